//! HTTP API handlers for rubric-ae
//!
//! REST endpoints for assignments, submissions and derived views, plus the
//! SSE progress stream and chat relay.

pub mod assessments;
pub mod events;
pub mod health;

pub use assessments::assessment_routes;
pub use events::event_routes;
pub use health::health_routes;

//! rubric-ae library interface
//!
//! Assessment engine: provider client with validation and fallback,
//! progress broadcaster, result cache, growth analysis, persistence and
//! the HTTP/SSE API. Exposed as a library for integration testing.

pub mod api;
pub mod assessment;
pub mod broadcast;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod growth;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::broadcast::ProgressBroadcaster;
use crate::services::AssessmentService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AssessmentService>,
    /// Same broadcaster the service's assessment client publishes to
    pub broadcaster: ProgressBroadcaster,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(service: Arc<AssessmentService>, broadcaster: ProgressBroadcaster) -> Self {
        Self {
            service,
            broadcaster,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Remember an error for `/health`
    pub async fn record_error(&self, message: String) {
        *self.last_error.write().await = Some(message);
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::assessment_routes())
        .merge(api::event_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

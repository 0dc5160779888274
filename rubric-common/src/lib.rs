//! # Rubric Common Library
//!
//! Shared code for the rubric assessment services including:
//! - Assessment data model (assignments, level scales, results)
//! - Progress stream message types
//! - SSE frame decoding and the reconnecting progress connector
//! - Configuration file and environment helpers
//! - Clock abstraction for time-dependent components

pub mod config;
pub mod error;
pub mod events;
pub mod model;
pub mod sse;
pub mod time;

pub use error::{Error, Result};
pub use events::{ProgressEvent, ProgressMessage, UserInfo};
pub use model::{
    AssessmentResult, Assignment, AssignmentConfig, Evaluation, LevelOrder, LevelScale,
    StudentContext, Submission, FALLBACK_EVALUATOR,
};

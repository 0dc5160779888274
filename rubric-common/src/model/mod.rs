//! Shared assessment data model

mod assignment;
mod result;

pub use assignment::{Assignment, AssignmentConfig, LevelOrder, LevelScale};
pub use result::{AssessmentResult, Evaluation, StudentContext, Submission, FALLBACK_EVALUATOR};

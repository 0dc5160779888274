//! Services composing the assessment pipeline with storage and caching

pub mod orchestrator;
pub mod statistics;

pub use orchestrator::{assignment_tag, student_tag, AssessmentService, NewSubmission};
pub use statistics::AssignmentStatistics;

//! Assessment pipeline
//!
//! Prompt construction, the provider call with retry and timeout, response
//! validation, and deterministic fallback generation.

mod client;
mod fallback;
mod prompt;
mod provider;
mod validator;

pub use client::{AssessmentClient, FallbackReason, ProviderOutcome, RetryPolicy};
pub use fallback::FallbackGenerator;
pub use prompt::{build_prompt, SYSTEM_PROMPT};
pub use provider::{AssessmentProvider, ChatCompletionsProvider, ProviderError, ProviderSettings};
pub use validator::{extract_json_object, parse_provider_response, validate_response};

use rubric_common::{AssignmentConfig, StudentContext, Submission};

/// Everything needed to assess one submission
#[derive(Debug, Clone, Copy)]
pub struct AssessmentRequest<'a> {
    pub submission: &'a Submission,
    pub config: &'a AssignmentConfig,
    pub student: &'a StudentContext,
}

impl<'a> AssessmentRequest<'a> {
    pub fn new(
        submission: &'a Submission,
        config: &'a AssignmentConfig,
        student: &'a StudentContext,
    ) -> Self {
        Self {
            submission,
            config,
            student,
        }
    }

    /// Writing type from the student context, else from the assignment
    pub fn writing_type(&self) -> Option<&'a str> {
        self.student
            .writing_type
            .as_deref()
            .or(self.config.writing_type.as_deref())
    }
}

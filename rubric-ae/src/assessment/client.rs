//! Assessment client
//!
//! Calls the provider with a bounded timeout and limited retries, validates
//! what comes back, and falls back to a generated result when the provider
//! is absent or fails. Progress is published on the assignment's topic.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::fallback::FallbackGenerator;
use super::prompt::{build_prompt, SYSTEM_PROMPT};
use super::provider::{AssessmentProvider, ProviderError};
use super::validator::{parse_provider_response, validate_response};
use super::AssessmentRequest;
use crate::broadcast::ProgressBroadcaster;
use rubric_common::{time, AssessmentResult, ProgressEvent, ProgressMessage, Result};

/// Text of the `error` progress event; provider details stay in the log
pub const PROVIDER_FAILURE_MESSAGE: &str =
    "Automatic assessment is temporarily unavailable; a preliminary result was generated.";

/// Timeout and retry settings for provider calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Upper bound for one provider call
    pub timeout: Duration,
    /// Extra attempts after a transient failure
    pub max_retries: u32,
    /// Pause before each retry
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 1,
            retry_delay: Duration::from_millis(500),
        }
    }
}

/// Why the provider's answer could not be used
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// No provider configured; fallback is the normal mode
    Unconfigured,
    Timeout(Duration),
    Upstream(String),
    Parse(String),
}

impl FallbackReason {
    /// True when a configured provider failed
    pub fn is_provider_failure(&self) -> bool {
        !matches!(self, Self::Unconfigured)
    }
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unconfigured => write!(f, "provider not configured"),
            Self::Timeout(after) => write!(f, "provider timed out after {:?}", after),
            Self::Upstream(detail) => write!(f, "provider error: {}", detail),
            Self::Parse(detail) => write!(f, "unparseable provider response: {}", detail),
        }
    }
}

/// Result of trying the provider
#[derive(Debug, Clone)]
pub enum ProviderOutcome {
    Assessed(AssessmentResult),
    NeedsFallback(FallbackReason),
}

/// Produces an [`AssessmentResult`] for every well-configured request
#[derive(Clone)]
pub struct AssessmentClient {
    provider: Option<Arc<dyn AssessmentProvider>>,
    broadcaster: ProgressBroadcaster,
    policy: RetryPolicy,
    fallback: FallbackGenerator,
}

impl AssessmentClient {
    /// Create a client
    ///
    /// `provider = None` runs every assessment through the fallback
    /// generator.
    pub fn new(
        provider: Option<Arc<dyn AssessmentProvider>>,
        broadcaster: ProgressBroadcaster,
    ) -> Self {
        Self {
            provider,
            broadcaster,
            policy: RetryPolicy::default(),
            fallback: FallbackGenerator::new(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackGenerator) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn is_provider_configured(&self) -> bool {
        self.provider.is_some()
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Assess one submission
    ///
    /// Emits `started` before the provider call and `completed` after it, or
    /// `error` when a configured provider failed and the result came from
    /// the fallback generator.
    ///
    /// # Errors
    /// Only configuration errors (empty, blank or duplicate domains or
    /// levels), reported before anything is published.
    pub async fn assess(&self, request: &AssessmentRequest<'_>) -> Result<AssessmentResult> {
        request.config.validate()?;

        let topic = request.submission.assignment_id.as_str();
        let student_name = request.student.student_name.as_str();

        self.broadcaster.broadcast(
            topic,
            ProgressMessage::Started(
                ProgressEvent::new(topic)
                    .with_submission(&request.submission.id)
                    .with_student(student_name),
            ),
            None,
        );

        let (result, failure) = match self.attempt_provider(request).await {
            ProviderOutcome::Assessed(result) => (result, None),
            ProviderOutcome::NeedsFallback(reason) => {
                if reason.is_provider_failure() {
                    warn!(
                        submission = %request.submission.id,
                        reason = %reason,
                        "Provider failed, using fallback assessment"
                    );
                } else {
                    debug!(submission = %request.submission.id, "Using fallback assessment");
                }
                let result = self.fallback.generate(request, time::now());
                (result, reason.is_provider_failure().then_some(reason))
            }
        };

        let event = ProgressEvent::new(topic)
            .with_submission(&request.submission.id)
            .with_student(student_name)
            .with_evaluation(result.id, result.overall.level.clone());

        let message = match failure {
            None => ProgressMessage::Completed(event),
            Some(_) => ProgressMessage::Error(event.with_message(PROVIDER_FAILURE_MESSAGE)),
        };
        self.broadcaster.broadcast(topic, message, None);

        info!(
            submission = %request.submission.id,
            evaluation = %result.id,
            evaluated_by = %result.evaluated_by,
            overall = %result.overall.level,
            "Assessment finished"
        );

        Ok(result)
    }

    /// Try the provider, retrying transient failures
    ///
    /// Unparseable replies are not retried.
    pub async fn attempt_provider(&self, request: &AssessmentRequest<'_>) -> ProviderOutcome {
        let Some(provider) = &self.provider else {
            return ProviderOutcome::NeedsFallback(FallbackReason::Unconfigured);
        };

        let prompt = build_prompt(request);
        let mut retries = 0;

        loop {
            let reply = match tokio::time::timeout(
                self.policy.timeout,
                provider.complete(SYSTEM_PROMPT, &prompt),
            )
            .await
            {
                Ok(reply) => reply,
                Err(_) => Err(ProviderError::Timeout(self.policy.timeout)),
            };

            match reply {
                Ok(text) => {
                    return match parse_provider_response(&text) {
                        Ok(value) => ProviderOutcome::Assessed(validate_response(
                            &value,
                            request,
                            provider.model_id(),
                            time::now(),
                        )),
                        Err(detail) => ProviderOutcome::NeedsFallback(FallbackReason::Parse(detail)),
                    };
                }
                Err(e) if e.is_transient() && retries < self.policy.max_retries => {
                    retries += 1;
                    warn!(
                        submission = %request.submission.id,
                        attempt = retries,
                        error = %e,
                        "Transient provider failure, retrying"
                    );
                    tokio::time::sleep(self.policy.retry_delay).await;
                }
                Err(ProviderError::Timeout(after)) => {
                    return ProviderOutcome::NeedsFallback(FallbackReason::Timeout(after));
                }
                Err(e) => {
                    return ProviderOutcome::NeedsFallback(FallbackReason::Upstream(e.to_string()));
                }
            }
        }
    }
}

//! Assessment results and the inputs they are produced from

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::AssignmentConfig;
use crate::{Error, Result};

/// `evaluated_by` marker for results produced without the external provider
pub const FALLBACK_EVALUATOR: &str = "fallback";

/// Judgment for one domain, or the overall judgment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub level: String,
    /// 0-100 inclusive
    pub score: f64,
    pub feedback: String,
}

/// One evaluator run over one submission
///
/// Never mutated after creation. A correction is a new result, so the full
/// history stays available for growth analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentResult {
    /// Evaluation id
    pub id: Uuid,
    pub submission_id: String,
    pub assignment_id: String,
    pub student_key: String,
    /// Keyed by domain name; key set equals the assignment's domain set
    pub domain_evaluations: BTreeMap<String, Evaluation>,
    pub overall: Evaluation,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    /// Model identifier, or [`FALLBACK_EVALUATOR`]
    pub evaluated_by: String,
    pub evaluated_at: DateTime<Utc>,
}

impl AssessmentResult {
    pub fn is_fallback(&self) -> bool {
        self.evaluated_by == FALLBACK_EVALUATOR
    }

    /// Verify the result against the config it claims to satisfy
    ///
    /// # Errors
    /// [`Error::InvalidInput`] naming the first violated constraint.
    pub fn check_against(&self, config: &AssignmentConfig) -> Result<()> {
        let expected: Vec<&str> = {
            let mut d: Vec<&str> = config.domains.iter().map(String::as_str).collect();
            d.sort_unstable();
            d
        };
        let actual: Vec<&str> = self.domain_evaluations.keys().map(String::as_str).collect();
        if expected != actual {
            return Err(Error::InvalidInput(format!(
                "domain set mismatch: expected {:?}, found {:?}",
                expected, actual
            )));
        }

        let evaluations = self
            .domain_evaluations
            .iter()
            .map(|(name, eval)| (name.as_str(), eval))
            .chain(std::iter::once(("overall", &self.overall)));

        for (name, eval) in evaluations {
            if !config.levels.iter().any(|l| l == &eval.level) {
                return Err(Error::InvalidInput(format!(
                    "{}: level '{}' is not in the assignment vocabulary",
                    name, eval.level
                )));
            }
            if !(0.0..=100.0).contains(&eval.score) {
                return Err(Error::InvalidInput(format!(
                    "{}: score {} outside 0-100",
                    name, eval.score
                )));
            }
        }
        Ok(())
    }
}

/// Who wrote the submission
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentContext {
    /// Stable key used to collect the student's history
    pub student_key: String,
    pub student_name: String,
    /// Overrides the assignment's writing type for fallback text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writing_type: Option<String>,
}

/// Writing sample submitted for assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: String,
    pub assignment_id: String,
    pub content: String,
}

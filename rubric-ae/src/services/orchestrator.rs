//! Assessment service
//!
//! Composition root for one submission: load the rubric, assess, persist,
//! then invalidate the cached views that depend on the new result.

use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use super::statistics::AssignmentStatistics;
use crate::assessment::{AssessmentClient, AssessmentRequest};
use crate::cache::ResultCache;
use crate::db::AssessmentRepository;
use crate::growth::{GrowthAnalyzer, GrowthSummary};
use rubric_common::{
    time, AssessmentResult, Assignment, AssignmentConfig, Error, Result, StudentContext,
    Submission,
};

/// Cache tag for views derived from an assignment's results
pub fn assignment_tag(assignment_id: &str) -> String {
    format!("assignment:{}", assignment_id)
}

/// Cache tag for views derived from a student's history
pub fn student_tag(student_key: &str) -> String {
    format!("student:{}", student_key)
}

/// Submission as received from a caller
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubmission {
    /// Generated when absent
    #[serde(default)]
    pub submission_id: Option<String>,
    pub student_key: String,
    pub student_name: String,
    pub content: String,
    #[serde(default)]
    pub writing_type: Option<String>,
}

pub struct AssessmentService {
    client: AssessmentClient,
    repository: Arc<dyn AssessmentRepository>,
    statistics_cache: ResultCache<AssignmentStatistics>,
    growth_cache: ResultCache<GrowthSummary>,
}

impl AssessmentService {
    pub fn new(
        client: AssessmentClient,
        repository: Arc<dyn AssessmentRepository>,
        cache_ttl: Duration,
    ) -> Self {
        Self::with_caches(
            client,
            repository,
            ResultCache::new(cache_ttl),
            ResultCache::new(cache_ttl),
        )
    }

    pub fn with_caches(
        client: AssessmentClient,
        repository: Arc<dyn AssessmentRepository>,
        statistics_cache: ResultCache<AssignmentStatistics>,
        growth_cache: ResultCache<GrowthSummary>,
    ) -> Self {
        Self {
            client,
            repository,
            statistics_cache,
            growth_cache,
        }
    }

    pub fn client(&self) -> &AssessmentClient {
        &self.client
    }

    pub fn statistics_cache(&self) -> &ResultCache<AssignmentStatistics> {
        &self.statistics_cache
    }

    pub fn growth_cache(&self) -> &ResultCache<GrowthSummary> {
        &self.growth_cache
    }

    /// Validate and store a new assignment
    pub async fn create_assignment(
        &self,
        title: &str,
        config: AssignmentConfig,
    ) -> Result<Assignment> {
        config.validate()?;
        if title.trim().is_empty() {
            return Err(Error::InvalidInput("assignment title is empty".to_string()));
        }

        let assignment = Assignment {
            id: Uuid::new_v4().to_string(),
            title: title.trim().to_string(),
            config,
            created_at: time::now(),
        };
        self.repository.save_assignment(&assignment).await?;

        info!(assignment = %assignment.id, title = %assignment.title, "Assignment created");
        Ok(assignment)
    }

    pub async fn assignment(&self, assignment_id: &str) -> Result<Assignment> {
        self.repository
            .load_assignment(assignment_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("assignment {}", assignment_id)))
    }

    /// Assess a submission against its assignment and persist the result
    pub async fn submit(&self, assignment_id: &str, input: NewSubmission) -> Result<AssessmentResult> {
        if input.content.trim().is_empty() {
            return Err(Error::InvalidInput("submission content is empty".to_string()));
        }
        if input.student_key.trim().is_empty() {
            return Err(Error::InvalidInput("student key is empty".to_string()));
        }

        let config = self.repository.load_assignment_config(assignment_id).await?;

        let submission = Submission {
            id: input
                .submission_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            assignment_id: assignment_id.to_string(),
            content: input.content,
        };
        let student = StudentContext {
            student_key: input.student_key,
            student_name: input.student_name,
            writing_type: input.writing_type,
        };

        let result = self
            .client
            .assess(&AssessmentRequest::new(&submission, &config, &student))
            .await?;

        self.repository.persist_result(&result).await?;

        let stale = self.statistics_cache.invalidate_by_tag(&assignment_tag(assignment_id))
            + self.growth_cache.invalidate_by_tag(&student_tag(&result.student_key));
        debug!(evaluation = %result.id, stale, "Invalidated cached views");

        Ok(result)
    }

    /// Aggregate statistics for an assignment (cached)
    pub async fn statistics(&self, assignment_id: &str) -> Result<AssignmentStatistics> {
        let key = format!("stats:{}", assignment_id);
        let tags = [assignment_tag(assignment_id)];

        self.statistics_cache
            .get_or_compute(&key, None, &tags, || async {
                // Unknown assignment is an error, not an empty report
                self.assignment(assignment_id).await?;
                let results = self.repository.load_assignment_results(assignment_id).await?;
                Ok::<_, Error>(AssignmentStatistics::from_results(assignment_id, &results))
            })
            .await
    }

    /// Growth summary over a student's full history (cached)
    ///
    /// Each result is ranked on its own assignment's level scale.
    pub async fn growth(&self, student_key: &str) -> Result<GrowthSummary> {
        let key = format!("growth:{}", student_key);
        let tags = [student_tag(student_key)];

        self.growth_cache
            .get_or_compute(&key, None, &tags, || async {
                let history = self.repository.load_history(student_key).await?;

                let assignment_ids: HashSet<&str> =
                    history.iter().map(|r| r.assignment_id.as_str()).collect();

                let mut scales = HashMap::new();
                for id in assignment_ids {
                    if let Some(assignment) = self.repository.load_assignment(id).await? {
                        scales.insert(id.to_string(), assignment.config.scale());
                    }
                }

                Ok::<_, Error>(GrowthAnalyzer::with_scales(scales).analyze(&history))
            })
            .await
    }
}

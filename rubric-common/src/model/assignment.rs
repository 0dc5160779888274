//! Assignment configuration and level vocabulary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::{Error, Result};

/// Direction of the level list, fixed when the assignment is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelOrder {
    /// `levels[0]` is the weakest achievement
    #[default]
    WorstFirst,
    /// `levels[0]` is the strongest achievement
    BestFirst,
}

/// Rubric definition an assessment is judged against
///
/// Immutable once any [`AssessmentResult`](super::AssessmentResult) references it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentConfig {
    /// Rubric dimensions, in display order
    pub domains: Vec<String>,
    /// Ordinal level labels
    pub levels: Vec<String>,
    /// Which end of `levels` is the best
    #[serde(default)]
    pub level_order: LevelOrder,
    /// Free-text grading criteria handed to the provider
    #[serde(default)]
    pub grading_criteria: String,
    /// Writing genre (narrative, argumentative, ...), used for fallback text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writing_type: Option<String>,
}

impl AssignmentConfig {
    pub fn new<D, L>(domains: D, levels: L) -> Self
    where
        D: IntoIterator,
        D::Item: Into<String>,
        L: IntoIterator,
        L::Item: Into<String>,
    {
        Self {
            domains: domains.into_iter().map(Into::into).collect(),
            levels: levels.into_iter().map(Into::into).collect(),
            level_order: LevelOrder::WorstFirst,
            grading_criteria: String::new(),
            writing_type: None,
        }
    }

    pub fn with_level_order(mut self, order: LevelOrder) -> Self {
        self.level_order = order;
        self
    }

    pub fn with_grading_criteria(mut self, criteria: impl Into<String>) -> Self {
        self.grading_criteria = criteria.into();
        self
    }

    pub fn with_writing_type(mut self, writing_type: impl Into<String>) -> Self {
        self.writing_type = Some(writing_type.into());
        self
    }

    /// Check the preconditions every assessment relies on
    ///
    /// # Errors
    /// [`Error::InvalidRubric`] when the domain or level list is empty, or contains
    /// blank or duplicate labels.
    pub fn validate(&self) -> Result<()> {
        check_labels("domain", &self.domains)?;
        check_labels("level", &self.levels)?;
        Ok(())
    }

    /// Ordinal view over the level list
    pub fn scale(&self) -> LevelScale {
        LevelScale::new(&self.levels, self.level_order)
    }

    /// Configured spelling of `raw`, matched case-insensitively after trimming
    pub fn canonical_level(&self, raw: &str) -> Option<&str> {
        let wanted = raw.trim();
        self.levels
            .iter()
            .find(|level| level.trim().eq_ignore_ascii_case(wanted) || level.trim() == wanted)
            .map(String::as_str)
    }

    /// Level substituted when the provider omits the overall level
    pub fn default_overall_level(&self) -> &str {
        self.levels
            .get(1)
            .or_else(|| self.levels.first())
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Neutral level substituted for a missing or invalid domain level
    pub fn middle_level(&self) -> &str {
        let scale = self.scale();
        let rank = scale.len() / 2;
        let label = scale.label(rank).unwrap_or_default().to_string();
        self.canonical_level(&label).unwrap_or_default()
    }
}

fn check_labels(kind: &str, labels: &[String]) -> Result<()> {
    if labels.is_empty() {
        return Err(Error::InvalidRubric(format!("assignment has no {} entries", kind)));
    }

    let mut seen = HashSet::new();
    for label in labels {
        let trimmed = label.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidRubric(format!("blank {} label", kind)));
        }
        if !seen.insert(trimmed.to_lowercase()) {
            return Err(Error::InvalidRubric(format!("duplicate {} label '{}'", kind, trimmed)));
        }
    }
    Ok(())
}

/// Level labels ranked from worst (rank 0) to best
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelScale {
    worst_first: Vec<String>,
}

impl LevelScale {
    pub fn new(levels: &[String], order: LevelOrder) -> Self {
        let mut worst_first: Vec<String> = levels.to_vec();
        if order == LevelOrder::BestFirst {
            worst_first.reverse();
        }
        Self { worst_first }
    }

    pub fn len(&self) -> usize {
        self.worst_first.len()
    }

    pub fn is_empty(&self) -> bool {
        self.worst_first.is_empty()
    }

    /// Zero-based quality rank of `label` (0 = worst)
    pub fn rank(&self, label: &str) -> Option<usize> {
        let wanted = label.trim();
        self.worst_first
            .iter()
            .position(|l| l.trim() == wanted || l.trim().eq_ignore_ascii_case(wanted))
    }

    /// One-based ordinal of `label` (worst = 1, best = `len()`)
    pub fn ordinal(&self, label: &str) -> Option<u32> {
        self.rank(label).map(|rank| rank as u32 + 1)
    }

    /// Label at the given quality rank
    pub fn label(&self, rank: usize) -> Option<&str> {
        self.worst_first.get(rank).map(String::as_str)
    }

    pub fn worst(&self) -> Option<&str> {
        self.label(0)
    }

    pub fn best(&self) -> Option<&str> {
        self.worst_first.last().map(String::as_str)
    }
}

/// Stored assignment: a config with identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: String,
    pub title: String,
    pub config: AssignmentConfig,
    pub created_at: DateTime<Utc>,
}

//! Per-assignment aggregate statistics

use serde::Serialize;
use std::collections::BTreeMap;

use rubric_common::AssessmentResult;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentStatistics {
    pub assignment_id: String,
    pub evaluation_count: usize,
    /// Results produced by the fallback generator
    pub fallback_count: usize,
    /// Overall level -> number of results
    pub overall_level_distribution: BTreeMap<String, usize>,
    pub domain_average_scores: BTreeMap<String, f64>,
    /// `None` when there are no results
    pub overall_average_score: Option<f64>,
}

impl AssignmentStatistics {
    pub fn from_results(assignment_id: &str, results: &[AssessmentResult]) -> Self {
        let mut distribution: BTreeMap<String, usize> = BTreeMap::new();
        let mut domain_totals: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        let mut overall_total = 0.0;

        for result in results {
            *distribution.entry(result.overall.level.clone()).or_default() += 1;
            overall_total += result.overall.score;

            for (domain, evaluation) in &result.domain_evaluations {
                let entry = domain_totals.entry(domain.clone()).or_default();
                entry.0 += evaluation.score;
                entry.1 += 1;
            }
        }

        let domain_average_scores = domain_totals
            .into_iter()
            .map(|(domain, (total, count))| (domain, round1(total / count as f64)))
            .collect();

        Self {
            assignment_id: assignment_id.to_string(),
            evaluation_count: results.len(),
            fallback_count: results.iter().filter(|r| r.is_fallback()).count(),
            overall_level_distribution: distribution,
            domain_average_scores,
            overall_average_score: (!results.is_empty())
                .then(|| round1(overall_total / results.len() as f64)),
        }
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

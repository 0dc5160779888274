//! Longitudinal growth over a student's assessment history
//!
//! Level labels become ordinals (worst = 1 .. best = n) using the level
//! order of the assignment each result belongs to, so histories spanning
//! several rubrics stay comparable step for step.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use rubric_common::{AssessmentResult, LevelScale};

/// Display scaling: percent per level step
pub const DEFAULT_PERCENT_PER_LEVEL: f64 = 25.0;

const TREND_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Stable,
    Declining,
}

/// Ordinal series for one domain
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainGrowth {
    pub series: Vec<u32>,
    pub first: u32,
    pub last: u32,
    pub change: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthDetail {
    /// Results considered (oldest first)
    pub assessments: usize,
    pub domains: BTreeMap<String, DomainGrowth>,
    pub overall_series: Vec<u32>,
    /// Mean of `last - first` over domains with at least two points
    pub improvement_rate: f64,
    pub trend: Trend,
}

/// `{"hasData": false}` or `{"hasData": true, ...detail}`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthSummary {
    pub has_data: bool,
    #[serde(flatten)]
    pub detail: Option<GrowthDetail>,
}

impl GrowthSummary {
    pub fn no_data() -> Self {
        Self {
            has_data: false,
            detail: None,
        }
    }

    pub fn improvement_rate(&self) -> Option<f64> {
        self.detail.as_ref().map(|d| d.improvement_rate)
    }

    /// Improvement rate scaled to percent, `step` percent per level
    pub fn improvement_percent(&self, step: f64) -> Option<f64> {
        self.improvement_rate().map(|rate| rate * step)
    }
}

/// Computes growth summaries
#[derive(Debug, Clone, Default)]
pub struct GrowthAnalyzer {
    default_scale: Option<LevelScale>,
    scales: HashMap<String, LevelScale>,
}

impl GrowthAnalyzer {
    /// One scale for every result
    pub fn with_scale(scale: LevelScale) -> Self {
        Self {
            default_scale: Some(scale),
            scales: HashMap::new(),
        }
    }

    /// Scale per assignment id
    pub fn with_scales(scales: HashMap<String, LevelScale>) -> Self {
        Self {
            default_scale: None,
            scales,
        }
    }

    fn scale_for(&self, assignment_id: &str) -> Option<&LevelScale> {
        self.scales
            .get(assignment_id)
            .or(self.default_scale.as_ref())
    }

    /// Summarize `history`, ordered oldest first
    ///
    /// Fewer than two results yields no data. A domain missing from a result,
    /// or a label the scale does not know, skips that point.
    pub fn analyze(&self, history: &[AssessmentResult]) -> GrowthSummary {
        if history.len() < 2 {
            return GrowthSummary::no_data();
        }

        let mut series: BTreeMap<String, Vec<u32>> = BTreeMap::new();
        let mut overall_series = Vec::new();

        for result in history {
            let Some(scale) = self.scale_for(&result.assignment_id) else {
                continue;
            };

            for (domain, evaluation) in &result.domain_evaluations {
                if let Some(ordinal) = scale.ordinal(&evaluation.level) {
                    series.entry(domain.clone()).or_default().push(ordinal);
                }
            }
            if let Some(ordinal) = scale.ordinal(&result.overall.level) {
                overall_series.push(ordinal);
            }
        }

        let domains: BTreeMap<String, DomainGrowth> = series
            .into_iter()
            .filter_map(|(domain, points)| {
                let first = *points.first()?;
                let last = *points.last()?;
                Some((
                    domain,
                    DomainGrowth {
                        change: i64::from(last) - i64::from(first),
                        series: points,
                        first,
                        last,
                    },
                ))
            })
            .collect();

        let changes: Vec<i64> = domains
            .values()
            .filter(|growth| growth.series.len() >= 2)
            .map(|growth| growth.change)
            .collect();

        let improvement_rate = if changes.is_empty() {
            0.0
        } else {
            changes.iter().sum::<i64>() as f64 / changes.len() as f64
        };

        let trend = if improvement_rate > TREND_EPSILON {
            Trend::Improving
        } else if improvement_rate < -TREND_EPSILON {
            Trend::Declining
        } else {
            Trend::Stable
        };

        GrowthSummary {
            has_data: true,
            detail: Some(GrowthDetail {
                assessments: history.len(),
                domains,
                overall_series,
                improvement_rate,
                trend,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rubric_common::{Evaluation, LevelOrder};
    use uuid::Uuid;

    const KOREAN_LEVELS: [&str; 4] = ["미흡", "보통", "우수", "매우우수"];

    fn korean_scale() -> LevelScale {
        let levels: Vec<String> = KOREAN_LEVELS.iter().map(|s| s.to_string()).collect();
        LevelScale::new(&levels, LevelOrder::WorstFirst)
    }

    fn eval(level: &str) -> Evaluation {
        Evaluation {
            level: level.to_string(),
            score: 70.0,
            feedback: String::new(),
        }
    }

    fn result(assignment: &str, domains: &[(&str, &str)], overall: &str) -> AssessmentResult {
        AssessmentResult {
            id: Uuid::new_v4(),
            submission_id: "s".into(),
            assignment_id: assignment.into(),
            student_key: "k".into(),
            domain_evaluations: domains
                .iter()
                .map(|(d, l)| (d.to_string(), eval(l)))
                .collect(),
            overall: eval(overall),
            strengths: vec![],
            improvements: vec![],
            evaluated_by: "fallback".into(),
            evaluated_at: Utc::now(),
        }
    }

    #[test]
    fn test_too_little_history_has_no_data() {
        let analyzer = GrowthAnalyzer::with_scale(korean_scale());
        assert_eq!(analyzer.analyze(&[]), GrowthSummary::no_data());
        assert_eq!(
            analyzer.analyze(&[result("a", &[("내용", "우수")], "우수")]),
            GrowthSummary::no_data()
        );
        assert_eq!(
            serde_json::to_value(GrowthSummary::no_data()).unwrap(),
            serde_json::json!({"hasData": false})
        );
    }

    #[test]
    fn test_two_points_give_series_and_rate() {
        let analyzer = GrowthAnalyzer::with_scale(korean_scale());
        let summary = analyzer.analyze(&[
            result("a", &[("내용", "미흡")], "미흡"),
            result("a", &[("내용", "우수")], "우수"),
        ]);

        let detail = summary.detail.as_ref().unwrap();
        assert!(summary.has_data);
        assert_eq!(detail.domains["내용"].series, vec![1, 3]);
        assert_eq!(detail.improvement_rate, 2.0);
        assert_eq!(detail.trend, Trend::Improving);
        assert_eq!(detail.overall_series, vec![1, 3]);
        assert_eq!(summary.improvement_percent(DEFAULT_PERCENT_PER_LEVEL), Some(50.0));
    }

    #[test]
    fn test_missing_and_unknown_points_are_skipped() {
        let analyzer = GrowthAnalyzer::with_scale(korean_scale());
        let summary = analyzer.analyze(&[
            result("a", &[("내용", "보통"), ("조직", "매우우수")], "보통"),
            result("a", &[("내용", "unknown")], "보통"),
            result("a", &[("내용", "매우우수")], "우수"),
        ]);

        let detail = summary.detail.unwrap();
        assert_eq!(detail.domains["내용"].series, vec![2, 4]);
        // Single point: reported, but not part of the rate
        assert_eq!(detail.domains["조직"].series, vec![4]);
        assert_eq!(detail.improvement_rate, 2.0);
    }

    #[test]
    fn test_best_first_assignment_uses_its_own_order() {
        let best_first: Vec<String> = ["A", "B", "C"].iter().map(|s| s.to_string()).collect();
        let mut scales = HashMap::new();
        scales.insert("korean".to_string(), korean_scale());
        scales.insert(
            "letters".to_string(),
            LevelScale::new(&best_first, LevelOrder::BestFirst),
        );
        let analyzer = GrowthAnalyzer::with_scales(scales);

        let summary = analyzer.analyze(&[
            result("letters", &[("voice", "A")], "A"),
            result("korean", &[("voice", "미흡")], "미흡"),
        ]);

        let detail = summary.detail.unwrap();
        assert_eq!(detail.domains["voice"].series, vec![3, 1]);
        assert_eq!(detail.improvement_rate, -2.0);
        assert_eq!(detail.trend, Trend::Declining);
    }

    #[test]
    fn test_serialized_shape() {
        let analyzer = GrowthAnalyzer::with_scale(korean_scale());
        let summary = analyzer.analyze(&[
            result("a", &[("내용", "보통")], "보통"),
            result("a", &[("내용", "보통")], "보통"),
        ]);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["hasData"], true);
        assert_eq!(json["improvementRate"], 0.0);
        assert_eq!(json["trend"], "stable");
        assert_eq!(json["domains"]["내용"]["series"], serde_json::json!([2, 2]));
    }
}

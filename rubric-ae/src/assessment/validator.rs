//! Provider response normalization
//!
//! Turns whatever the provider sent back into a result that satisfies the
//! assignment's schema, substituting defaults field by field.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::AssessmentRequest;
use rubric_common::{AssessmentResult, AssignmentConfig, Evaluation};

/// Score used when the provider gives none (or an unusable one) for a domain
pub const DEFAULT_DOMAIN_SCORE: f64 = 75.0;

const DOMAIN_MAP_KEYS: [&str; 3] = ["domains", "domainEvaluations", "domainScores"];

/// First complete, brace-matched JSON object in `text`
///
/// Braces inside string literals (including escaped quotes) are ignored.
/// Returns `None` when no object closes.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Extract and parse the JSON object embedded in a provider reply
///
/// # Errors
/// A short description when no object is found or it does not parse.
pub fn parse_provider_response(text: &str) -> Result<Value, String> {
    let object = extract_json_object(text).ok_or_else(|| "no JSON object in response".to_string())?;
    serde_json::from_str(object).map_err(|e| format!("invalid JSON object: {}", e))
}

/// Build a schema-valid result from an arbitrary JSON value
///
/// Every configured domain is present in the output; levels are normalized
/// to the configured spelling; scores are clamped to 0-100. Anything missing
/// or unusable is replaced by a default rather than rejected.
pub fn validate_response(
    raw: &Value,
    request: &AssessmentRequest<'_>,
    evaluated_by: &str,
    evaluated_at: DateTime<Utc>,
) -> AssessmentResult {
    let config = request.config;
    let domain_map = DOMAIN_MAP_KEYS
        .iter()
        .find_map(|key| raw.get(key).and_then(Value::as_object));

    let domain_evaluations: BTreeMap<String, Evaluation> = config
        .domains
        .iter()
        .map(|domain| {
            let entry = domain_map.and_then(|map| lookup(map, domain));
            (domain.clone(), domain_evaluation(entry, config))
        })
        .collect();

    let overall = overall_evaluation(raw.get("overall"), &domain_evaluations, config);

    AssessmentResult {
        id: Uuid::new_v4(),
        submission_id: request.submission.id.clone(),
        assignment_id: request.submission.assignment_id.clone(),
        student_key: request.student.student_key.clone(),
        domain_evaluations,
        overall,
        strengths: text_list(raw.get("strengths")),
        improvements: text_list(raw.get("improvements")),
        evaluated_by: evaluated_by.to_string(),
        evaluated_at,
    }
}

/// Exact key first, then trimmed case-insensitive match
fn lookup<'v>(map: &'v Map<String, Value>, domain: &str) -> Option<&'v Value> {
    map.get(domain).or_else(|| {
        let wanted = domain.trim().to_lowercase();
        map.iter()
            .find(|(key, _)| key.trim().to_lowercase() == wanted)
            .map(|(_, value)| value)
    })
}

fn domain_evaluation(entry: Option<&Value>, config: &AssignmentConfig) -> Evaluation {
    let (level, score, feedback) = match entry {
        Some(Value::Object(fields)) => (
            fields.get("level").and_then(|v| level_of(v, config)),
            fields.get("score").and_then(score_of),
            fields.get("feedback").and_then(Value::as_str),
        ),
        // Bare score, or bare level label
        Some(value @ (Value::Number(_) | Value::String(_))) => {
            (level_of(value, config), score_of(value), None)
        }
        _ => (None, None, None),
    };

    Evaluation {
        level: level.unwrap_or_else(|| config.middle_level()).to_string(),
        score: score.unwrap_or(DEFAULT_DOMAIN_SCORE),
        feedback: feedback.unwrap_or_default().trim().to_string(),
    }
}

fn overall_evaluation(
    entry: Option<&Value>,
    domains: &BTreeMap<String, Evaluation>,
    config: &AssignmentConfig,
) -> Evaluation {
    let (level, score, feedback) = match entry {
        Some(Value::Object(fields)) => (
            fields.get("level").and_then(|v| level_of(v, config)),
            fields.get("score").and_then(score_of),
            fields.get("feedback").and_then(Value::as_str),
        ),
        // Bare score, or bare level label
        Some(value @ (Value::Number(_) | Value::String(_))) => {
            (level_of(value, config), score_of(value), None)
        }
        _ => (None, None, None),
    };

    let score = score.unwrap_or_else(|| mean_score(domains));

    Evaluation {
        level: level.unwrap_or_else(|| config.default_overall_level()).to_string(),
        score,
        feedback: feedback.unwrap_or_default().trim().to_string(),
    }
}

fn mean_score(domains: &BTreeMap<String, Evaluation>) -> f64 {
    if domains.is_empty() {
        return DEFAULT_DOMAIN_SCORE;
    }
    domains.values().map(|e| e.score).sum::<f64>() / domains.len() as f64
}

fn level_of<'c>(value: &Value, config: &'c AssignmentConfig) -> Option<&'c str> {
    value.as_str().and_then(|raw| config.canonical_level(raw))
}

/// Finite number or numeric string, clamped to 0-100
fn score_of(value: &Value) -> Option<f64> {
    let score = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    score.is_finite().then(|| score.clamp(0.0, 100.0))
}

/// Array of strings, or a single string
fn text_list(value: Option<&Value>) -> Vec<String> {
    let items: Vec<&str> = match value {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
        Some(Value::String(item)) => vec![item.as_str()],
        _ => Vec::new(),
    };

    items
        .into_iter()
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rubric_common::{StudentContext, Submission};
    use serde_json::json;

    struct Fixture {
        submission: Submission,
        config: AssignmentConfig,
        student: StudentContext,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                submission: Submission {
                    id: "s-1".into(),
                    assignment_id: "a-1".into(),
                    content: "text".into(),
                },
                config: AssignmentConfig::new(
                    ["clarity", "structure"],
                    ["poor", "fair", "good", "excellent"],
                ),
                student: StudentContext {
                    student_key: "k-1".into(),
                    student_name: "Kim".into(),
                    writing_type: None,
                },
            }
        }

        fn validate(&self, raw: &Value) -> AssessmentResult {
            let request = AssessmentRequest::new(&self.submission, &self.config, &self.student);
            validate_response(raw, &request, "model-x", Utc::now())
        }
    }

    #[test]
    fn test_extract_skips_braces_in_strings() {
        let text = r#"Sure! {"a": "curly } and \" quote {", "b": {"c": 1}} trailing {"#;
        assert_eq!(
            extract_json_object(text),
            Some(r#"{"a": "curly } and \" quote {", "b": {"c": 1}}"#)
        );
    }

    #[test]
    fn test_extract_handles_code_fences_and_unclosed() {
        assert_eq!(extract_json_object("```json\n{\"x\":1}\n```"), Some("{\"x\":1}"));
        assert_eq!(extract_json_object("{\"x\": {"), None);
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[test]
    fn test_parse_reports_failures() {
        assert!(parse_provider_response("nothing").is_err());
        assert!(parse_provider_response("{not: valid}").is_err());
        assert_eq!(parse_provider_response("x {\"k\":2} y").unwrap(), json!({"k": 2}));
    }

    #[test]
    fn test_arbitrary_values_yield_valid_results() {
        let fixture = Fixture::new();
        let inputs = [
            Value::Null,
            json!([]),
            json!([1, 2, 3]),
            json!(42),
            json!("just text"),
            json!(true),
            json!({}),
            json!({"domains": null}),
            json!({"domains": {"clarity": "bogus"}, "overall": 7}),
            json!({"domains": {"clarity": {"score": -50}, "structure": {"score": 900}}}),
            json!({"domains": {"clarity": {"score": "NaN"}}, "overall": {"level": []}}),
        ];

        for raw in &inputs {
            let result = fixture.validate(raw);
            result
                .check_against(&fixture.config)
                .unwrap_or_else(|e| panic!("{:?} produced invalid result: {}", raw, e));
        }
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let fixture = Fixture::new();
        let result = fixture.validate(&json!({}));

        for evaluation in result.domain_evaluations.values() {
            assert_eq!(evaluation.score, DEFAULT_DOMAIN_SCORE);
            assert_eq!(evaluation.level, "good");
        }
        assert_eq!(result.overall.level, "fair");
        assert_eq!(result.overall.score, DEFAULT_DOMAIN_SCORE);
        assert!(result.strengths.is_empty());
        assert_eq!(result.evaluated_by, "model-x");
        assert_eq!(result.submission_id, "s-1");
        assert_eq!(result.student_key, "k-1");
    }

    #[test]
    fn test_provider_values_normalized() {
        let fixture = Fixture::new();
        let result = fixture.validate(&json!({
            "domainEvaluations": {
                " Clarity ": {"level": " EXCELLENT ", "score": "92", "feedback": " Crisp. "},
                "structure": {"level": "poor", "score": 110}
            },
            "overall": {"level": "Good"},
            "strengths": "Vivid detail",
            "improvements": ["", "Paragraphing", 3]
        }));

        let clarity = &result.domain_evaluations["clarity"];
        assert_eq!(clarity.level, "excellent");
        assert_eq!(clarity.score, 92.0);
        assert_eq!(clarity.feedback, "Crisp.");

        let structure = &result.domain_evaluations["structure"];
        assert_eq!(structure.level, "poor");
        assert_eq!(structure.score, 100.0);

        assert_eq!(result.overall.level, "good");
        assert_eq!(result.overall.score, 96.0);
        assert_eq!(result.strengths, vec!["Vivid detail"]);
        assert_eq!(result.improvements, vec!["Paragraphing"]);
    }

    #[test]
    fn test_bare_overall_score_or_label() {
        let fixture = Fixture::new();
        let domains = json!({"clarity": 60, "structure": 70});

        let scored = fixture.validate(&json!({"domains": domains.clone(), "overall": 82}));
        assert_eq!(scored.overall.score, 82.0);
        assert_eq!(scored.overall.level, "fair");

        let clamped = fixture.validate(&json!({"domains": domains.clone(), "overall": "140"}));
        assert_eq!(clamped.overall.score, 100.0);

        let labelled = fixture.validate(&json!({"domains": domains.clone(), "overall": "Excellent"}));
        assert_eq!(labelled.overall.level, "excellent");
        assert_eq!(labelled.overall.score, 65.0);
    }

    #[test]
    fn test_bare_scores_under_domain_scores_key() {
        let fixture = Fixture::new();
        let result = fixture.validate(&json!({
            "domainScores": {"clarity": 60, "structure": 80},
            "overall": {"score": 55, "level": "unknown"}
        }));

        assert_eq!(result.domain_evaluations["clarity"].score, 60.0);
        assert_eq!(result.domain_evaluations["clarity"].level, "good");
        assert_eq!(result.overall.score, 55.0);
        assert_eq!(result.overall.level, "fair");
    }
}

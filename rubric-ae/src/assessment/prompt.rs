//! Provider prompt construction

use std::fmt::Write;

use super::AssessmentRequest;
use rubric_common::LevelOrder;

/// System message sent with every assessment request
pub const SYSTEM_PROMPT: &str = "You are an experienced writing teacher. \
Assess the student's writing strictly against the rubric you are given and \
answer with a single JSON object only, without commentary or code fences.";

/// Build the user prompt for one submission
///
/// Embeds the domains, the level labels together with their direction, the
/// grading criteria, the submission text and the exact JSON shape expected
/// back.
pub fn build_prompt(request: &AssessmentRequest<'_>) -> String {
    let config = request.config;
    let mut prompt = String::with_capacity(1024 + request.submission.content.len());

    prompt.push_str("# Rubric\n\n");
    prompt.push_str("Domains:\n");
    for domain in &config.domains {
        let _ = writeln!(prompt, "- {}", domain);
    }

    let direction = match config.level_order {
        LevelOrder::WorstFirst => "from weakest to strongest",
        LevelOrder::BestFirst => "from strongest to weakest",
    };
    let _ = writeln!(
        prompt,
        "\nAchievement levels ({}): {}",
        direction,
        config.levels.join(", ")
    );
    prompt.push_str("Use only these exact level labels.\n");

    if !config.grading_criteria.trim().is_empty() {
        prompt.push_str("\n# Grading criteria\n\n");
        prompt.push_str(config.grading_criteria.trim());
        prompt.push('\n');
    }

    if let Some(writing_type) = request.writing_type() {
        let _ = writeln!(prompt, "\nWriting type: {}", writing_type);
    }

    prompt.push_str("\n# Student writing\n\n");
    prompt.push_str(&request.submission.content);
    prompt.push_str("\n\n# Response format\n\n");
    prompt.push_str("Respond with JSON of exactly this shape:\n");
    prompt.push_str(&response_shape(&config.domains, &config.levels));
    prompt.push_str(
        "\nScores are numbers from 0 to 100. Give at least one strength and one improvement.\n",
    );

    prompt
}

fn response_shape(domains: &[String], levels: &[String]) -> String {
    let level_hint = levels.join("|");
    let domain_entries: serde_json::Map<String, serde_json::Value> = domains
        .iter()
        .map(|domain| {
            (
                domain.clone(),
                serde_json::json!({
                    "level": level_hint,
                    "score": 0,
                    "feedback": "..."
                }),
            )
        })
        .collect();

    let shape = serde_json::json!({
        "domains": domain_entries,
        "overall": { "level": level_hint, "score": 0, "feedback": "..." },
        "strengths": ["..."],
        "improvements": ["..."]
    });

    serde_json::to_string_pretty(&shape).unwrap_or_default()
}

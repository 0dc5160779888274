//! Schema-valid results produced without the provider

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::AssessmentRequest;
use rubric_common::{AssessmentResult, Evaluation, FALLBACK_EVALUATOR};

const BASE_SCORE: u32 = 60;
const SCORE_STEP: u32 = 10;
const PICKED_PER_LIST: usize = 2;

struct FeedbackPool {
    strengths: &'static [&'static str],
    improvements: &'static [&'static str],
}

const NARRATIVE: FeedbackPool = FeedbackPool {
    strengths: &[
        "Events follow a clear sequence that is easy to track.",
        "Characters are introduced with concrete, memorable details.",
        "The opening draws the reader into the story quickly.",
        "Dialogue helps reveal what the characters feel.",
    ],
    improvements: &[
        "Show the turning point of the story more vividly.",
        "Describe the setting so the reader can picture it.",
        "Let the ending reflect on what the narrator learned.",
        "Vary sentence openings to keep the pacing lively.",
    ],
};

const ARGUMENTATIVE: FeedbackPool = FeedbackPool {
    strengths: &[
        "The main claim is stated clearly near the beginning.",
        "Reasons are organized in a logical order.",
        "The conclusion restates the position with confidence.",
        "Transitions connect each reason to the claim.",
    ],
    improvements: &[
        "Support each reason with a specific example or evidence.",
        "Address a counterargument and respond to it.",
        "Explain how the evidence proves the claim.",
        "Avoid repeating the same reason in different words.",
    ],
};

const EXPOSITORY: FeedbackPool = FeedbackPool {
    strengths: &[
        "The topic is introduced clearly for the reader.",
        "Information is grouped into focused paragraphs.",
        "Key terms are explained in plain language.",
        "Facts are presented accurately and objectively.",
    ],
    improvements: &[
        "Add examples or comparisons to clarify difficult ideas.",
        "Use headings or topic sentences to signal each section.",
        "Check that every paragraph stays on its main idea.",
        "Summarize the key points in the conclusion.",
    ],
};

const DESCRIPTIVE: FeedbackPool = FeedbackPool {
    strengths: &[
        "Sensory details help the reader picture the subject.",
        "Word choice is precise and colorful.",
        "The description moves in an orderly way through the scene.",
        "Figurative language adds interest.",
    ],
    improvements: &[
        "Include sounds, smells, or textures as well as sights.",
        "Replace general adjectives with more specific ones.",
        "Connect the details to an overall impression.",
        "Trim details that distract from the main subject.",
    ],
};

const GENERAL: FeedbackPool = FeedbackPool {
    strengths: &[
        "The writing stays focused on its topic.",
        "Ideas are expressed in complete sentences.",
        "The piece has a recognizable beginning, middle and end.",
        "The writer's voice comes through clearly.",
    ],
    improvements: &[
        "Develop each main idea with more supporting detail.",
        "Review spelling and punctuation carefully.",
        "Use transitions to connect paragraphs smoothly.",
        "Read the piece aloud to catch awkward sentences.",
    ],
};

fn pool_for(writing_type: Option<&str>) -> &'static FeedbackPool {
    let Some(kind) = writing_type else {
        return &GENERAL;
    };
    match kind.trim().to_lowercase().as_str() {
        "narrative" | "story" | "서사문" => &NARRATIVE,
        "argumentative" | "persuasive" | "opinion" | "논설문" => &ARGUMENTATIVE,
        "expository" | "informative" | "explanatory" | "설명문" => &EXPOSITORY,
        "descriptive" | "묘사문" => &DESCRIPTIVE,
        _ => &GENERAL,
    }
}

/// Pseudo-random, schema-valid result generator
///
/// With a seed, the same request and timestamp always produce the same
/// result (including its id).
#[derive(Debug, Clone, Default)]
pub struct FallbackGenerator {
    seed: Option<u64>,
}

impl FallbackGenerator {
    /// Unseeded generator
    pub fn new() -> Self {
        Self { seed: None }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self { seed: Some(seed) }
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Generate a result for `request`
    ///
    /// The seed fixes levels, scores and feedback; the evaluation id is
    /// always fresh so repeated fallbacks never share an id.
    ///
    /// The overall level is drawn by index; each domain level lands within
    /// one step of it. Scores are `60 + 10 * rank + jitter` (rank counted
    /// from the worst level, jitter in 0..10), capped at 100.
    pub fn generate(
        &self,
        request: &AssessmentRequest<'_>,
        evaluated_at: DateTime<Utc>,
    ) -> AssessmentResult {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let config = request.config;
        let scale = config.scale();
        let top = scale.len().saturating_sub(1);

        let overall_rank = rng.gen_range(0..scale.len().max(1));

        let domain_evaluations: BTreeMap<String, Evaluation> = config
            .domains
            .iter()
            .map(|domain| {
                let offset: i64 = rng.gen_range(-1..=1);
                let rank = (overall_rank as i64 + offset).clamp(0, top as i64) as usize;
                let level = scale.label(rank).unwrap_or_default().to_string();
                let score = score_for(rank, &mut rng);
                let feedback = format!("{} was rated {} in an automatic preliminary review.", domain, level);
                (
                    domain.clone(),
                    Evaluation {
                        level,
                        score,
                        feedback,
                    },
                )
            })
            .collect();

        let overall_level = scale.label(overall_rank).unwrap_or_default().to_string();
        let overall = Evaluation {
            score: score_for(overall_rank, &mut rng),
            feedback: format!(
                "Preliminary overall rating: {}. A detailed review will follow.",
                overall_level
            ),
            level: overall_level,
        };

        let pool = pool_for(request.writing_type());
        let strengths = pick(pool.strengths, &mut rng);
        let improvements = pick(pool.improvements, &mut rng);

        AssessmentResult {
            id: Uuid::new_v4(),
            submission_id: request.submission.id.clone(),
            assignment_id: request.submission.assignment_id.clone(),
            student_key: request.student.student_key.clone(),
            domain_evaluations,
            overall,
            strengths,
            improvements,
            evaluated_by: FALLBACK_EVALUATOR.to_string(),
            evaluated_at,
        }
    }
}

fn score_for(rank: usize, rng: &mut StdRng) -> f64 {
    let jitter: u32 = rng.gen_range(0..SCORE_STEP);
    let score = BASE_SCORE + SCORE_STEP * rank as u32 + jitter;
    f64::from(score.min(100))
}

fn pick(pool: &[&str], rng: &mut StdRng) -> Vec<String> {
    pool.choose_multiple(rng, PICKED_PER_LIST)
        .map(|s| s.to_string())
        .collect()
}

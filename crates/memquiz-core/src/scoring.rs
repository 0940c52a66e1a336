use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::dataset::Question;
use crate::grader::is_answer_correct;

/// Reference seconds budgeted per question.
pub const T_REF_PER_QUESTION: f64 = 60.0;
/// Floor for the time factor; slow but correct runs keep half credit.
pub const MIN_TIME_FACTOR: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreResult {
    pub accuracy: f64,
    pub total: usize,
    pub correct: usize,
    pub duration_ms: u64,
    pub time_factor: f64,
    pub composite: f64,
}

/// `sqrt(T_REF * total / max(seconds, 1))` clamped to `[MIN_TIME_FACTOR, 1]`.
pub fn time_factor(total: usize, duration_ms: u64) -> f64 {
    let seconds = (duration_ms as f64 / 1000.0).max(1.0);
    let t_ref = T_REF_PER_QUESTION * total as f64;
    (t_ref / seconds).sqrt().clamp(MIN_TIME_FACTOR, 1.0)
}

/// Core formula over raw counts.
pub fn score(total: usize, correct: usize, duration_ms: u64) -> ScoreResult {
    let accuracy = if total == 0 {
        0.0
    } else {
        correct as f64 / total as f64
    };
    let time_factor = time_factor(total, duration_ms);
    ScoreResult {
        accuracy,
        total,
        correct,
        duration_ms,
        time_factor,
        composite: accuracy * time_factor * 100.0,
    }
}

/// Score explicit per-question judgments. Questions missing from
/// `judgments` count as incorrect.
pub fn score_judgments<'a>(
    questions: impl IntoIterator<Item = &'a Question>,
    judgments: &HashMap<String, bool>,
    duration_ms: u64,
) -> ScoreResult {
    let mut total = 0;
    let mut correct = 0;
    for q in questions {
        total += 1;
        if judgments.get(&q.id).copied().unwrap_or(false) {
            correct += 1;
        }
    }
    score(total, correct, duration_ms)
}

/// Score free-text responses with the local exact/alias match rule.
pub fn score_responses<'a>(
    questions: impl IntoIterator<Item = &'a Question>,
    answers: &HashMap<String, String>,
    duration_ms: u64,
) -> ScoreResult {
    let mut total = 0;
    let mut correct = 0;
    for q in questions {
        total += 1;
        let response = answers.get(&q.id).map(String::as_str).unwrap_or("");
        if is_answer_correct(q, response) {
            correct += 1;
        }
    }
    score(total, correct, duration_ms)
}

/// `m:ss` rendering of a duration.
pub fn format_duration(duration_ms: u64) -> String {
    let total_seconds = duration_ms / 1000;
    format!("{}:{:02}", total_seconds / 60, total_seconds % 60)
}

/// Fraction → rounded whole percent, e.g. `0.706` → `71%`.
pub fn format_percent(value: f64) -> String {
    format!("{}%", (value * 100.0).round() as i64)
}

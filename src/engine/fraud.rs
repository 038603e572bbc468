use serde::{Deserialize, Serialize};

use crate::catalog::Question;
use crate::session::stats::AnswerRecord;

/// Heuristic signal that an answer may not be honest. Not proof.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FraudFlag {
    #[serde(rename_all = "camelCase")]
    FastAnswer {
        question_id: String,
        time: f64,
        min_time: f64,
    },
    #[serde(rename_all = "camelCase")]
    TooManyErrors {
        question_id: String,
        errors: u32,
        max_errors: u32,
    },
}

impl FraudFlag {
    pub fn question_id(&self) -> &str {
        match self {
            FraudFlag::FastAnswer { question_id, .. } => question_id,
            FraudFlag::TooManyErrors { question_id, .. } => question_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FraudFlag::FastAnswer { .. } => "fast_answer",
            FraudFlag::TooManyErrors { .. } => "too_many_errors",
        }
    }
}

/// Course-wide thresholds used when a question does not set its own.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FraudDefaults {
    pub min_answer_time: f64,
    pub max_error_count: u32,
}

impl Default for FraudDefaults {
    fn default() -> Self {
        Self {
            min_answer_time: 3.0,
            max_error_count: 5,
        }
    }
}

// A zero override counts as unset, matching how the sheet leaves cells blank.
fn min_time_for(question: &Question, defaults: &FraudDefaults) -> f64 {
    question
        .fraud_detection
        .as_ref()
        .and_then(|fd| fd.min_answer_time)
        .filter(|&t| t > 0.0)
        .unwrap_or(defaults.min_answer_time)
}

fn max_errors_for(question: &Question, defaults: &FraudDefaults) -> u32 {
    question
        .fraud_detection
        .as_ref()
        .and_then(|fd| fd.max_error_count)
        .filter(|&n| n > 0)
        .unwrap_or(defaults.max_error_count)
}

/// Flag answers submitted faster than the question's minimum answer time.
pub fn check_fast(
    question: &Question,
    answer_time_secs: f64,
    defaults: &FraudDefaults,
) -> Option<FraudFlag> {
    if !question.fraud_enabled() {
        return None;
    }
    let min_time = min_time_for(question, defaults);
    (answer_time_secs < min_time).then(|| FraudFlag::FastAnswer {
        question_id: question.id.clone(),
        time: answer_time_secs,
        min_time,
    })
}

/// Flag a question once its incorrect submissions in this session, counting
/// the current one, exceed the allowed maximum. Call only for an incorrect
/// current submission; `prior` is the session's answer log so far.
pub fn check_error_burst(
    question: &Question,
    prior: &[AnswerRecord],
    defaults: &FraudDefaults,
) -> Option<FraudFlag> {
    if !question.fraud_enabled() {
        return None;
    }
    let max_errors = max_errors_for(question, defaults);
    let prior_errors = prior
        .iter()
        .filter(|a| a.question_id == question.id && !a.correct && !a.skipped)
        .count() as u32;
    let errors = prior_errors + 1;
    (errors > max_errors).then(|| FraudFlag::TooManyErrors {
        question_id: question.id.clone(),
        errors,
        max_errors,
    })
}

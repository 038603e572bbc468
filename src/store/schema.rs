use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::Bindings;
use crate::engine::fraud::FraudFlag;
use crate::session::stats::{AnswerRecord, SessionStats};

/// In-progress session state, persisted after every mutating transition so
/// the attempt can be resumed. Field names match the browser client's cache.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizCacheSnapshot {
    #[serde(default)]
    pub current_question_index: usize,
    #[serde(default)]
    pub correct_count: u32,
    #[serde(default)]
    pub skip_count: u32,
    #[serde(default)]
    pub error_count: u32,
    #[serde(default)]
    pub fraud_flags: Vec<FraudFlag>,
    #[serde(default)]
    pub answers: Vec<AnswerRecord>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_order: Option<Vec<String>>,
    /// Bindings sampled for template questions, by question id. Older
    /// snapshots lack this and get fresh samples on resume.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub question_bindings: BTreeMap<String, Bindings>,
}

impl QuizCacheSnapshot {
    /// Only snapshots with at least one recorded answer are worth offering.
    pub fn has_answers(&self) -> bool {
        !self.answers.is_empty()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            correct_count: self.correct_count,
            skip_count: self.skip_count,
            error_count: self.error_count,
            fraud_flags: self.fraud_flags.clone(),
            answers: self.answers.clone(),
        }
    }
}

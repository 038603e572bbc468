use serde::{Deserialize, Serialize};

use crate::engine::fraud::FraudFlag;

/// One submission or skip, in the order it happened.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub question_id: String,
    /// `None` for skips.
    #[serde(default)]
    pub answer: Option<Vec<String>>,
    pub correct: bool,
    /// Seconds from the question being shown to the submission.
    pub time: f64,
    #[serde(default)]
    pub skipped: bool,
}

/// Running statistics for one session. Owned by the session state machine.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub correct_count: u32,
    pub skip_count: u32,
    pub error_count: u32,
    pub fraud_flags: Vec<FraudFlag>,
    pub answers: Vec<AnswerRecord>,
}

impl SessionStats {
    pub fn fraud_count(&self) -> u32 {
        self.fraud_flags.len() as u32
    }

    pub fn has_answers(&self) -> bool {
        !self.answers.is_empty()
    }

    pub fn answers_for<'a>(&'a self, question_id: &'a str) -> impl Iterator<Item = &'a AnswerRecord> {
        self.answers.iter().filter(move |a| a.question_id == question_id)
    }

    pub fn record_submission(&mut self, record: AnswerRecord, flags: Vec<FraudFlag>) {
        if record.correct {
            self.correct_count += 1;
        } else {
            self.error_count += 1;
        }
        self.fraud_flags.extend(flags);
        self.answers.push(record);
    }

    pub fn record_skip(&mut self, question_id: &str, time: f64) {
        self.skip_count += 1;
        self.answers.push(AnswerRecord {
            question_id: question_id.to_string(),
            answer: None,
            correct: false,
            time,
            skipped: true,
        });
    }
}

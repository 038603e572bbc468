use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::nullable;
use crate::engine::fraud::FraudFlag;
use crate::engine::scoring;
use crate::engine::unlock;
use crate::session::stats::SessionStats;

/// Finalized outcome of one completed attempt. Never mutated after creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    #[serde(default, deserialize_with = "nullable::or_default")]
    pub email: String,
    #[serde(default, deserialize_with = "nullable::or_default")]
    pub level_id: String,
    #[serde(default, deserialize_with = "nullable::or_default")]
    pub correct_count: u32,
    #[serde(default, deserialize_with = "nullable::or_default")]
    pub total_questions: u32,
    #[serde(default, deserialize_with = "nullable::or_default")]
    pub correct_rate: u32,
    #[serde(default, deserialize_with = "nullable::or_default")]
    pub skip_count: u32,
    #[serde(default, deserialize_with = "nullable::or_default")]
    pub error_count: u32,
    #[serde(default, deserialize_with = "nullable::or_default")]
    pub fraud_count: u32,
    #[serde(default, deserialize_with = "nullable::or_default")]
    pub fraud_flags: Vec<FraudFlag>,
    #[serde(default, deserialize_with = "nullable::or_default")]
    pub perfect_without_skip: bool,
    /// Whole seconds.
    #[serde(default, deserialize_with = "nullable::or_default")]
    pub elapsed_time: u64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_time: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub end_time: DateTime<Utc>,
}

impl ProgressRecord {
    pub fn from_stats(
        email: &str,
        level_id: &str,
        stats: &SessionStats,
        total_questions: usize,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        let correct_rate = scoring::correct_rate(stats.correct_count, total_questions);
        Self {
            email: email.to_string(),
            level_id: level_id.to_string(),
            correct_count: stats.correct_count,
            total_questions: total_questions as u32,
            correct_rate,
            skip_count: stats.skip_count,
            error_count: stats.error_count,
            fraud_count: stats.fraud_count(),
            fraud_flags: stats.fraud_flags.clone(),
            perfect_without_skip: scoring::is_perfect_without_skip(correct_rate, stats.skip_count),
            elapsed_time: scoring::elapsed_whole_secs(start_time, end_time),
            start_time,
            end_time,
        }
    }
}

/// A user's attempts grouped by level id, oldest first within each level.
/// Serializes as the plain `levelId -> [record]` object the API returns.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProgressHistory {
    by_level: BTreeMap<String, Vec<ProgressRecord>>,
}

impl ProgressHistory {
    pub fn records(&self, level_id: &str) -> &[ProgressRecord] {
        self.by_level.get(level_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn push(&mut self, record: ProgressRecord) {
        self.by_level
            .entry(record.level_id.clone())
            .or_default()
            .push(record);
    }

    pub fn best(&self, level_id: &str) -> Option<&ProgressRecord> {
        unlock::best_record(self.records(level_id))
    }

    pub fn levels(&self) -> impl Iterator<Item = &str> {
        self.by_level.keys().map(String::as_str)
    }

    pub fn attempt_count(&self) -> usize {
        self.by_level.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.attempt_count() == 0
    }
}

impl FromIterator<ProgressRecord> for ProgressHistory {
    fn from_iter<I: IntoIterator<Item = ProgressRecord>>(iter: I) -> Self {
        let mut history = ProgressHistory::default();
        for record in iter {
            history.push(record);
        }
        history
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::session::stats::AnswerRecord;

    fn stats(correct: u32, skips: u32) -> SessionStats {
        SessionStats {
            correct_count: correct,
            skip_count: skips,
            error_count: 0,
            fraud_flags: Vec::new(),
            answers: Vec::<AnswerRecord>::new(),
        }
    }

    #[test]
    fn record_from_perfect_session() {
        let t0 = Utc::now();
        let record = ProgressRecord::from_stats(
            "a@example.com",
            "level-1",
            &stats(3, 0),
            3,
            t0,
            t0 + Duration::milliseconds(95_400),
        );
        assert_eq!(record.correct_rate, 100);
        assert!(record.perfect_without_skip);
        assert_eq!(record.elapsed_time, 95);
        assert_eq!(record.total_questions, 3);
    }

    #[test]
    fn skips_prevent_perfect_flag() {
        let t0 = Utc::now();
        let record = ProgressRecord::from_stats("a", "l", &stats(2, 1), 3, t0, t0);
        assert_eq!(record.correct_rate, 67);
        assert!(!record.perfect_without_skip);
    }

    #[test]
    fn timestamps_serialize_as_epoch_millis() {
        let t0 = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        let record = ProgressRecord::from_stats("a", "l", &stats(1, 0), 1, t0, t0);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["startTime"], 1_700_000_000_123i64);
        assert_eq!(json["levelId"], "l");
        let back: ProgressRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.start_time, t0);
    }

    #[test]
    fn history_groups_by_level() {
        let t0 = Utc::now();
        let history: ProgressHistory = [
            ProgressRecord::from_stats("a", "l1", &stats(1, 0), 2, t0, t0),
            ProgressRecord::from_stats("a", "l2", &stats(2, 0), 2, t0, t0),
            ProgressRecord::from_stats("a", "l1", &stats(2, 0), 2, t0, t0),
        ]
        .into_iter()
        .collect();
        assert_eq!(history.records("l1").len(), 2);
        assert_eq!(history.records("missing").len(), 0);
        assert_eq!(history.attempt_count(), 3);
        assert_eq!(history.best("l1").unwrap().correct_rate, 100);
        let json = serde_json::to_value(&history).unwrap();
        assert!(json["l2"].is_array());
    }
}

//! Envelope decoding for the spreadsheet API.
//!
//! Every response is `{"success": bool, "error"?: string, <payload>}`. A
//! missing or null payload reads as empty, the way the browser client treated
//! `data.levels || []`.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::warn;

use crate::catalog::{Level, Link, Question};
use crate::catalog::nullable;
use crate::remote::error::ApiError;
use crate::session::result::{ProgressHistory, ProgressRecord};

/// Server-side settings sheet. Only the keys the client acts on are kept.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSettings {
    #[serde(default, deserialize_with = "nullable::or_default")]
    pub admin_emails: Vec<String>,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    payload: Map<String, Value>,
}

fn open(body: &str) -> Result<Map<String, Value>, ApiError> {
    let envelope: Envelope = serde_json::from_str(body)?;
    if !envelope.success {
        return Err(ApiError::Rejected(
            envelope.error.unwrap_or_else(|| "unknown error".to_string()),
        ));
    }
    Ok(envelope.payload)
}

fn field<T: DeserializeOwned + Default>(
    payload: &mut Map<String, Value>,
    name: &str,
) -> Result<T, ApiError> {
    match payload.remove(name) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => Ok(serde_json::from_value(value)?),
    }
}

pub fn decode_settings(body: &str) -> Result<RemoteSettings, ApiError> {
    field(&mut open(body)?, "settings")
}

pub fn decode_levels(body: &str) -> Result<Vec<Level>, ApiError> {
    field(&mut open(body)?, "levels")
}

pub fn decode_links(body: &str) -> Result<Vec<Link>, ApiError> {
    field(&mut open(body)?, "links")
}

/// The server groups questions by level even when asked for one level; a
/// flat list is accepted too.
#[derive(Deserialize)]
#[serde(untagged)]
enum QuestionsPayload {
    List(Vec<Question>),
    ByLevel(BTreeMap<String, Vec<Question>>),
}

impl Default for QuestionsPayload {
    fn default() -> Self {
        QuestionsPayload::List(Vec::new())
    }
}

pub fn decode_questions(body: &str, level_id: &str) -> Result<Vec<Question>, ApiError> {
    let payload: QuestionsPayload = field(&mut open(body)?, "questions")?;
    Ok(match payload {
        QuestionsPayload::List(list) => list
            .into_iter()
            .filter(|q| q.level_id.is_empty() || q.level_id == level_id)
            .collect(),
        QuestionsPayload::ByLevel(mut by_level) => by_level.remove(level_id).unwrap_or_default(),
    })
}

pub fn decode_question_bank(body: &str) -> Result<BTreeMap<String, Vec<Question>>, ApiError> {
    let payload: QuestionsPayload = field(&mut open(body)?, "questions")?;
    Ok(match payload {
        QuestionsPayload::ByLevel(by_level) => by_level,
        QuestionsPayload::List(list) => {
            let mut by_level: BTreeMap<String, Vec<Question>> = BTreeMap::new();
            for question in list {
                by_level
                    .entry(question.level_id.clone())
                    .or_default()
                    .push(question);
            }
            by_level
        }
    })
}

/// Progress rows grouped under `key`. A row that still fails to decode, such
/// as one with a blank timestamp, is dropped with a warning so one hand-edited
/// cell cannot hide the rest of the history.
fn progress_rows(body: &str) -> Result<BTreeMap<String, Vec<ProgressRecord>>, ApiError> {
    let grouped: BTreeMap<String, Vec<Value>> = field(&mut open(body)?, "progress")?;
    Ok(grouped
        .into_iter()
        .map(|(key, rows)| {
            let records = rows
                .into_iter()
                .filter_map(|row| match serde_json::from_value::<ProgressRecord>(row) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        warn!(group = %key, error = %e, "skipping unreadable progress row");
                        None
                    }
                })
                .collect();
            (key, records)
        })
        .collect())
}

pub fn decode_progress(body: &str) -> Result<ProgressHistory, ApiError> {
    Ok(progress_rows(body)?
        .into_iter()
        .flat_map(|(level_id, records)| {
            records.into_iter().map(move |mut record| {
                if record.level_id.is_empty() {
                    record.level_id = level_id.clone();
                }
                record
            })
        })
        .collect())
}

/// `allProgress` groups by email rather than by level.
pub fn decode_all_progress(body: &str) -> Result<BTreeMap<String, Vec<ProgressRecord>>, ApiError> {
    progress_rows(body)
}

pub fn decode_ack(body: &str) -> Result<(), ApiError> {
    open(body).map(|_| ())
}

pub fn progress_request(record: &ProgressRecord) -> Result<Value, ApiError> {
    Ok(json!({
        "type": "progress",
        "data": serde_json::to_value(record)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORD: &str = r#"{
        "email": "a@example.com", "levelId": "level-1", "correctCount": 2,
        "totalQuestions": 3, "correctRate": 67, "skipCount": 1, "errorCount": 0,
        "fraudCount": 0, "fraudFlags": [], "perfectWithoutSkip": false,
        "elapsedTime": 42, "startTime": 1700000000000, "endTime": 1700000042000
    }"#;

    #[test]
    fn rejected_envelope_surfaces_error() {
        let err = decode_levels(r#"{"success": false, "error": "Unknown type"}"#).unwrap_err();
        match err {
            ApiError::Rejected(msg) => assert_eq!(msg, "Unknown type"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!ApiError::Rejected(String::new()).allows_fallback());
    }

    #[test]
    fn missing_payload_is_empty() {
        assert!(decode_levels(r#"{"success": true}"#).unwrap().is_empty());
        assert!(decode_levels(r#"{"success": true, "levels": null}"#).unwrap().is_empty());
        assert_eq!(
            decode_settings(r#"{"success": true, "settings": {"adminEmails": null}}"#).unwrap(),
            RemoteSettings::default()
        );
    }

    #[test]
    fn links_payload_decodes() {
        let body = r#"{"success": true, "links": [
            {"id": "slide-1", "category": "materials", "type": "drive", "icon": "📄",
             "title": "Lecture 1", "url": "https://drive.example/1", "pageNumber": null,
             "description": null, "order": 1}
        ]}"#;
        let links = decode_links(body).unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].title, "Lecture 1");
        assert!(decode_links(r#"{"success": true}"#).unwrap().is_empty());
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(decode_levels("<html>"), Err(ApiError::Decode(_))));
    }

    #[test]
    fn questions_accept_mapping_and_list() {
        let mapping = r#"{"success": true, "questions": {
            "L1": [{"id": "q1", "levelId": "L1", "type": "text", "question": "Hi", "answer": "Hello"}],
            "L2": [{"id": "q9", "levelId": "L2", "question": "?"}]
        }}"#;
        let l1 = decode_questions(mapping, "L1").unwrap();
        assert_eq!(l1.len(), 1);
        assert_eq!(l1[0].text, "Hi");
        assert!(decode_questions(mapping, "L3").unwrap().is_empty());
        assert_eq!(decode_question_bank(mapping).unwrap().len(), 2);

        let list = r#"{"success": true, "questions": [
            {"id": "q1", "levelId": "L1", "question": "a"},
            {"id": "q2", "levelId": "L2", "question": "b"}
        ]}"#;
        let l2 = decode_questions(list, "L2").unwrap();
        assert_eq!(l2.len(), 1);
        assert_eq!(l2[0].id, "q2");
        assert_eq!(decode_question_bank(list).unwrap()["L1"][0].id, "q1");
    }

    #[test]
    fn progress_grouped_by_level_and_by_email() {
        let body = format!(r#"{{"success": true, "progress": {{"level-1": [{RECORD}]}}}}"#);
        let history = decode_progress(&body).unwrap();
        assert_eq!(history.records("level-1")[0].correct_rate, 67);

        let body = format!(r#"{{"success": true, "progress": {{"a@example.com": [{RECORD}, {RECORD}]}}}}"#);
        let all = decode_all_progress(&body).unwrap();
        assert_eq!(all["a@example.com"].len(), 2);
    }

    #[test]
    fn blank_cells_read_as_zero_and_broken_rows_are_skipped() {
        let blank = r#"{
            "email": "a@example.com", "levelId": null, "correctCount": 1,
            "totalQuestions": 3, "correctRate": 33, "skipCount": null, "errorCount": null,
            "fraudCount": null, "fraudFlags": null, "perfectWithoutSkip": null,
            "elapsedTime": null, "startTime": 1700000000000, "endTime": 1700000042000
        }"#;
        let broken = r#"{"email": "a@example.com", "levelId": "level-1", "startTime": null}"#;
        let body = format!(
            r#"{{"success": true, "progress": {{"level-1": [{RECORD}, {blank}, {broken}]}}}}"#
        );
        let history = decode_progress(&body).unwrap();
        let records = history.records("level-1");
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].level_id, "level-1");
        assert_eq!(records[1].skip_count, 0);
        assert_eq!(records[1].elapsed_time, 0);
        assert_eq!(history.best("level-1").unwrap().correct_rate, 67);

        let body = format!(r#"{{"success": true, "progress": {{"a@example.com": [{broken}, {RECORD}]}}}}"#);
        assert_eq!(decode_all_progress(&body).unwrap()["a@example.com"].len(), 1);
    }

    #[test]
    fn save_request_wraps_record() {
        let record: ProgressRecord = serde_json::from_str(RECORD).unwrap();
        let body = progress_request(&record).unwrap();
        assert_eq!(body["type"], "progress");
        assert_eq!(body["data"]["levelId"], "level-1");
        assert_eq!(body["data"]["startTime"], 1_700_000_000_000i64);
        decode_ack(r#"{"success": true, "message": "Progress saved"}"#).unwrap();
    }
}

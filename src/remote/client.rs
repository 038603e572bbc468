use std::collections::BTreeMap;
#[cfg(feature = "network")]
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::catalog::{Level, Link, Question};
use crate::remote::QuizBackend;
use crate::remote::error::ApiError;
use crate::remote::wire::{self, RemoteSettings};
use crate::session::result::{ProgressHistory, ProgressRecord};

/// Client for the spreadsheet web app: `GET ?type=...` to read, `POST` a
/// JSON body to write.
pub struct SheetsClient {
    base_url: String,
    #[cfg(feature = "network")]
    http: reqwest::blocking::Client,
}

impl SheetsClient {
    #[cfg(feature = "network")]
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        if base_url.trim().is_empty() {
            return Err(ApiError::NotConfigured);
        }
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            base_url: base_url.trim().to_string(),
            http,
        })
    }

    #[cfg(not(feature = "network"))]
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        if base_url.trim().is_empty() {
            return Err(ApiError::NotConfigured);
        }
        Ok(Self {
            base_url: base_url.trim().to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[cfg(feature = "network")]
    fn get(&self, query: &[(&str, &str)]) -> Result<String, ApiError> {
        debug!(url = %self.base_url, ?query, "GET");
        let response = self.http.get(&self.base_url).query(query).send()?;
        let response = response.error_for_status()?;
        Ok(response.text()?)
    }

    #[cfg(not(feature = "network"))]
    fn get(&self, query: &[(&str, &str)]) -> Result<String, ApiError> {
        debug!(url = %self.base_url, ?query, "GET skipped, network disabled");
        Err(ApiError::Disabled)
    }

    #[cfg(feature = "network")]
    fn post(&self, body: &Value) -> Result<String, ApiError> {
        debug!(url = %self.base_url, "POST");
        let response = self.http.post(&self.base_url).json(body).send()?;
        let response = response.error_for_status()?;
        Ok(response.text()?)
    }

    #[cfg(not(feature = "network"))]
    fn post(&self, _body: &Value) -> Result<String, ApiError> {
        Err(ApiError::Disabled)
    }
}

impl QuizBackend for SheetsClient {
    fn fetch_settings(&self) -> Result<RemoteSettings, ApiError> {
        wire::decode_settings(&self.get(&[("type", "settings")])?)
    }

    fn fetch_levels(&self) -> Result<Vec<Level>, ApiError> {
        wire::decode_levels(&self.get(&[("type", "levels")])?)
    }

    fn fetch_questions(&self, level_id: &str) -> Result<Vec<Question>, ApiError> {
        let body = self.get(&[("type", "questions"), ("levelId", level_id)])?;
        wire::decode_questions(&body, level_id)
    }

    fn fetch_all_questions(&self) -> Result<BTreeMap<String, Vec<Question>>, ApiError> {
        wire::decode_question_bank(&self.get(&[("type", "questions"), ("all", "true")])?)
    }

    fn fetch_links(&self) -> Result<Vec<Link>, ApiError> {
        wire::decode_links(&self.get(&[("type", "links")])?)
    }

    fn fetch_progress(&self, email: &str) -> Result<ProgressHistory, ApiError> {
        wire::decode_progress(&self.get(&[("type", "progress"), ("email", email)])?)
    }

    fn fetch_all_progress(&self) -> Result<BTreeMap<String, Vec<ProgressRecord>>, ApiError> {
        wire::decode_all_progress(&self.get(&[("type", "allProgress")])?)
    }

    fn save_progress(&self, record: &ProgressRecord) -> Result<(), ApiError> {
        let body = wire::progress_request(record)?;
        wire::decode_ack(&self.post(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_url_is_not_configured() {
        assert!(matches!(SheetsClient::new("  "), Err(ApiError::NotConfigured)));
    }

    #[test]
    fn keeps_trimmed_url() {
        let client = SheetsClient::new(" https://script.example.com/exec ").unwrap();
        assert_eq!(client.base_url(), "https://script.example.com/exec");
    }

    #[cfg(not(feature = "network"))]
    #[test]
    fn calls_fail_without_network_feature() {
        let client = SheetsClient::new("https://script.example.com/exec").unwrap();
        assert!(matches!(client.fetch_levels(), Err(ApiError::Disabled)));
    }
}

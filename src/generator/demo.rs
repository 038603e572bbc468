use std::collections::BTreeMap;
use std::sync::Mutex;

use rust_embed::Embed;
use serde::de::DeserializeOwned;

use crate::catalog::{Level, Link, Question};
use crate::remote::{ApiError, QuizBackend, RemoteSettings};
use crate::session::result::{ProgressHistory, ProgressRecord};

#[derive(Embed)]
#[folder = "assets/demo/"]
struct DemoAssets;

fn load_asset<T: DeserializeOwned>(name: &str) -> Result<T, ApiError> {
    let file = DemoAssets::get(name)
        .ok_or_else(|| ApiError::Rejected(format!("demo asset {name} is missing")))?;
    Ok(serde_json::from_slice(file.data.as_ref())?)
}

/// Built-in sample course. Serves the embedded levels, questions and links, and keeps
/// saved progress in memory for the lifetime of the process.
#[derive(Default)]
pub struct DemoBackend {
    saved: Mutex<Vec<ProgressRecord>>,
}

impl DemoBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn levels() -> Result<Vec<Level>, ApiError> {
        load_asset("levels.json")
    }

    pub fn questions() -> Result<BTreeMap<String, Vec<Question>>, ApiError> {
        load_asset("questions.json")
    }

    pub fn links() -> Result<Vec<Link>, ApiError> {
        load_asset("links.json")
    }

    fn saved(&self) -> Vec<ProgressRecord> {
        match self.saved.lock() {
            Ok(saved) => saved.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl QuizBackend for DemoBackend {
    fn fetch_settings(&self) -> Result<RemoteSettings, ApiError> {
        Ok(RemoteSettings::default())
    }

    fn fetch_levels(&self) -> Result<Vec<Level>, ApiError> {
        Self::levels()
    }

    fn fetch_questions(&self, level_id: &str) -> Result<Vec<Question>, ApiError> {
        Ok(Self::questions()?.remove(level_id).unwrap_or_default())
    }

    fn fetch_all_questions(&self) -> Result<BTreeMap<String, Vec<Question>>, ApiError> {
        Self::questions()
    }

    fn fetch_links(&self) -> Result<Vec<Link>, ApiError> {
        Self::links()
    }

    fn fetch_progress(&self, email: &str) -> Result<ProgressHistory, ApiError> {
        Ok(self
            .saved()
            .into_iter()
            .filter(|r| r.email == email)
            .collect())
    }

    fn fetch_all_progress(&self) -> Result<BTreeMap<String, Vec<ProgressRecord>>, ApiError> {
        let mut by_email: BTreeMap<String, Vec<ProgressRecord>> = BTreeMap::new();
        for record in self.saved() {
            by_email.entry(record.email.clone()).or_default().push(record);
        }
        Ok(by_email)
    }

    fn save_progress(&self, record: &ProgressRecord) -> Result<(), ApiError> {
        match self.saved.lock() {
            Ok(mut saved) => saved.push(record.clone()),
            Err(poisoned) => poisoned.into_inner().push(record.clone()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::QuestionKind;
    use crate::catalog::validate::validate_catalog;

    #[test]
    fn demo_catalog_is_clean() {
        let levels = DemoBackend::levels().unwrap();
        let questions = DemoBackend::questions().unwrap();
        assert_eq!(levels.len(), 4);
        let issues = validate_catalog(&levels, &questions);
        assert!(issues.is_empty(), "{issues:?}");
    }

    #[test]
    fn first_level_has_one_of_each_kind() {
        let backend = DemoBackend::new();
        let kinds: Vec<QuestionKind> = backend
            .fetch_questions("level-1")
            .unwrap()
            .iter()
            .map(|q| q.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![QuestionKind::Single, QuestionKind::Multiple, QuestionKind::Text]
        );
        assert!(backend.fetch_questions("nope").unwrap().is_empty());
    }

    #[test]
    fn levels_chain_on_min_score() {
        let levels = DemoBackend::levels().unwrap();
        let level2 = levels.iter().find(|l| l.id == "level-2").unwrap();
        let prereqs: Vec<&str> = level2.prerequisites().collect();
        assert_eq!(prereqs, vec!["level-1"]);
        assert!(levels.iter().find(|l| l.id == "optional").unwrap().unlock_conditions.is_none());
    }

    #[test]
    fn demo_links_cover_both_categories() {
        let links = DemoBackend::new().fetch_links().unwrap();
        assert_eq!(links.len(), 3);
        let groups = crate::catalog::link::grouped_by_category(&links);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].1.len(), 2);
    }

    #[test]
    fn saved_progress_is_served_back() {
        let backend = DemoBackend::new();
        let record: ProgressRecord = serde_json::from_value(serde_json::json!({
            "email": "a@example.com", "levelId": "level-1", "correctCount": 3,
            "totalQuestions": 3, "correctRate": 100, "skipCount": 0, "errorCount": 0,
            "fraudCount": 0, "elapsedTime": 30, "startTime": 0, "endTime": 30000
        }))
        .unwrap();
        backend.save_progress(&record).unwrap();
        assert_eq!(backend.fetch_progress("a@example.com").unwrap().attempt_count(), 1);
        assert!(backend.fetch_progress("b@example.com").unwrap().is_empty());
        assert_eq!(backend.fetch_all_progress().unwrap()["a@example.com"].len(), 1);
    }
}

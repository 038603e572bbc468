use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, info, warn};

use crate::auth::{AccessError, Identity};
use crate::catalog::level::sorted_by_order;
use crate::catalog::validate::{ContentIssue, validate_catalog};
use crate::catalog::{Level, Link, Question};
use crate::config::Config;
use crate::engine::unlock::{self, LevelStatus};
use crate::generator::DemoBackend;
use crate::remote::{ApiError, QuizBackend, RemoteSettings};
use crate::session::quiz::{QuizSession, SessionCache};
use crate::session::result::{ProgressHistory, ProgressRecord};
use crate::store::{CacheKey, JsonStore};

/// Non-blocking messages for the user, produced by background work.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    ProgressSaved { level_id: String },
    SaveFailed { level_id: String, error: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CatalogSource {
    Remote,
    Demo,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HistorySource {
    Remote,
    LocalMirror,
    /// Guests, or nothing could be loaded.
    Empty,
}

/// One row of the level list.
#[derive(Clone, Debug, PartialEq)]
pub struct LevelSummary {
    pub level: Level,
    pub status: LevelStatus,
    pub best: Option<ProgressRecord>,
    pub attempts: usize,
}

/// One row of the instructor report: a user's standing on one level.
#[derive(Clone, Debug, PartialEq)]
pub struct ReportRow {
    pub email: String,
    pub level_id: String,
    pub attempts: usize,
    pub best: ProgressRecord,
    pub flagged_attempts: usize,
}

pub struct App {
    pub config: Config,
    /// Settings and progress. The demo fallback leaves it in place so
    /// attempts still reach the API once it answers again.
    backend: Arc<dyn QuizBackend>,
    /// Levels, questions and links.
    content: Arc<dyn QuizBackend>,
    store: JsonStore,
    source: CatalogSource,
    remote_settings: RemoteSettings,
    identity: Option<Identity>,
    levels: Vec<Level>,
    questions: BTreeMap<String, Vec<Question>>,
    history: ProgressHistory,
    notice_tx: mpsc::Sender<Notice>,
    notice_rx: mpsc::Receiver<Notice>,
    saves: Vec<JoinHandle<()>>,
}

impl App {
    pub fn new(config: Config, backend: Arc<dyn QuizBackend>, store: JsonStore) -> Self {
        let (notice_tx, notice_rx) = mpsc::channel();
        Self {
            config,
            content: Arc::clone(&backend),
            backend,
            store,
            source: CatalogSource::Remote,
            remote_settings: RemoteSettings::default(),
            identity: None,
            levels: Vec::new(),
            questions: BTreeMap::new(),
            history: ProgressHistory::default(),
            notice_tx,
            notice_rx,
            saves: Vec::new(),
        }
    }

    pub fn source(&self) -> CatalogSource {
        self.source
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn level(&self, level_id: &str) -> Option<&Level> {
        self.levels.iter().find(|l| l.id == level_id)
    }

    pub fn history(&self) -> &ProgressHistory {
        &self.history
    }

    pub fn is_admin(&self) -> bool {
        self.identity.as_ref().is_some_and(|id| {
            !id.anonymous
                && self
                    .config
                    .access_policy()
                    .is_admin(&id.email, &self.remote_settings.admin_emails)
        })
    }

    /// Run entirely on the built-in demo course, progress included.
    pub fn use_demo_course(&mut self) {
        let demo: Arc<dyn QuizBackend> = Arc::new(DemoBackend::new());
        self.backend = Arc::clone(&demo);
        self.content = demo;
        self.source = CatalogSource::Demo;
        self.questions.clear();
    }

    /// Serve demo content while progress keeps going to the configured backend.
    fn switch_to_demo(&mut self, reason: &ApiError) {
        info!(error = %reason, "API unavailable, using built-in demo course");
        self.content = Arc::new(DemoBackend::new());
        self.source = CatalogSource::Demo;
        self.questions.clear();
    }

    /// Fetch settings and levels. Falls back to the demo course only when
    /// `demo_fallback` is on.
    pub fn load_catalog(&mut self) -> Result<CatalogSource> {
        match self.backend.fetch_settings() {
            Ok(settings) => self.remote_settings = settings,
            Err(e) => {
                warn!(error = %e, "settings unavailable, using configured admins only");
                self.remote_settings = RemoteSettings::default();
            }
        }

        let levels = match self.content.fetch_levels() {
            Ok(levels) => levels,
            Err(e) if self.config.demo_fallback && e.allows_fallback() => {
                self.switch_to_demo(&e);
                self.content.fetch_levels()?
            }
            Err(e) => return Err(e).context("loading levels"),
        };
        debug!(count = levels.len(), "levels loaded");
        self.levels = levels;
        Ok(self.source)
    }

    pub fn login(&mut self, email: &str, display_name: &str) -> Result<&Identity> {
        let identity = self.config.access_policy().authorize(
            email,
            display_name,
            &self.remote_settings.admin_emails,
        )?;
        info!(email = %identity.email, "signed in");
        self.identity = Some(identity);
        self.load_user_progress();
        self.identity.as_ref().ok_or_else(|| anyhow!("sign-in lost"))
    }

    pub fn login_anonymous(&mut self) -> Result<&Identity> {
        let identity = self.config.access_policy().anonymous()?;
        self.identity = Some(identity);
        self.history = ProgressHistory::default();
        self.identity.as_ref().ok_or_else(|| anyhow!("sign-in lost"))
    }

    pub fn logout(&mut self) {
        self.identity = None;
        self.history = ProgressHistory::default();
    }

    fn mirror_key(&self, email: &str) -> CacheKey {
        CacheKey::progress(&self.config.cache_prefix, email)
    }

    /// Remote history when reachable, else the local mirror. Guests have none.
    pub fn load_user_progress(&mut self) -> HistorySource {
        let Some(identity) = self.identity.as_ref().filter(|id| id.persists_progress()) else {
            self.history = ProgressHistory::default();
            return HistorySource::Empty;
        };
        let email = identity.email.clone();
        match self.backend.fetch_progress(&email) {
            Ok(history) => {
                self.history = history;
                HistorySource::Remote
            }
            Err(e) => {
                warn!(error = %e, "progress unavailable, reading local mirror");
                match self.store.load_progress_mirror(&self.mirror_key(&email)) {
                    Some(history) => {
                        self.history = history;
                        HistorySource::LocalMirror
                    }
                    None => {
                        self.history = ProgressHistory::default();
                        HistorySource::Empty
                    }
                }
            }
        }
    }

    /// Levels in display order, hidden ones only once unlocked.
    pub fn level_overview(&self) -> Vec<LevelSummary> {
        sorted_by_order(&self.levels)
            .into_iter()
            .filter(|level| unlock::is_listed(level, &self.history))
            .map(|level| LevelSummary {
                level: level.clone(),
                status: unlock::level_status(level, &self.history),
                best: self.history.best(&level.id).cloned(),
                attempts: self.history.records(&level.id).len(),
            })
            .collect()
    }

    /// Questions for one level, fetched on first use.
    pub fn questions_for(&mut self, level_id: &str) -> Result<&[Question]> {
        if !self.questions.contains_key(level_id) {
            let bank = match self.content.fetch_questions(level_id) {
                Ok(bank) => bank,
                Err(e) if self.config.demo_fallback && e.allows_fallback() => {
                    self.switch_to_demo(&e);
                    self.content.fetch_questions(level_id)?
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("loading questions for {level_id}"));
                }
            };
            debug!(level = level_id, count = bank.len(), "questions loaded");
            self.questions.insert(level_id.to_string(), bank);
        }
        Ok(self
            .questions
            .get(level_id)
            .map(Vec::as_slice)
            .unwrap_or(&[]))
    }

    /// Course links, with the same demo fallback as the level list.
    pub fn links(&mut self) -> Result<Vec<Link>> {
        let links = match self.content.fetch_links() {
            Ok(links) => links,
            Err(e) if self.config.demo_fallback && e.allows_fallback() => {
                self.switch_to_demo(&e);
                self.content.fetch_links()?
            }
            Err(e) => return Err(e).context("loading links"),
        };
        debug!(count = links.len(), "links loaded");
        Ok(links)
    }

    /// Build a session for an unlocked level. The caller drives `start`.
    pub fn start_level(&mut self, level_id: &str) -> Result<QuizSession> {
        let identity = self
            .identity
            .clone()
            .ok_or(AccessError::AnonymousDisabled)
            .context("sign in before starting a level")?;
        let level = self
            .level(level_id)
            .cloned()
            .ok_or_else(|| anyhow!("unknown level `{level_id}`"))?;
        if !unlock::is_unlocked(&level, &self.history) {
            bail!("level `{}` is locked", level.title);
        }

        let bank = self.questions_for(level_id)?.to_vec();
        let settings = self.config.session_settings();
        let key = CacheKey::quiz(&self.config.cache_prefix, level_id, Some(&identity.email));
        Ok(QuizSession::new(level_id, bank, Some(identity.email), settings)
            .with_cache(SessionCache::new(self.store.clone(), key)))
    }

    /// Append a finished attempt locally, mirror it, and send it to the
    /// backend on a worker thread. The remote outcome arrives as a `Notice`.
    pub fn record_completion(&mut self, record: ProgressRecord) {
        let Some(identity) = self.identity.as_ref().filter(|id| id.persists_progress()) else {
            debug!(level = %record.level_id, "guest attempt not persisted");
            return;
        };
        let key = self.mirror_key(&identity.email);
        self.history.push(record.clone());
        if let Err(e) = self.store.save_progress_mirror(&key, &self.history) {
            warn!(error = %e, "failed to write local progress mirror");
        }

        let backend = Arc::clone(&self.backend);
        let tx = self.notice_tx.clone();
        let handle = thread::spawn(move || {
            let notice = match backend.save_progress(&record) {
                Ok(()) => Notice::ProgressSaved {
                    level_id: record.level_id,
                },
                Err(e) => {
                    warn!(error = %e, level = %record.level_id, "progress save failed");
                    Notice::SaveFailed {
                        level_id: record.level_id,
                        error: e.to_string(),
                    }
                }
            };
            let _ = tx.send(notice);
        });
        self.saves.push(handle);
    }

    /// Block until every background save has reported.
    pub fn wait_for_saves(&mut self) {
        for handle in self.saves.drain(..) {
            let _ = handle.join();
        }
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        self.saves.retain(|h| !h.is_finished());
        self.notice_rx.try_iter().collect()
    }

    /// Best attempt per user and level, for admins.
    pub fn admin_report(&self) -> Result<Vec<ReportRow>> {
        if !self.is_admin() {
            bail!("the report is only available to administrators");
        }
        let all = self.backend.fetch_all_progress().context("loading all progress")?;
        let mut rows = Vec::new();
        for (email, records) in all {
            let history: ProgressHistory = records.into_iter().collect();
            for level_id in history.levels() {
                let records = history.records(level_id);
                if let Some(best) = unlock::best_record(records) {
                    rows.push(ReportRow {
                        email: email.clone(),
                        level_id: level_id.to_string(),
                        attempts: records.len(),
                        best: best.clone(),
                        flagged_attempts: records.iter().filter(|r| r.fraud_count > 0).count(),
                    });
                }
            }
        }
        Ok(rows)
    }

    /// Fetch the full question bank and check it against the level list.
    pub fn validate_content(&mut self) -> Result<Vec<ContentIssue>> {
        let bank = match self.content.fetch_all_questions() {
            Ok(bank) => bank,
            Err(e) if self.config.demo_fallback && e.allows_fallback() => {
                self.switch_to_demo(&e);
                self.content.fetch_all_questions()?
            }
            Err(e) => return Err(e).context("loading question bank"),
        };
        Ok(validate_catalog(&self.levels, &bank))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tempfile::TempDir;

    use super::*;

    /// Backend that is unreachable for reads and writes.
    struct Offline;

    impl QuizBackend for Offline {
        fn fetch_settings(&self) -> Result<RemoteSettings, ApiError> {
            Err(ApiError::Network("offline".into()))
        }
        fn fetch_levels(&self) -> Result<Vec<Level>, ApiError> {
            Err(ApiError::Network("offline".into()))
        }
        fn fetch_questions(&self, _: &str) -> Result<Vec<Question>, ApiError> {
            Err(ApiError::Network("offline".into()))
        }
        fn fetch_all_questions(&self) -> Result<BTreeMap<String, Vec<Question>>, ApiError> {
            Err(ApiError::Network("offline".into()))
        }
        fn fetch_links(&self) -> Result<Vec<Link>, ApiError> {
            Err(ApiError::Network("offline".into()))
        }
        fn fetch_progress(&self, _: &str) -> Result<ProgressHistory, ApiError> {
            Err(ApiError::Network("offline".into()))
        }
        fn fetch_all_progress(&self) -> Result<BTreeMap<String, Vec<ProgressRecord>>, ApiError> {
            Err(ApiError::Network("offline".into()))
        }
        fn save_progress(&self, _: &ProgressRecord) -> Result<(), ApiError> {
            Err(ApiError::Status(503))
        }
    }

    /// Demo catalog whose settings name an admin and whose saves are counted.
    /// With `content_down` every content read fails as if the API were down.
    struct Recording {
        demo: DemoBackend,
        saves: Mutex<usize>,
        content_down: bool,
    }

    impl Recording {
        fn content<T>(
            &self,
            read: impl FnOnce(&DemoBackend) -> Result<T, ApiError>,
        ) -> Result<T, ApiError> {
            if self.content_down {
                return Err(ApiError::Network("connection reset".into()));
            }
            read(&self.demo)
        }
    }

    impl QuizBackend for Recording {
        fn fetch_settings(&self) -> Result<RemoteSettings, ApiError> {
            Ok(RemoteSettings {
                admin_emails: vec!["prof@example.com".into()],
            })
        }
        fn fetch_levels(&self) -> Result<Vec<Level>, ApiError> {
            self.content(DemoBackend::fetch_levels)
        }
        fn fetch_questions(&self, level_id: &str) -> Result<Vec<Question>, ApiError> {
            self.content(|demo| demo.fetch_questions(level_id))
        }
        fn fetch_all_questions(&self) -> Result<BTreeMap<String, Vec<Question>>, ApiError> {
            self.content(DemoBackend::fetch_all_questions)
        }
        fn fetch_links(&self) -> Result<Vec<Link>, ApiError> {
            self.content(DemoBackend::fetch_links)
        }
        fn fetch_progress(&self, email: &str) -> Result<ProgressHistory, ApiError> {
            self.demo.fetch_progress(email)
        }
        fn fetch_all_progress(&self) -> Result<BTreeMap<String, Vec<ProgressRecord>>, ApiError> {
            self.demo.fetch_all_progress()
        }
        fn save_progress(&self, record: &ProgressRecord) -> Result<(), ApiError> {
            *self.saves.lock().unwrap() += 1;
            self.demo.save_progress(record)
        }
    }

    fn config(dir: &TempDir) -> Config {
        Config {
            data_dir: dir.path().to_string_lossy().to_string(),
            require_auth: false,
            show_timer: false,
            randomize_questions: false,
            randomize_options: false,
            ..Config::default()
        }
    }

    fn app_with(dir: &TempDir, config: Config, backend: Arc<dyn QuizBackend>) -> App {
        let store = JsonStore::with_base_dir(dir.path().to_path_buf()).unwrap();
        App::new(config, backend, store)
    }

    fn recording() -> Arc<Recording> {
        Arc::new(Recording {
            demo: DemoBackend::new(),
            saves: Mutex::new(0),
            content_down: false,
        })
    }

    fn record(level: &str, rate: u32) -> ProgressRecord {
        serde_json::from_value(serde_json::json!({
            "email": "a@example.com", "levelId": level, "correctCount": 3,
            "totalQuestions": 3, "correctRate": rate, "skipCount": 0, "errorCount": 0,
            "fraudCount": 0, "perfectWithoutSkip": rate == 100, "elapsedTime": 30,
            "startTime": 0, "endTime": 30000
        }))
        .unwrap()
    }

    #[test]
    fn offline_without_fallback_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mut app = app_with(&dir, config(&dir), Arc::new(Offline));
        let err = app.load_catalog().unwrap_err();
        assert!(format!("{err:#}").contains("loading levels"));
    }

    #[test]
    fn offline_with_fallback_serves_demo() {
        let dir = TempDir::new().unwrap();
        let cfg = Config {
            demo_fallback: true,
            ..config(&dir)
        };
        let mut app = app_with(&dir, cfg, Arc::new(Offline));
        assert_eq!(app.load_catalog().unwrap(), CatalogSource::Demo);
        assert_eq!(app.levels().len(), 4);
        assert_eq!(app.questions_for("level-1").unwrap().len(), 3);
    }

    #[test]
    fn content_fallback_keeps_saving_to_the_api() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(Recording {
            demo: DemoBackend::new(),
            saves: Mutex::new(0),
            content_down: true,
        });
        let cfg = Config {
            demo_fallback: true,
            ..config(&dir)
        };
        let mut app = app_with(&dir, cfg, backend.clone());
        app.login("a@example.com", "A").unwrap();
        assert_eq!(app.questions_for("level-1").unwrap().len(), 3);
        assert_eq!(app.source(), CatalogSource::Demo);

        app.record_completion(record("level-1", 100));
        app.wait_for_saves();
        assert_eq!(*backend.saves.lock().unwrap(), 1);
        assert!(matches!(&app.drain_notices()[..], [Notice::ProgressSaved { .. }]));

        // Settings still come from the API, so its admin list applies.
        app.load_catalog().unwrap();
        app.login("prof@example.com", "Prof").unwrap();
        assert!(app.is_admin());
        assert_eq!(app.admin_report().unwrap().len(), 1);
    }

    #[test]
    fn links_fall_back_with_the_catalog() {
        let dir = TempDir::new().unwrap();
        let mut app = app_with(&dir, config(&dir), Arc::new(Offline));
        let err = app.links().unwrap_err();
        assert!(format!("{err:#}").contains("loading links"));

        let cfg = Config {
            demo_fallback: true,
            ..config(&dir)
        };
        let mut app = app_with(&dir, cfg, Arc::new(Offline));
        assert_eq!(app.links().unwrap().len(), 3);
        assert_eq!(app.source(), CatalogSource::Demo);
    }

    #[test]
    fn overview_gates_chained_levels() {
        let dir = TempDir::new().unwrap();
        let mut app = app_with(&dir, config(&dir), recording());
        app.load_catalog().unwrap();
        app.login("a@example.com", "A").unwrap();

        let statuses: Vec<(String, LevelStatus)> = app
            .level_overview()
            .into_iter()
            .map(|s| (s.level.id, s.status))
            .collect();
        assert_eq!(statuses[0], ("level-1".to_string(), LevelStatus::Available));
        assert_eq!(statuses[1], ("level-2".to_string(), LevelStatus::Locked));
        assert!(app.start_level("level-2").is_err());

        app.record_completion(record("level-1", 100));
        app.wait_for_saves();
        let overview = app.level_overview();
        assert_eq!(overview[0].status, LevelStatus::Perfect);
        assert_eq!(overview[1].status, LevelStatus::Available);
        assert!(app.start_level("level-2").is_ok());
    }

    #[test]
    fn failed_remote_save_becomes_notice_and_keeps_local_state() {
        let dir = TempDir::new().unwrap();
        let mut app = app_with(&dir, config(&dir), Arc::new(Offline));
        app.login("a@example.com", "A").unwrap();

        app.record_completion(record("level-1", 80));
        app.wait_for_saves();
        let notices = app.drain_notices();
        assert_eq!(notices.len(), 1);
        assert!(matches!(&notices[0], Notice::SaveFailed { level_id, .. } if level_id == "level-1"));
        assert_eq!(app.history().attempt_count(), 1);

        // Next login, still offline: the mirror stands in.
        app.logout();
        app.login("a@example.com", "A").unwrap();
        assert_eq!(app.history().attempt_count(), 1);
        assert_eq!(app.load_user_progress(), HistorySource::LocalMirror);
    }

    #[test]
    fn guests_play_but_never_persist() {
        let dir = TempDir::new().unwrap();
        let backend = recording();
        let mut app = app_with(&dir, config(&dir), backend.clone());
        app.load_catalog().unwrap();
        app.login_anonymous().unwrap();
        assert!(app.start_level("level-1").is_ok());

        app.record_completion(record("level-1", 100));
        app.wait_for_saves();
        assert!(app.drain_notices().is_empty());
        assert!(app.history().is_empty());
        assert_eq!(*backend.saves.lock().unwrap(), 0);
        assert_eq!(app.load_user_progress(), HistorySource::Empty);
    }

    #[test]
    fn anonymous_rejected_when_auth_required() {
        let dir = TempDir::new().unwrap();
        let cfg = Config {
            require_auth: true,
            ..config(&dir)
        };
        let mut app = app_with(&dir, cfg, recording());
        let err = app.login_anonymous().unwrap_err();
        assert_eq!(err.downcast_ref::<AccessError>(), Some(&AccessError::AnonymousDisabled));
    }

    #[test]
    fn start_requires_sign_in_and_known_level() {
        let dir = TempDir::new().unwrap();
        let mut app = app_with(&dir, config(&dir), recording());
        app.load_catalog().unwrap();
        assert!(app.start_level("level-1").is_err());
        app.login("a@example.com", "A").unwrap();
        assert!(app.start_level("nope").is_err());
        let session = app.start_level("level-1").unwrap();
        assert_eq!(session.level_id(), "level-1");
    }

    #[test]
    fn report_is_admin_only() {
        let dir = TempDir::new().unwrap();
        let backend = recording();
        let mut app = app_with(&dir, config(&dir), backend.clone());
        app.load_catalog().unwrap();
        app.login("a@example.com", "A").unwrap();
        app.record_completion(record("level-1", 60));
        app.record_completion(record("level-1", 100));
        app.wait_for_saves();
        assert!(app.admin_report().is_err());

        app.login("prof@example.com", "Prof").unwrap();
        assert!(app.is_admin());
        let rows = app.admin_report().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].email, "a@example.com");
        assert_eq!(rows[0].attempts, 2);
        assert_eq!(rows[0].best.correct_rate, 100);
    }

    #[test]
    fn demo_content_validates() {
        let dir = TempDir::new().unwrap();
        let mut app = app_with(&dir, config(&dir), recording());
        app.load_catalog().unwrap();
        assert!(app.validate_content().unwrap().is_empty());
    }
}

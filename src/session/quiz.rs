use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use thiserror::Error;
use tracing::{debug, info};

use crate::catalog::{Bindings, Question};
use crate::engine::answer::evaluate_answer;
use crate::engine::fraud::{self, FraudDefaults, FraudFlag};
use crate::engine::scoring;
use crate::event::Ticker;
use crate::generator::questions::{self, PreparedQuestion};
use crate::session::result::ProgressRecord;
use crate::session::stats::{AnswerRecord, SessionStats};
use crate::store::{CacheKey, JsonStore, QuizCacheSnapshot};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    NotStarted,
    /// A resumable snapshot exists; waiting for resume-or-restart.
    CacheOffered,
    Answering,
    /// The current question was submitted; `next` advances.
    ResultShown,
    Completed,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("cannot {action} while the session is {phase:?}")]
    InvalidTransition { action: &'static str, phase: Phase },
    #[error("select at least one answer")]
    NoAnswerSelected,
    #[error("skipping is disabled for this course")]
    SkipDisabled,
    #[error("this question has already been answered")]
    AlreadyAnswered,
    #[error("there is no saved session to resume")]
    NoPendingSnapshot,
}

/// The slice of configuration the state machine reads.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SessionSettings {
    pub randomize_questions: bool,
    pub randomize_options: bool,
    pub allow_skip: bool,
    pub allow_retry: bool,
    pub enable_progress_cache: bool,
    pub show_timer: bool,
    pub fraud: FraudDefaults,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            randomize_questions: true,
            randomize_options: true,
            allow_skip: true,
            allow_retry: false,
            enable_progress_cache: true,
            show_timer: true,
            fraud: FraudDefaults::default(),
        }
    }
}

/// Where this session's snapshot lives.
#[derive(Clone, Debug)]
pub struct SessionCache {
    pub store: JsonStore,
    pub key: CacheKey,
}

impl SessionCache {
    pub fn new(store: JsonStore, key: CacheKey) -> Self {
        Self { store, key }
    }
}

/// What the caller needs to render the result of a submission.
#[derive(Clone, Debug, PartialEq)]
pub struct SubmitOutcome {
    pub correct: bool,
    pub flags: Vec<FraudFlag>,
    pub correct_answers: Vec<String>,
    pub explanation: Option<String>,
    pub explanation_image: Option<String>,
}

/// One attempt at one level by one user.
pub struct QuizSession {
    level_id: String,
    user: Option<String>,
    bank: Vec<Question>,
    settings: SessionSettings,
    cache: Option<SessionCache>,
    rng: SmallRng,

    phase: Phase,
    questions: Vec<PreparedQuestion>,
    index: usize,
    stats: SessionStats,
    start_time: DateTime<Utc>,
    question_shown_at: DateTime<Utc>,
    pending: Option<QuizCacheSnapshot>,
    record: Option<ProgressRecord>,
    ticker: Option<Ticker>,
}

impl QuizSession {
    pub fn new(
        level_id: impl Into<String>,
        bank: Vec<Question>,
        user: Option<String>,
        settings: SessionSettings,
    ) -> Self {
        let now = Utc::now();
        Self {
            level_id: level_id.into(),
            user,
            bank,
            settings,
            cache: None,
            rng: SmallRng::from_entropy(),
            phase: Phase::NotStarted,
            questions: Vec::new(),
            index: 0,
            stats: SessionStats::default(),
            start_time: now,
            question_shown_at: now,
            pending: None,
            record: None,
            ticker: None,
        }
    }

    pub fn with_rng(mut self, rng: SmallRng) -> Self {
        self.rng = rng;
        self
    }

    /// Attach snapshot storage. Ignored when caching is disabled.
    pub fn with_cache(mut self, cache: SessionCache) -> Self {
        if self.settings.enable_progress_cache {
            self.cache = Some(cache);
        }
        self
    }

    // --- Accessors ---

    pub fn level_id(&self) -> &str {
        &self.level_id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn total(&self) -> usize {
        self.questions.len()
    }

    /// Questions available to the level, before any attempt is prepared.
    pub fn bank_size(&self) -> usize {
        self.bank.len()
    }

    pub fn questions(&self) -> &[PreparedQuestion] {
        &self.questions
    }

    pub fn current_question(&self) -> Option<&PreparedQuestion> {
        match self.phase {
            Phase::Answering | Phase::ResultShown => self.questions.get(self.index),
            _ => None,
        }
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn pending_snapshot(&self) -> Option<&QuizCacheSnapshot> {
        self.pending.as_ref()
    }

    pub fn record(&self) -> Option<&ProgressRecord> {
        self.record.as_ref()
    }

    pub fn take_record(&mut self) -> Option<ProgressRecord> {
        self.record.take()
    }

    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> u64 {
        scoring::elapsed_whole_secs(self.start_time, now)
    }

    pub fn timer_running(&self) -> bool {
        self.ticker.as_ref().is_some_and(|t| !t.is_cancelled())
    }

    /// Latest elapsed-seconds tick from the timer, if one arrived.
    pub fn tick(&self) -> Option<u64> {
        self.ticker.as_ref().and_then(Ticker::latest)
    }

    /// Serializable capture of an in-progress session.
    pub fn snapshot(&self) -> Option<QuizCacheSnapshot> {
        if !matches!(self.phase, Phase::Answering | Phase::ResultShown) {
            return None;
        }
        let question_bindings: BTreeMap<String, Bindings> = self
            .questions
            .iter()
            .filter(|p| !p.bindings.is_empty())
            .map(|p| (p.question.id.clone(), p.bindings.clone()))
            .collect();
        Some(QuizCacheSnapshot {
            current_question_index: self.index,
            correct_count: self.stats.correct_count,
            skip_count: self.stats.skip_count,
            error_count: self.stats.error_count,
            fraud_flags: self.stats.fraud_flags.clone(),
            answers: self.stats.answers.clone(),
            start_time: self.start_time,
            question_order: Some(self.questions.iter().map(|p| p.question.id.clone()).collect()),
            question_bindings,
        })
    }

    // --- Transitions ---

    pub fn start(&mut self) -> Result<Phase, SessionError> {
        self.start_at(Utc::now())
    }

    /// Read the cached snapshot (if caching is on) and either offer it or
    /// begin a fresh attempt.
    pub fn start_at(&mut self, now: DateTime<Utc>) -> Result<Phase, SessionError> {
        let snapshot = self
            .cache
            .as_ref()
            .and_then(|c| c.store.load_snapshot(&c.key));
        self.start_with_at(snapshot, now)
    }

    pub fn start_with(&mut self, snapshot: Option<QuizCacheSnapshot>) -> Result<Phase, SessionError> {
        self.start_with_at(snapshot, Utc::now())
    }

    pub fn start_with_at(
        &mut self,
        snapshot: Option<QuizCacheSnapshot>,
        now: DateTime<Utc>,
    ) -> Result<Phase, SessionError> {
        self.expect_phase("start", &[Phase::NotStarted])?;
        match snapshot.filter(QuizCacheSnapshot::has_answers) {
            Some(snapshot) => {
                debug!(level = %self.level_id, answers = snapshot.answers.len(), "offering cached session");
                self.pending = Some(snapshot);
                self.phase = Phase::CacheOffered;
            }
            None => self.begin_fresh_at(now),
        }
        Ok(self.phase)
    }

    pub fn resume_offered(&mut self) -> Result<Phase, SessionError> {
        self.resume_offered_at(Utc::now())
    }

    pub fn resume_offered_at(&mut self, now: DateTime<Utc>) -> Result<Phase, SessionError> {
        self.expect_phase("resume", &[Phase::CacheOffered])?;
        let snapshot = self.pending.take().ok_or(SessionError::NoPendingSnapshot)?;
        self.resume_from_snapshot_at(snapshot, now);
        Ok(self.phase)
    }

    pub fn begin_fresh(&mut self) {
        self.begin_fresh_at(Utc::now());
    }

    /// Discard any snapshot, prepare a new question sequence and reset the
    /// statistics. Valid from any phase; this is also how a retry starts.
    pub fn begin_fresh_at(&mut self, now: DateTime<Utc>) {
        self.pending = None;
        self.record = None;
        self.clear_cache();

        let prepared = questions::prepare(&self.bank, self.settings.randomize_questions, &mut self.rng);
        self.questions = prepared
            .into_iter()
            .map(|p| self.with_option_order(p))
            .collect();
        self.index = 0;
        self.stats = SessionStats::default();
        self.start_time = now;
        debug!(level = %self.level_id, total = self.questions.len(), "session started");

        self.start_timer();
        self.enter_question(now);
    }

    pub fn resume_from_snapshot(&mut self, snapshot: QuizCacheSnapshot) {
        self.resume_from_snapshot_at(snapshot, Utc::now());
    }

    /// Restore index, statistics and start time. The question sequence is
    /// rebuilt from the cached order; ids missing from the bank are dropped.
    pub fn resume_from_snapshot_at(&mut self, snapshot: QuizCacheSnapshot, now: DateTime<Utc>) {
        self.pending = None;
        self.record = None;

        let prepared = match &snapshot.question_order {
            Some(order) => {
                let kept: Vec<Question> = order
                    .iter()
                    .filter_map(|id| self.bank.iter().find(|q| &q.id == id))
                    .cloned()
                    .collect();
                kept.iter()
                    .map(|q| match snapshot.question_bindings.get(&q.id) {
                        Some(bindings) => PreparedQuestion {
                            question: questions::instantiate(q, bindings),
                            bindings: bindings.clone(),
                        },
                        None => questions::prepare_one(q, &mut self.rng),
                    })
                    .collect::<Vec<_>>()
            }
            None => questions::prepare(&self.bank, self.settings.randomize_questions, &mut self.rng),
        };
        self.questions = prepared
            .into_iter()
            .map(|p| self.with_option_order(p))
            .collect();
        self.index = snapshot.current_question_index;
        self.stats = snapshot.stats();
        self.start_time = snapshot.start_time;
        debug!(
            level = %self.level_id,
            index = self.index,
            total = self.questions.len(),
            "session resumed"
        );

        self.start_timer();
        self.enter_question(now);

        // A snapshot taken after a submission but before `next` resumes on
        // the result, so the question cannot be answered twice.
        if self.phase == Phase::Answering
            && let Some(current) = self.questions.get(self.index)
            && self
                .stats
                .answers
                .last()
                .is_some_and(|a| !a.skipped && a.question_id == current.question.id)
        {
            self.phase = Phase::ResultShown;
        }
    }

    pub fn submit(&mut self, answers: &[String]) -> Result<SubmitOutcome, SessionError> {
        self.submit_at(answers, Utc::now())
    }

    /// Evaluate the current question, run both fraud checks and record the
    /// answer. The index does not move until `next`.
    pub fn submit_at(
        &mut self,
        answers: &[String],
        now: DateTime<Utc>,
    ) -> Result<SubmitOutcome, SessionError> {
        match self.phase {
            Phase::Answering => {}
            Phase::ResultShown if self.can_retry() => {}
            Phase::ResultShown => return Err(SessionError::AlreadyAnswered),
            phase => {
                return Err(SessionError::InvalidTransition {
                    action: "submit",
                    phase,
                });
            }
        }
        let selected: Vec<String> = answers
            .iter()
            .filter(|a| !a.trim().is_empty())
            .cloned()
            .collect();
        if selected.is_empty() {
            return Err(SessionError::NoAnswerSelected);
        }
        let Some(current) = self.questions.get(self.index) else {
            return Err(SessionError::InvalidTransition {
                action: "submit",
                phase: self.phase,
            });
        };
        let question = &current.question;

        let time = scoring::elapsed_secs_f64(self.question_shown_at, now);
        let correct = evaluate_answer(question, &selected);

        let mut flags = Vec::new();
        if let Some(flag) = fraud::check_fast(question, time, &self.settings.fraud) {
            flags.push(flag);
        }
        if !correct
            && let Some(flag) =
                fraud::check_error_burst(question, &self.stats.answers, &self.settings.fraud)
        {
            flags.push(flag);
        }

        let outcome = SubmitOutcome {
            correct,
            flags: flags.clone(),
            correct_answers: question.answer.values(),
            explanation: question.explanation.clone(),
            explanation_image: question.explanation_image.clone(),
        };
        debug!(
            question = %question.id,
            correct,
            time,
            flags = flags.len(),
            "answer submitted"
        );

        let record = AnswerRecord {
            question_id: question.id.clone(),
            answer: Some(selected),
            correct,
            time,
            skipped: false,
        };
        self.stats.record_submission(record, flags);
        self.phase = Phase::ResultShown;
        self.persist();
        Ok(outcome)
    }

    pub fn skip(&mut self) -> Result<Phase, SessionError> {
        self.skip_at(Utc::now())
    }

    pub fn skip_at(&mut self, now: DateTime<Utc>) -> Result<Phase, SessionError> {
        self.expect_phase("skip", &[Phase::Answering])?;
        if !self.settings.allow_skip {
            return Err(SessionError::SkipDisabled);
        }
        if let Some(current) = self.questions.get(self.index) {
            let time = scoring::elapsed_secs_f64(self.question_shown_at, now);
            let id = current.question.id.clone();
            debug!(question = %id, "question skipped");
            self.stats.record_skip(&id, time);
        }
        self.index += 1;
        self.enter_question(now);
        Ok(self.phase)
    }

    pub fn next(&mut self) -> Result<Phase, SessionError> {
        self.next_at(Utc::now())
    }

    pub fn next_at(&mut self, now: DateTime<Utc>) -> Result<Phase, SessionError> {
        self.expect_phase("advance", &[Phase::ResultShown])?;
        self.index += 1;
        self.enter_question(now);
        Ok(self.phase)
    }

    /// Leave mid-session. The timer stops and the snapshot stays on disk for
    /// a later resume; the last snapshot is returned.
    pub fn abandon(mut self) -> Option<QuizCacheSnapshot> {
        self.stop_timer();
        let snapshot = self.snapshot();
        if snapshot.is_some() {
            debug!(level = %self.level_id, index = self.index, "session abandoned");
        }
        snapshot
    }

    // --- Internals ---

    fn expect_phase(&self, action: &'static str, allowed: &[Phase]) -> Result<(), SessionError> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(SessionError::InvalidTransition {
                action,
                phase: self.phase,
            })
        }
    }

    /// A wrong answer on the current question may be resubmitted.
    pub fn can_retry(&self) -> bool {
        if !self.settings.allow_retry {
            return false;
        }
        let Some(current) = self.questions.get(self.index) else {
            return false;
        };
        self.stats
            .answers
            .last()
            .is_some_and(|a| a.question_id == current.question.id && !a.correct && !a.skipped)
    }

    fn with_option_order(&mut self, mut prepared: PreparedQuestion) -> PreparedQuestion {
        if self.settings.randomize_options {
            questions::shuffle_options(&mut prepared.question, &mut self.rng);
        }
        prepared
    }

    /// Show the question at `index`, or complete when past the end.
    fn enter_question(&mut self, now: DateTime<Utc>) {
        if self.index >= self.questions.len() {
            self.complete(now);
            return;
        }
        self.phase = Phase::Answering;
        self.question_shown_at = now;
        self.persist();
    }

    fn complete(&mut self, now: DateTime<Utc>) {
        self.stop_timer();
        self.phase = Phase::Completed;
        let email = self.user.as_deref().unwrap_or("anonymous");
        let record = ProgressRecord::from_stats(
            email,
            &self.level_id,
            &self.stats,
            self.questions.len(),
            self.start_time,
            now,
        );
        info!(
            level = %self.level_id,
            rate = record.correct_rate,
            skips = record.skip_count,
            fraud = record.fraud_count,
            "session completed"
        );
        self.record = Some(record);
        self.clear_cache();
    }

    fn start_timer(&mut self) {
        self.stop_timer();
        if self.settings.show_timer {
            self.ticker = Some(Ticker::every_second(self.start_time));
        }
    }

    fn stop_timer(&mut self) {
        if let Some(mut ticker) = self.ticker.take() {
            ticker.cancel();
        }
    }

    fn persist(&self) {
        if let Some(cache) = &self.cache
            && let Some(snapshot) = self.snapshot()
        {
            cache.store.save_snapshot(&cache.key, &snapshot);
        }
    }

    fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.store.clear_snapshot(&cache.key);
        }
    }
}

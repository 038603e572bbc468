use serde::{Deserialize, Serialize};

use crate::catalog::{Level, Requirement, UnlockMode};
use crate::session::result::{ProgressHistory, ProgressRecord};

// --- Level Status ---

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LevelStatus {
    Locked,
    Available,
    Attempted,
    /// Best attempt is 100% with no skips.
    Perfect,
}

impl LevelStatus {
    pub fn is_playable(self) -> bool {
        !matches!(self, LevelStatus::Locked)
    }
}

/// Pick the attempt that represents a user's standing on a level.
///
/// Narrowing filters, applied in order: highest `correct_rate`, then fewest
/// skips, then fewest fraud flags; among what remains the latest
/// `start_time` wins (the earliest-listed on an exact tie).
pub fn best_record(records: &[ProgressRecord]) -> Option<&ProgressRecord> {
    let max_rate = records.iter().map(|r| r.correct_rate).max()?;
    let by_rate: Vec<&ProgressRecord> = records
        .iter()
        .filter(|r| r.correct_rate == max_rate)
        .collect();

    let min_skip = by_rate.iter().map(|r| r.skip_count).min()?;
    let by_skip: Vec<&ProgressRecord> = by_rate
        .into_iter()
        .filter(|r| r.skip_count == min_skip)
        .collect();

    let min_fraud = by_skip.iter().map(|r| r.fraud_count).min()?;
    by_skip
        .into_iter()
        .filter(|r| r.fraud_count == min_fraud)
        .rev()
        .max_by_key(|r| r.start_time)
}

fn requirement_met(requirement: &Requirement, history: &ProgressHistory) -> bool {
    let Some(best) = history.best(&requirement.level_id) else {
        return false;
    };
    if let Some(min_score) = requirement.min_score
        && (best.correct_rate as f64) < min_score
    {
        return false;
    }
    if requirement.require_perfect == Some(true) && best.correct_rate != 100 {
        return false;
    }
    if requirement.no_skip == Some(true) && best.skip_count != 0 {
        return false;
    }
    true
}

/// Whether `level` is open given the user's history. No conditions, or an
/// empty requirement list, means unlocked.
pub fn is_unlocked(level: &Level, history: &ProgressHistory) -> bool {
    let Some(conditions) = &level.unlock_conditions else {
        return true;
    };
    if conditions.requirements.is_empty() {
        return true;
    }
    let mut results = conditions
        .requirements
        .iter()
        .map(|req| requirement_met(req, history));
    match conditions.mode {
        UnlockMode::All => results.all(|met| met),
        UnlockMode::Any => results.any(|met| met),
    }
}

pub fn level_status(level: &Level, history: &ProgressHistory) -> LevelStatus {
    if !is_unlocked(level, history) {
        return LevelStatus::Locked;
    }
    match history.best(&level.id) {
        Some(best) if best.perfect_without_skip => LevelStatus::Perfect,
        Some(_) => LevelStatus::Attempted,
        None => LevelStatus::Available,
    }
}

/// Hidden levels stay out of listings until they unlock.
pub fn is_listed(level: &Level, history: &ProgressHistory) -> bool {
    !level.hidden || is_unlocked(level, history)
}

use chrono::{DateTime, Utc};

/// Percentage of correct answers, rounded half-up to an integer in 0..=100.
/// An empty question sequence scores 0.
pub fn correct_rate(correct_count: u32, total_questions: usize) -> u32 {
    if total_questions == 0 {
        return 0;
    }
    let rate = correct_count as f64 / total_questions as f64 * 100.0;
    ((rate + 0.5).floor() as u32).min(100)
}

pub fn is_perfect_without_skip(correct_rate: u32, skip_count: u32) -> bool {
    correct_rate == 100 && skip_count == 0
}

/// Whole seconds between two instants, never negative.
pub fn elapsed_whole_secs(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    (end - start).num_seconds().max(0) as u64
}

/// Fractional seconds between two instants, never negative.
pub fn elapsed_secs_f64(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    ((end - start).num_milliseconds().max(0) as f64) / 1000.0
}

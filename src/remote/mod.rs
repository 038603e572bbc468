pub mod client;
pub mod error;
pub mod wire;

use std::collections::BTreeMap;

use crate::catalog::{Level, Link, Question};
use crate::session::result::{ProgressHistory, ProgressRecord};

pub use client::SheetsClient;
pub use error::ApiError;
pub use wire::RemoteSettings;

/// Where catalog content and progress history live. Implementations block;
/// callers that must not wait run them on a worker thread.
pub trait QuizBackend: Send + Sync {
    fn fetch_settings(&self) -> Result<RemoteSettings, ApiError>;
    fn fetch_levels(&self) -> Result<Vec<Level>, ApiError>;
    fn fetch_questions(&self, level_id: &str) -> Result<Vec<Question>, ApiError>;
    fn fetch_all_questions(&self) -> Result<BTreeMap<String, Vec<Question>>, ApiError>;
    /// Course resources listed next to the levels.
    fn fetch_links(&self) -> Result<Vec<Link>, ApiError>;
    /// One user's history, grouped by level.
    fn fetch_progress(&self, email: &str) -> Result<ProgressHistory, ApiError>;
    /// Every user's records, grouped by email.
    fn fetch_all_progress(&self) -> Result<BTreeMap<String, Vec<ProgressRecord>>, ApiError>;
    fn save_progress(&self, record: &ProgressRecord) -> Result<(), ApiError>;
}

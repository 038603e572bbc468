use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::session::result::ProgressHistory;
use crate::store::schema::QuizCacheSnapshot;

/// Storage key, formatted the way the browser client named its entries.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// `<prefix>quiz_<levelId>_<email|anon>`
    pub fn quiz(prefix: &str, level_id: &str, email: Option<&str>) -> Self {
        let user = email.filter(|e| !e.is_empty()).unwrap_or("anon");
        Self(format!("{prefix}quiz_{level_id}_{user}"))
    }

    /// `<prefix>progress_<email>`
    pub fn progress(prefix: &str, email: &str) -> Self {
        Self(format!("{prefix}progress_{email}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn file_name(&self) -> String {
        let stem: String = self
            .0
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' || c == '@' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!("{stem}.json")
    }
}

/// One pretty-printed JSON file per key. Reads are best-effort: missing or
/// unparsable files come back as `None`.
#[derive(Clone, Debug)]
pub struct JsonStore {
    base_dir: PathBuf,
}

impl JsonStore {
    pub fn new() -> Result<Self> {
        let base_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lecquiz");
        Self::with_base_dir(base_dir)
    }

    pub fn with_base_dir(base_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn file_path(&self, key: &CacheKey) -> PathBuf {
        self.base_dir.join(key.file_name())
    }

    pub fn load<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let path = self.file_path(key);
        let content = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = key.as_str(), error = %e, "discarding unreadable cache entry");
                None
            }
        }
    }

    pub fn save<T: Serialize>(&self, key: &CacheKey, data: &T) -> Result<()> {
        let path = self.file_path(key);
        let tmp_path = path.with_extension("json.tmp");

        let json = serde_json::to_string_pretty(data)?;
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;

        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    /// Remove an entry. Returns false only if a file existed and could not be
    /// deleted.
    pub fn remove(&self, key: &CacheKey) -> bool {
        let path = self.file_path(key);
        match fs::remove_file(&path) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => {
                warn!(key = key.as_str(), error = %e, "failed to remove cache entry");
                false
            }
        }
    }

    pub fn load_snapshot(&self, key: &CacheKey) -> Option<QuizCacheSnapshot> {
        self.load(key)
    }

    /// Last write wins. Failures are logged and reported, never raised.
    pub fn save_snapshot(&self, key: &CacheKey, snapshot: &QuizCacheSnapshot) -> bool {
        match self.save(key, snapshot) {
            Ok(()) => {
                debug!(key = key.as_str(), index = snapshot.current_question_index, "snapshot saved");
                true
            }
            Err(e) => {
                warn!(key = key.as_str(), error = %e, "failed to write snapshot");
                false
            }
        }
    }

    pub fn clear_snapshot(&self, key: &CacheKey) -> bool {
        self.remove(key)
    }

    pub fn load_progress_mirror(&self, key: &CacheKey) -> Option<ProgressHistory> {
        self.load(key)
    }

    pub fn save_progress_mirror(&self, key: &CacheKey, history: &ProgressHistory) -> Result<()> {
        self.save(key, history)
    }
}

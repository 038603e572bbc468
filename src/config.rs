use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::AccessPolicy;
use crate::engine::fraud::FraudDefaults;
use crate::session::quiz::SessionSettings;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_app_name")]
    pub app_name: String,

    #[serde(default = "default_require_auth")]
    pub require_auth: bool,
    #[serde(default = "default_restrict_domain")]
    pub restrict_domain: bool,
    #[serde(default)]
    pub allowed_domains: Vec<String>,
    #[serde(default)]
    pub admin_emails: Vec<String>,

    #[serde(default = "default_show_timer")]
    pub show_timer: bool,
    #[serde(default = "default_randomize_questions")]
    pub randomize_questions: bool,
    #[serde(default = "default_randomize_options")]
    pub randomize_options: bool,
    #[serde(default = "default_allow_skip")]
    pub allow_skip: bool,
    #[serde(default = "default_allow_retry")]
    pub allow_retry: bool,

    #[serde(default = "default_enable_progress_cache")]
    pub enable_progress_cache: bool,
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Seconds.
    #[serde(default = "default_min_answer_time")]
    pub min_answer_time: f64,
    #[serde(default = "default_max_error_count")]
    pub max_error_count: u32,

    /// Serve the built-in demo course when the API cannot be reached.
    #[serde(default = "default_demo_fallback")]
    pub demo_fallback: bool,
}

fn default_api_url() -> String {
    String::new()
}
fn default_app_name() -> String {
    "Lecture Quiz".to_string()
}
fn default_require_auth() -> bool {
    true
}
fn default_restrict_domain() -> bool {
    false
}
fn default_show_timer() -> bool {
    true
}
fn default_randomize_questions() -> bool {
    true
}
fn default_randomize_options() -> bool {
    true
}
fn default_allow_skip() -> bool {
    true
}
fn default_allow_retry() -> bool {
    false
}
fn default_enable_progress_cache() -> bool {
    true
}
fn default_cache_prefix() -> String {
    "lecture_quiz_".to_string()
}
fn default_data_dir() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lecquiz")
        .to_string_lossy()
        .to_string()
}
fn default_min_answer_time() -> f64 {
    FraudDefaults::default().min_answer_time
}
fn default_max_error_count() -> u32 {
    FraudDefaults::default().max_error_count
}
fn default_demo_fallback() -> bool {
    false
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            app_name: default_app_name(),
            require_auth: default_require_auth(),
            restrict_domain: default_restrict_domain(),
            allowed_domains: Vec::new(),
            admin_emails: Vec::new(),
            show_timer: default_show_timer(),
            randomize_questions: default_randomize_questions(),
            randomize_options: default_randomize_options(),
            allow_skip: default_allow_skip(),
            allow_retry: default_allow_retry(),
            enable_progress_cache: default_enable_progress_cache(),
            cache_prefix: default_cache_prefix(),
            data_dir: default_data_dir(),
            min_answer_time: default_min_answer_time(),
            max_error_count: default_max_error_count(),
            demo_fallback: default_demo_fallback(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Config::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.normalize();
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lecquiz")
            .join("config.toml")
    }

    /// Reset values that cannot be meant literally back to their defaults.
    pub fn normalize(&mut self) {
        if !self.min_answer_time.is_finite() || self.min_answer_time < 0.0 {
            self.min_answer_time = default_min_answer_time();
        }
        if self.max_error_count == 0 {
            self.max_error_count = default_max_error_count();
        }
        if self.cache_prefix.trim().is_empty() {
            self.cache_prefix = default_cache_prefix();
        }
        if self.data_dir.trim().is_empty() {
            self.data_dir = default_data_dir();
        }
        self.api_url = self.api_url.trim().to_string();
        self.allowed_domains.retain(|d| !d.trim().is_empty());
        self.admin_emails.retain(|e| !e.trim().is_empty());
    }

    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            randomize_questions: self.randomize_questions,
            randomize_options: self.randomize_options,
            allow_skip: self.allow_skip,
            allow_retry: self.allow_retry,
            enable_progress_cache: self.enable_progress_cache,
            show_timer: self.show_timer,
            fraud: FraudDefaults {
                min_answer_time: self.min_answer_time,
                max_error_count: self.max_error_count,
            },
        }
    }

    pub fn access_policy(&self) -> AccessPolicy {
        AccessPolicy {
            require_auth: self.require_auth,
            restrict_domain: self.restrict_domain,
            allowed_domains: self.allowed_domains.clone(),
            admin_emails: self.admin_emails.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_config_serde_defaults_from_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.cache_prefix, "lecture_quiz_");
        assert_eq!(config.min_answer_time, 3.0);
        assert_eq!(config.max_error_count, 5);
        assert!(config.require_auth);
        assert!(!config.allow_retry);
        assert!(!config.demo_fallback);
        assert!(config.data_dir.contains("lecquiz"));
    }

    #[test]
    fn test_config_partial_file_keeps_other_defaults() {
        let toml_str = r#"
api_url = "https://script.example.com/exec"
restrict_domain = true
allowed_domains = ["school.ac.jp"]
randomize_questions = false
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.api_url, "https://script.example.com/exec");
        assert!(config.restrict_domain);
        assert!(!config.randomize_questions);
        assert!(config.randomize_options);
        assert_eq!(config.access_policy().allowed_domains, vec!["school.ac.jp"]);
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.allow_retry = true;
        config.admin_emails = vec!["t@example.com".into()];
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_normalize_resets_nonsense() {
        let mut config = Config::default();
        config.min_answer_time = -1.0;
        config.max_error_count = 0;
        config.cache_prefix = "  ".into();
        config.api_url = "  https://x  ".into();
        config.allowed_domains = vec!["".into(), "a.org".into()];
        config.normalize();
        assert_eq!(config.min_answer_time, 3.0);
        assert_eq!(config.max_error_count, 5);
        assert_eq!(config.cache_prefix, "lecture_quiz_");
        assert_eq!(config.api_url, "https://x");
        assert_eq!(config.allowed_domains, vec!["a.org"]);
    }

    #[test]
    fn test_session_settings_projection() {
        let mut config = Config::default();
        config.show_timer = false;
        config.min_answer_time = 1.5;
        let settings = config.session_settings();
        assert!(!settings.show_timer);
        assert!(settings.allow_skip);
        assert_eq!(settings.fraud.min_answer_time, 1.5);
        assert_eq!(settings.fraud.max_error_count, 5);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "require_auth = \"maybe\"").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("parsing config"));
    }
}

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::app_dirs::AppDirs;

/// User preferences for a quiz run. Missing fields fall back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Countdown length for one quiz.
    pub initial_duration_secs: u64,
    /// Questions requested from the source.
    pub question_count: usize,
    /// How long to wait for a source before using the built-in bank.
    pub fetch_timeout_secs: u64,
    /// `general`, `cpp_dsa`, `current_affairs`, or `custom:<name>`.
    pub quiz_type: String,
    /// Fixes the selector's random draws when set.
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            initial_duration_secs: 1800,
            question_count: 15,
            fetch_timeout_secs: 10,
            quiz_type: "general".to_string(),
            seed: None,
        }
    }
}

/// Command-line values layered over the stored config.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub initial_duration_secs: Option<u64>,
    pub question_count: Option<usize>,
    pub quiz_type: Option<String>,
    pub seed: Option<u64>,
}

impl Config {
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(secs) = overrides.initial_duration_secs {
            self.initial_duration_secs = secs;
        }
        if let Some(count) = overrides.question_count {
            self.question_count = count;
        }
        if let Some(quiz_type) = overrides.quiz_type {
            self.quiz_type = quiz_type;
        }
        if overrides.seed.is_some() {
            self.seed = overrides.seed;
        }
        self
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            path: AppDirs::config_path(),
        }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        match fs::read(&self.path).map(|bytes| serde_json::from_slice::<Config>(&bytes)) {
            Ok(Ok(cfg)) => cfg,
            Ok(Err(e)) => {
                debug!(path = %self.path.display(), "ignoring unreadable config: {e}");
                Config::default()
            }
            Err(_) => Config::default(),
        }
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg).map_err(std::io::Error::other)?;
        fs::write(&self.path, data)
    }
}

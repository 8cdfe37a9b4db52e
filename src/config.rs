use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{ilog_debug, Error, Result};

pub const DEFAULT_CONFIG_FILE: &str = "ideagen.toml";
pub const DEFAULT_TRANSCRIPT_DIR: &str = "logs";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Which language-model backend drives the agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// OpenAI-compatible `/chat/completions` endpoint.
    #[default]
    Chat,
    /// A headless CLI agent run once per task.
    Command,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub command: Option<String>,
    pub temperature: Option<f32>,
}

impl BackendConfig {
    pub fn effective_model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn effective_command(&self) -> &str {
        self.command.as_deref().unwrap_or("claude")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RandomConfig {
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Task/agent catalog file; the built-in catalog is used when absent.
    pub catalog: Option<PathBuf>,
    pub transcript_dir: Option<String>,
    pub task_timeout_secs: Option<u64>,
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub random: RandomConfig,
}

fn default_max_parallel() -> usize {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog: None,
            transcript_dir: None,
            task_timeout_secs: None,
            max_parallel: default_max_parallel(),
            backend: BackendConfig::default(),
            random: RandomConfig::default(),
        }
    }
}

impl Config {
    pub fn ideagen_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir()
            .ok_or_else(|| Error::Configuration("no home directory".to_string()))?
            .join(".ideagen"))
    }

    /// `./ideagen.toml` if it exists, otherwise `~/.ideagen/ideagen.toml`.
    pub fn default_path() -> Result<PathBuf> {
        let local = PathBuf::from(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return Ok(local);
        }
        Ok(Self::ideagen_dir()?.join(DEFAULT_CONFIG_FILE))
    }

    pub fn transcript_dir(&self) -> PathBuf {
        expand_tilde(
            self.transcript_dir
                .as_deref()
                .unwrap_or(DEFAULT_TRANSCRIPT_DIR),
        )
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_secs.map(Duration::from_secs)
    }

    /// Load from `path`, or defaults when the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        ilog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            ilog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        ilog_debug!(
            "Config loaded: backend={:?}, model={}, catalog={:?}, max_parallel={}",
            config.backend.kind,
            config.backend.effective_model(),
            config.catalog,
            config.max_parallel
        );
        Ok(config)
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path()?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_parallel == 0 {
            return Err(Error::Configuration(
                "max_parallel must be at least 1".to_string(),
            ));
        }
        if self.task_timeout_secs == Some(0) {
            return Err(Error::Configuration(
                "task_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Overlay `AI_API_KEY`, `AI_MODEL`, `AI_BASE_URL` and `RANDOM_ORG_API_KEY`.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(key) = non_empty("AI_API_KEY") {
            self.backend.api_key = Some(key);
        }
        if let Some(model) = non_empty("AI_MODEL") {
            self.backend.model = Some(model);
        }
        if let Some(url) = non_empty("AI_BASE_URL") {
            self.backend.base_url = Some(url);
        }
        if let Some(key) = non_empty("RANDOM_ORG_API_KEY") {
            self.random.api_key = Some(key);
        }
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

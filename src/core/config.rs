use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::PipelineError;

/// Filesystem locations used by a run.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub project_root: PathBuf,
    pub log_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl AppPaths {
    pub fn new(config: &AppConfig) -> Self {
        let project_root = discover_project_root();
        let log_dir = project_root.join(&config.log_dir);
        let output_dir = project_root.join(&config.output_dir);

        for dir in [&log_dir, &output_dir] {
            let _ = fs::create_dir_all(dir);
        }

        AppPaths {
            project_root,
            log_dir,
            output_dir,
        }
    }
}

fn discover_project_root() -> PathBuf {
    if let Ok(root) = env::var("SLIDEWISE_ROOT") {
        return PathBuf::from(root);
    }

    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    if manifest_dir.join("config.yml").exists() {
        return manifest_dir;
    }

    env::current_dir().unwrap_or(manifest_dir)
}

/// Remote vector-collection service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Generative backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub text_timeout_secs: u64,
    /// Kept short to bound the retry loop's worst case.
    pub image_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-2.0-flash-lite".to_string(),
            api_key: String::new(),
            text_timeout_secs: 30,
            image_timeout_secs: 10,
        }
    }
}

/// Retry policy knobs shared by both backend operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub short_delay_ms: u64,
    pub quota_cooldown_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            short_delay_ms: 1000,
            quota_cooldown_secs: 60,
        }
    }
}

impl RetryConfig {
    pub fn short_delay(&self) -> Duration {
        Duration::from_millis(self.short_delay_ms)
    }

    pub fn quota_cooldown(&self) -> Duration {
        Duration::from_secs(self.quota_cooldown_secs)
    }
}

/// Top-level configuration, loaded from `config.yml` with environment
/// overrides applied on top.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub backend: BackendConfig,
    pub retry: RetryConfig,
    pub log_dir: String,
    pub output_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            backend: BackendConfig::default(),
            retry: RetryConfig::default(),
            log_dir: "logs".to_string(),
            output_dir: "output".to_string(),
        }
    }
}

impl AppConfig {
    /// Loads configuration. An explicitly given path must exist; otherwise
    /// `SLIDEWISE_CONFIG_PATH` or `./config.yml` is used when present, and
    /// pure defaults when not.
    pub fn load(explicit: Option<&Path>) -> Result<Self, PipelineError> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let fallback = env::var("SLIDEWISE_CONFIG_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("config.yml"));
                if fallback.exists() {
                    Self::from_file(&fallback)?
                } else {
                    AppConfig::default()
                }
            }
        };

        config.apply_overrides(|key| env::var(key).ok());
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, PipelineError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_yaml::from_str(&contents)
            .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("SLIDEWISE_STORE_URL") {
            self.store.base_url = url;
        }
        if let Some(url) = lookup("SLIDEWISE_BACKEND_URL") {
            self.backend.base_url = url;
        }
        if let Some(model) = lookup("SLIDEWISE_MODEL") {
            self.backend.model = model;
        }
        if let Some(key) = lookup("SLIDEWISE_API_KEY").or_else(|| lookup("GOOGLE_API_KEY")) {
            self.backend.api_key = key;
        }
    }

    /// The backend cannot be constructed without a key; surface this before
    /// any work starts.
    pub fn ensure_api_key(&self) -> Result<(), PipelineError> {
        if self.backend.api_key.trim().is_empty() {
            return Err(PipelineError::Config(
                "no API key configured; set GOOGLE_API_KEY or backend.api_key".to_string(),
            ));
        }
        Ok(())
    }
}

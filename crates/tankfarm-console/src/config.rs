//! Console configuration loading (`tankfarm.toml`).

#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use smol_str::SmolStr;

use crate::error::ConsoleError;

pub const CONFIG_FILE_NAME: &str = "tankfarm.toml";
pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_STATE_PATH: &str = "tankfarm-inputs.json";
pub const DEFAULT_LISTEN: &str = "127.0.0.1:8090";
const DEFAULT_DEBOUNCE_MS: u64 = 500;
const DEFAULT_CSV_DELAY_MS: u64 = 400;
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleConfig {
    pub backend_url: SmolStr,
    pub state_path: PathBuf,
    pub debounce: Duration,
    pub remote_sync: bool,
    pub download_dir: PathBuf,
    pub csv_delay: Duration,
    pub listen: SmolStr,
    pub log_level: SmolStr,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            backend_url: SmolStr::new(DEFAULT_BACKEND_URL),
            state_path: PathBuf::from(DEFAULT_STATE_PATH),
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            remote_sync: true,
            download_dir: PathBuf::from("downloads"),
            csv_delay: Duration::from_millis(DEFAULT_CSV_DELAY_MS),
            listen: SmolStr::new(DEFAULT_LISTEN),
            log_level: SmolStr::new("info"),
        }
    }
}

impl ConsoleConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConsoleError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            ConsoleError::InvalidConfig(format!("{}: {err}", path.display()).into())
        })?;
        Self::from_toml_str(&text)
            .map_err(|err| ConsoleError::InvalidConfig(format!("{}: {err}", path.display()).into()))
    }

    /// Load `path` when it exists, defaults otherwise.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConsoleError> {
        let path = path.as_ref();
        if !path.is_file() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConsoleError> {
        let raw: ConsoleToml = toml::from_str(text)
            .map_err(|err| ConsoleError::InvalidConfig(err.to_string().into()))?;
        raw.into_config()
    }

    /// Apply `--backend` / `--state` overrides.
    pub fn with_overrides(
        mut self,
        backend: Option<String>,
        state: Option<PathBuf>,
    ) -> Result<Self, ConsoleError> {
        if let Some(url) = backend {
            self.backend_url = validate_backend_url(&url)?;
        }
        if let Some(path) = state {
            self.state_path = path;
        }
        Ok(self)
    }
}

fn validate_backend_url(url: &str) -> Result<SmolStr, ConsoleError> {
    let trimmed = url.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ConsoleError::InvalidConfig(
            format!("backend.base_url must start with http:// or https:// (got '{url}')").into(),
        ));
    }
    Ok(SmolStr::new(trimmed))
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConsoleToml {
    backend: Option<BackendSection>,
    storage: Option<StorageSection>,
    persistence: Option<PersistenceSection>,
    export: Option<ExportSection>,
    web: Option<WebSection>,
    log: Option<LogSection>,
}

#[derive(Debug, Deserialize)]
struct BackendSection {
    base_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StorageSection {
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PersistenceSection {
    debounce_ms: Option<u64>,
    remote_sync: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ExportSection {
    download_dir: Option<String>,
    csv_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct WebSection {
    listen: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LogSection {
    level: Option<String>,
}

impl ConsoleToml {
    fn into_config(self) -> Result<ConsoleConfig, ConsoleError> {
        let defaults = ConsoleConfig::default();

        let backend_url = match self.backend.and_then(|section| section.base_url) {
            Some(url) => validate_backend_url(&url)?,
            None => defaults.backend_url,
        };

        let (debounce_ms, remote_sync) = match self.persistence {
            Some(section) => (
                section.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS),
                section.remote_sync.unwrap_or(true),
            ),
            None => (DEFAULT_DEBOUNCE_MS, true),
        };
        if debounce_ms == 0 {
            return Err(ConsoleError::InvalidConfig(
                "persistence.debounce_ms must be greater than 0".into(),
            ));
        }

        let (download_dir, csv_delay_ms) = match self.export {
            Some(section) => (
                section
                    .download_dir
                    .map_or(defaults.download_dir, PathBuf::from),
                section.csv_delay_ms.unwrap_or(DEFAULT_CSV_DELAY_MS),
            ),
            None => (defaults.download_dir, DEFAULT_CSV_DELAY_MS),
        };

        let level = self
            .log
            .and_then(|section| section.level)
            .map(|level| level.trim().to_ascii_lowercase())
            .unwrap_or_else(|| defaults.log_level.to_string());
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConsoleError::InvalidConfig(
                format!("invalid log.level '{level}'").into(),
            ));
        }

        Ok(ConsoleConfig {
            backend_url,
            state_path: self
                .storage
                .and_then(|section| section.path)
                .map_or(defaults.state_path, PathBuf::from),
            debounce: Duration::from_millis(debounce_ms),
            remote_sync,
            download_dir,
            csv_delay: Duration::from_millis(csv_delay_ms),
            listen: self
                .web
                .and_then(|section| section.listen)
                .map_or(defaults.listen, SmolStr::new),
            log_level: SmolStr::new(level),
        })
    }
}

//! Configuration loading.
//!
//! Loads switchboard configuration from `./switchboard.toml` (or
//! `$SWITCHBOARD_CONFIG_PATH`). Environment variables override file values;
//! file values override defaults.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Top-level switchboard configuration loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SwitchboardConfig {
    /// Default language tag for contacts created without one.
    pub language: String,
    /// Filesystem paths for persistent state.
    pub paths: PathsConfig,
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// The static backend roster, one entry per transport.
    #[serde(rename = "backend")]
    pub backends: Vec<BackendConfig>,
}

impl Default for SwitchboardConfig {
    fn default() -> Self {
        Self {
            language: "en-us".to_owned(),
            paths: PathsConfig::default(),
            log_level: "info".to_owned(),
            backends: Vec::new(),
        }
    }
}

/// Filesystem paths for persistent state.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Identity store SQLite file.
    pub db: String,
    /// Directory for rotating JSON logs.
    pub logs_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let base = directories::ProjectDirs::from("", "", "switchboard")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            db: base.join("switchboard.db").display().to_string(),
            logs_dir: base.join("logs").display().to_string(),
        }
    }
}

/// One configured transport.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Backend name; becomes the `backends` row key.
    pub name: String,
    /// Which transport implementation carries this backend.
    pub kind: BackendKind,
    /// Gateway send endpoint (http transports only).
    pub outbound_url: Option<String>,
    /// Gateway events endpoint (http transports only).
    pub poll_url: Option<String>,
}

/// Transport implementations switchboard can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-memory bucket for tests and local development.
    Bucket,
    /// Generic JSON gateway over HTTP.
    Http,
}

impl SwitchboardConfig {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// Config file path: `$SWITCHBOARD_CONFIG_PATH` or `./switchboard.toml`.
    /// A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from the TOML file only, no env overrides.
    fn load_from_file() -> Result<Self> {
        let path = Self::config_path_with(|key| std::env::var(key).ok());
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                let config: SwitchboardConfig =
                    toml::from_str(&contents).context("failed to parse config TOML")?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no config file found, using defaults");
                Ok(SwitchboardConfig::default())
            }
            Err(e) => Err(anyhow::anyhow!("failed to read config file: {e}")),
        }
    }

    /// Resolve the config path using a custom env resolver (for testing).
    fn config_path_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
        if let Some(p) = env("SWITCHBOARD_CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("switchboard.toml")
    }

    /// Apply environment variable overrides (env > config > defaults).
    ///
    /// Takes a resolver function for testability.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("SWITCHBOARD_LANGUAGE") {
            self.language = v;
        }
        if let Some(v) = env("SWITCHBOARD_LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = env("SWITCHBOARD_DB") {
            self.paths.db = v;
        }
        if let Some(v) = env("SWITCHBOARD_LOGS_DIR") {
            self.paths.logs_dir = v;
        }
    }
}

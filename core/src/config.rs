//! Configuration loading
//!
//! Sources, lowest priority first:
//! 1. Built-in defaults
//! 2. TOML file (`--config`, `SIFT_CONFIG_PATH`, or `./sift.toml` if present)
//! 3. Environment variables prefixed `SIFT_`, nested with `__`
//!    (e.g. `SIFT_ENGINE__MAX_LOOP_ITERATIONS=10000`)
//!
//! A `.env` file in the working directory is loaded into the environment
//! first.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG_FILE: &str = "sift.toml";
const CONFIG_PATH_VAR: &str = "SIFT_CONFIG_PATH";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log: LogConfig,
    pub engine: EngineConfig,
    pub triggers: TriggerConfig,
    pub debug: DebugConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` wins when set
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Abort a `while` loop after this many iterations. Unlimited when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_loop_iterations: Option<u64>,
    /// Readable descriptions include per-statement access stats
    pub include_stats: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Refuse new `when` registrations beyond this many pending triggers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_pending: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Maintain the line -> statement map for debuggers
    pub filemaps: bool,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load with default search rules
    pub fn load() -> Result<Self> {
        Self::builder().build()
    }

    /// Effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to render configuration")
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    skip_env: bool,
}

impl ConfigBuilder {
    /// Explicit config file; it must exist
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    /// Ignore `SIFT_*` environment variables and `.env`
    pub fn skip_env(mut self, skip: bool) -> Self {
        self.skip_env = skip;
        self
    }

    pub fn build(self) -> Result<Config> {
        if !self.skip_env {
            dotenvy::dotenv().ok();
        }

        let explicit = self.config_path.or_else(|| {
            if self.skip_env {
                None
            } else {
                std::env::var(CONFIG_PATH_VAR).ok().map(PathBuf::from)
            }
        });

        let file = match &explicit {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading config file");
                ::config::File::from(path.as_path()).required(true)
            }
            None => ::config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let mut builder = ::config::Config::builder().add_source(file);
        if !self.skip_env {
            builder = builder.add_source(
                ::config::Environment::with_prefix("SIFT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config: Config = builder
            .build()
            .context("Failed to read configuration sources")?
            .try_deserialize()
            .context("Invalid configuration")?;

        Ok(config)
    }
}

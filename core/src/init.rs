//! One-time process initialization
//!
//! Loads configuration, installs the tracing subscriber and, when enabled,
//! sets up the debugger line maps. Embedders call this once before loading
//! any units.
//!
//! # Example
//!
//! ```no_run
//! use sift_core::init::InitBuilder;
//!
//! InitBuilder::new()
//!     .config_path("./sift.toml")
//!     .init()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::interpreter::debug;

/// Global initialization state
static INIT_STATE: OnceLock<InitState> = OnceLock::new();

#[derive(Debug)]
struct InitState {
    config: Config,
}

/// Options for initializing the engine
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Config file path (overrides default search)
    pub config_path: Option<PathBuf>,

    /// Log filter (overrides config file and env vars, not `RUST_LOG`)
    pub log_filter: Option<String>,

    /// Force the debugger line maps on regardless of configuration
    pub filemaps: bool,

    /// Leave the global tracing subscriber alone
    pub skip_logging: bool,
}

pub struct InitBuilder {
    options: InitOptions,
}

impl InitBuilder {
    pub fn new() -> Self {
        Self {
            options: InitOptions::default(),
        }
    }

    /// Set the config file path
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn log_filter(mut self, filter: impl Into<String>) -> Self {
        self.options.log_filter = Some(filter.into());
        self
    }

    pub fn filemaps(mut self, enabled: bool) -> Self {
        self.options.filemaps = enabled;
        self
    }

    pub fn skip_logging(mut self, skip: bool) -> Self {
        self.options.skip_logging = skip;
        self
    }

    pub fn init(self) -> Result<&'static Config> {
        initialize(self.options)
    }
}

impl Default for InitBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Initialize with the given options
///
/// Calling this more than once is safe; later calls return the configuration
/// from the first.
pub fn initialize(options: InitOptions) -> Result<&'static Config> {
    if let Some(state) = INIT_STATE.get() {
        return Ok(&state.config);
    }

    let mut config = Config::builder()
        .config_path(options.config_path)
        .build()
        .context("Failed to load configuration")?;

    if let Some(filter) = options.log_filter {
        config.log.filter = filter;
    }
    if options.filemaps {
        config.debug.filemaps = true;
    }

    if !options.skip_logging {
        install_subscriber(&config.log.filter)?;
    }

    if config.debug.filemaps {
        debug::init();
    }

    tracing::debug!(
        filemaps = config.debug.filemaps,
        max_loop_iterations = ?config.engine.max_loop_iterations,
        max_pending = ?config.triggers.max_pending,
        "sift initialized"
    );

    // Another thread may have won the race; its state is as good as ours
    let _ = INIT_STATE.set(InitState { config });
    INIT_STATE
        .get()
        .map(|s| &s.config)
        .ok_or_else(|| anyhow!("Initialization state missing"))
}

/// `RUST_LOG` takes precedence over the configured filter. An already
/// installed global subscriber is kept.
fn install_subscriber(filter: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => EnvFilter::try_new(filter)
            .with_context(|| format!("Invalid log filter '{}'", filter))?,
    };

    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_err()
    {
        tracing::debug!("global tracing subscriber already installed");
    }
    Ok(())
}

/// Check if the engine has been initialized
pub fn is_initialized() -> bool {
    INIT_STATE.get().is_some()
}

/// Configuration from [`initialize`], if it ran
pub fn get_config() -> Option<&'static Config> {
    INIT_STATE.get().map(|s| &s.config)
}

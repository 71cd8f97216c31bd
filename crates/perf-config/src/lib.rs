//! # perf-config
//!
//! Layered configuration loading for perfrec using figment.
//!
//! Configuration sources (in priority order, highest wins):
//! 1. Environment variables (`PERFREC_*` prefix, `__` as separator)
//! 2. Project-level `.perfrec/config.toml`
//! 3. User-level `~/.config/perfrec/config.toml`
//! 4. Built-in defaults
//!
//! `PERFREC_RECORDING__MODE=overwrite` maps to `recording.mode`.
//!
//! # Usage
//!
//! ```no_run
//! use perf_config::{Mode, PerfConfig};
//!
//! let config = PerfConfig::load_with_dotenv().expect("config");
//! if config.recording.mode == Mode::Overwrite {
//!     println!("records will be replaced");
//! }
//! ```

mod error;
mod recording;

pub use error::ConfigError;
pub use recording::{Mode, RecordingConfig};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "PERFREC_";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PerfConfig {
    #[serde(default)]
    pub recording: RecordingConfig,
}

impl PerfConfig {
    /// Load configuration from TOML files and environment variables.
    ///
    /// Does NOT call `dotenvy`; use [`Self::load_with_dotenv`] for `.env`
    /// loading.
    pub fn load() -> Result<Self, ConfigError> {
        Self::figment().extract().map_err(ConfigError::from)
    }

    /// Load `.env` from the workspace root, then [`Self::load`].
    pub fn load_with_dotenv() -> Result<Self, ConfigError> {
        Self::load_dotenv_from_workspace();
        Self::load()
    }

    /// Build the figment provider chain.
    ///
    /// Public so tests can inspect the figment or layer extra providers.
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(global_path) = Self::global_config_path()
            && global_path.exists()
        {
            figment = figment.merge(Toml::file(global_path));
        }

        let local_path = PathBuf::from(".perfrec/config.toml");
        if local_path.exists() {
            figment = figment.merge(Toml::file(local_path));
        }

        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("perfrec").join("config.toml"))
    }

    /// Walk up from `CARGO_MANIFEST_DIR` looking for `.env`, falling back to
    /// the current directory. Missing files are not an error.
    fn load_dotenv_from_workspace() {
        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            let mut dir = PathBuf::from(manifest_dir);
            // crate -> crates/ -> workspace root
            for _ in 0..3 {
                let env_path = dir.join(".env");
                if env_path.exists() {
                    let _ = dotenvy::from_path(&env_path);
                    return;
                }
                if !dir.pop() {
                    break;
                }
            }
        }
        let _ = dotenvy::dotenv();
    }
}

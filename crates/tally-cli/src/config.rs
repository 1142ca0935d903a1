//! Configuration loading and management.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use tally_core::ValidationConfig;

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,
    /// Largest stored-vs-calculated difference still considered equal.
    pub discrepancy_tolerance_secs: i64,
    /// Shortest untracked span reported as a gap.
    pub gap_threshold_secs: i64,
    /// Longest plausible session.
    pub max_session_secs: i64,
    /// Intervals per page during category backfill.
    pub backfill_page_size: usize,
    /// How many sessions batch validation ranks by untracked time.
    pub top_gappiest: usize,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        let engine = ValidationConfig::default();
        Self {
            database_path: data_dir.join("tally.db"),
            discrepancy_tolerance_secs: engine.discrepancy_tolerance_secs,
            gap_threshold_secs: engine.gap_threshold_secs,
            max_session_secs: engine.max_session_secs,
            backfill_page_size: 500,
            top_gappiest: 5,
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // TALLY_*
        figment = figment.merge(Env::prefixed("TALLY_"));

        figment.extract()
    }

    /// Thresholds handed to the validator.
    #[must_use]
    pub const fn validation_config(&self) -> ValidationConfig {
        ValidationConfig {
            discrepancy_tolerance_secs: self.discrepancy_tolerance_secs,
            gap_threshold_secs: self.gap_threshold_secs,
            max_session_secs: self.max_session_secs,
        }
    }
}

/// Returns the platform-specific config directory for tally.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("tally"))
}

/// Returns the platform-specific data directory for tally.
///
/// On Linux: `~/.local/share/tally`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("tally"))
}

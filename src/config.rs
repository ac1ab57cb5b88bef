//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/ptree/ptree.toml`
//! 3. Local config: file passed with `--config`
//! 4. Environment variables: `PTREE_*` prefix, `__` between nested keys

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::FixedOffset;
use config::{Config, ConfigError, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::application::{ApplicationError, ApplicationResult, ThresholdConfig};
use crate::domain::{offset_hours, Level};

/// Promotion thresholds per target level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RulesConfig {
    pub bq: ThresholdConfig,
    pub b1: ThresholdConfig,
    pub b2: ThresholdConfig,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            bq: ThresholdConfig::default_for(Level::BQ),
            b1: ThresholdConfig::default_for(Level::B1),
            b2: ThresholdConfig::default_for(Level::B2),
        }
    }
}

/// Unified configuration for ptree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// TOML file with `[[partner]]` records
    pub feed_path: Option<PathBuf>,
    /// TOML file with `[[sale]]` and `[[bonus]]` records
    pub ledger_path: Option<PathBuf>,
    /// Offset of calendar-day boundaries from UTC, in hours
    pub utc_offset_hours: i32,
    /// Levels of team expansion below each surpassed partner; 0 for the whole subtree
    pub surpassed_team_depth: usize,
    /// Deadline for a single ledger query; 0 disables it
    pub ledger_timeout_secs: u64,
    /// Accept feeds whose upgrade timestamps do not match the level
    pub lenient_upgrade_times: bool,
    pub rules: RulesConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            feed_path: None,
            ledger_path: None,
            utc_offset_hours: 8,
            surpassed_team_depth: 1,
            ledger_timeout_secs: 30,
            lenient_upgrade_times: false,
            rules: RulesConfig::default(),
        }
    }
}

/// Get the XDG config directory for ptree.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "ptree").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("ptree.toml"))
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}

/// Expand `~`, `$VAR` and `${VAR}` in a path.
fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    shellexpand::full(raw.as_ref())
        .map(|s| PathBuf::from(s.into_owned()))
        .unwrap_or_else(|_| path.to_path_buf())
}

impl Settings {
    /// Load settings with layered precedence.
    ///
    /// # Arguments
    /// * `local` - Optional explicit config file; it must exist if given
    pub fn load(local: Option<&Path>) -> ApplicationResult<Self> {
        let defaults = Config::try_from(&Settings::default()).map_err(config_err)?;
        let mut builder = Config::builder().add_source(defaults);

        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                builder = builder.add_source(File::from(global_path).required(false));
            }
        }

        if let Some(local_path) = local {
            builder = builder.add_source(File::from(local_path.to_path_buf()).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("PTREE")
                .prefix_separator("_")
                .try_parsing(true)
                .separator("__"),
        );

        let mut settings: Self = builder
            .build()
            .map_err(config_err)?
            .try_deserialize()
            .map_err(config_err)?;
        settings.expand_paths();
        settings.validate()?;
        Ok(settings)
    }

    /// Expand shell variables and tilde in path-like fields.
    fn expand_paths(&mut self) {
        self.feed_path = self.feed_path.as_deref().map(expand_path);
        self.ledger_path = self.ledger_path.as_deref().map(expand_path);
    }

    fn validate(&self) -> ApplicationResult<()> {
        self.utc_offset().map(|_| ())
    }

    pub fn utc_offset(&self) -> ApplicationResult<FixedOffset> {
        offset_hours(self.utc_offset_hours).map_err(|e| ApplicationError::Config {
            message: e.to_string(),
        })
    }

    /// Team expansion depth for surpassed-team queries, `None` for the whole subtree.
    pub fn team_depth(&self) -> Option<usize> {
        match self.surpassed_team_depth {
            0 => None,
            n => Some(n),
        }
    }

    pub fn ledger_timeout(&self) -> Option<Duration> {
        match self.ledger_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Render as TOML, e.g. for `ptree config show`.
    pub fn to_toml(&self) -> ApplicationResult<String> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: e.to_string(),
        })
    }
}

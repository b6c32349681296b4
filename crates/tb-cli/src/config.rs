//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::Duration;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use tb_core::CostUnitConfig;

/// Application configuration.
///
/// Cost units are validated while the configuration is extracted, so a
/// loaded `Config` always carries a usable mapping.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,
    /// Staged batches older than this are evicted at startup.
    pub cache_max_age_minutes: u32,
    /// Emit every SQL statement as a `trace` event on `tb_db::sql`.
    pub trace_sql: bool,
    /// Cost units keyed by identifier.
    pub cost_units: CostUnitConfig,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("cache_max_age_minutes", &self.cache_max_age_minutes)
            .field("trace_sql", &self.trace_sql)
            .field("cost_units", &self.cost_units.ids().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("tb.db"),
            cache_max_age_minutes: 20,
            trace_sql: false,
            cost_units: CostUnitConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    ///
    /// Later sources override earlier ones: built-in defaults, the platform
    /// config file, `config_path`, then `TB_*` environment variables.
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

        figment = figment.merge(Env::prefixed("TB_"));

        figment.extract()
    }

    /// Retention window of the staging cache.
    pub fn cache_max_age(&self) -> Duration {
        Duration::minutes(i64::from(self.cache_max_age_minutes))
    }
}

/// Returns the platform-specific config directory for tb.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("tb"))
}

/// Returns the platform-specific data directory for tb.
///
/// On Linux: `~/.local/share/tb`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("tb"))
}

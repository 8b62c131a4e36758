//! Kernel configuration.
//!
//! Loaded via the `config` crate from `WAYMARK_*` environment variables,
//! e.g. `WAYMARK_SYNC_LEGACY_FIELDS=false`.

use serde::Deserialize;

/// Settings that change how the kernel writes workitems.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KernelConfig {
    /// Mirror canonical fields to their legacy names after each event.
    #[serde(default = "default_sync_legacy_fields")]
    pub sync_legacy_fields: bool,

    /// Write event log timestamps in UTC instead of local time.
    #[serde(default = "default_log_timestamps_utc")]
    pub log_timestamps_utc: bool,
}

fn default_sync_legacy_fields() -> bool {
    true
}

fn default_log_timestamps_utc() -> bool {
    true
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            sync_legacy_fields: default_sync_legacy_fields(),
            log_timestamps_utc: default_log_timestamps_utc(),
        }
    }
}

impl KernelConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but cannot be parsed.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::with_prefix("WAYMARK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

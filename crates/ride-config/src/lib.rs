//! Shared configuration for the ride dispatch daemon.
//!
//! Configuration is layered by [`ortho_config`]: built-in defaults are
//! overridden by a configuration file (`--config-path` or
//! `RIDED_CONFIG_PATH`), then by `RIDED_*` environment variables, and finally
//! by command-line flags. The resolved [`Config`] carries the listener
//! endpoint, the telemetry settings, and the numeric tuning knobs of the
//! dispatch core, which [`Config::dispatch_settings`] validates into a
//! [`DispatchSettings`] value.

mod defaults;
mod dispatch;
mod logging;
mod runtime;
mod socket;

use std::ffi::OsString;
use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_FAN_OUT_RADIUS_KM, DEFAULT_LOG_FILTER, DEFAULT_PRESENCE_TTL_SECS,
    DEFAULT_SWEEP_INTERVAL_SECS, DEFAULT_TCP_PORT, DEFAULT_TOMBSTONE_RETENTION_SECS,
    default_log_filter, default_log_filter_string, default_log_format, default_socket_endpoint,
};
pub use dispatch::{DispatchSettings, DispatchSettingsError};
pub use logging::{LogFormat, LogFormatParseError};
pub use runtime::{RuntimePaths, RuntimePathsError};
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};

/// Resolved daemon configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "RIDED")]
pub struct Config {
    /// Endpoint the daemon listens on for client sessions.
    #[ortho_config(default = default_socket_endpoint())]
    pub daemon_socket: SocketEndpoint,
    /// `tracing` filter expression applied to daemon logs.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Output format for daemon logs.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// Radius, in kilometres, used to select fan-out candidates.
    #[ortho_config(default = DEFAULT_FAN_OUT_RADIUS_KM)]
    pub fan_out_radius_km: f64,
    /// Seconds without a location update before a driver is considered gone.
    #[ortho_config(default = DEFAULT_PRESENCE_TTL_SECS)]
    pub presence_ttl_secs: u64,
    /// Seconds between staleness sweeps.
    #[ortho_config(default = DEFAULT_SWEEP_INTERVAL_SECS)]
    pub sweep_interval_secs: u64,
    /// Seconds a terminal ride id is remembered after leaving the live table.
    #[ortho_config(default = DEFAULT_TOMBSTONE_RETENTION_SECS)]
    pub tombstone_retention_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon_socket: default_socket_endpoint(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            fan_out_radius_km: DEFAULT_FAN_OUT_RADIUS_KM,
            presence_ttl_secs: DEFAULT_PRESENCE_TTL_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            tombstone_retention_secs: DEFAULT_TOMBSTONE_RETENTION_SECS,
        }
    }
}

impl Config {
    /// Loads the configuration from the process arguments, environment and
    /// configuration files.
    ///
    /// # Errors
    ///
    /// Returns the [`OrthoError`] raised by any layer that fails to parse or
    /// merge.
    pub fn load() -> Result<Self, Arc<OrthoError>> {
        <Self as OrthoConfig>::load()
    }

    /// Loads the configuration using `args` in place of the process
    /// arguments. The first item is the program name.
    ///
    /// # Errors
    ///
    /// As for [`Config::load`].
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, Arc<OrthoError>>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as OrthoConfig>::load_from_iter(args)
    }

    /// Endpoint the daemon binds.
    #[must_use]
    pub fn daemon_socket(&self) -> &SocketEndpoint {
        &self.daemon_socket
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Validates the numeric tuning fields and converts them into durations.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchSettingsError`] when the radius is not a positive
    /// finite number or when any interval is zero.
    pub fn dispatch_settings(&self) -> Result<DispatchSettings, DispatchSettingsError> {
        DispatchSettings::from_config(self)
    }
}

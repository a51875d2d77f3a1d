//! Validated tuning for the dispatch core.

use std::time::Duration;

use thiserror::Error;

use crate::Config;

/// Dispatch tuning resolved from [`Config`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchSettings {
    /// Radius, in kilometres, for fan-out and nearby-driver queries.
    pub fan_out_radius_km: f64,
    /// Age after which a driver without location updates is swept.
    pub presence_ttl: Duration,
    /// Period of the staleness sweep.
    pub sweep_interval: Duration,
    /// How long a terminal ride id stays reserved.
    pub tombstone_retention: Duration,
}

impl DispatchSettings {
    pub(crate) fn from_config(config: &Config) -> Result<Self, DispatchSettingsError> {
        let radius = config.fan_out_radius_km;
        if !radius.is_finite() || radius <= 0.0 {
            return Err(DispatchSettingsError::InvalidRadius { radius });
        }
        Ok(Self {
            fan_out_radius_km: radius,
            presence_ttl: non_zero("presence_ttl_secs", config.presence_ttl_secs)?,
            sweep_interval: non_zero("sweep_interval_secs", config.sweep_interval_secs)?,
            tombstone_retention: non_zero(
                "tombstone_retention_secs",
                config.tombstone_retention_secs,
            )?,
        })
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        // The built-in defaults are valid by construction.
        let config = Config::default();
        Self {
            fan_out_radius_km: config.fan_out_radius_km,
            presence_ttl: Duration::from_secs(config.presence_ttl_secs),
            sweep_interval: Duration::from_secs(config.sweep_interval_secs),
            tombstone_retention: Duration::from_secs(config.tombstone_retention_secs),
        }
    }
}

fn non_zero(field: &'static str, seconds: u64) -> Result<Duration, DispatchSettingsError> {
    if seconds == 0 {
        return Err(DispatchSettingsError::ZeroInterval { field });
    }
    Ok(Duration::from_secs(seconds))
}

/// Errors raised when the configured dispatch tuning is unusable.
#[derive(Debug, Error, PartialEq)]
pub enum DispatchSettingsError {
    /// The fan-out radius was zero, negative, or not finite.
    #[error("fan-out radius must be a positive number of kilometres, got {radius}")]
    InvalidRadius {
        /// Rejected radius.
        radius: f64,
    },
    /// An interval field was zero.
    #[error("{field} must be greater than zero")]
    ZeroInterval {
        /// Name of the offending configuration field.
        field: &'static str,
    },
}

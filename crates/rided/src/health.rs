//! Structured health reporting for daemon lifecycle events.

use std::sync::Arc;

use ride_config::Config;

use crate::bootstrap::BootstrapError;
use crate::coordinator::SweepReport;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked after every staleness sweep pass.
    fn sweep_completed(&self, report: &SweepReport);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn sweep_completed(&self, report: &SweepReport) {
        (**self).sweep_completed(report);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting daemon bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            socket = %config.daemon_socket(),
            log_filter = %config.log_filter(),
            log_format = ?config.log_format(),
            fan_out_radius_km = config.fan_out_radius_km,
            presence_ttl_secs = config.presence_ttl_secs,
            "daemon bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "daemon bootstrap failed"
        );
    }

    fn sweep_completed(&self, report: &SweepReport) {
        if report.stale_drivers.is_empty() && report.purged_tombstones == 0 {
            tracing::trace!(target: HEALTH_TARGET, event = "sweep_completed", "sweep found nothing");
            return;
        }
        tracing::info!(
            target: HEALTH_TARGET,
            event = "sweep_completed",
            stale_drivers = ?report.stale_drivers,
            purged_tombstones = report.purged_tombstones,
            "staleness sweep removed entries"
        );
    }
}

//! Real-time ride dispatch daemon.
//!
//! `rided` accepts rider and driver sessions over a Unix or TCP socket and
//! speaks newline-delimited JSON events in both directions. Drivers announce
//! presence and stream locations; riders request rides, which are offered to
//! every available driver within the fan-out radius. The first driver to
//! accept wins, and the ride then advances through arrival, start, and
//! completion, or ends early through cancellation.
//!
//! All shared state lives in the [`coordinator`]: the connection registry and
//! its rooms, the driver presence table, and the ride tracker. The daemon
//! layers process supervision on top: a singleton lock, pid and health
//! artefacts, optional daemonisation, and a periodic sweep that takes silent
//! drivers offline.
//!
//! Configuration is layered through [`ride_config::Config`] and telemetry is
//! structured through `tracing`.

mod bootstrap;
pub mod coordinator;
mod dispatch;
mod health;
mod process;
pub mod telemetry;
mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use dispatch::DispatchError;
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{ArtefactAction, LaunchError, LaunchMode, RuntimeArtefact, run_daemon};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;

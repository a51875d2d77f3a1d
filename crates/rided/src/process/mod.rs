//! Process supervision for the dispatch daemon.
//!
//! Covers singleton locking, pid and health artefacts, optional
//! daemonisation, and the launch sequence that wires the listener and the
//! staleness sweep around a bootstrapped coordinator.

use std::time::Duration;

pub(crate) mod daemonizer;
mod errors;
mod files;
mod guard;
pub(crate) mod launch;
pub(crate) mod shutdown;

pub use errors::{ArtefactAction, LaunchError, RuntimeArtefact};
pub use launch::{LaunchMode, run_daemon};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
pub(crate) const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
pub(crate) const FOREGROUND_ENV_VAR: &str = "RIDED_FOREGROUND";

//! Periodic staleness sweep.

use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use thiserror::Error;
use tracing::{debug, info};

use super::{Coordinator, SWEEP_TARGET};
use crate::health::HealthReporter;

/// Errors raised while stopping the sweep thread.
#[derive(Debug, Error)]
pub enum SweepError {
    /// The sweep thread panicked.
    #[error("sweep thread panicked")]
    ThreadPanic,
}

/// Handle to the background sweep thread.
///
/// Dropping the handle stops the sweep without waiting for it.
pub struct SweepHandle {
    stop: Option<Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl SweepHandle {
    /// Stops the sweep and waits for the thread to exit.
    ///
    /// # Errors
    ///
    /// Returns [`SweepError::ThreadPanic`] when the thread panicked.
    pub fn stop(mut self) -> Result<(), SweepError> {
        self.stop.take();
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| SweepError::ThreadPanic),
            None => Ok(()),
        }
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        self.stop.take();
    }
}

/// Starts sweeping `coordinator` every `interval` on a named thread.
///
/// Each pass is reported through `reporter`.
///
/// # Errors
///
/// Returns the spawn error when the thread cannot be created.
pub fn spawn_sweep(
    coordinator: Arc<Coordinator>,
    interval: Duration,
    reporter: Arc<dyn HealthReporter>,
) -> io::Result<SweepHandle> {
    let (stop, stopped) = bounded::<()>(1);
    let thread = thread::Builder::new()
        .name("rided-sweep".to_owned())
        .spawn(move || run_sweep_loop(&coordinator, interval, &stopped, reporter.as_ref()))?;
    Ok(SweepHandle {
        stop: Some(stop),
        thread: Some(thread),
    })
}

fn run_sweep_loop(
    coordinator: &Coordinator,
    interval: Duration,
    stopped: &Receiver<()>,
    reporter: &dyn HealthReporter,
) {
    info!(
        target: SWEEP_TARGET,
        interval_secs = interval.as_secs(),
        "staleness sweep active"
    );
    loop {
        match stopped.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {
                let report = coordinator.sweep();
                debug!(
                    target: SWEEP_TARGET,
                    stale = report.stale_drivers.len(),
                    purged = report.purged_tombstones,
                    "sweep pass finished"
                );
                reporter.sweep_completed(&report);
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    info!(target: SWEEP_TARGET, "staleness sweep stopped");
}

//! Singleton lock plus pid and health artefacts for a running daemon.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use ride_config::RuntimePaths;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{info, warn};

use super::PROCESS_TARGET;
use super::errors::{ArtefactAction, LaunchError, RuntimeArtefact};
use super::files::atomic_write;

/// Holds the lock file for the daemon's lifetime and removes every runtime
/// artefact on drop.
#[derive(Debug)]
pub(super) struct ProcessGuard {
    paths: RuntimePaths,
    _lock: File,
    pid: Option<u32>,
}

impl ProcessGuard {
    pub(super) fn acquire(paths: RuntimePaths) -> Result<Self, LaunchError> {
        let lock = acquire_lock(&paths)?;
        Ok(Self {
            paths,
            _lock: lock,
            pid: None,
        })
    }

    pub(super) fn write_pid(&mut self, pid: u32) -> Result<(), LaunchError> {
        let path = self.paths.pid_path();
        atomic_write(path, format!("{pid}\n").as_bytes()).map_err(LaunchError::artefact(
            RuntimeArtefact::Pid,
            ArtefactAction::Write,
            path,
        ))?;
        self.pid = Some(pid);
        info!(
            target: PROCESS_TARGET,
            pid,
            file = %path.display(),
            "pid file written"
        );
        Ok(())
    }

    pub(super) fn write_health(&self, status: HealthState) -> Result<(), LaunchError> {
        let pid = self.pid.ok_or(LaunchError::PidNotRecorded)?;
        let path = self.paths.health_path();
        let snapshot = HealthSnapshot {
            status: status.as_str(),
            pid,
            timestamp: OffsetDateTime::now_utc(),
        };
        let mut payload = serde_json::to_vec(&snapshot)?;
        payload.push(b'\n');
        atomic_write(path, &payload).map_err(LaunchError::artefact(
            RuntimeArtefact::Health,
            ArtefactAction::Write,
            path,
        ))?;
        info!(
            target: PROCESS_TARGET,
            status = snapshot.status,
            file = %path.display(),
            "health snapshot updated"
        );
        Ok(())
    }

    pub(super) fn paths(&self) -> &RuntimePaths {
        &self.paths
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        for (path, artefact) in [
            (self.paths.health_path(), RuntimeArtefact::Health),
            (self.paths.pid_path(), RuntimeArtefact::Pid),
            (self.paths.lock_path(), RuntimeArtefact::Lock),
        ] {
            match fs::remove_file(path) {
                Err(error) if error.kind() != io::ErrorKind::NotFound => {
                    warn!(
                        target: PROCESS_TARGET,
                        file = %path.display(),
                        artefact = artefact.as_str(),
                        %error,
                        "failed to remove runtime artefact"
                    );
                }
                _ => {}
            }
        }
    }
}

/// Lifecycle stage published in the health snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum HealthState {
    Starting,
    Ready,
    Stopping,
}

impl HealthState {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Stopping => "stopping",
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthSnapshot {
    status: &'static str,
    pid: u32,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
}

fn acquire_lock(paths: &RuntimePaths) -> Result<File, LaunchError> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    match options.open(paths.lock_path()) {
        Ok(file) => {
            info!(
                target: PROCESS_TARGET,
                file = %paths.lock_path().display(),
                "acquired daemon lock"
            );
            Ok(file)
        }
        Err(error) if error.kind() == io::ErrorKind::AlreadyExists => handle_existing_lock(paths),
        Err(source) => Err(LaunchError::artefact(
            RuntimeArtefact::Lock,
            ArtefactAction::Create,
            paths.lock_path(),
        )(source)),
    }
}

fn handle_existing_lock(paths: &RuntimePaths) -> Result<File, LaunchError> {
    match read_pid(paths.pid_path()) {
        Some(pid) if process_alive(pid)? => {
            info!(
                target: PROCESS_TARGET,
                pid,
                "refusing to start: existing daemon alive"
            );
            return Err(LaunchError::AlreadyRunning { pid });
        }
        Some(pid) => {
            warn!(
                target: PROCESS_TARGET,
                pid,
                "existing daemon not detected; cleaning stale files"
            );
        }
        // A lock without a pid belongs to a launch that has not finished
        // starting, or to one that crashed before writing it.
        None if paths.pid_path().exists() => {}
        None => {
            return Err(LaunchError::StartupInProgress {
                lock: paths.lock_path().to_path_buf(),
                pid: paths.pid_path().to_path_buf(),
            });
        }
    }
    remove_stale(RuntimeArtefact::Lock, paths.lock_path())?;
    remove_stale(RuntimeArtefact::Pid, paths.pid_path())?;
    acquire_lock(paths)
}

fn read_pid(path: &Path) -> Option<u32> {
    let content = fs::read_to_string(path).ok()?;
    content.trim().parse::<u32>().ok()
}

fn remove_stale(artefact: RuntimeArtefact, path: &Path) -> Result<(), LaunchError> {
    match fs::remove_file(path) {
        Err(error) if error.kind() != io::ErrorKind::NotFound => Err(LaunchError::artefact(
            artefact,
            ArtefactAction::Remove,
            path,
        )(error)),
        _ => Ok(()),
    }
}

fn process_alive(pid: u32) -> Result<bool, LaunchError> {
    let Ok(raw) = i32::try_from(pid) else {
        return Ok(false);
    };
    if raw == 0 {
        return Ok(false);
    }
    match kill(Pid::from_raw(raw), None) {
        Ok(()) | Err(Errno::EPERM) => Ok(true),
        Err(Errno::ESRCH | Errno::ECHILD) => Ok(false),
        Err(errno) => Err(LaunchError::Liveness { pid, errno }),
    }
}

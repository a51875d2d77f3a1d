//! Errors raised while launching, supervising and tearing down `rided`.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nix::errno::Errno;
use thiserror::Error;

use ortho_config::OrthoError;

use ride_config::{RuntimePathsError, SocketPreparationError};

use crate::bootstrap::BootstrapError;
use crate::coordinator::SweepError;
use crate::transport::ListenerError;

use super::daemonizer::DaemonizeError;
use super::shutdown::ShutdownError;

/// Files the daemon keeps in its runtime directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeArtefact {
    /// Singleton lock held for the daemon's lifetime.
    Lock,
    /// Pid of the serving process.
    Pid,
    /// JSON health snapshot polled by supervisors.
    Health,
}

impl RuntimeArtefact {
    /// Short name used in logs and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lock => "lock",
            Self::Pid => "pid",
            Self::Health => "health",
        }
    }
}

impl fmt::Display for RuntimeArtefact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the daemon was doing to a runtime artefact when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtefactAction {
    /// Opening the file for the first time.
    Create,
    /// Replacing its contents.
    Write,
    /// Deleting it during cleanup.
    Remove,
}

impl fmt::Display for ArtefactAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Write => "write",
            Self::Remove => "remove",
        })
    }
}

/// Everything that can stop the dispatch daemon from starting or from
/// shutting down cleanly.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {0}")]
    Config(#[from] Arc<OrthoError>),
    /// The socket parent directory could not be prepared.
    #[error("failed to prepare the session socket: {0}")]
    Socket(#[from] SocketPreparationError),
    /// The runtime directory could not be derived or created.
    #[error("failed to resolve runtime paths: {0}")]
    RuntimePaths(#[from] RuntimePathsError),
    /// A lock, pid or health file operation failed.
    #[error("failed to {action} {artefact} file '{path}': {source}")]
    Artefact {
        /// Which file failed.
        artefact: RuntimeArtefact,
        /// What was being done to it.
        action: ArtefactAction,
        /// Location of the file.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Another dispatcher already owns the runtime directory.
    #[error("a dispatcher is already running with pid {pid}")]
    AlreadyRunning {
        /// Pid read from the existing pid file.
        pid: u32,
    },
    /// The lock exists but its owner has not recorded a pid yet.
    #[error("another dispatcher is still starting (lock '{lock}', awaiting pid '{pid}')")]
    StartupInProgress {
        /// Lock file held by the other launch.
        lock: PathBuf,
        /// Pid file it has yet to write.
        pid: PathBuf,
    },
    /// The health snapshot could not be serialised.
    #[error("failed to encode health snapshot: {0}")]
    HealthEncode(#[from] serde_json::Error),
    /// `kill(pid, 0)` returned something other than alive or gone.
    #[error("could not tell whether pid {pid} is alive: {errno}")]
    Liveness {
        /// Pid being checked.
        pid: u32,
        /// Error returned by the kernel.
        errno: Errno,
    },
    /// Health was published before the serving pid was known.
    #[error("health cannot be published before the pid is recorded")]
    PidNotRecorded,
    /// Detaching into the background failed.
    #[error("failed to detach from the terminal: {0}")]
    Daemonize(#[from] DaemonizeError),
    /// Signal handling failed.
    #[error("failed while waiting for a shutdown signal: {0}")]
    Shutdown(#[from] ShutdownError),
    /// Bootstrap could not build the coordinator.
    #[error("failed to assemble the coordinator: {0}")]
    Bootstrap(#[from] BootstrapError),
    /// The session listener failed to bind, start or stop.
    #[error("session listener failed: {0}")]
    Listener(#[from] ListenerError),
    /// The sweep thread could not be spawned.
    #[error("failed to spawn the staleness sweep thread: {0}")]
    SweepThread(#[source] io::Error),
    /// The sweep thread panicked.
    #[error("staleness sweep stopped abnormally: {0}")]
    Sweep(#[from] SweepError),
}

impl LaunchError {
    /// Builds a mapper for IO failures on one runtime artefact.
    pub(crate) fn artefact(
        artefact: RuntimeArtefact,
        action: ArtefactAction,
        path: &Path,
    ) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Artefact {
            artefact,
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}

//! Runtime artefact locations for the daemon supervisor.
//!
//! The lock, pid and health files live next to the Unix socket when one is
//! configured, and in a per-user runtime directory otherwise.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::{Config, SocketEndpoint};

#[cfg(unix)]
use dirs::runtime_dir;
#[cfg(unix)]
use libc::geteuid;

const ARTEFACT_STEM: &str = "rided";

/// Canonical paths for runtime artefacts written by the daemon.
#[derive(Debug, Clone)]
pub struct RuntimePaths {
    runtime_dir: PathBuf,
    lock_path: PathBuf,
    pid_path: PathBuf,
    health_path: PathBuf,
}

impl RuntimePaths {
    /// Derives runtime paths from the configuration and creates the directory.
    ///
    /// # Errors
    ///
    /// Fails when a Unix socket path has no parent or when the directory
    /// cannot be created.
    pub fn from_config(config: &Config) -> Result<Self, RuntimePathsError> {
        let runtime_dir = runtime_directory(config.daemon_socket())?;
        fs::create_dir_all(&runtime_dir).map_err(|source| RuntimePathsError::RuntimeDirectory {
            path: runtime_dir.clone(),
            source,
        })?;
        let artefact = |extension: &str| runtime_dir.join(format!("{ARTEFACT_STEM}.{extension}"));
        Ok(Self {
            lock_path: artefact("lock"),
            pid_path: artefact("pid"),
            health_path: artefact("health"),
            runtime_dir,
        })
    }

    /// Directory holding runtime artefacts.
    #[must_use]
    pub fn runtime_dir(&self) -> &Path {
        self.runtime_dir.as_path()
    }

    /// Lock file guarding singleton startup.
    #[must_use]
    pub fn lock_path(&self) -> &Path {
        self.lock_path.as_path()
    }

    /// PID file.
    #[must_use]
    pub fn pid_path(&self) -> &Path {
        self.pid_path.as_path()
    }

    /// Health snapshot.
    #[must_use]
    pub fn health_path(&self) -> &Path {
        self.health_path.as_path()
    }
}

fn runtime_directory(endpoint: &SocketEndpoint) -> Result<PathBuf, RuntimePathsError> {
    let SocketEndpoint::Unix { path } = endpoint else {
        return Ok(default_runtime_directory());
    };
    path.parent()
        .filter(|parent| !parent.as_str().is_empty())
        .map(|parent| parent.as_std_path().to_path_buf())
        .ok_or_else(|| RuntimePathsError::MissingSocketParent {
            path: path.to_string(),
        })
}

fn default_runtime_directory() -> PathBuf {
    #[cfg(unix)]
    {
        if let Some(dir) = runtime_dir() {
            return dir.join(ARTEFACT_STEM);
        }
        env::temp_dir()
            .join(ARTEFACT_STEM)
            .join(format!("uid-{}", unsafe { geteuid() }))
    }

    #[cfg(not(unix))]
    {
        env::temp_dir().join(ARTEFACT_STEM)
    }
}

/// Errors raised while deriving daemon runtime paths.
#[derive(Debug, Error)]
pub enum RuntimePathsError {
    /// The socket path lacked a parent directory.
    #[error("socket path '{path}' has no parent directory")]
    MissingSocketParent {
        /// Configured socket path.
        path: String,
    },
    /// Creating the runtime directory failed.
    #[error("failed to prepare runtime directory '{path}': {source}")]
    RuntimeDirectory {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

//! Failures raised while opening or running the session listener.

use std::io;

use camino::Utf8PathBuf;
use thiserror::Error;

/// What the listener was doing to a leftover Unix socket when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleSocketStep {
    /// Reading the path's metadata.
    Inspect,
    /// Connecting to see whether a daemon still answers.
    Connect,
    /// Unlinking the dead socket.
    Remove,
}

impl StaleSocketStep {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Inspect => "inspect",
            Self::Connect => "connect to",
            Self::Remove => "remove",
        }
    }
}

/// Errors surfaced while binding or running the session listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The TCP host did not resolve to any usable address.
    #[error("session endpoint {endpoint} did not resolve: {reason}")]
    Unresolved {
        /// Endpoint as configured.
        endpoint: String,
        /// Resolver failure or an empty result.
        reason: String,
    },
    /// The OS refused the bind.
    #[error("cannot listen for sessions on {endpoint}: {source}")]
    Bind {
        /// Endpoint as configured.
        endpoint: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Another daemon answers on the socket.
    #[error("session socket {path} is served by another daemon")]
    SocketInUse {
        /// Socket path.
        path: Utf8PathBuf,
    },
    /// Something other than a socket sits at the path.
    #[error("refusing to replace {path}: it is not a socket")]
    NotASocket {
        /// Offending path.
        path: Utf8PathBuf,
    },
    /// A leftover socket could not be cleared.
    #[error("cannot {} stale session socket {path}: {source}", step.as_str())]
    StaleSocket {
        /// Socket path.
        path: Utf8PathBuf,
        /// Step that failed.
        step: StaleSocketStep,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Unix sockets are not available on this platform.
    #[cfg(not(unix))]
    #[error("unix session sockets are unsupported here ({endpoint})")]
    UnixUnsupported {
        /// Endpoint as configured.
        endpoint: String,
    },
    /// The accept loop could not be started.
    #[error("cannot start the session accept loop: {source}")]
    AcceptLoop {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The accept loop panicked.
    #[error("session accept loop panicked")]
    AcceptLoopPanicked,
}

//! Error types for session dispatch failures.
//!
//! Every variant maps onto a wire [`ErrorKind`] so that the failing session
//! receives a structured `error` event instead of a dropped connection.

use std::io;

use ride_protocol::{ErrorKind, Role, ServerEvent};
use thiserror::Error;

use crate::coordinator::{PresenceError, RideError};

/// Errors surfaced while reading, parsing, or routing a session's events.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Line could not be parsed as a client event.
    #[error("malformed JSONL: {message}")]
    MalformedJsonl {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Line exceeds the maximum allowed size.
    #[error("request too large: {size} bytes exceeds {max_size} byte limit")]
    RequestTooLarge { size: usize, max_size: usize },

    /// The session sent an event before declaring its role.
    #[error("'{event}' sent before hello")]
    HelloRequired { event: &'static str },

    /// The event is reserved for the other role.
    #[error("'{event}' is only available to {required} sessions, not {actual}")]
    WrongRole {
        event: &'static str,
        required: Role,
        actual: Role,
    },

    /// Ride lifecycle operation failed.
    #[error(transparent)]
    Ride(#[from] RideError),

    /// Driver presence operation failed.
    #[error(transparent)]
    Presence(#[from] PresenceError),

    /// IO error during read or write.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Event serialization failed.
    #[error("failed to serialize event: {0}")]
    SerializeResponse(#[from] serde_json::Error),
}

impl DispatchError {
    /// Wire category reported to the client.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedJsonl { .. } | Self::RequestTooLarge { .. } => ErrorKind::Protocol,
            Self::HelloRequired { .. } | Self::WrongRole { .. } => ErrorKind::Validation,
            Self::Ride(error) => error.kind(),
            Self::Presence(error) => error.kind(),
            Self::Io(_) | Self::SerializeResponse(_) => ErrorKind::Internal,
        }
    }

    /// Renders the failure as an `error` event for the originating session.
    pub fn to_event(&self) -> ServerEvent {
        ServerEvent::error(self.kind(), self.to_string())
    }

    /// Creates a malformed JSONL error from a serde error.
    pub fn from_json_error(source: serde_json::Error) -> Self {
        Self::MalformedJsonl {
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Creates a malformed JSONL error with a custom message.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedJsonl {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a request too large error.
    pub fn request_too_large(size: usize, max_size: usize) -> Self {
        Self::RequestTooLarge { size, max_size }
    }
}

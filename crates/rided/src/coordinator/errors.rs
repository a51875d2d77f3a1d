//! Failures reported by the coordinator to the originating session.

use ride_protocol::{CoordinateError, DriverId, ErrorKind, RideId, RideStatus};
use thiserror::Error;

/// Errors raised by presence operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PresenceError {
    /// The driver id was empty.
    #[error("driver id must not be empty")]
    BlankDriverId,
    /// The driver is not online.
    #[error("driver {driver_id} is not online")]
    UnknownDriver {
        /// Driver named by the request.
        driver_id: DriverId,
    },
    /// The driver is online through a different connection.
    #[error("driver {driver_id} is online on another connection")]
    NotOwner {
        /// Driver named by the request.
        driver_id: DriverId,
    },
    /// The reported position was not a valid coordinate.
    #[error("invalid location: {0}")]
    InvalidLocation(#[from] CoordinateError),
}

impl PresenceError {
    /// Wire category of the failure.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

/// Errors raised by ride lifecycle operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RideError {
    /// A required identifier was empty.
    #[error("{field} must not be empty")]
    BlankId {
        /// Name of the empty field.
        field: &'static str,
    },
    /// The ride id is live or was used recently.
    #[error("ride {ride_id} already exists")]
    DuplicateRide {
        /// Rejected ride id.
        ride_id: RideId,
    },
    /// No live or recently finished ride has this id.
    #[error("ride {ride_id} does not exist")]
    UnknownRide {
        /// Requested ride id.
        ride_id: RideId,
    },
    /// Another driver claimed the ride first, or it is past acceptance.
    #[error("ride {ride_id} is no longer available ({status})")]
    AlreadyTaken {
        /// Contested ride.
        ride_id: RideId,
        /// Status observed when the claim was made.
        status: RideStatus,
    },
    /// The ride is not in a state that allows the action.
    #[error("cannot {action} ride {ride_id} while it is {status}")]
    InvalidTransition {
        /// Ride concerned.
        ride_id: RideId,
        /// Status observed when the action was attempted.
        status: RideStatus,
        /// Attempted action.
        action: &'static str,
    },
    /// The calling session is not part of the ride.
    #[error("not a participant of ride {ride_id}")]
    NotParticipant {
        /// Ride concerned.
        ride_id: RideId,
    },
    /// The accepting driver is already assigned to another live ride.
    #[error("driver {driver_id} is already assigned to ride {ride_id}")]
    DriverBusy {
        /// Driver concerned.
        driver_id: DriverId,
        /// Ride the driver is assigned to.
        ride_id: RideId,
    },
    /// The accepting driver is not available.
    #[error(transparent)]
    Driver(#[from] PresenceError),
    /// A pickup or drop coordinate was invalid.
    #[error("invalid {field}: {source}")]
    InvalidPlace {
        /// Which place was invalid.
        field: &'static str,
        /// Underlying coordinate problem.
        #[source]
        source: CoordinateError,
    },
    /// The reported fare was negative or not finite.
    #[error("fare must be a non-negative amount, got {fare}")]
    InvalidFare {
        /// Rejected fare.
        fare: f64,
    },
}

impl RideError {
    /// Wire category of the failure.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyTaken { .. } | Self::InvalidTransition { .. } | Self::DriverBusy { .. } => {
                ErrorKind::Conflict
            }
            Self::UnknownRide { .. } => ErrorKind::NotFound,
            Self::BlankId { .. }
            | Self::DuplicateRide { .. }
            | Self::NotParticipant { .. }
            | Self::Driver(_)
            | Self::InvalidPlace { .. }
            | Self::InvalidFare { .. } => ErrorKind::Validation,
        }
    }

    pub(crate) fn blank(field: &'static str) -> Self {
        Self::BlankId { field }
    }
}

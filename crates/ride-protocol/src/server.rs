//! Events pushed by the daemon.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    DriverId, FlagReason, GeoPoint, Initiator, Place, RideId, Role, SessionId, VehicleType,
};

/// One line sent to a client, tagged by event name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Acknowledges `hello`.
    ConnectionEstablished(ConnectionEstablished),
    /// Acknowledges `go-online` to the driver.
    OnlineConfirmed(OnlineConfirmed),
    /// Announces a driver coming online.
    DriverOnline(DriverOnline),
    /// Announces a driver going offline, by request or by sweep.
    DriverOffline(DriverOffline),
    /// Offers a ride to a nearby driver.
    RideRequested(RideRequested),
    /// Tells the rider how many drivers were offered the ride.
    RideRequestSent(RideRequestSent),
    /// Tells the winning driver the ride is theirs.
    AcceptConfirmed(AcceptConfirmed),
    /// Tells a driver the ride could not be claimed.
    AcceptRejected(AcceptRejected),
    /// Announces the assignment to the ride room.
    RideAccepted(RideAccepted),
    /// The driver is at the pickup point.
    RideArrived(RideArrived),
    /// The trip is under way.
    RideStarted(RideStarted),
    /// The trip finished.
    RideCompleted(RideCompleted),
    /// The ride was called off by the counterparty.
    RideCancelled(RideCancelled),
    /// Acknowledges `cancel-ride` to its sender.
    CancelConfirmed(CancelConfirmed),
    /// A participant dropped off a live ride.
    RideFlagged(RideFlagged),
    /// The assigned driver moved.
    DriverLocationUpdate(DriverLocationUpdate),
    /// Answers `get-nearby-drivers`.
    NearbyDrivers(NearbyDrivers),
    /// A request from this session failed.
    Error(ErrorReport),
}

impl ServerEvent {
    /// Kebab-case event name, as it appears on the wire.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ConnectionEstablished(_) => "connection-established",
            Self::OnlineConfirmed(_) => "online-confirmed",
            Self::DriverOnline(_) => "driver-online",
            Self::DriverOffline(_) => "driver-offline",
            Self::RideRequested(_) => "ride-requested",
            Self::RideRequestSent(_) => "ride-request-sent",
            Self::AcceptConfirmed(_) => "accept-confirmed",
            Self::AcceptRejected(_) => "accept-rejected",
            Self::RideAccepted(_) => "ride-accepted",
            Self::RideArrived(_) => "ride-arrived",
            Self::RideStarted(_) => "ride-started",
            Self::RideCompleted(_) => "ride-completed",
            Self::RideCancelled(_) => "ride-cancelled",
            Self::CancelConfirmed(_) => "cancel-confirmed",
            Self::RideFlagged(_) => "ride-flagged",
            Self::DriverLocationUpdate(_) => "driver-location-update",
            Self::NearbyDrivers(_) => "nearby-drivers",
            Self::Error(_) => "error",
        }
    }

    /// Builds an `error` event.
    #[must_use]
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error(ErrorReport {
            kind,
            message: message.into(),
        })
    }
}

/// Payload of `connection-established`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionEstablished {
    /// Identifier the daemon assigned to the connection.
    pub session_id: SessionId,
    /// Role accepted for the session.
    pub role: Role,
}

/// Payload of `online-confirmed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineConfirmed {
    /// Driver now online.
    pub driver_id: DriverId,
}

/// Payload of `driver-online`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverOnline {
    /// Driver now online.
    pub driver_id: DriverId,
    /// Position reported at go-online, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
}

/// Payload of `driver-offline`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverOffline {
    /// Driver no longer online.
    pub driver_id: DriverId,
}

/// Payload of `ride-requested`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideRequested {
    /// Ride on offer.
    pub ride_id: RideId,
    /// Pickup point.
    pub pickup: Place,
    /// Drop-off point.
    pub drop: Place,
    /// Requested vehicle class.
    pub vehicle_type: VehicleType,
    /// Fare quoted to the rider.
    pub estimated_fare: f64,
    /// Distance from the receiving driver to the pickup point.
    pub distance_km: f64,
}

/// Payload of `ride-request-sent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideRequestSent {
    /// Ride that was fanned out.
    pub ride_id: RideId,
    /// Number of drivers that were offered the ride.
    pub nearby_drivers_count: usize,
}

/// Payload of `accept-confirmed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptConfirmed {
    /// Ride now assigned to the receiving driver.
    pub ride_id: RideId,
}

/// Payload of `accept-rejected`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptRejected {
    /// Ride that could not be claimed.
    pub ride_id: RideId,
    /// Human-readable explanation.
    pub reason: String,
}

/// Payload of `ride-accepted`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideAccepted {
    /// Ride now assigned.
    pub ride_id: RideId,
    /// Assigned driver.
    pub driver_id: DriverId,
    /// Last known driver position.
    pub driver_location: Option<GeoPoint>,
    /// Minutes until the driver reaches the pickup point, when the driver
    /// position is known.
    pub estimated_arrival: Option<u32>,
}

/// Payload of `ride-arrived`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideArrived {
    /// Ride concerned.
    pub ride_id: RideId,
    /// Moment the driver reported arrival.
    #[serde(with = "time::serde::rfc3339")]
    pub arrived_at: OffsetDateTime,
}

/// Payload of `ride-started`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideStarted {
    /// Ride concerned.
    pub ride_id: RideId,
    /// Moment the trip began.
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
}

/// Payload of `ride-completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideCompleted {
    /// Ride concerned.
    pub ride_id: RideId,
    /// Fare charged.
    pub actual_fare: f64,
    /// Moment the trip ended.
    #[serde(with = "time::serde::rfc3339")]
    pub completed_at: OffsetDateTime,
}

/// Payload of `ride-cancelled`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideCancelled {
    /// Ride concerned.
    pub ride_id: RideId,
    /// Reason given by the initiator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Who cancelled.
    pub cancelled_by: Initiator,
    /// Moment of cancellation.
    #[serde(with = "time::serde::rfc3339")]
    pub cancelled_at: OffsetDateTime,
}

/// Payload of `cancel-confirmed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelConfirmed {
    /// Ride cancelled by the receiving session.
    pub ride_id: RideId,
}

/// Payload of `ride-flagged`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideFlagged {
    /// Ride needing attention.
    pub ride_id: RideId,
    /// What happened.
    pub reason: FlagReason,
}

/// Payload of `driver-location-update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverLocationUpdate {
    /// Driver that moved.
    pub driver_id: DriverId,
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lng: f64,
}

/// One entry of `nearby-drivers`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyDriver {
    /// Driver found.
    pub driver_id: DriverId,
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lng: f64,
    /// Great-circle distance from the search centre.
    pub distance_km: f64,
}

/// Payload of `nearby-drivers`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyDrivers {
    /// Drivers within the radius, nearest first.
    pub drivers: Vec<NearbyDriver>,
}

/// Category of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The line was not a well-formed event.
    Protocol,
    /// The event was well formed but its content was not acceptable.
    Validation,
    /// The target was in the wrong state.
    Conflict,
    /// The target does not exist.
    NotFound,
    /// The daemon failed while handling the event.
    Internal,
}

impl ErrorKind {
    /// Wire name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Protocol => "protocol",
            Self::Validation => "validation",
            Self::Conflict => "conflict",
            Self::NotFound => "not_found",
            Self::Internal => "internal",
        }
    }
}

/// Payload of `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Failure category.
    pub kind: ErrorKind,
    /// Human-readable detail.
    pub message: String,
}

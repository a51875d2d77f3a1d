//! Events sent by rider and driver clients.

use serde::{Deserialize, Serialize};

use crate::{DriverId, GeoPoint, Place, RideId, RiderId, Role, VehicleType};

/// One line from a client, tagged by event name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Declares the session role. Must precede every other event.
    Hello(Hello),
    /// A driver becomes available.
    GoOnline(GoOnline),
    /// A driver stops taking rides.
    GoOffline(DriverRef),
    /// A driver reports its position.
    UpdateLocation(LocationUpdate),
    /// A driver claims a requested ride.
    AcceptRide(AcceptRide),
    /// The assigned driver reached the pickup point.
    DriverArrived(RideRef),
    /// The assigned driver picked the rider up.
    StartRide(RideRef),
    /// The assigned driver dropped the rider off.
    CompleteRide(CompleteRide),
    /// A rider asks for a ride.
    RequestRide(RideRequest),
    /// Either participant calls a ride off.
    CancelRide(CancelRide),
    /// Lists online drivers around a point.
    GetNearbyDrivers(NearbyQuery),
}

impl ClientEvent {
    /// Kebab-case event name, as it appears on the wire.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Hello(_) => "hello",
            Self::GoOnline(_) => "go-online",
            Self::GoOffline(_) => "go-offline",
            Self::UpdateLocation(_) => "update-location",
            Self::AcceptRide(_) => "accept-ride",
            Self::DriverArrived(_) => "driver-arrived",
            Self::StartRide(_) => "start-ride",
            Self::CompleteRide(_) => "complete-ride",
            Self::RequestRide(_) => "request-ride",
            Self::CancelRide(_) => "cancel-ride",
            Self::GetNearbyDrivers(_) => "get-nearby-drivers",
        }
    }
}

/// Payload of `hello`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// Role the session speaks for.
    pub role: Role,
}

/// Payload of `go-online`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoOnline {
    /// Driver going online.
    pub driver_id: DriverId,
    /// Starting position, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_location: Option<GeoPoint>,
}

/// Payload naming a single driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverRef {
    /// Driver concerned.
    pub driver_id: DriverId,
}

/// Payload of `update-location`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdate {
    /// Reporting driver.
    pub driver_id: DriverId,
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lng: f64,
}

impl LocationUpdate {
    /// Reported position.
    #[must_use]
    pub const fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

/// Payload of `accept-ride`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptRide {
    /// Ride being claimed.
    pub ride_id: RideId,
    /// Driver claiming it.
    pub driver_id: DriverId,
}

/// Payload naming a single ride.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideRef {
    /// Ride concerned.
    pub ride_id: RideId,
}

/// Payload of `complete-ride`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRide {
    /// Ride being completed.
    pub ride_id: RideId,
    /// Fare charged to the rider.
    pub actual_fare: f64,
}

/// Payload of `request-ride`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideRequest {
    /// Client-chosen ride identifier.
    pub ride_id: RideId,
    /// Requesting rider.
    pub rider_id: RiderId,
    /// Pickup point.
    pub pickup: Place,
    /// Drop-off point.
    pub drop: Place,
    /// Requested vehicle class.
    pub vehicle_type: VehicleType,
}

/// Payload of `cancel-ride`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRide {
    /// Ride being cancelled.
    pub ride_id: RideId,
    /// Free-form reason shown to the counterparty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Payload of `get-nearby-drivers`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyQuery {
    /// Latitude of the search centre.
    pub lat: f64,
    /// Longitude of the search centre.
    pub lng: f64,
    /// Search radius; the configured fan-out radius when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius_km: Option<f64>,
}

impl NearbyQuery {
    /// Search centre.
    #[must_use]
    pub const fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

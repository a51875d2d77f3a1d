//! Wire types shared by the ride dispatch daemon and its clients.
//!
//! Every message on a session connection is one JSON object per line,
//! adjacently tagged with the event name:
//!
//! ```json
//! {"event":"go-online","data":{"driverId":"d-17","initialLocation":{"lat":23.34,"lng":85.3}}}
//! ```
//!
//! [`ClientEvent`] lists what riders and drivers may send; [`ServerEvent`]
//! lists what the daemon pushes back, either as a direct reply or as a room
//! broadcast. Payload field names are camelCase.

mod client;
mod geo;
mod ids;
mod server;
mod status;

pub use client::{
    AcceptRide, CancelRide, ClientEvent, CompleteRide, DriverRef, GoOnline, Hello, LocationUpdate,
    NearbyQuery, RideRef, RideRequest,
};
pub use geo::{CoordinateError, GeoPoint, Place};
pub use ids::{DriverId, RideId, RiderId, SessionId};
pub use server::{
    AcceptConfirmed, AcceptRejected, CancelConfirmed, ConnectionEstablished, DriverLocationUpdate,
    DriverOffline, DriverOnline, ErrorKind, ErrorReport, NearbyDriver, NearbyDrivers,
    OnlineConfirmed, RideAccepted, RideArrived, RideCancelled, RideCompleted, RideFlagged,
    RideRequestSent, RideRequested, RideStarted, ServerEvent,
};
pub use status::{FlagReason, Initiator, RideStatus, Role, VehicleType, VehicleTypeParseError};

//! Ride lifecycle tracking.
//!
//! Live rides sit in a [`DashMap`] keyed by ride id. Every transition runs
//! under that ride's entry guard, so two drivers racing to accept the same
//! ride are serialized and only the first one sees `REQUESTED`. Finished rides
//! leave a tombstone behind for a retention window so late or repeated
//! operations get a conflict rather than "unknown ride", and so the id cannot
//! be reused straight away.
//!
//! ```text
//! REQUESTED --accept--> ACCEPTED --arrive--> ARRIVED
//!     |                   |   \                 |
//!     |                   |    \--start--> IN_PROGRESS <--start--/
//!     |                   |                     |
//!     +------cancel-------+------cancel---------+ (from ARRIVED)
//!                                               |
//!                              IN_PROGRESS --complete--> COMPLETED
//! ```

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use ride_protocol::{
    AcceptConfirmed, CancelConfirmed, DriverId, DriverLocationUpdate, FlagReason, GeoPoint,
    Initiator, Place, RideAccepted, RideArrived, RideCancelled, RideCompleted, RideFlagged,
    RideId, RideRequest, RideRequestSent, RideRequested, RideStarted, RideStatus, RiderId, Role,
    ServerEvent, SessionId, VehicleType,
};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info};

use super::archive::RideArchive;
use super::clock::Clock;
use super::errors::{PresenceError, RideError};
use super::fare::FareEstimator;
use super::geo::{arrival_minutes, haversine_km};
use super::presence::PresenceTable;
use super::registry::{ConnectionRegistry, Room};
use super::{Collaborators, RIDES_TARGET};

/// Step that moves a ride through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RideAction {
    /// A driver claims the ride.
    Accept,
    /// The driver reached the pickup point.
    Arrive,
    /// The rider is on board.
    Start,
    /// The rider was dropped off.
    Complete,
    /// A participant called the ride off.
    Cancel,
}

impl RideAction {
    /// Verb used in error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Arrive => "mark arrival for",
            Self::Start => "start",
            Self::Complete => "complete",
            Self::Cancel => "cancel",
        }
    }

    /// Status reached by applying the action in `from`, or `None` when the
    /// transition is not allowed.
    #[must_use]
    pub const fn apply(self, from: RideStatus) -> Option<RideStatus> {
        match (self, from) {
            (Self::Accept, RideStatus::Requested) => Some(RideStatus::Accepted),
            (Self::Arrive, RideStatus::Accepted) => Some(RideStatus::Arrived),
            (Self::Start, RideStatus::Accepted | RideStatus::Arrived) => {
                Some(RideStatus::InProgress)
            }
            (Self::Complete, RideStatus::InProgress) => Some(RideStatus::Completed),
            (
                Self::Cancel,
                RideStatus::Requested | RideStatus::Accepted | RideStatus::Arrived,
            ) => Some(RideStatus::Cancelled),
            _ => None,
        }
    }
}

/// Everything known about one ride.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RideRecord {
    /// Client-chosen identifier.
    pub ride_id: RideId,
    /// Requesting rider.
    pub rider_id: RiderId,
    /// Assigned driver, once accepted.
    pub driver_id: Option<DriverId>,
    /// Pickup point.
    pub pickup: Place,
    /// Drop-off point.
    pub drop: Place,
    /// Requested vehicle class.
    pub vehicle_type: VehicleType,
    /// Fare quoted at request time.
    pub estimated_fare: f64,
    /// Fare charged at completion.
    pub actual_fare: Option<f64>,
    /// Current lifecycle status.
    pub status: RideStatus,
    /// Drivers the request was fanned out to.
    pub offered_to: Vec<DriverId>,
    /// When the ride was requested.
    #[serde(with = "time::serde::rfc3339")]
    pub requested_at: OffsetDateTime,
    /// When a driver accepted.
    #[serde(with = "time::serde::rfc3339::option")]
    pub accepted_at: Option<OffsetDateTime>,
    /// When the driver reached the pickup.
    #[serde(with = "time::serde::rfc3339::option")]
    pub arrived_at: Option<OffsetDateTime>,
    /// When the trip began.
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    /// When the trip ended.
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    /// When the ride was cancelled.
    #[serde(with = "time::serde::rfc3339::option")]
    pub cancelled_at: Option<OffsetDateTime>,
    /// Reason given when cancelled.
    pub cancellation_reason: Option<String>,
    /// Who cancelled.
    pub cancelled_by: Option<Initiator>,
    /// Set when a participant's connection dropped mid-ride.
    #[serde(with = "time::serde::rfc3339::option")]
    pub flagged_at: Option<OffsetDateTime>,
    /// Why the ride was flagged.
    pub flag_reason: Option<FlagReason>,
}

impl RideRecord {
    fn requested(
        request: RideRequest,
        estimated_fare: f64,
        requested_at: OffsetDateTime,
    ) -> Self {
        let RideRequest {
            ride_id,
            rider_id,
            pickup,
            drop,
            vehicle_type,
        } = request;
        Self {
            ride_id,
            rider_id,
            driver_id: None,
            pickup,
            drop,
            vehicle_type,
            estimated_fare,
            actual_fare: None,
            status: RideStatus::Requested,
            offered_to: Vec::new(),
            requested_at,
            accepted_at: None,
            arrived_at: None,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
            cancellation_reason: None,
            cancelled_by: None,
            flagged_at: None,
            flag_reason: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Tombstone {
    status: RideStatus,
    recorded_at: OffsetDateTime,
}

/// Live rides, recent tombstones, and driver assignments.
pub struct RideTracker {
    rides: DashMap<RideId, RideRecord>,
    tombstones: DashMap<RideId, Tombstone>,
    assignments: DashMap<DriverId, RideId>,
    registry: Arc<ConnectionRegistry>,
    presence: Arc<PresenceTable>,
    clock: Arc<dyn Clock>,
    fares: Arc<dyn FareEstimator>,
    archive: Arc<dyn RideArchive>,
    fan_out_radius_km: f64,
}

impl RideTracker {
    pub(crate) fn new(
        registry: Arc<ConnectionRegistry>,
        presence: Arc<PresenceTable>,
        collaborators: &Collaborators,
        fan_out_radius_km: f64,
    ) -> Self {
        Self {
            rides: DashMap::new(),
            tombstones: DashMap::new(),
            assignments: DashMap::new(),
            registry,
            presence,
            clock: Arc::clone(&collaborators.clock),
            fares: Arc::clone(&collaborators.fares),
            archive: Arc::clone(&collaborators.archive),
            fan_out_radius_km,
        }
    }

    /// Creates a ride and offers it to every located driver in range.
    ///
    /// Returns how many drivers were offered the ride; zero is not an error.
    ///
    /// # Errors
    ///
    /// Rejects blank ids, invalid coordinates, and ride ids that are live or
    /// tombstoned.
    pub fn request_ride(&self, session: SessionId, request: RideRequest) -> Result<usize, RideError> {
        validate_request(&request)?;
        let ride_id = request.ride_id.clone();
        if self.tombstones.contains_key(&ride_id) {
            return Err(RideError::DuplicateRide { ride_id });
        }

        let estimated_fare = self
            .fares
            .estimate(&request.pickup, &request.drop, request.vehicle_type);
        let record = RideRecord::requested(request, estimated_fare, self.clock.now());
        let offer = RideRequested {
            ride_id: ride_id.clone(),
            pickup: record.pickup.clone(),
            drop: record.drop.clone(),
            vehicle_type: record.vehicle_type,
            estimated_fare,
            distance_km: 0.0,
        };
        let pickup = record.pickup.point();
        match self.rides.entry(ride_id.clone()) {
            Entry::Occupied(_) => return Err(RideError::DuplicateRide { ride_id }),
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
        }

        self.registry.join(session, Room::Ride(ride_id.clone()));
        self.registry.join(session, Room::ActiveRiders);

        let candidates = self.presence.find_nearby(pickup, self.fan_out_radius_km);
        for candidate in &candidates {
            let event = ServerEvent::RideRequested(RideRequested {
                distance_km: candidate.distance_km,
                ..offer.clone()
            });
            self.registry
                .broadcast(&Room::Driver(candidate.driver_id.clone()), &event);
        }
        if let Some(mut ride) = self.rides.get_mut(&ride_id) {
            ride.offered_to = candidates
                .iter()
                .map(|candidate| candidate.driver_id.clone())
                .collect();
        }

        let count = candidates.len();
        info!(
            target: RIDES_TARGET,
            %ride_id,
            %session,
            nearby_drivers = count,
            estimated_fare,
            "ride requested"
        );
        self.registry.send_to(
            session,
            &ServerEvent::RideRequestSent(RideRequestSent {
                ride_id,
                nearby_drivers_count: count,
            }),
        );
        Ok(count)
    }

    /// Assigns the ride to the driver if nobody claimed it first.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::AlreadyTaken`] when the ride is past `REQUESTED`,
    /// and validation errors when the driver is offline, owned by another
    /// session, or already on a ride.
    pub fn accept_ride(
        &self,
        session: SessionId,
        ride_id: &RideId,
        driver_id: &DriverId,
    ) -> Result<(), RideError> {
        let presence = self
            .presence
            .get(driver_id)
            .ok_or_else(|| PresenceError::UnknownDriver {
                driver_id: driver_id.clone(),
            })?;
        if presence.session != session {
            return Err(PresenceError::NotOwner {
                driver_id: driver_id.clone(),
            }
            .into());
        }
        let reserved = self.reserve_driver(driver_id, ride_id)?;

        let Some(mut ride) = self.rides.get_mut(ride_id) else {
            if reserved {
                self.unreserve_driver(driver_id, ride_id);
            }
            return Err(self.absent(ride_id, RideAction::Accept));
        };
        let Some(next) = RideAction::Accept.apply(ride.status) else {
            debug!(
                target: RIDES_TARGET,
                %ride_id,
                %driver_id,
                status = %ride.status,
                "accept lost"
            );
            let status = ride.status;
            drop(ride);
            if reserved {
                self.unreserve_driver(driver_id, ride_id);
            }
            return Err(RideError::AlreadyTaken {
                ride_id: ride_id.clone(),
                status,
            });
        };
        ride.status = next;
        ride.driver_id = Some(driver_id.clone());
        ride.accepted_at = Some(self.clock.now());

        // Room membership and notifications happen under the ride guard so a
        // concurrent cancel sees either none or all of them.
        let room = Room::Ride(ride_id.clone());
        self.registry.join(session, room.clone());
        let driver_location = presence.location;
        let estimated_arrival = driver_location
            .map(|location| arrival_minutes(haversine_km(location, ride.pickup.point())));
        info!(target: RIDES_TARGET, %ride_id, %driver_id, status = %next, "ride accepted");
        self.registry.broadcast(
            &room,
            &ServerEvent::RideAccepted(RideAccepted {
                ride_id: ride_id.clone(),
                driver_id: driver_id.clone(),
                driver_location,
                estimated_arrival,
            }),
        );
        self.registry.send_to(
            session,
            &ServerEvent::AcceptConfirmed(AcceptConfirmed {
                ride_id: ride_id.clone(),
            }),
        );
        Ok(())
    }

    /// Claims `driver_id` for `ride_id` in the assignment index.
    ///
    /// Returns whether this call made the reservation; `false` means the
    /// driver already pointed at this ride.
    fn reserve_driver(&self, driver_id: &DriverId, ride_id: &RideId) -> Result<bool, RideError> {
        match self.assignments.entry(driver_id.clone()) {
            Entry::Occupied(current) if current.get() == ride_id => Ok(false),
            Entry::Occupied(current) => Err(RideError::DriverBusy {
                driver_id: driver_id.clone(),
                ride_id: current.get().clone(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(ride_id.clone());
                Ok(true)
            }
        }
    }

    fn unreserve_driver(&self, driver_id: &DriverId, ride_id: &RideId) {
        self.assignments
            .remove_if(driver_id, |_, assigned| assigned == ride_id);
    }

    /// Drops the driver's assignment once the driver has left.
    ///
    /// The ride itself stays live; only location relaying and the busy check
    /// stop referring to it. Returns the ride the driver was assigned to.
    pub fn release_driver(&self, driver_id: &DriverId) -> Option<RideId> {
        let (_, ride_id) = self.assignments.remove(driver_id)?;
        debug!(target: RIDES_TARGET, %ride_id, %driver_id, "driver assignment released");
        Some(ride_id)
    }

    /// Records that the driver reached the pickup point.
    ///
    /// # Errors
    ///
    /// Fails for unknown rides, non-participants, and rides not `ACCEPTED`.
    pub fn mark_arrived(&self, session: SessionId, ride_id: &RideId) -> Result<(), RideError> {
        let record = self.advance(session, ride_id, RideAction::Arrive, |ride, now| {
            ride.arrived_at = Some(now);
        })?;
        let arrived_at = record.arrived_at.unwrap_or(record.requested_at);
        self.registry.broadcast(
            &Room::Ride(ride_id.clone()),
            &ServerEvent::RideArrived(RideArrived {
                ride_id: ride_id.clone(),
                arrived_at,
            }),
        );
        Ok(())
    }

    /// Starts the trip.
    ///
    /// # Errors
    ///
    /// Fails for unknown rides, non-participants, and rides not `ACCEPTED` or
    /// `ARRIVED`.
    pub fn start_ride(&self, session: SessionId, ride_id: &RideId) -> Result<(), RideError> {
        let record = self.advance(session, ride_id, RideAction::Start, |ride, now| {
            ride.started_at = Some(now);
        })?;
        let started_at = record.started_at.unwrap_or(record.requested_at);
        self.registry.broadcast(
            &Room::Ride(ride_id.clone()),
            &ServerEvent::RideStarted(RideStarted {
                ride_id: ride_id.clone(),
                started_at,
            }),
        );
        Ok(())
    }

    /// Finishes the trip, archives it, and tears down its room.
    ///
    /// # Errors
    ///
    /// Fails for invalid fares, unknown rides, non-participants, and rides not
    /// `IN_PROGRESS`.
    pub fn complete_ride(
        &self,
        session: SessionId,
        ride_id: &RideId,
        actual_fare: f64,
    ) -> Result<(), RideError> {
        if !actual_fare.is_finite() || actual_fare < 0.0 {
            return Err(RideError::InvalidFare { fare: actual_fare });
        }
        let record = self.advance(session, ride_id, RideAction::Complete, |ride, now| {
            ride.completed_at = Some(now);
            ride.actual_fare = Some(actual_fare);
        })?;
        let completed_at = record.completed_at.unwrap_or(record.requested_at);
        self.registry.broadcast(
            &Room::Ride(ride_id.clone()),
            &ServerEvent::RideCompleted(RideCompleted {
                ride_id: ride_id.clone(),
                actual_fare,
                completed_at,
            }),
        );
        self.finish(record);
        Ok(())
    }

    /// Calls the ride off on behalf of `initiator`.
    ///
    /// The other participants receive `ride-cancelled`; drivers that were
    /// offered an unaccepted ride receive it too. The caller gets
    /// `cancel-confirmed`.
    ///
    /// # Errors
    ///
    /// Fails for unknown rides, non-participants, and rides already in
    /// progress or finished.
    pub fn cancel_ride(
        &self,
        session: SessionId,
        ride_id: &RideId,
        reason: Option<String>,
        initiator: Initiator,
    ) -> Result<(), RideError> {
        let record = self.advance(session, ride_id, RideAction::Cancel, |ride, now| {
            ride.cancelled_at = Some(now);
            ride.cancellation_reason = reason;
            ride.cancelled_by = Some(initiator);
        })?;

        let event = ServerEvent::RideCancelled(RideCancelled {
            ride_id: ride_id.clone(),
            reason: record.cancellation_reason.clone(),
            cancelled_by: initiator,
            cancelled_at: record.cancelled_at.unwrap_or(record.requested_at),
        });
        self.registry
            .broadcast_except(&Room::Ride(ride_id.clone()), session, &event);
        if record.driver_id.is_none() {
            for driver_id in &record.offered_to {
                self.registry
                    .broadcast(&Room::Driver(driver_id.clone()), &event);
            }
        }
        self.registry.send_to(
            session,
            &ServerEvent::CancelConfirmed(CancelConfirmed {
                ride_id: ride_id.clone(),
            }),
        );
        self.finish(record);
        Ok(())
    }

    /// Forwards a driver's new position to the ride it is assigned to.
    ///
    /// Returns whether the driver had a live ride.
    pub fn relay_driver_location(&self, driver_id: &DriverId, point: GeoPoint) -> bool {
        let Some(ride_id) = self.assignment(driver_id) else {
            return false;
        };
        self.registry.broadcast(
            &Room::Ride(ride_id),
            &ServerEvent::DriverLocationUpdate(DriverLocationUpdate {
                driver_id: driver_id.clone(),
                lat: point.lat,
                lng: point.lng,
            }),
        );
        true
    }

    /// Flags every live ride among `rooms` after a `role` session dropped.
    ///
    /// Remaining room members receive `ride-flagged`. Returns the flagged
    /// rides.
    pub(crate) fn flag_abandoned(&self, role: Role, rooms: &[Room]) -> Vec<RideId> {
        let reason = FlagReason::from(role);
        let now = self.clock.now();
        let flagged: Vec<RideId> = rooms
            .iter()
            .filter_map(|room| match room {
                Room::Ride(ride_id) => Some(ride_id),
                _ => None,
            })
            .filter(|ride_id| {
                let Some(mut ride) = self.rides.get_mut(*ride_id) else {
                    return false;
                };
                if ride.status.is_terminal() {
                    return false;
                }
                ride.flagged_at = Some(now);
                ride.flag_reason = Some(reason);
                true
            })
            .cloned()
            .collect();

        for ride_id in &flagged {
            info!(target: RIDES_TARGET, %ride_id, ?reason, "ride flagged");
            self.registry.broadcast(
                &Room::Ride(ride_id.clone()),
                &ServerEvent::RideFlagged(RideFlagged {
                    ride_id: ride_id.clone(),
                    reason,
                }),
            );
        }
        flagged
    }

    /// Forgets tombstones older than `retention`. Returns how many went.
    pub fn purge_tombstones(&self, retention: Duration) -> usize {
        let now = self.clock.now();
        let expired: Vec<RideId> = self
            .tombstones
            .iter()
            .filter(|entry| now - entry.recorded_at > retention)
            .map(|entry| entry.key().clone())
            .collect();
        expired
            .iter()
            .filter(|ride_id| {
                self.tombstones
                    .remove_if(*ride_id, |_, tombstone| now - tombstone.recorded_at > retention)
                    .is_some()
            })
            .count()
    }

    /// Snapshot of a live ride.
    pub fn get(&self, ride_id: &RideId) -> Option<RideRecord> {
        self.rides.get(ride_id).map(|ride| ride.value().clone())
    }

    /// Final status of a recently finished ride.
    pub fn tombstone(&self, ride_id: &RideId) -> Option<RideStatus> {
        self.tombstones.get(ride_id).map(|tombstone| tombstone.status)
    }

    /// Live ride the driver is assigned to.
    pub fn assignment(&self, driver_id: &DriverId) -> Option<RideId> {
        self.assignments
            .get(driver_id)
            .map(|ride_id| ride_id.value().clone())
    }

    /// Number of live rides.
    pub fn len(&self) -> usize {
        self.rides.len()
    }

    /// Reports whether no ride is live.
    pub fn is_empty(&self) -> bool {
        self.rides.is_empty()
    }

    fn advance(
        &self,
        session: SessionId,
        ride_id: &RideId,
        action: RideAction,
        stamp: impl FnOnce(&mut RideRecord, OffsetDateTime),
    ) -> Result<RideRecord, RideError> {
        let Some(mut ride) = self.rides.get_mut(ride_id) else {
            return Err(self.absent(ride_id, action));
        };
        if !self.registry.is_member(session, &Room::Ride(ride_id.clone())) {
            return Err(RideError::NotParticipant {
                ride_id: ride_id.clone(),
            });
        }
        let Some(next) = action.apply(ride.status) else {
            return Err(RideError::InvalidTransition {
                ride_id: ride_id.clone(),
                status: ride.status,
                action: action.as_str(),
            });
        };
        ride.status = next;
        stamp(ride.value_mut(), self.clock.now());
        info!(target: RIDES_TARGET, %ride_id, %session, status = %next, "ride advanced");
        Ok(ride.value().clone())
    }

    fn absent(&self, ride_id: &RideId, action: RideAction) -> RideError {
        let ride_id = ride_id.clone();
        match self.tombstone(&ride_id) {
            Some(status) if action == RideAction::Accept => {
                RideError::AlreadyTaken { ride_id, status }
            }
            Some(status) => RideError::InvalidTransition {
                ride_id,
                status,
                action: action.as_str(),
            },
            None => RideError::UnknownRide { ride_id },
        }
    }

    fn finish(&self, record: RideRecord) {
        let ride_id = record.ride_id.clone();
        self.tombstones.insert(
            ride_id.clone(),
            Tombstone {
                status: record.status,
                recorded_at: self.clock.now(),
            },
        );
        self.rides.remove(&ride_id);
        self.assignments.retain(|_, assigned| *assigned != ride_id);
        self.registry.dissolve(&Room::Ride(ride_id.clone()));
        info!(target: RIDES_TARGET, %ride_id, status = %record.status, "ride closed");
        self.archive.persist_ride(&record);
    }
}

fn validate_request(request: &RideRequest) -> Result<(), RideError> {
    if request.ride_id.is_blank() {
        return Err(RideError::blank("rideId"));
    }
    if request.rider_id.is_blank() {
        return Err(RideError::blank("riderId"));
    }
    request
        .pickup
        .point()
        .validate()
        .map_err(|source| RideError::InvalidPlace {
            field: "pickup",
            source,
        })?;
    request
        .drop
        .point()
        .validate()
        .map_err(|source| RideError::InvalidPlace {
            field: "drop",
            source,
        })
}

//! In-memory dispatch core.
//!
//! The [`Coordinator`] owns the three collaborating tables: the
//! [`ConnectionRegistry`] of sessions and rooms, the [`PresenceTable`] of
//! online drivers, and the [`RideTracker`] of live rides. It is constructed
//! once at bootstrap and shared with the transport behind an `Arc`; there is
//! no global state.

mod archive;
mod clock;
mod errors;
mod fare;
mod geo;
mod presence;
mod registry;
mod rides;
mod sweep;

#[cfg(test)]
mod rides_tests;

use std::sync::Arc;

use ride_config::DispatchSettings;
use ride_protocol::{
    ConnectionEstablished, DriverId, GeoPoint, Initiator, NearbyDriver, RideId, RideRequest, Role,
    ServerEvent, SessionId,
};
use tracing::{debug, info};

pub use archive::{RideArchive, TracingRideArchive};
#[cfg(any(test, feature = "test-support"))]
pub use clock::ManualClock;
pub use clock::{Clock, SystemClock};
pub use errors::{PresenceError, RideError};
pub use fare::{FareEstimator, RateCard, RateCardFareEstimator};
pub use geo::haversine_km;
pub use presence::{DriverPresence, PresenceTable};
pub use registry::{ConnectionRegistry, Outbox, Room};
pub use rides::{RideAction, RideRecord, RideTracker};
pub use sweep::{SweepError, SweepHandle, spawn_sweep};

pub(crate) const REGISTRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registry");
pub(crate) const PRESENCE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::presence");
pub(crate) const RIDES_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::rides");
pub(crate) const SWEEP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::sweep");

/// Pluggable collaborators of the dispatch core.
#[derive(Clone)]
pub struct Collaborators {
    /// Time source for every timestamp.
    pub clock: Arc<dyn Clock>,
    /// Quotes fares for new ride requests.
    pub fares: Arc<dyn FareEstimator>,
    /// Receives terminal rides.
    pub archive: Arc<dyn RideArchive>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            fares: Arc::new(RateCardFareEstimator),
            archive: Arc::new(TracingRideArchive),
        }
    }
}

/// Outcome of one staleness sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Drivers taken offline for missing location updates.
    pub stale_drivers: Vec<DriverId>,
    /// Ride tombstones that outlived their retention window.
    pub purged_tombstones: usize,
}

/// Result of tearing down a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Departure {
    /// Drivers the session owned, now offline.
    pub drivers: Vec<DriverId>,
    /// Live rides flagged because the session left.
    pub flagged_rides: Vec<RideId>,
}

/// Real-time dispatch coordinator.
pub struct Coordinator {
    registry: Arc<ConnectionRegistry>,
    presence: Arc<PresenceTable>,
    rides: RideTracker,
    settings: DispatchSettings,
}

impl Coordinator {
    /// Builds a coordinator with the system clock, the rate-card fare
    /// estimator, and the logging archive.
    #[must_use]
    pub fn new(settings: DispatchSettings) -> Self {
        Self::with_collaborators(settings, Collaborators::default())
    }

    /// Builds a coordinator around explicit collaborators.
    #[must_use]
    pub fn with_collaborators(settings: DispatchSettings, collaborators: Collaborators) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let presence = Arc::new(PresenceTable::new(
            Arc::clone(&registry),
            Arc::clone(&collaborators.clock),
        ));
        let rides = RideTracker::new(
            Arc::clone(&registry),
            Arc::clone(&presence),
            &collaborators,
            settings.fan_out_radius_km,
        );
        Self {
            registry,
            presence,
            rides,
            settings,
        }
    }

    /// Tuning in effect.
    #[must_use]
    pub const fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Reserves an identifier for a new connection.
    pub fn open_session(&self) -> SessionId {
        self.registry.allocate_session()
    }

    /// Registers the session under `role` and acknowledges the handshake.
    ///
    /// A repeated handshake swaps the role and outbox but keeps rooms.
    pub fn hello(&self, session: SessionId, role: Role, outbox: Outbox) {
        self.registry.register(session, role, outbox);
        self.registry.send_to(
            session,
            &ServerEvent::ConnectionEstablished(ConnectionEstablished {
                session_id: session,
                role,
            }),
        );
    }

    /// Brings a driver online for this session.
    ///
    /// # Errors
    ///
    /// See [`PresenceTable::go_online`].
    pub fn go_online(
        &self,
        session: SessionId,
        driver_id: DriverId,
        location: Option<GeoPoint>,
    ) -> Result<(), PresenceError> {
        self.presence.go_online(session, driver_id, location)
    }

    /// Takes a driver offline and releases its ride assignment.
    ///
    /// # Errors
    ///
    /// See [`PresenceTable::go_offline`].
    pub fn go_offline(&self, session: SessionId, driver_id: &DriverId) -> Result<(), PresenceError> {
        self.presence.go_offline(session, driver_id)?;
        self.rides.release_driver(driver_id);
        Ok(())
    }

    /// Records a driver position and relays it to the driver's live ride.
    ///
    /// # Errors
    ///
    /// See [`PresenceTable::update_location`]. Nothing is relayed on error.
    pub fn update_location(
        &self,
        session: SessionId,
        driver_id: &DriverId,
        point: GeoPoint,
    ) -> Result<(), PresenceError> {
        self.presence.update_location(session, driver_id, point)?;
        self.rides.relay_driver_location(driver_id, point);
        Ok(())
    }

    /// Opens a ride and fans it out to nearby drivers.
    ///
    /// # Errors
    ///
    /// See [`RideTracker::request_ride`].
    pub fn request_ride(&self, session: SessionId, request: RideRequest) -> Result<usize, RideError> {
        self.rides.request_ride(session, request)
    }

    /// Claims a ride for a driver.
    ///
    /// # Errors
    ///
    /// See [`RideTracker::accept_ride`].
    pub fn accept_ride(
        &self,
        session: SessionId,
        ride_id: &RideId,
        driver_id: &DriverId,
    ) -> Result<(), RideError> {
        self.rides.accept_ride(session, ride_id, driver_id)
    }

    /// # Errors
    ///
    /// See [`RideTracker::mark_arrived`].
    pub fn mark_arrived(&self, session: SessionId, ride_id: &RideId) -> Result<(), RideError> {
        self.rides.mark_arrived(session, ride_id)
    }

    /// # Errors
    ///
    /// See [`RideTracker::start_ride`].
    pub fn start_ride(&self, session: SessionId, ride_id: &RideId) -> Result<(), RideError> {
        self.rides.start_ride(session, ride_id)
    }

    /// # Errors
    ///
    /// See [`RideTracker::complete_ride`].
    pub fn complete_ride(
        &self,
        session: SessionId,
        ride_id: &RideId,
        actual_fare: f64,
    ) -> Result<(), RideError> {
        self.rides.complete_ride(session, ride_id, actual_fare)
    }

    /// Cancels a ride on behalf of the calling session.
    ///
    /// The initiator is derived from the session's registered role.
    ///
    /// # Errors
    ///
    /// See [`RideTracker::cancel_ride`].
    pub fn cancel_ride(
        &self,
        session: SessionId,
        ride_id: &RideId,
        reason: Option<String>,
    ) -> Result<(), RideError> {
        let initiator = self
            .registry
            .role(session)
            .map_or(Initiator::System, Initiator::from);
        self.rides.cancel_ride(session, ride_id, reason, initiator)
    }

    /// Located drivers around `point`, nearest first. Falls back to the
    /// configured fan-out radius.
    pub fn nearby_drivers(&self, point: GeoPoint, radius_km: Option<f64>) -> Vec<NearbyDriver> {
        let radius = radius_km
            .filter(|radius| radius.is_finite() && *radius > 0.0)
            .unwrap_or(self.settings.fan_out_radius_km);
        self.presence.find_nearby(point, radius)
    }

    /// Tears down a session after its connection closed.
    ///
    /// Drivers it owned go offline and every live ride it took part in is
    /// flagged for the remaining participants. Rides are not cancelled.
    pub fn disconnect(&self, session: SessionId) -> Departure {
        let Some((role, rooms)) = self.registry.unregister(session) else {
            debug!(target: REGISTRY_TARGET, %session, "session closed before hello");
            return Departure::default();
        };
        let drivers = self.presence.release_session(session);
        for driver_id in &drivers {
            self.rides.release_driver(driver_id);
        }
        let flagged_rides = self.rides.flag_abandoned(role, &rooms);
        info!(
            target: REGISTRY_TARGET,
            %session,
            %role,
            drivers = drivers.len(),
            flagged = flagged_rides.len(),
            "session disconnected"
        );
        Departure {
            drivers,
            flagged_rides,
        }
    }

    /// Runs one staleness pass over presence and ride tombstones.
    pub fn sweep(&self) -> SweepReport {
        let stale_drivers = self.presence.sweep(self.settings.presence_ttl);
        for driver_id in &stale_drivers {
            self.rides.release_driver(driver_id);
        }
        SweepReport {
            stale_drivers,
            purged_tombstones: self
                .rides
                .purge_tombstones(self.settings.tombstone_retention),
        }
    }

    /// Session and room bookkeeping.
    #[must_use]
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Online drivers.
    #[must_use]
    pub fn presence(&self) -> &PresenceTable {
        &self.presence
    }

    /// Live rides.
    #[must_use]
    pub const fn rides(&self) -> &RideTracker {
        &self.rides
    }
}

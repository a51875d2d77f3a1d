//! Driver presence: who is online, where, and since when.
//!
//! Each driver entry is locked independently, so location updates from
//! different drivers never contend. Entry guards are released before any
//! call into the [`ConnectionRegistry`]: the map is updated first, then room
//! membership and announcements follow. A concurrent reader may therefore see
//! an online driver whose rooms are not joined yet.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use ride_protocol::{
    DriverId, DriverOffline, DriverOnline, GeoPoint, NearbyDriver, OnlineConfirmed, ServerEvent,
    SessionId,
};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::errors::PresenceError;
use super::geo::haversine_km;
use super::registry::{ConnectionRegistry, Room};
use super::PRESENCE_TARGET;

/// One online driver.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverPresence {
    /// Last reported position, if any.
    pub location: Option<GeoPoint>,
    /// When the driver last went online or reported a position.
    pub last_updated: OffsetDateTime,
    /// Connection that owns the driver.
    pub session: SessionId,
}

/// Table of online drivers.
pub struct PresenceTable {
    drivers: DashMap<DriverId, DriverPresence>,
    registry: Arc<ConnectionRegistry>,
    clock: Arc<dyn Clock>,
}

impl PresenceTable {
    pub(crate) fn new(registry: Arc<ConnectionRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self {
            drivers: DashMap::new(),
            registry,
            clock,
        }
    }

    /// Marks the driver online for `session`, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Rejects blank driver ids and invalid initial locations.
    pub fn go_online(
        &self,
        session: SessionId,
        driver_id: DriverId,
        location: Option<GeoPoint>,
    ) -> Result<(), PresenceError> {
        if driver_id.is_blank() {
            return Err(PresenceError::BlankDriverId);
        }
        if let Some(point) = location {
            point.validate()?;
        }

        let presence = DriverPresence {
            location,
            last_updated: self.clock.now(),
            session,
        };
        let previous = self.drivers.insert(driver_id.clone(), presence);
        if let Some(previous) = previous.filter(|previous| previous.session != session) {
            self.detach(previous.session, &driver_id);
        }
        self.registry.join(session, Room::Driver(driver_id.clone()));
        self.registry.join(session, Room::ActiveDrivers);

        info!(target: PRESENCE_TARGET, %driver_id, %session, "driver online");
        self.registry
            .broadcast_all(&ServerEvent::DriverOnline(DriverOnline {
                driver_id: driver_id.clone(),
                location,
            }));
        self.registry.send_to(
            session,
            &ServerEvent::OnlineConfirmed(OnlineConfirmed { driver_id }),
        );
        Ok(())
    }

    /// Records a new position for an online driver.
    ///
    /// Unknown drivers are never re-admitted.
    ///
    /// # Errors
    ///
    /// Fails when the driver is offline, owned by another session, or the
    /// point is invalid.
    pub fn update_location(
        &self,
        session: SessionId,
        driver_id: &DriverId,
        point: GeoPoint,
    ) -> Result<(), PresenceError> {
        point.validate()?;
        let Some(mut entry) = self.drivers.get_mut(driver_id) else {
            warn!(
                target: PRESENCE_TARGET,
                %driver_id,
                %session,
                "location update for unknown driver dropped"
            );
            return Err(PresenceError::UnknownDriver {
                driver_id: driver_id.clone(),
            });
        };
        if entry.session != session {
            return Err(PresenceError::NotOwner {
                driver_id: driver_id.clone(),
            });
        }
        entry.location = Some(point);
        entry.last_updated = self.clock.now();
        debug!(
            target: PRESENCE_TARGET,
            %driver_id,
            lat = point.lat,
            lng = point.lng,
            "location updated"
        );
        Ok(())
    }

    /// Takes the driver offline. Offline drivers are a silent no-op.
    ///
    /// # Errors
    ///
    /// Fails when another session owns the driver.
    pub fn go_offline(&self, session: SessionId, driver_id: &DriverId) -> Result<(), PresenceError> {
        let removed = self
            .drivers
            .remove_if(driver_id, |_, presence| presence.session == session);
        match removed {
            Some(_) => {
                self.retire(session, driver_id, "driver offline");
                Ok(())
            }
            None if self.drivers.contains_key(driver_id) => Err(PresenceError::NotOwner {
                driver_id: driver_id.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Online drivers with a known position within `radius_km` of `point`,
    /// nearest first.
    pub fn find_nearby(&self, point: GeoPoint, radius_km: f64) -> Vec<NearbyDriver> {
        let mut nearby: Vec<NearbyDriver> = self
            .drivers
            .iter()
            .filter_map(|entry| {
                let location = entry.location?;
                let distance_km = haversine_km(point, location);
                (distance_km <= radius_km).then(|| NearbyDriver {
                    driver_id: entry.key().clone(),
                    lat: location.lat,
                    lng: location.lng,
                    distance_km,
                })
            })
            .collect();
        nearby.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        nearby
    }

    /// Snapshot of one driver's entry.
    pub fn get(&self, driver_id: &DriverId) -> Option<DriverPresence> {
        self.drivers.get(driver_id).map(|entry| entry.value().clone())
    }

    /// Number of online drivers.
    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    /// Reports whether no driver is online.
    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    /// Removes every driver whose last update is older than `ttl`.
    ///
    /// Each entry is re-checked under its own lock, so a driver that reports
    /// in while the sweep runs is kept. Returns the removed drivers.
    pub fn sweep(&self, ttl: Duration) -> Vec<DriverId> {
        let now = self.clock.now();
        let candidates: Vec<DriverId> = self
            .drivers
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = Vec::new();
        for driver_id in candidates {
            let stale = self
                .drivers
                .remove_if(&driver_id, |_, presence| now - presence.last_updated > ttl);
            if let Some((driver_id, presence)) = stale {
                self.retire(presence.session, &driver_id, "stale driver swept");
                removed.push(driver_id);
            }
        }
        removed
    }

    /// Takes every driver owned by `session` offline.
    pub(crate) fn release_session(&self, session: SessionId) -> Vec<DriverId> {
        let owned: Vec<DriverId> = self
            .drivers
            .iter()
            .filter(|entry| entry.session == session)
            .map(|entry| entry.key().clone())
            .collect();

        owned
            .into_iter()
            .filter(|driver_id| {
                self.drivers
                    .remove_if(driver_id, |_, presence| presence.session == session)
                    .is_some()
            })
            .inspect(|driver_id| self.retire(session, driver_id, "driver disconnected"))
            .collect()
    }

    fn retire(&self, session: SessionId, driver_id: &DriverId, reason: &'static str) {
        self.detach(session, driver_id);
        info!(target: PRESENCE_TARGET, %driver_id, %session, reason, "driver removed");
        self.registry
            .broadcast_all(&ServerEvent::DriverOffline(DriverOffline {
                driver_id: driver_id.clone(),
            }));
    }

    fn detach(&self, session: SessionId, driver_id: &DriverId) {
        self.registry.leave(session, &Room::Driver(driver_id.clone()));
        let still_driving = self.drivers.iter().any(|entry| entry.session == session);
        if !still_driving {
            self.registry.leave(session, &Room::ActiveDrivers);
        }
    }
}

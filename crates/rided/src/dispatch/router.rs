//! Event routing for dispatch sessions.
//!
//! The router enforces the session handshake and role checks, then hands
//! each event to the matching [`Coordinator`] operation. Direct replies and
//! room broadcasts are produced by the coordinator itself; the router only
//! turns a lost accept race into `accept-rejected` and leaves every other
//! failure to the caller.

use std::sync::Arc;

use crossbeam_channel::TrySendError;
use ride_protocol::{
    AcceptRejected, AcceptRide, CancelRide, ClientEvent, CompleteRide, DriverRef, ErrorKind,
    GoOnline, Hello, NearbyDrivers, NearbyQuery, RideRef, Role, ServerEvent,
    SessionId,
};
use tracing::{debug, warn};

use crate::coordinator::{Coordinator, Outbox, PresenceError};

use super::DISPATCH_TARGET;
use super::errors::DispatchError;

/// Per-connection state owned by the reading thread.
#[derive(Debug)]
pub struct SessionState {
    id: SessionId,
    role: Option<Role>,
    outbox: Outbox,
}

impl SessionState {
    /// State for a session that has not said hello yet.
    pub fn new(id: SessionId, outbox: Outbox) -> Self {
        Self {
            id,
            role: None,
            outbox,
        }
    }

    /// Session identifier.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Role declared by `hello`, if any.
    pub fn role(&self) -> Option<Role> {
        self.role
    }

    /// Queues an event for this session's connection.
    ///
    /// Returns `false` when the outbox is full or its writer has gone away.
    pub fn send(&self, event: ServerEvent) -> bool {
        match self.outbox.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!(
                    target: DISPATCH_TARGET,
                    session = %self.id,
                    event = event.name(),
                    "outbox full; dropping reply"
                );
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    fn registered(&self, event: &'static str) -> Result<SessionId, DispatchError> {
        match self.role {
            Some(_) => Ok(self.id),
            None => Err(DispatchError::HelloRequired { event }),
        }
    }

    fn acting_as(&self, event: &'static str, required: Role) -> Result<SessionId, DispatchError> {
        match self.role {
            Some(actual) if actual == required => Ok(self.id),
            Some(actual) => Err(DispatchError::WrongRole {
                event,
                required,
                actual,
            }),
            None => Err(DispatchError::HelloRequired { event }),
        }
    }
}

/// Routes client events to the coordinator.
#[derive(Clone)]
pub struct EventRouter {
    coordinator: Arc<Coordinator>,
}

impl EventRouter {
    /// Creates a router over the shared coordinator.
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self { coordinator }
    }

    /// Applies one event on behalf of `session`.
    ///
    /// # Errors
    ///
    /// Returns an error when the session has not said hello, holds the wrong
    /// role, or the coordinator rejects the operation. Lost accept races are
    /// answered with `accept-rejected` and are not errors.
    pub fn route(&self, session: &mut SessionState, event: ClientEvent) -> Result<(), DispatchError> {
        let name = event.name();
        debug!(
            target: DISPATCH_TARGET,
            session = %session.id,
            event = name,
            "routing event"
        );

        match event {
            ClientEvent::Hello(Hello { role }) => {
                self.coordinator
                    .hello(session.id, role, session.outbox.clone());
                session.role = Some(role);
                Ok(())
            }
            ClientEvent::GoOnline(GoOnline {
                driver_id,
                initial_location,
            }) => {
                let id = session.acting_as(name, Role::Driver)?;
                Ok(self.coordinator.go_online(id, driver_id, initial_location)?)
            }
            ClientEvent::GoOffline(DriverRef { driver_id }) => {
                let id = session.acting_as(name, Role::Driver)?;
                Ok(self.coordinator.go_offline(id, &driver_id)?)
            }
            ClientEvent::UpdateLocation(update) => {
                let id = session.acting_as(name, Role::Driver)?;
                Ok(self
                    .coordinator
                    .update_location(id, &update.driver_id, update.point())?)
            }
            ClientEvent::AcceptRide(AcceptRide { ride_id, driver_id }) => {
                let id = session.acting_as(name, Role::Driver)?;
                match self.coordinator.accept_ride(id, &ride_id, &driver_id) {
                    Err(error) if error.kind() == ErrorKind::Conflict => {
                        debug!(
                            target: DISPATCH_TARGET,
                            session = %id,
                            %ride_id,
                            %driver_id,
                            %error,
                            "accept rejected"
                        );
                        session.send(ServerEvent::AcceptRejected(AcceptRejected {
                            ride_id,
                            reason: error.to_string(),
                        }));
                        Ok(())
                    }
                    outcome => Ok(outcome?),
                }
            }
            ClientEvent::DriverArrived(RideRef { ride_id }) => {
                let id = session.acting_as(name, Role::Driver)?;
                Ok(self.coordinator.mark_arrived(id, &ride_id)?)
            }
            ClientEvent::StartRide(RideRef { ride_id }) => {
                let id = session.acting_as(name, Role::Driver)?;
                Ok(self.coordinator.start_ride(id, &ride_id)?)
            }
            ClientEvent::CompleteRide(CompleteRide {
                ride_id,
                actual_fare,
            }) => {
                let id = session.acting_as(name, Role::Driver)?;
                Ok(self.coordinator.complete_ride(id, &ride_id, actual_fare)?)
            }
            ClientEvent::RequestRide(request) => {
                let id = session.acting_as(name, Role::Rider)?;
                self.coordinator.request_ride(id, request)?;
                Ok(())
            }
            ClientEvent::CancelRide(CancelRide { ride_id, reason }) => {
                let id = session.registered(name)?;
                Ok(self.coordinator.cancel_ride(id, &ride_id, reason)?)
            }
            ClientEvent::GetNearbyDrivers(query) => {
                session.registered(name)?;
                self.nearby(session, &query)
            }
        }
    }

    fn nearby(&self, session: &SessionState, query: &NearbyQuery) -> Result<(), DispatchError> {
        let point = query.point();
        point.validate().map_err(PresenceError::from)?;
        let drivers = self.coordinator.nearby_drivers(point, query.radius_km);
        session.send(ServerEvent::NearbyDrivers(NearbyDrivers { drivers }));
        Ok(())
    }
}

//! Connection registry: live sessions, their roles, and room membership.
//!
//! Every room is a set of sessions. Rooms appear when the first session joins
//! and disappear when the last one leaves. Delivery is a non-blocking send on
//! the session's bounded outbox: a client that stops reading loses events once
//! its outbox is full, and never stalls the caller.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{Sender, TrySendError};
use ride_protocol::{DriverId, RideId, Role, ServerEvent, SessionId};
use tracing::{debug, warn};

use super::REGISTRY_TARGET;

/// Broadcast group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Room {
    /// Sessions speaking for one driver.
    Driver(DriverId),
    /// Participants of one ride.
    Ride(RideId),
    /// Every session with an online driver.
    ActiveDrivers,
    /// Every session that has requested a ride.
    ActiveRiders,
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Driver(driver_id) => write!(f, "driver_{driver_id}"),
            Self::Ride(ride_id) => write!(f, "ride_{ride_id}"),
            Self::ActiveDrivers => f.write_str("active_drivers"),
            Self::ActiveRiders => f.write_str("active_riders"),
        }
    }
}

/// Outbox that delivers events to one connection.
pub type Outbox = Sender<ServerEvent>;

#[derive(Debug)]
struct SessionEntry {
    role: Role,
    rooms: HashSet<Room>,
    outbox: Outbox,
}

#[derive(Debug, Default)]
struct RegistryState {
    sessions: HashMap<SessionId, SessionEntry>,
    rooms: HashMap<Room, HashSet<SessionId>>,
}

impl RegistryState {
    fn deliver(&self, session: SessionId, event: &ServerEvent) -> bool {
        let Some(entry) = self.sessions.get(&session) else {
            return false;
        };
        match entry.outbox.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(
                    target: REGISTRY_TARGET,
                    %session,
                    event = event.name(),
                    "outbox full; dropping event"
                );
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!(
                    target: REGISTRY_TARGET,
                    %session,
                    event = event.name(),
                    "outbox closed; dropping event"
                );
                false
            }
        }
    }

    fn detach(&mut self, session: SessionId, room: &Room) {
        if let Some(members) = self.rooms.get_mut(room) {
            members.remove(&session);
            if members.is_empty() {
                self.rooms.remove(room);
            }
        }
    }
}

/// Session and room bookkeeping behind a single mutex.
#[derive(Debug)]
pub struct ConnectionRegistry {
    state: Mutex<RegistryState>,
    next_session: AtomicU64,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    /// Builds an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            next_session: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hands out a fresh session id for a new connection.
    pub fn allocate_session(&self) -> SessionId {
        SessionId::new(self.next_session.fetch_add(1, Ordering::Relaxed))
    }

    /// Records the session's role and outbox.
    ///
    /// Registering again replaces the role and outbox but keeps memberships.
    pub fn register(&self, session: SessionId, role: Role, outbox: Outbox) {
        let mut state = self.lock();
        match state.sessions.get_mut(&session) {
            Some(entry) => {
                entry.role = role;
                entry.outbox = outbox;
            }
            None => {
                state.sessions.insert(
                    session,
                    SessionEntry {
                        role,
                        rooms: HashSet::new(),
                        outbox,
                    },
                );
            }
        }
        debug!(target: REGISTRY_TARGET, %session, %role, "session registered");
    }

    /// Role declared by the session, if registered.
    pub fn role(&self, session: SessionId) -> Option<Role> {
        self.lock().sessions.get(&session).map(|entry| entry.role)
    }

    /// Adds the session to the room. Unknown sessions are ignored.
    pub fn join(&self, session: SessionId, room: Room) {
        let mut state = self.lock();
        let Some(entry) = state.sessions.get_mut(&session) else {
            return;
        };
        if entry.rooms.insert(room.clone()) {
            debug!(target: REGISTRY_TARGET, %session, %room, "joined room");
            state.rooms.entry(room).or_default().insert(session);
        }
    }

    /// Removes the session from the room.
    pub fn leave(&self, session: SessionId, room: &Room) {
        let mut state = self.lock();
        let removed = state
            .sessions
            .get_mut(&session)
            .is_some_and(|entry| entry.rooms.remove(room));
        if removed {
            state.detach(session, room);
            debug!(target: REGISTRY_TARGET, %session, %room, "left room");
        }
    }

    /// Reports whether the session is in the room.
    pub fn is_member(&self, session: SessionId, room: &Room) -> bool {
        self.lock()
            .rooms
            .get(room)
            .is_some_and(|members| members.contains(&session))
    }

    /// Sessions currently in the room.
    pub fn members(&self, room: &Room) -> Vec<SessionId> {
        let mut members: Vec<_> = self
            .lock()
            .rooms
            .get(room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default();
        members.sort_unstable();
        members
    }

    /// Delivers the event to every member of the room.
    ///
    /// Returns how many sessions accepted it. Unknown rooms are a no-op.
    pub fn broadcast(&self, room: &Room, event: &ServerEvent) -> usize {
        self.deliver_to_room(room, None, event)
    }

    /// Delivers the event to every member of the room except `excluded`.
    pub fn broadcast_except(&self, room: &Room, excluded: SessionId, event: &ServerEvent) -> usize {
        self.deliver_to_room(room, Some(excluded), event)
    }

    fn deliver_to_room(
        &self,
        room: &Room,
        excluded: Option<SessionId>,
        event: &ServerEvent,
    ) -> usize {
        let state = self.lock();
        let Some(members) = state.rooms.get(room) else {
            return 0;
        };
        members
            .iter()
            .filter(|session| Some(**session) != excluded)
            .filter(|session| state.deliver(**session, event))
            .count()
    }

    /// Delivers the event to every registered session.
    pub fn broadcast_all(&self, event: &ServerEvent) -> usize {
        let state = self.lock();
        state
            .sessions
            .keys()
            .filter(|session| state.deliver(**session, event))
            .count()
    }

    /// Delivers the event to one session.
    pub fn send_to(&self, session: SessionId, event: &ServerEvent) -> bool {
        self.lock().deliver(session, event)
    }

    /// Removes every member from the room and deletes it.
    pub fn dissolve(&self, room: &Room) {
        let mut state = self.lock();
        let Some(members) = state.rooms.remove(room) else {
            return;
        };
        for session in members {
            if let Some(entry) = state.sessions.get_mut(&session) {
                entry.rooms.remove(room);
            }
        }
        debug!(target: REGISTRY_TARGET, %room, "room dissolved");
    }

    /// Forgets the session and releases all its memberships.
    ///
    /// Returns the role and the rooms the session was in, or `None` when the
    /// session never registered.
    pub fn unregister(&self, session: SessionId) -> Option<(Role, Vec<Room>)> {
        let mut state = self.lock();
        let entry = state.sessions.remove(&session)?;
        let rooms: Vec<Room> = entry.rooms.into_iter().collect();
        for room in &rooms {
            state.detach(session, room);
        }
        debug!(
            target: REGISTRY_TARGET,
            %session,
            rooms = rooms.len(),
            "session unregistered"
        );
        Some((entry.role, rooms))
    }

    /// Number of registered sessions.
    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Number of non-empty rooms.
    pub fn room_count(&self) -> usize {
        self.lock().rooms.len()
    }
}

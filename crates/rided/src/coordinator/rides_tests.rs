//! Unit tests for the ride lifecycle tracker.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, unbounded};
use mockall::mock;
use ride_config::DispatchSettings;
use ride_protocol::{
    DriverId, ErrorKind, GeoPoint, Initiator, Place, RideId, RideRequest, RideStatus, RiderId,
    Role, ServerEvent, SessionId, VehicleType,
};
use rstest::{fixture, rstest};

use super::rides::{RideAction, RideRecord};
use super::{
    Clock, Collaborators, Coordinator, FareEstimator, ManualClock, RideArchive, RideError, Room,
};

mock! {
    Archive {}
    impl RideArchive for Archive {
        fn persist_ride(&self, ride: &RideRecord);
    }
}

struct FlatFare;

impl FareEstimator for FlatFare {
    fn estimate(&self, _pickup: &Place, _drop: &Place, _vehicle_type: VehicleType) -> f64 {
        120.0
    }
}

struct Client {
    session: SessionId,
    inbox: Receiver<ServerEvent>,
}

impl Client {
    fn names(&self) -> Vec<&'static str> {
        self.inbox.try_iter().map(|event| event.name()).collect()
    }

    fn events(&self) -> Vec<ServerEvent> {
        self.inbox.try_iter().collect()
    }
}

struct Harness {
    clock: Arc<ManualClock>,
    coordinator: Coordinator,
}

impl Harness {
    fn with_archive(archive: Arc<dyn RideArchive>) -> Self {
        let clock = Arc::new(ManualClock::default());
        let coordinator = Coordinator::with_collaborators(
            DispatchSettings {
                tombstone_retention: Duration::from_secs(600),
                ..DispatchSettings::default()
            },
            Collaborators {
                clock: Arc::clone(&clock) as Arc<dyn Clock>,
                fares: Arc::new(FlatFare),
                archive,
            },
        );
        Self { clock, coordinator }
    }

    fn connect(&self, role: Role) -> Client {
        let (outbox, inbox) = unbounded();
        let session = self.coordinator.open_session();
        self.coordinator.hello(session, role, outbox);
        let _ = inbox.try_recv();
        Client { session, inbox }
    }

    fn driver(&self, id: &str, lat: f64, lng: f64) -> Client {
        let client = self.connect(Role::Driver);
        self.coordinator
            .go_online(client.session, DriverId::from(id), Some(GeoPoint::new(lat, lng)))
            .expect("go online");
        client.inbox.try_iter().for_each(drop);
        client
    }

    fn request(&self, rider: &Client, ride: &str) -> usize {
        self.coordinator
            .request_ride(rider.session, request(ride))
            .expect("request ride")
    }

    fn accepted(&self, ride: &str) -> (Client, Client) {
        let driver = self.driver("d1", 23.34, 85.30);
        let rider = self.connect(Role::Rider);
        self.request(&rider, ride);
        self.coordinator
            .accept_ride(driver.session, &RideId::from(ride), &DriverId::from("d1"))
            .expect("accept");
        driver.inbox.try_iter().for_each(drop);
        rider.inbox.try_iter().for_each(drop);
        (rider, driver)
    }
}

fn request(ride: &str) -> RideRequest {
    RideRequest {
        ride_id: RideId::from(ride),
        rider_id: RiderId::from("rider-1"),
        pickup: Place::new(23.34, 85.30, "Main Road"),
        drop: Place::new(23.36, 85.33, "Station"),
        vehicle_type: VehicleType::CarEconomy,
    }
}

#[fixture]
fn harness() -> Harness {
    Harness::with_archive(Arc::new(super::TracingRideArchive))
}

#[rstest]
#[case(RideAction::Accept, RideStatus::Requested, Some(RideStatus::Accepted))]
#[case(RideAction::Accept, RideStatus::Accepted, None)]
#[case(RideAction::Arrive, RideStatus::Accepted, Some(RideStatus::Arrived))]
#[case(RideAction::Arrive, RideStatus::Requested, None)]
#[case(RideAction::Start, RideStatus::Accepted, Some(RideStatus::InProgress))]
#[case(RideAction::Start, RideStatus::Arrived, Some(RideStatus::InProgress))]
#[case(RideAction::Start, RideStatus::Requested, None)]
#[case(RideAction::Complete, RideStatus::InProgress, Some(RideStatus::Completed))]
#[case(RideAction::Complete, RideStatus::Accepted, None)]
#[case(RideAction::Cancel, RideStatus::Requested, Some(RideStatus::Cancelled))]
#[case(RideAction::Cancel, RideStatus::Arrived, Some(RideStatus::Cancelled))]
#[case(RideAction::Cancel, RideStatus::InProgress, None)]
#[case(RideAction::Cancel, RideStatus::Cancelled, None)]
#[case(RideAction::Start, RideStatus::Completed, None)]
fn lifecycle_transitions(
    #[case] action: RideAction,
    #[case] from: RideStatus,
    #[case] expected: Option<RideStatus>,
) {
    assert_eq!(action.apply(from), expected);
}

#[rstest]
fn request_without_drivers_reports_zero(harness: Harness) {
    let rider = harness.connect(Role::Rider);

    assert_eq!(harness.request(&rider, "r1"), 0);

    let events = rider.events();
    assert!(matches!(
        events.as_slice(),
        [ServerEvent::RideRequestSent(sent)] if sent.nearby_drivers_count == 0
    ));
    let ride = harness.coordinator.rides().get(&RideId::from("r1")).expect("live ride");
    assert_eq!(ride.status, RideStatus::Requested);
    assert_eq!(ride.estimated_fare, 120.0);
    assert!(harness
        .coordinator
        .registry()
        .is_member(rider.session, &Room::Ride(RideId::from("r1"))));
}

#[rstest]
fn request_fans_out_to_drivers_in_range_only(harness: Harness) {
    let near = harness.driver("near", 23.341, 85.301);
    let far = harness.driver("far", 23.80, 86.20);
    let rider = harness.connect(Role::Rider);

    assert_eq!(harness.request(&rider, "r1"), 1);

    let offers = near.events();
    assert!(matches!(
        offers.as_slice(),
        [ServerEvent::RideRequested(offer)] if offer.distance_km < 1.0 && offer.estimated_fare == 120.0
    ));
    assert!(far.names().is_empty());
    let ride = harness.coordinator.rides().get(&RideId::from("r1")).expect("live ride");
    assert_eq!(ride.offered_to, vec![DriverId::from("near")]);
}

#[rstest]
fn duplicate_ride_ids_are_rejected(harness: Harness) {
    let rider = harness.connect(Role::Rider);
    harness.request(&rider, "r1");

    let error = harness
        .coordinator
        .request_ride(rider.session, request("r1"))
        .expect_err("duplicate");
    assert_eq!(error, RideError::DuplicateRide { ride_id: RideId::from("r1") });
    assert_eq!(harness.coordinator.rides().len(), 1);
}

#[rstest]
fn tombstoned_ride_ids_stay_reserved_until_purged(harness: Harness) {
    let rider = harness.connect(Role::Rider);
    harness.request(&rider, "r1");
    harness
        .coordinator
        .cancel_ride(rider.session, &RideId::from("r1"), None)
        .expect("cancel");

    assert!(matches!(
        harness.coordinator.request_ride(rider.session, request("r1")),
        Err(RideError::DuplicateRide { .. })
    ));

    harness.clock.advance(Duration::from_secs(601));
    assert_eq!(harness.coordinator.sweep().purged_tombstones, 1);
    assert_eq!(harness.request(&rider, "r1"), 0);
}

#[rstest]
#[case(request_with(|r| r.ride_id = RideId::from("  ")), "rideId")]
#[case(request_with(|r| r.rider_id = RiderId::from("")), "riderId")]
fn blank_identifiers_are_rejected(
    harness: Harness,
    #[case] bad: RideRequest,
    #[case] field: &'static str,
) {
    let rider = harness.connect(Role::Rider);
    let error = harness
        .coordinator
        .request_ride(rider.session, bad)
        .expect_err("blank id");
    assert_eq!(error, RideError::BlankId { field });
    assert_eq!(error.kind(), ErrorKind::Validation);
}

fn request_with(edit: impl FnOnce(&mut RideRequest)) -> RideRequest {
    let mut request = request("r1");
    edit(&mut request);
    request
}

#[rstest]
fn out_of_range_pickup_is_rejected(harness: Harness) {
    let rider = harness.connect(Role::Rider);
    let bad = request_with(|r| r.pickup = Place::new(123.0, 85.0, ""));

    assert!(matches!(
        harness.coordinator.request_ride(rider.session, bad),
        Err(RideError::InvalidPlace { field: "pickup", .. })
    ));
    assert!(harness.coordinator.rides().is_empty());
}

#[rstest]
fn accept_notifies_rider_and_confirms_driver(harness: Harness) {
    let driver = harness.driver("d1", 23.34, 85.30);
    let rider = harness.connect(Role::Rider);
    harness.request(&rider, "r1");
    rider.inbox.try_iter().for_each(drop);
    driver.inbox.try_iter().for_each(drop);

    harness
        .coordinator
        .accept_ride(driver.session, &RideId::from("r1"), &DriverId::from("d1"))
        .expect("accept");

    let rider_events = rider.events();
    let [ServerEvent::RideAccepted(accepted)] = rider_events.as_slice() else {
        panic!("expected ride-accepted, got {rider_events:?}");
    };
    assert_eq!(accepted.driver_id, DriverId::from("d1"));
    assert_eq!(accepted.driver_location, Some(GeoPoint::new(23.34, 85.30)));
    assert_eq!(accepted.estimated_arrival, Some(1));
    assert_eq!(driver.names(), vec!["ride-accepted", "accept-confirmed"]);
    assert_eq!(
        harness.coordinator.rides().assignment(&DriverId::from("d1")),
        Some(RideId::from("r1"))
    );
}

#[rstest]
fn accept_requires_an_online_driver_owned_by_the_caller(harness: Harness) {
    let rider = harness.connect(Role::Rider);
    harness.request(&rider, "r1");
    let stranger = harness.connect(Role::Driver);
    let _owner = harness.driver("d1", 23.34, 85.30);

    assert!(matches!(
        harness
            .coordinator
            .accept_ride(stranger.session, &RideId::from("r1"), &DriverId::from("ghost")),
        Err(RideError::Driver(_))
    ));
    assert!(matches!(
        harness
            .coordinator
            .accept_ride(stranger.session, &RideId::from("r1"), &DriverId::from("d1")),
        Err(RideError::Driver(_))
    ));
    assert_eq!(
        harness.coordinator.rides().get(&RideId::from("r1")).map(|r| r.status),
        Some(RideStatus::Requested)
    );
}

#[rstest]
fn busy_driver_cannot_accept_a_second_ride(harness: Harness) {
    let (rider, driver) = harness.accepted("r1");
    harness.request(&rider, "r2");

    let error = harness
        .coordinator
        .accept_ride(driver.session, &RideId::from("r2"), &DriverId::from("d1"))
        .expect_err("busy");
    assert_eq!(error.kind(), ErrorKind::Conflict);
    assert!(matches!(error, RideError::DriverBusy { .. }));
}

#[test]
fn concurrent_accepts_have_exactly_one_winner() {
    const DRIVERS: usize = 8;
    let harness = Arc::new(Harness::with_archive(Arc::new(super::TracingRideArchive)));
    let drivers: Vec<Client> = (0..DRIVERS)
        .map(|n| harness.driver(&format!("d{n}"), 23.34, 85.30))
        .collect();
    let rider = harness.connect(Role::Rider);
    assert_eq!(harness.request(&rider, "r1"), DRIVERS);

    let barrier = Arc::new(Barrier::new(DRIVERS));
    let outcomes: Vec<Result<(), RideError>> = thread::scope(|scope| {
        let workers: Vec<_> = drivers
            .iter()
            .enumerate()
            .map(|(n, driver)| {
                let harness = Arc::clone(&harness);
                let barrier = Arc::clone(&barrier);
                let session = driver.session;
                scope.spawn(move || {
                    barrier.wait();
                    harness.coordinator.accept_ride(
                        session,
                        &RideId::from("r1"),
                        &DriverId::from(format!("d{n}")),
                    )
                })
            })
            .collect();
        workers
            .into_iter()
            .map(|worker| worker.join().expect("accept thread"))
            .collect()
    });

    assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .filter_map(|outcome| outcome.as_ref().err())
        .all(|error| matches!(error, RideError::AlreadyTaken { .. })));
    let confirmed = drivers
        .iter()
        .filter(|driver| driver.names().contains(&"accept-confirmed"))
        .count();
    assert_eq!(confirmed, 1);
}

/// Runs `left` and `right` on two threads released together.
fn race<A, B>(left: impl FnOnce() -> A + Send, right: impl FnOnce() -> B + Send) -> (A, B)
where
    A: Send,
    B: Send,
{
    let barrier = Barrier::new(2);
    thread::scope(|scope| {
        let first = scope.spawn(|| {
            barrier.wait();
            left()
        });
        let second = scope.spawn(|| {
            barrier.wait();
            right()
        });
        (
            first.join().expect("left thread"),
            second.join().expect("right thread"),
        )
    })
}

#[test]
fn accept_racing_cancel_leaves_no_stale_assignment() {
    let harness = Harness::with_archive(Arc::new(super::TracingRideArchive));
    let driver = harness.driver("d1", 23.34, 85.30);
    let rider = harness.connect(Role::Rider);
    let d1 = DriverId::from("d1");

    for n in 0..500 {
        let ride = RideId::from(format!("r{n}"));
        harness.request(&rider, ride.as_str());
        let (_accepted, cancelled) = race(
            || harness.coordinator.accept_ride(driver.session, &ride, &d1),
            || harness.coordinator.cancel_ride(rider.session, &ride, None),
        );

        cancelled.expect("rider may cancel requested and accepted rides");
        assert_eq!(harness.coordinator.rides().tombstone(&ride), Some(RideStatus::Cancelled));
        assert_eq!(harness.coordinator.rides().assignment(&d1), None, "ride {ride}");
        assert!(harness.coordinator.registry().members(&Room::Ride(ride)).is_empty());
        driver.inbox.try_iter().for_each(drop);
        rider.inbox.try_iter().for_each(drop);
    }

    harness.request(&rider, "fresh");
    harness
        .coordinator
        .accept_ride(driver.session, &RideId::from("fresh"), &d1)
        .expect("driver is free after the races");
}

#[test]
fn one_driver_racing_for_two_rides_gets_at_most_one() {
    let harness = Harness::with_archive(Arc::new(super::TracingRideArchive));
    let driver = harness.driver("d1", 23.34, 85.30);
    let rider = harness.connect(Role::Rider);
    let d1 = DriverId::from("d1");

    for n in 0..500 {
        let first = RideId::from(format!("a{n}"));
        let second = RideId::from(format!("b{n}"));
        harness.request(&rider, first.as_str());
        harness.request(&rider, second.as_str());

        let outcomes = race(
            || harness.coordinator.accept_ride(driver.session, &first, &d1),
            || harness.coordinator.accept_ride(driver.session, &second, &d1),
        );
        let winner = match outcomes {
            (Ok(()), Err(RideError::DriverBusy { .. })) => &first,
            (Err(RideError::DriverBusy { .. }), Ok(())) => &second,
            other => panic!("expected exactly one accept, got {other:?}"),
        };
        assert_eq!(harness.coordinator.rides().assignment(&d1).as_ref(), Some(winner));
        let accepted = [&first, &second]
            .into_iter()
            .filter(|ride| {
                harness.coordinator.rides().get(ride).map(|r| r.status) == Some(RideStatus::Accepted)
            })
            .count();
        assert_eq!(accepted, 1);

        for ride in [&first, &second] {
            harness
                .coordinator
                .cancel_ride(rider.session, ride, None)
                .expect("cancel");
        }
        assert_eq!(harness.coordinator.rides().assignment(&d1), None);
        driver.inbox.try_iter().for_each(drop);
        rider.inbox.try_iter().for_each(drop);
    }
}

#[rstest]
fn driver_leaving_releases_its_assignment(harness: Harness) {
    let (_rider, driver) = harness.accepted("r1");
    let d1 = DriverId::from("d1");

    harness
        .coordinator
        .go_offline(driver.session, &d1)
        .expect("go offline");

    assert_eq!(harness.coordinator.rides().assignment(&d1), None);
    assert_eq!(
        harness.coordinator.rides().get(&RideId::from("r1")).map(|r| r.status),
        Some(RideStatus::Accepted),
        "the ride itself stays live"
    );
}

#[test]
fn full_trip_archives_once_and_tears_down_the_room() {
    let mut archive = MockArchive::new();
    archive
        .expect_persist_ride()
        .withf(|ride| {
            ride.status == RideStatus::Completed
                && ride.actual_fare == Some(145.0)
                && ride.arrived_at.is_some()
                && ride.started_at.is_some()
        })
        .times(1)
        .return_const(());
    let harness = Harness::with_archive(Arc::new(archive));
    let (rider, driver) = harness.accepted("r1");
    let ride = RideId::from("r1");

    harness.clock.advance(Duration::from_secs(120));
    harness.coordinator.mark_arrived(driver.session, &ride).expect("arrive");
    harness.coordinator.start_ride(driver.session, &ride).expect("start");
    harness
        .coordinator
        .complete_ride(driver.session, &ride, 145.0)
        .expect("complete");

    assert_eq!(rider.names(), vec!["ride-arrived", "ride-started", "ride-completed"]);
    assert!(harness.coordinator.rides().get(&ride).is_none());
    assert_eq!(harness.coordinator.rides().tombstone(&ride), Some(RideStatus::Completed));
    assert_eq!(harness.coordinator.rides().assignment(&DriverId::from("d1")), None);
    assert!(harness.coordinator.registry().members(&Room::Ride(ride)).is_empty());
}

#[rstest]
fn steps_from_outside_the_ride_room_are_rejected(harness: Harness) {
    let (_rider, _driver) = harness.accepted("r1");
    let outsider = harness.driver("d2", 23.34, 85.30);

    let error = harness
        .coordinator
        .start_ride(outsider.session, &RideId::from("r1"))
        .expect_err("outsider");
    assert_eq!(error, RideError::NotParticipant { ride_id: RideId::from("r1") });
}

#[rstest]
fn completing_before_start_is_a_conflict(harness: Harness) {
    let (_rider, driver) = harness.accepted("r1");

    let error = harness
        .coordinator
        .complete_ride(driver.session, &RideId::from("r1"), 100.0)
        .expect_err("not started");
    assert!(matches!(
        error,
        RideError::InvalidTransition { status: RideStatus::Accepted, .. }
    ));
    assert_eq!(error.kind(), ErrorKind::Conflict);
}

#[rstest]
#[case(-1.0)]
#[case(f64::NAN)]
fn invalid_fares_are_rejected(harness: Harness, #[case] fare: f64) {
    let (_rider, driver) = harness.accepted("r1");
    harness
        .coordinator
        .start_ride(driver.session, &RideId::from("r1"))
        .expect("start");

    assert!(matches!(
        harness.coordinator.complete_ride(driver.session, &RideId::from("r1"), fare),
        Err(RideError::InvalidFare { .. })
    ));
    assert_eq!(
        harness.coordinator.rides().get(&RideId::from("r1")).map(|r| r.status),
        Some(RideStatus::InProgress)
    );
}

#[rstest]
fn unknown_rides_are_not_found(harness: Harness) {
    let driver = harness.driver("d1", 23.34, 85.30);
    let error = harness
        .coordinator
        .start_ride(driver.session, &RideId::from("missing"))
        .expect_err("unknown");
    assert_eq!(error.kind(), ErrorKind::NotFound);
}

#[rstest]
fn rider_cancel_notifies_driver_and_second_cancel_conflicts(harness: Harness) {
    let (rider, driver) = harness.accepted("r1");
    let ride = RideId::from("r1");

    harness
        .coordinator
        .cancel_ride(rider.session, &ride, Some("changed plans".to_owned()))
        .expect("cancel");

    let driver_events = driver.events();
    let [ServerEvent::RideCancelled(cancelled)] = driver_events.as_slice() else {
        panic!("expected ride-cancelled, got {driver_events:?}");
    };
    assert_eq!(cancelled.cancelled_by, Initiator::Rider);
    assert_eq!(cancelled.reason.as_deref(), Some("changed plans"));
    assert_eq!(rider.names(), vec!["cancel-confirmed"]);
    assert_eq!(harness.coordinator.rides().assignment(&DriverId::from("d1")), None);

    let error = harness
        .coordinator
        .cancel_ride(rider.session, &ride, None)
        .expect_err("second cancel");
    assert_eq!(error.kind(), ErrorKind::Conflict);
    assert!(harness.coordinator.rides().is_empty());
    assert_eq!(harness.coordinator.rides().tombstone(&ride), Some(RideStatus::Cancelled));
}

#[rstest]
fn cancelling_an_unaccepted_ride_withdraws_the_offers(harness: Harness) {
    let offered = harness.driver("d1", 23.34, 85.30);
    let rider = harness.connect(Role::Rider);
    harness.request(&rider, "r1");
    offered.inbox.try_iter().for_each(drop);

    harness
        .coordinator
        .cancel_ride(rider.session, &RideId::from("r1"), None)
        .expect("cancel");

    assert_eq!(offered.names(), vec!["ride-cancelled"]);
}

#[rstest]
fn in_progress_rides_cannot_be_cancelled(harness: Harness) {
    let (rider, driver) = harness.accepted("r1");
    harness
        .coordinator
        .start_ride(driver.session, &RideId::from("r1"))
        .expect("start");

    assert!(matches!(
        harness.coordinator.cancel_ride(rider.session, &RideId::from("r1"), None),
        Err(RideError::InvalidTransition { status: RideStatus::InProgress, .. })
    ));
}

#[rstest]
fn bound_driver_locations_reach_the_ride_room(harness: Harness) {
    let (rider, driver) = harness.accepted("r1");

    harness
        .coordinator
        .update_location(driver.session, &DriverId::from("d1"), GeoPoint::new(23.35, 85.31))
        .expect("update");

    let events = rider.events();
    assert!(matches!(
        events.as_slice(),
        [ServerEvent::DriverLocationUpdate(update)] if update.lat == 23.35 && update.lng == 85.31
    ));
}

#[rstest]
fn driver_disconnect_flags_the_ride_without_cancelling(harness: Harness) {
    let (rider, driver) = harness.accepted("r1");

    let departure = harness.coordinator.disconnect(driver.session);

    assert_eq!(departure.drivers, vec![DriverId::from("d1")]);
    assert_eq!(departure.flagged_rides, vec![RideId::from("r1")]);
    let ride = harness.coordinator.rides().get(&RideId::from("r1")).expect("still live");
    assert_eq!(ride.status, RideStatus::Accepted);
    assert!(ride.flagged_at.is_some());
    assert!(rider.names().contains(&"ride-flagged"));
}

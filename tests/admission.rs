mod common;

use chrono::{Duration, Utc};
use futures::future::join_all;
use rust_decimal_macros::dec;
use tokio_test::{assert_err, assert_ok};

use seatshare::api::{BookingAPI, TripAPI};
use seatshare::db::{Store, StoreTx};
use seatshare::entities::{BookingStatus, Decision, TripStatus};
use seatshare::error::{
    already_requested_error, busy_error, invalid_seats_error, seats_unavailable_error,
    too_many_attempts_error, unauthorized_error,
};
use seatshare::notifier::Event;

use common::{harness, harness_with, passenger, short_lock_settings};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn five_passengers_race_for_three_seats() {
    let h = harness();
    let trip = h.publish(3, dec!(100), Utc::now() + Duration::hours(6)).await;
    let trip_id = trip.id;

    let attempts = (0..5).map(|_| {
        let engine = h.engine.clone();
        let user = passenger();
        tokio::spawn(async move { engine.request_seats(user, trip_id, 1).await })
    });

    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let admitted = results.iter().filter(|r| r.is_ok()).count();
    let rejected: Vec<_> = results.into_iter().filter_map(|r| r.err()).collect();

    assert_eq!(admitted, 3);
    assert_eq!(rejected.len(), 2);
    assert!(rejected.iter().all(|e| *e == seats_unavailable_error()));

    let trip = h.current_trip(trip.id).await;
    assert_eq!(trip.seats_reserved, 3);
    assert_eq!(trip.status, TripStatus::Full);
}

#[tokio::test]
async fn rejecting_a_full_trip_request_reopens_it() {
    let h = harness();
    let trip = h.publish(2, dec!(100), Utc::now() + Duration::hours(6)).await;

    let booking = assert_ok!(h.engine.request_seats(passenger(), trip.id, 2).await);
    assert_eq!(h.current_trip(trip.id).await.status, TripStatus::Full);

    let booking = assert_ok!(
        h.engine
            .decide_booking(h.driver.clone(), booking.id, Decision::Reject)
            .await
    );
    assert_eq!(booking.status, BookingStatus::Rejected);

    let trip = h.current_trip(trip.id).await;
    assert_eq!(trip.status, TripStatus::Active);
    assert_eq!(trip.seats_reserved, 0);

    let events = h.drain_events();
    assert!(events.contains(&Event::TripFull { trip_id: trip.id }));
    assert!(events.contains(&Event::TripReopened { trip_id: trip.id }));
}

#[tokio::test]
async fn approval_keeps_the_reservation() {
    let h = harness();
    let trip = h.publish(3, dec!(100), Utc::now() + Duration::hours(6)).await;
    let rider = passenger();

    let booking = assert_ok!(h.engine.request_seats(rider.clone(), trip.id, 2).await);
    let booking = assert_ok!(
        h.engine
            .decide_booking(h.driver.clone(), booking.id, Decision::Approve)
            .await
    );

    assert_eq!(booking.status, BookingStatus::Approved);
    assert_eq!(h.current_trip(trip.id).await.seats_reserved, 2);

    // a second decision is not allowed
    assert_err!(
        h.engine
            .decide_booking(h.driver.clone(), booking.id, Decision::Reject)
            .await
    );
}

#[tokio::test]
async fn cancelling_releases_seats_for_either_party() {
    let h = harness();
    let trip = h.publish(2, dec!(100), Utc::now() + Duration::hours(6)).await;
    let first = passenger();
    let second = passenger();

    let pending = assert_ok!(h.engine.request_seats(first.clone(), trip.id, 1).await);
    let approved = assert_ok!(h.engine.request_seats(second.clone(), trip.id, 1).await);
    assert_ok!(
        h.engine
            .decide_booking(h.driver.clone(), approved.id, Decision::Approve)
            .await
    );
    assert_eq!(h.current_trip(trip.id).await.status, TripStatus::Full);

    let cancelled = assert_ok!(h.engine.cancel_booking(first.clone(), pending.id).await);
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert_eq!(h.current_trip(trip.id).await.status, TripStatus::Active);

    assert_ok!(h.engine.cancel_booking(h.driver.clone(), approved.id).await);

    let trip = h.current_trip(trip.id).await;
    assert_eq!(trip.seats_reserved, 0);

    // a stranger cannot cancel someone else's booking
    let again = assert_ok!(h.engine.request_seats(first.clone(), trip.id, 1).await);
    let err = assert_err!(h.engine.cancel_booking(second, again.id).await);
    assert_eq!(err, unauthorized_error());
}

#[tokio::test]
async fn duplicate_and_repeated_requests_are_bounded() {
    let h = harness();
    let trip = h.publish(4, dec!(100), Utc::now() + Duration::hours(6)).await;
    let rider = passenger();

    let booking = assert_ok!(h.engine.request_seats(rider.clone(), trip.id, 1).await);
    let err = assert_err!(h.engine.request_seats(rider.clone(), trip.id, 1).await);
    assert_eq!(err, already_requested_error());

    assert_ok!(h.engine.cancel_booking(rider.clone(), booking.id).await);

    for _ in 0..2 {
        let booking = assert_ok!(h.engine.request_seats(rider.clone(), trip.id, 1).await);
        assert_ok!(h.engine.cancel_booking(rider.clone(), booking.id).await);
    }

    let err = assert_err!(h.engine.request_seats(rider.clone(), trip.id, 1).await);
    assert_eq!(err, too_many_attempts_error());
    assert_eq!(h.current_trip(trip.id).await.seats_reserved, 0);
}

#[tokio::test]
async fn invalid_requests_leave_inventory_alone() {
    let h = harness();
    let trip = h.publish(2, dec!(100), Utc::now() + Duration::hours(6)).await;

    let err = assert_err!(h.engine.request_seats(passenger(), trip.id, 0).await);
    assert_eq!(err, invalid_seats_error());

    let err = assert_err!(h.engine.request_seats(passenger(), trip.id, 3).await);
    assert_eq!(err, seats_unavailable_error());

    // drivers do not book seats
    let err = assert_err!(h.engine.request_seats(h.driver.clone(), trip.id, 1).await);
    assert_eq!(err, unauthorized_error());

    assert_eq!(h.current_trip(trip.id).await.seats_reserved, 0);
}

#[tokio::test]
async fn held_trip_lock_surfaces_as_busy() {
    let h = harness_with(short_lock_settings());
    let trip = h.publish(2, dec!(100), Utc::now() + Duration::hours(6)).await;

    let mut tx = h.engine.store().begin().await.unwrap();
    tx.fetch_trip_for_update(&trip.id).await.unwrap();

    let err = assert_err!(h.engine.request_seats(passenger(), trip.id, 1).await);
    assert_eq!(err, busy_error());
    assert!(err.is_retryable());

    drop(tx);

    assert_ok!(h.engine.request_seats(passenger(), trip.id, 1).await);
    assert_eq!(h.current_trip(trip.id).await.seats_reserved, 1);
}

#[tokio::test]
async fn search_lists_only_bookable_trips() {
    let h = harness();
    let open = h.publish(2, dec!(100), Utc::now() + Duration::hours(6)).await;
    let full = h.publish(1, dec!(100), Utc::now() + Duration::hours(7)).await;

    assert_ok!(h.engine.request_seats(passenger(), full.id, 1).await);

    let trips = assert_ok!(
        h.engine
            .search_trips(
                passenger(),
                seatshare::db::TripQuery {
                    origin: Some("pune".into()),
                    ..Default::default()
                },
            )
            .await
    );

    let ids: Vec<_> = trips.iter().map(|t| t.id).collect();
    assert!(ids.contains(&open.id));
    assert!(!ids.contains(&full.id));
}

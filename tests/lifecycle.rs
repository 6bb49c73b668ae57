mod common;

use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use tokio_test::{assert_err, assert_ok};

use seatshare::api::{BookingAPI, NewTrip, TripAPI, WalletAPI};
use seatshare::db::{Store, StoreTx};
use seatshare::entities::{
    BookingStatus, Decision, LedgerKind, Otp, TripStatus, MAX_PRICE_PER_SEAT,
};
use seatshare::error::{
    invalid_input_error, invalid_otp_error, invalid_state_error, not_startable_error,
    too_many_attempts_error, unauthorized_error,
};
use seatshare::notifier::Event;

use common::{departing_soon, details, harness, passenger};

fn wrong_code(code: &str) -> String {
    let wrong = if code == "1234" { "4321" } else { "1234" };
    wrong.to_string()
}

#[tokio::test]
async fn otp_gate_requires_the_issued_code() {
    let h = harness();
    let trip = h.publish(2, dec!(150), departing_soon()).await;
    let rider = passenger();

    let booking = assert_ok!(h.engine.request_seats(rider.clone(), trip.id, 1).await);
    assert_ok!(
        h.engine
            .decide_booking(h.driver.clone(), booking.id, Decision::Approve)
            .await
    );

    let issued = assert_ok!(h.engine.issue_otp(h.driver.clone(), trip.id).await);
    assert!(issued.otp.is_none(), "driver view never carries the code");

    let otp = assert_ok!(h.engine.find_trip_otp(rider.clone(), trip.id).await);
    assert_eq!(otp.code.len(), 4);

    let err = assert_err!(h.engine.find_trip_otp(passenger(), trip.id).await);
    assert_eq!(err, unauthorized_error());

    let err = assert_err!(
        h.engine
            .start_trip(h.driver.clone(), trip.id, wrong_code(&otp.code))
            .await
    );
    assert_eq!(err, invalid_otp_error());
    assert_eq!(h.current_trip(trip.id).await.status, TripStatus::Active);

    let started = assert_ok!(
        h.engine
            .start_trip(h.driver.clone(), trip.id, otp.code.clone())
            .await
    );
    assert_eq!(started.status, TripStatus::InProgress);

    let err = assert_err!(h.engine.start_trip(h.driver.clone(), trip.id, otp.code).await);
    assert_eq!(err, invalid_state_error());

    let started_events = h
        .drain_events()
        .into_iter()
        .filter(|e| *e == Event::TripStarted { trip_id: trip.id })
        .count();
    assert_eq!(started_events, 1);
}

#[tokio::test]
async fn failed_attempts_are_counted_until_reissue() {
    let mut settings = seatshare::config::Settings::default();
    settings.windows.otp_max_attempts = 2;

    let h = common::harness_with(settings);
    let trip = h.publish(2, dec!(150), departing_soon()).await;

    assert_ok!(h.engine.issue_otp(h.driver.clone(), trip.id).await);
    let code = h.engine.store().find_trip(&trip.id).await.unwrap().unwrap().otp.unwrap().code;

    for _ in 0..2 {
        let err = assert_err!(
            h.engine
                .start_trip(h.driver.clone(), trip.id, wrong_code(&code))
                .await
        );
        assert_eq!(err, invalid_otp_error());
    }

    let err = assert_err!(h.engine.start_trip(h.driver.clone(), trip.id, code).await);
    assert_eq!(err, too_many_attempts_error());

    assert_ok!(h.engine.issue_otp(h.driver.clone(), trip.id).await);
    let code = h.engine.store().find_trip(&trip.id).await.unwrap().unwrap().otp.unwrap().code;

    let started = assert_ok!(h.engine.start_trip(h.driver.clone(), trip.id, code).await);
    assert_eq!(started.status, TripStatus::InProgress);
}

#[tokio::test]
async fn start_outside_the_window_is_not_startable() {
    let h = harness();
    let trip = h.publish(2, dec!(150), Utc::now() + Duration::days(2)).await;

    let err = assert_err!(h.engine.issue_otp(h.driver.clone(), trip.id).await);
    assert_eq!(err, not_startable_error());

    // even a correct code is refused before the window opens
    let mut tx = h.engine.store().begin().await.unwrap();
    let mut stored = tx.fetch_trip_for_update(&trip.id).await.unwrap();
    stored.otp = Some(Otp {
        code: "2468".into(),
        issued_at: Utc::now(),
        failed_attempts: 0,
    });
    tx.update_trip(&stored).await.unwrap();
    tx.commit().await.unwrap();

    let err = assert_err!(
        h.engine
            .start_trip(h.driver.clone(), trip.id, "2468".into())
            .await
    );
    assert_eq!(err, not_startable_error());
    assert_eq!(h.current_trip(trip.id).await.status, TripStatus::Active);
}

#[tokio::test]
async fn unanswered_requests_expire_when_the_trip_starts() {
    let h = harness();
    let trip = h.publish(3, dec!(150), departing_soon()).await;

    let approved = assert_ok!(h.engine.request_seats(passenger(), trip.id, 1).await);
    let pending = assert_ok!(h.engine.request_seats(passenger(), trip.id, 2).await);
    assert_ok!(
        h.engine
            .decide_booking(h.driver.clone(), approved.id, Decision::Approve)
            .await
    );
    assert_eq!(h.current_trip(trip.id).await.status, TripStatus::Full);

    assert_ok!(h.engine.issue_otp(h.driver.clone(), trip.id).await);
    let code = h.engine.store().find_trip(&trip.id).await.unwrap().unwrap().otp.unwrap().code;
    let started = assert_ok!(h.engine.start_trip(h.driver.clone(), trip.id, code).await);

    assert_eq!(started.status, TripStatus::InProgress);
    assert_eq!(started.seats_reserved, 1);

    let pending = assert_ok!(h.engine.find_booking(h.driver.clone(), pending.id).await);
    assert_eq!(pending.status, BookingStatus::Rejected);
}

#[tokio::test]
async fn finishing_twice_posts_one_credit() {
    let h = harness();
    let trip = h.publish(3, dec!(120), departing_soon()).await;

    for seats in [1, 2] {
        let booking = assert_ok!(h.engine.request_seats(passenger(), trip.id, seats).await);
        assert_ok!(
            h.engine
                .decide_booking(h.driver.clone(), booking.id, Decision::Approve)
                .await
        );
    }

    assert_ok!(h.engine.issue_otp(h.driver.clone(), trip.id).await);
    let code = h.engine.store().find_trip(&trip.id).await.unwrap().unwrap().otp.unwrap().code;
    assert_ok!(h.engine.start_trip(h.driver.clone(), trip.id, code).await);

    let done = assert_ok!(h.engine.finish_trip(h.driver.clone(), trip.id).await);
    assert_eq!(done.status, TripStatus::Completed);

    let again = assert_ok!(h.engine.finish_trip(h.driver.clone(), trip.id).await);
    assert_eq!(again.status, TripStatus::Completed);

    let entries = assert_ok!(
        h.engine
            .list_ledger_entries(h.driver.clone(), h.driver.id)
            .await
    );
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, LedgerKind::TripCredit);
    assert_eq!(entries[0].reference_id, trip.id);
    assert_eq!(entries[0].amount, dec!(360));
    assert_eq!(h.balance(h.driver.id).await, dec!(360));
}

#[tokio::test]
async fn only_the_driver_drives_the_lifecycle() {
    let h = harness();
    let trip = h.publish(2, dec!(100), departing_soon()).await;
    let intruder = seatshare::auth::User::driver(uuid::Uuid::new_v4());

    let err = assert_err!(h.engine.issue_otp(intruder.clone(), trip.id).await);
    assert_eq!(err, unauthorized_error());

    let err = assert_err!(h.engine.cancel_trip(intruder.clone(), trip.id).await);
    assert_eq!(err, unauthorized_error());

    let err = assert_err!(h.engine.finish_trip(h.driver.clone(), trip.id).await);
    assert_eq!(err, invalid_state_error());
}

#[tokio::test]
async fn cancelling_a_trip_releases_every_booking() {
    let h = harness();
    let trip = h.publish(3, dec!(100), Utc::now() + Duration::hours(5)).await;
    let first = passenger();
    let second = passenger();

    let pending = assert_ok!(h.engine.request_seats(first.clone(), trip.id, 1).await);
    let approved = assert_ok!(h.engine.request_seats(second.clone(), trip.id, 2).await);
    assert_ok!(
        h.engine
            .decide_booking(h.driver.clone(), approved.id, Decision::Approve)
            .await
    );

    let cancelled = assert_ok!(h.engine.cancel_trip(h.driver.clone(), trip.id).await);
    assert_eq!(cancelled.status, TripStatus::Cancelled);
    assert_eq!(cancelled.seats_reserved, 0);

    for id in [pending.id, approved.id] {
        let booking = assert_ok!(h.engine.find_booking(h.driver.clone(), id).await);
        assert_eq!(booking.status, BookingStatus::Cancelled);
    }

    let err = assert_err!(h.engine.cancel_trip(h.driver.clone(), trip.id).await);
    assert_eq!(err, invalid_state_error());

    let notified = h.drain_events().into_iter().any(|e| match e {
        Event::TripCancelled { passenger_ids, .. } => {
            passenger_ids.contains(&first.id) && passenger_ids.contains(&second.id)
        }
        _ => false,
    });
    assert!(notified);
}

#[tokio::test]
async fn recurring_publish_creates_daily_trips() {
    let h = harness();
    let first_departure = Utc::now() + Duration::hours(3);

    let trips = assert_ok!(
        h.engine
            .publish_trip(
                h.driver.clone(),
                NewTrip {
                    details: details(dec!(80)),
                    seat_capacity: 4,
                    scheduled_at: first_departure,
                    recurring: true,
                },
            )
            .await
    );

    assert_eq!(trips.len(), 5);
    for (day, trip) in trips.iter().enumerate() {
        assert_eq!(trip.scheduled_at, first_departure + Duration::days(day as i64));
        assert_eq!(trip.status, TripStatus::Active);
    }

    let err = assert_err!(
        h.engine
            .publish_trip(
                h.driver.clone(),
                NewTrip {
                    details: details(dec!(80)),
                    seat_capacity: 4,
                    scheduled_at: Utc::now() - Duration::hours(1),
                    recurring: false,
                },
            )
            .await
    );
    assert_eq!(err, invalid_input_error());
}

#[tokio::test]
async fn seat_price_is_capped_at_publish() {
    let h = harness();

    let err = assert_err!(
        h.engine
            .publish_trip(
                h.driver.clone(),
                NewTrip {
                    details: details(rust_decimal::Decimal::MAX),
                    seat_capacity: 2,
                    scheduled_at: departing_soon(),
                    recurring: false,
                },
            )
            .await
    );
    assert_eq!(err, invalid_input_error());

    let trip = h.publish(2, MAX_PRICE_PER_SEAT, departing_soon()).await;
    assert_eq!(trip.details.price_per_seat, MAX_PRICE_PER_SEAT);
}

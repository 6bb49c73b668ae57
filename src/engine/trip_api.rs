use super::helpers::{lock_trip, post_entry, release_seats};
use super::Engine;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::{
    api::{NewTrip, TripAPI, RECURRING_DAYS},
    auth::{Platform, User},
    db::{Store, StoreTx, TripQuery},
    entities::{BookingStatus, Decision, LedgerEntry, Otp, OtpCheck, Trip, TripStatus},
    error::{
        invalid_input_error, invalid_otp_error, not_found_error, too_many_attempts_error,
        unauthorized_error, Error,
    },
    notifier::Event,
};

#[async_trait]
impl<S: Store> TripAPI for Engine<S> {
    #[tracing::instrument(skip(self))]
    async fn publish_trip(&self, user: User, params: NewTrip) -> Result<Vec<Trip>, Error> {
        self.authorize(user.clone(), "publish_trip", Platform::default())?;

        if params.scheduled_at <= Utc::now() {
            return Err(invalid_input_error());
        }

        let days = if params.recurring { RECURRING_DAYS } else { 1 };

        let trips = (0..days)
            .map(|day| {
                Trip::new(
                    user.id,
                    params.details.clone(),
                    params.seat_capacity,
                    params.scheduled_at + Duration::days(day),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut tx = self.store.begin().await?;

        for trip in trips.iter() {
            tx.insert_trip(trip).await?;
        }

        let events = trips
            .iter()
            .map(|trip| Event::TripPublished {
                trip_id: trip.id,
                driver_id: trip.driver_id,
            })
            .collect();

        self.commit(tx, events).await?;

        tracing::info!(count = trips.len(), "published trips");

        Ok(trips)
    }

    #[tracing::instrument(skip(self))]
    async fn find_trip(&self, user: User, id: Uuid) -> Result<Trip, Error> {
        let trip = self
            .store
            .find_trip(&id)
            .await?
            .ok_or_else(not_found_error)?;

        self.authorize(user, "read", trip.clone())?;

        Ok(trip.redacted())
    }

    #[tracing::instrument(skip(self))]
    async fn search_trips(&self, _user: User, query: TripQuery) -> Result<Vec<Trip>, Error> {
        let trips = self.store.search_trips(&query).await?;

        Ok(trips.into_iter().map(Trip::redacted).collect())
    }

    #[tracing::instrument(skip(self))]
    async fn issue_otp(&self, user: User, id: Uuid) -> Result<Trip, Error> {
        let mut tx = self.store.begin().await?;
        let mut trip = lock_trip(&mut tx, &id).await?;

        self.authorize(user.clone(), "issue_otp", trip.clone())?;

        let code = trip
            .issue_otp(Utc::now(), &self.settings.windows)?
            .code
            .clone();

        tx.update_trip(&trip).await?;

        let passenger_ids = tx
            .fetch_bookings_for_trip(&id)
            .await?
            .into_iter()
            .filter(|b| b.status == BookingStatus::Approved)
            .map(|b| b.passenger_id)
            .collect();

        self.commit(
            tx,
            vec![Event::OtpIssued {
                trip_id: id,
                passenger_ids,
                code,
            }],
        )
        .await?;

        tracing::info!("issued start code");

        Ok(trip.redacted())
    }

    #[tracing::instrument(skip(self))]
    async fn find_trip_otp(&self, user: User, id: Uuid) -> Result<Otp, Error> {
        let trip = self
            .store
            .find_trip(&id)
            .await?
            .ok_or_else(not_found_error)?;

        let rides = self
            .store
            .list_bookings_for_trip(&id)
            .await?
            .iter()
            .any(|b| b.passenger_id == user.id && b.status == BookingStatus::Approved);

        if !rides && !user.is_admin() {
            return Err(unauthorized_error());
        }

        trip.otp.ok_or_else(not_found_error)
    }

    #[tracing::instrument(skip(self, otp))]
    async fn start_trip(&self, user: User, id: Uuid, otp: String) -> Result<Trip, Error> {
        let mut tx = self.store.begin().await?;
        let mut trip = lock_trip(&mut tx, &id).await?;

        self.authorize(user.clone(), "start", trip.clone())?;

        match trip.check_otp(&otp, Utc::now(), &self.settings.windows)? {
            OtpCheck::Accepted => {}
            OtpCheck::Rejected => {
                tracing::warn!("start code rejected");

                // keep the failure count
                tx.update_trip(&trip).await?;
                tx.commit().await?;

                return Err(invalid_otp_error());
            }
            OtpCheck::Locked => {
                tracing::warn!("start code locked after too many attempts");
                return Err(too_many_attempts_error());
            }
        }

        let mut events = vec![];

        // requests the driver never answered expire with the departure
        let pending = tx
            .fetch_bookings_for_trip(&id)
            .await?
            .into_iter()
            .filter(|b| b.status == BookingStatus::Pending);

        for mut booking in pending {
            let seats = booking.decide(Decision::Reject)?;
            release_seats(&mut trip, seats, &mut events)?;

            tx.update_booking(&booking).await?;

            events.push(Event::BookingRejected {
                booking_id: booking.id,
                trip_id: id,
                passenger_id: booking.passenger_id,
            });
        }

        tx.update_trip(&trip).await?;

        events.push(Event::TripStarted { trip_id: id });

        self.commit(tx, events).await?;

        tracing::info!("trip started");

        Ok(trip.redacted())
    }

    /// Retrying a finished trip re-runs the credit posting, which is a no-op the second time.
    #[tracing::instrument(skip(self))]
    async fn finish_trip(&self, user: User, id: Uuid) -> Result<Trip, Error> {
        let mut tx = self.store.begin().await?;
        let mut trip = lock_trip(&mut tx, &id).await?;

        self.authorize(user.clone(), "finish", trip.clone())?;

        let retried = trip.status == TripStatus::Completed;

        if !retried {
            trip.finish()?;
            tx.update_trip(&trip).await?;
        }

        let approved_seats: i32 = tx
            .fetch_bookings_for_trip(&id)
            .await?
            .iter()
            .filter(|b| b.status == BookingStatus::Approved)
            .map(|b| b.seats_requested)
            .sum();

        let fare = trip.fare(approved_seats)?;
        let mut events = vec![];

        tx.lock_account(&trip.driver_id).await?;
        post_entry(
            &mut tx,
            &LedgerEntry::trip_credit(trip.driver_id, fare, trip.id),
            &mut events,
        )
        .await?;

        if !retried {
            events.push(Event::TripCompleted {
                trip_id: id,
                driver_id: trip.driver_id,
                fare,
            });
        }

        self.commit(tx, events).await?;

        tracing::info!(%fare, retried, "trip completed");

        Ok(trip.redacted())
    }

    #[tracing::instrument(skip(self))]
    async fn cancel_trip(&self, user: User, id: Uuid) -> Result<Trip, Error> {
        let mut tx = self.store.begin().await?;
        let mut trip = lock_trip(&mut tx, &id).await?;

        self.authorize(user.clone(), "cancel", trip.clone())?;

        trip.cancel()?;

        let mut events = vec![];
        let mut passenger_ids = vec![];

        let holding = tx
            .fetch_bookings_for_trip(&id)
            .await?
            .into_iter()
            .filter(|b| b.status.holds_seats());

        for mut booking in holding {
            let seats = booking.cancel()?;
            release_seats(&mut trip, seats, &mut events)?;

            tx.update_booking(&booking).await?;
            passenger_ids.push(booking.passenger_id);
        }

        tx.update_trip(&trip).await?;

        events.push(Event::TripCancelled {
            trip_id: id,
            passenger_ids,
        });

        self.commit(tx, events).await?;

        tracing::info!(seats_reserved = trip.seats_reserved, "trip cancelled");

        Ok(trip.redacted())
    }
}

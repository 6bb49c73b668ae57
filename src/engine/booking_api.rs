use super::helpers::{lock_trip, release_seats};
use super::Engine;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    api::BookingAPI,
    auth::{Platform, User},
    db::{Store, StoreTx},
    entities::{Booking, Decision, TripStatus},
    error::{
        already_requested_error, invalid_seats_error, invalid_state_error, not_found_error,
        too_many_attempts_error, Error,
    },
    notifier::Event,
};

#[async_trait]
impl<S: Store> BookingAPI for Engine<S> {
    /// Reservation-on-request: the seats are taken from the trip in the same transaction that
    /// creates the pending booking.
    #[tracing::instrument(skip(self))]
    async fn request_seats(
        &self,
        user: User,
        trip_id: Uuid,
        seats: i32,
    ) -> Result<Booking, Error> {
        self.authorize(user.clone(), "request_seats", Platform::default())?;

        if seats < 1 {
            return Err(invalid_seats_error());
        }

        let mut tx = self.store.begin().await?;
        let mut trip = lock_trip(&mut tx, &trip_id).await?;

        if trip.driver_id == user.id {
            return Err(invalid_state_error());
        }

        let previous: Vec<Booking> = tx
            .fetch_bookings_for_trip(&trip_id)
            .await?
            .into_iter()
            .filter(|b| b.passenger_id == user.id)
            .collect();

        if previous.iter().any(|b| b.status.holds_seats()) {
            return Err(already_requested_error());
        }

        if previous.len() >= self.settings.max_booking_attempts {
            tracing::warn!(attempts = previous.len(), "booking attempts exhausted");
            return Err(too_many_attempts_error());
        }

        let filled = trip.reserve_seats(seats).map_err(|err| {
            tracing::warn!(free = trip.free_seats(), %err, "admission rejected");
            err
        })?;

        let booking = Booking::new(trip.id, trip.driver_id, user.id, seats)?;

        tx.insert_booking(&booking).await?;
        tx.update_trip(&trip).await?;

        let mut events = vec![Event::BookingRequested {
            booking_id: booking.id,
            trip_id,
            driver_id: trip.driver_id,
            seats,
        }];

        if filled {
            events.push(Event::TripFull { trip_id });
        }

        self.commit(tx, events).await?;

        tracing::info!(
            booking_id = %booking.id,
            seats_reserved = trip.seats_reserved,
            "seats admitted"
        );

        Ok(booking)
    }

    #[tracing::instrument(skip(self))]
    async fn decide_booking(
        &self,
        user: User,
        id: Uuid,
        decision: Decision,
    ) -> Result<Booking, Error> {
        // the trip id never changes, so it is safe to read it before taking the trip lock
        let trip_id = self
            .store
            .find_booking(&id)
            .await?
            .ok_or_else(not_found_error)?
            .trip_id;

        let mut tx = self.store.begin().await?;
        let mut trip = lock_trip(&mut tx, &trip_id).await?;
        let mut booking = tx.fetch_booking(&id).await?;

        self.authorize(user.clone(), "decide", booking.clone())?;

        if !trip.status.is_open() {
            return Err(invalid_state_error());
        }

        let released = booking.decide(decision)?;
        let mut events = vec![];

        if released > 0 {
            release_seats(&mut trip, released, &mut events)?;
            tx.update_trip(&trip).await?;
        }

        tx.update_booking(&booking).await?;

        events.push(match decision {
            Decision::Approve => Event::BookingApproved {
                booking_id: id,
                trip_id,
                passenger_id: booking.passenger_id,
            },
            Decision::Reject => Event::BookingRejected {
                booking_id: id,
                trip_id,
                passenger_id: booking.passenger_id,
            },
        });

        self.commit(tx, events).await?;

        tracing::info!(?decision, seats_reserved = trip.seats_reserved, "booking decided");

        Ok(booking)
    }

    /// Either party may cancel a pending or approved booking until the trip starts.
    #[tracing::instrument(skip(self))]
    async fn cancel_booking(&self, user: User, id: Uuid) -> Result<Booking, Error> {
        let trip_id = self
            .store
            .find_booking(&id)
            .await?
            .ok_or_else(not_found_error)?
            .trip_id;

        let mut tx = self.store.begin().await?;
        let mut trip = lock_trip(&mut tx, &trip_id).await?;
        let mut booking = tx.fetch_booking(&id).await?;

        self.authorize(user.clone(), "cancel", booking.clone())?;

        if !matches!(trip.status, TripStatus::Active | TripStatus::Full) {
            return Err(invalid_state_error());
        }

        let seats = booking.cancel()?;
        let mut events = vec![];

        release_seats(&mut trip, seats, &mut events)?;

        tx.update_booking(&booking).await?;
        tx.update_trip(&trip).await?;

        events.push(Event::BookingCancelled {
            booking_id: id,
            trip_id,
            passenger_id: booking.passenger_id,
            driver_id: booking.driver_id,
        });

        self.commit(tx, events).await?;

        tracing::info!(seats_reserved = trip.seats_reserved, "booking cancelled");

        Ok(booking)
    }

    #[tracing::instrument(skip(self))]
    async fn find_booking(&self, user: User, id: Uuid) -> Result<Booking, Error> {
        let booking = self
            .store
            .find_booking(&id)
            .await?
            .ok_or_else(not_found_error)?;

        self.authorize(user, "read", booking.clone())?;

        Ok(booking)
    }

    #[tracing::instrument(skip(self))]
    async fn list_trip_bookings(&self, user: User, trip_id: Uuid) -> Result<Vec<Booking>, Error> {
        let trip = self
            .store
            .find_trip(&trip_id)
            .await?
            .ok_or_else(not_found_error)?;

        self.authorize(user, "read_bookings", trip)?;

        self.store.list_bookings_for_trip(&trip_id).await
    }

    #[tracing::instrument(skip(self))]
    async fn list_my_bookings(&self, user: User) -> Result<Vec<Booking>, Error> {
        self.store.list_bookings_for_passenger(&user.id).await
    }
}

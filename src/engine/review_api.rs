use super::helpers::lock_trip;
use super::Engine;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    api::{NewReview, ReviewAPI},
    auth::User,
    db::{Store, StoreTx},
    entities::{BookingStatus, DriverRating, Review, TripStatus},
    error::{already_reviewed_error, invalid_state_error, unauthorized_error, Error},
    notifier::Event,
};

#[async_trait]
impl<S: Store> ReviewAPI for Engine<S> {
    #[tracing::instrument(skip(self, params), fields(rating = params.rating))]
    async fn submit_review(
        &self,
        user: User,
        trip_id: Uuid,
        params: NewReview,
    ) -> Result<Review, Error> {
        let mut tx = self.store.begin().await?;
        let trip = lock_trip(&mut tx, &trip_id).await?;

        self.authorize(user.clone(), "review", trip.clone())?;

        if trip.status != TripStatus::Completed {
            return Err(invalid_state_error());
        }

        let rode = tx
            .fetch_bookings_for_trip(&trip_id)
            .await?
            .iter()
            .any(|b| b.passenger_id == user.id && b.status == BookingStatus::Approved);

        if !rode {
            return Err(unauthorized_error());
        }

        if tx.review_exists(&trip_id, &user.id).await? {
            return Err(already_reviewed_error());
        }

        let review = Review::new(
            trip_id,
            user.id,
            trip.driver_id,
            params.rating,
            params.comment,
        )?;

        tx.insert_review(&review).await?;

        self.commit(
            tx,
            vec![Event::ReviewSubmitted {
                trip_id,
                driver_id: trip.driver_id,
                rating: review.rating,
            }],
        )
        .await?;

        Ok(review)
    }

    #[tracing::instrument(skip(self))]
    async fn driver_rating(&self, driver_id: Uuid) -> Result<DriverRating, Error> {
        let reviews = self.store.list_reviews_for_driver(&driver_id).await?;

        Ok(DriverRating::from_reviews(driver_id, &reviews))
    }
}

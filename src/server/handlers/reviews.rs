use axum::extract::{Extension, Json, Path};
use uuid::Uuid;

use crate::api::{DynAPI, NewReview};
use crate::auth::User;
use crate::entities::{DriverRating, Review};
use crate::error::Error;

pub async fn create(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(trip_id): Path<Uuid>,
    Json(params): Json<NewReview>,
) -> Result<Json<Review>, Error> {
    let review = api.submit_review(user, trip_id, params).await?;

    Ok(review.into())
}

pub async fn driver_rating(
    Extension(api): Extension<DynAPI>,
    Path(driver_id): Path<Uuid>,
) -> Result<Json<DriverRating>, Error> {
    let rating = api.driver_rating(driver_id).await?;

    Ok(rating.into())
}

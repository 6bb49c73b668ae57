use axum::extract::{Extension, Json, Path, Query};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{DynAPI, NewTrip};
use crate::auth::User;
use crate::db::TripQuery;
use crate::entities::{Booking, Otp, Trip};
use crate::error::Error;

#[derive(Serialize, Deserialize)]
pub struct SearchParams {
    from: Option<String>,
    to: Option<String>,
    date: Option<NaiveDate>,
}

#[derive(Serialize, Deserialize)]
pub struct RequestSeatsParams {
    seats: i32,
}

#[derive(Serialize, Deserialize)]
pub struct StartParams {
    otp: String,
}

pub async fn publish(
    Extension(api): Extension<DynAPI>,
    user: User,
    Json(params): Json<NewTrip>,
) -> Result<Json<Vec<Trip>>, Error> {
    let trips = api.publish_trip(user, params).await?;

    Ok(trips.into())
}

pub async fn search(
    Extension(api): Extension<DynAPI>,
    user: User,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Trip>>, Error> {
    let query = TripQuery {
        origin: params.from,
        destination: params.to,
        date: params.date,
    };

    let trips = api.search_trips(user, query).await?;

    Ok(trips.into())
}

pub async fn find(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Trip>, Error> {
    let trip = api.find_trip(user, id).await?;

    Ok(trip.into())
}

pub async fn bookings(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Booking>>, Error> {
    let bookings = api.list_trip_bookings(user, id).await?;

    Ok(bookings.into())
}

pub async fn request_seats(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
    Json(params): Json<RequestSeatsParams>,
) -> Result<Json<Booking>, Error> {
    let booking = api.request_seats(user, id, params.seats).await?;

    Ok(booking.into())
}

pub async fn issue_otp(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Trip>, Error> {
    let trip = api.issue_otp(user, id).await?;

    Ok(trip.into())
}

pub async fn find_otp(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Otp>, Error> {
    let otp = api.find_trip_otp(user, id).await?;

    Ok(otp.into())
}

pub async fn start(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
    Json(params): Json<StartParams>,
) -> Result<Json<Trip>, Error> {
    let trip = api.start_trip(user, id, params.otp).await?;

    Ok(trip.into())
}

pub async fn finish(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Trip>, Error> {
    let trip = api.finish_trip(user, id).await?;

    Ok(trip.into())
}

pub async fn cancel(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Trip>, Error> {
    let trip = api.cancel_trip(user, id).await?;

    Ok(trip.into())
}

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::User;
use crate::db::TripQuery;
use crate::entities::{
    Booking, Decision, DriverRating, LedgerEntry, Otp, PayoutMethod, Posting, Review, Trip,
    TripDetails, WalletAccount, Withdrawal, WithdrawalStatus,
};
use crate::error::Error;

/// Number of daily trips created by a recurring publish.
pub const RECURRING_DAYS: i64 = 5;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewTrip {
    #[serde(flatten)]
    pub details: TripDetails,
    pub seat_capacity: i32,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default)]
    pub recurring: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewWithdrawal {
    pub amount: Decimal,
    pub method: PayoutMethod,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewAdjustment {
    pub amount: Decimal,
    pub reference_id: Uuid,
    pub note: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewReview {
    pub rating: u8,
    pub comment: Option<String>,
}

#[async_trait]
pub trait TripAPI {
    /// Returns every trip created; more than one when `recurring` is set.
    async fn publish_trip(&self, user: User, params: NewTrip) -> Result<Vec<Trip>, Error>;
    async fn find_trip(&self, user: User, id: Uuid) -> Result<Trip, Error>;
    async fn search_trips(&self, user: User, query: TripQuery) -> Result<Vec<Trip>, Error>;
    /// Issues (or re-issues) the start code. The code itself goes to the approved passengers.
    async fn issue_otp(&self, user: User, id: Uuid) -> Result<Trip, Error>;
    /// The current code, readable by passengers holding an approved booking on the trip.
    async fn find_trip_otp(&self, user: User, id: Uuid) -> Result<Otp, Error>;
    async fn start_trip(&self, user: User, id: Uuid, otp: String) -> Result<Trip, Error>;
    async fn finish_trip(&self, user: User, id: Uuid) -> Result<Trip, Error>;
    async fn cancel_trip(&self, user: User, id: Uuid) -> Result<Trip, Error>;
}

#[async_trait]
pub trait BookingAPI {
    async fn request_seats(&self, user: User, trip_id: Uuid, seats: i32)
        -> Result<Booking, Error>;
    async fn decide_booking(
        &self,
        user: User,
        id: Uuid,
        decision: Decision,
    ) -> Result<Booking, Error>;
    async fn cancel_booking(&self, user: User, id: Uuid) -> Result<Booking, Error>;
    async fn find_booking(&self, user: User, id: Uuid) -> Result<Booking, Error>;
    async fn list_trip_bookings(&self, user: User, trip_id: Uuid) -> Result<Vec<Booking>, Error>;
    async fn list_my_bookings(&self, user: User) -> Result<Vec<Booking>, Error>;
}

#[async_trait]
pub trait WalletAPI {
    async fn find_wallet(&self, user: User, account_id: Uuid) -> Result<WalletAccount, Error>;
    async fn list_ledger_entries(
        &self,
        user: User,
        account_id: Uuid,
    ) -> Result<Vec<LedgerEntry>, Error>;
    /// Recomputes the balance from the entries and checks it against the cached value.
    async fn reconcile_wallet(&self, user: User, account_id: Uuid)
        -> Result<WalletAccount, Error>;
    async fn post_adjustment(
        &self,
        user: User,
        account_id: Uuid,
        params: NewAdjustment,
    ) -> Result<Posting, Error>;
}

#[async_trait]
pub trait WithdrawalAPI {
    async fn request_withdrawal(
        &self,
        user: User,
        params: NewWithdrawal,
    ) -> Result<Withdrawal, Error>;
    async fn approve_withdrawal(&self, user: User, id: Uuid) -> Result<Withdrawal, Error>;
    async fn reject_withdrawal(
        &self,
        user: User,
        id: Uuid,
        reason: String,
    ) -> Result<Withdrawal, Error>;
    async fn find_withdrawal(&self, user: User, id: Uuid) -> Result<Withdrawal, Error>;
    /// Admins see every request, drivers only their own.
    async fn list_withdrawals(
        &self,
        user: User,
        status: Option<WithdrawalStatus>,
    ) -> Result<Vec<Withdrawal>, Error>;
}

#[async_trait]
pub trait ReviewAPI {
    async fn submit_review(
        &self,
        user: User,
        trip_id: Uuid,
        params: NewReview,
    ) -> Result<Review, Error>;
    async fn driver_rating(&self, driver_id: Uuid) -> Result<DriverRating, Error>;
}

pub trait API: TripAPI + BookingAPI + WalletAPI + WithdrawalAPI + ReviewAPI {}

pub type DynAPI = Arc<dyn API + Send + Sync>;

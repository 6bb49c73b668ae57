mod locks;
mod memory;
mod postgres;

pub use locks::{LockKey, LockTable};
pub use memory::{MemoryStore, MemoryTx};
pub use postgres::{PgStore, PgTx};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{
    Booking, LedgerEntry, Posting, Review, Trip, WalletAccount, Withdrawal, WithdrawalStatus,
};
use crate::error::Error;

/// Filters for the public trip listing. Place filters are case-insensitive substrings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TripQuery {
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub date: Option<NaiveDate>,
}

impl TripQuery {
    pub fn matches(&self, trip: &Trip) -> bool {
        fn contains(haystack: &str, needle: &Option<String>) -> bool {
            needle
                .as_ref()
                .map_or(true, |n| haystack.to_lowercase().contains(&n.trim().to_lowercase()))
        }

        contains(&trip.details.origin, &self.origin)
            && contains(&trip.details.destination, &self.destination)
            && self.date.map_or(true, |d| trip.scheduled_at.date_naive() == d)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WithdrawalQuery {
    pub status: Option<WithdrawalStatus>,
    pub account_id: Option<Uuid>,
}

impl WithdrawalQuery {
    pub fn matches(&self, withdrawal: &Withdrawal) -> bool {
        self.status.map_or(true, |s| withdrawal.status == s)
            && self.account_id.map_or(true, |a| withdrawal.account_id == a)
    }
}

/// Persistence collaborator. Plain reads see committed state only; every mutation goes
/// through a [`StoreTx`].
#[async_trait]
pub trait Store: Send + Sync + 'static {
    type Tx: StoreTx;

    async fn begin(&self) -> Result<Self::Tx, Error>;

    async fn find_trip(&self, id: &Uuid) -> Result<Option<Trip>, Error>;
    async fn search_trips(&self, query: &TripQuery) -> Result<Vec<Trip>, Error>;

    async fn find_booking(&self, id: &Uuid) -> Result<Option<Booking>, Error>;
    async fn list_bookings_for_trip(&self, trip_id: &Uuid) -> Result<Vec<Booking>, Error>;
    async fn list_bookings_for_passenger(&self, passenger_id: &Uuid)
        -> Result<Vec<Booking>, Error>;

    /// Cached balance; an account without entries has a zero balance.
    async fn find_wallet(&self, account_id: &Uuid) -> Result<WalletAccount, Error>;
    async fn list_ledger_entries(&self, account_id: &Uuid) -> Result<Vec<LedgerEntry>, Error>;

    async fn find_withdrawal(&self, id: &Uuid) -> Result<Option<Withdrawal>, Error>;
    async fn list_withdrawals(&self, query: &WithdrawalQuery) -> Result<Vec<Withdrawal>, Error>;

    async fn list_reviews_for_driver(&self, driver_id: &Uuid) -> Result<Vec<Review>, Error>;
}

/// A unit of work. Locks taken through `*_for_update` / `lock_account` are held until the
/// transaction is committed or dropped; dropping without `commit` discards every write.
#[async_trait]
pub trait StoreTx: Send {
    async fn fetch_trip_for_update(&mut self, id: &Uuid) -> Result<Trip, Error>;
    async fn insert_trip(&mut self, trip: &Trip) -> Result<(), Error>;
    async fn update_trip(&mut self, trip: &Trip) -> Result<(), Error>;

    /// Bookings are only read and written while their trip is locked.
    async fn fetch_booking(&mut self, id: &Uuid) -> Result<Booking, Error>;
    async fn fetch_bookings_for_trip(&mut self, trip_id: &Uuid) -> Result<Vec<Booking>, Error>;
    async fn insert_booking(&mut self, booking: &Booking) -> Result<(), Error>;
    async fn update_booking(&mut self, booking: &Booking) -> Result<(), Error>;

    /// Serializes wallet mutations for the account and returns its current balance.
    async fn lock_account(&mut self, account_id: &Uuid) -> Result<WalletAccount, Error>;
    /// Appends unless `(kind, reference_id)` already exists, keeping the cached balance in step.
    async fn append_entry(&mut self, entry: &LedgerEntry) -> Result<Posting, Error>;
    /// Sum of entries from scratch, bypassing the cached balance.
    async fn sum_entries(&mut self, account_id: &Uuid) -> Result<rust_decimal::Decimal, Error>;

    async fn fetch_withdrawal_for_update(&mut self, id: &Uuid) -> Result<Withdrawal, Error>;
    async fn insert_withdrawal(&mut self, withdrawal: &Withdrawal) -> Result<(), Error>;
    async fn update_withdrawal(&mut self, withdrawal: &Withdrawal) -> Result<(), Error>;

    async fn review_exists(&mut self, trip_id: &Uuid, reviewer_id: &Uuid) -> Result<bool, Error>;
    async fn insert_review(&mut self, review: &Review) -> Result<(), Error>;

    async fn commit(self) -> Result<(), Error>;
}

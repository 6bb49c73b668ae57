use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::{OwnedMutexGuard, RwLock};
use uuid::Uuid;

use super::{LockKey, LockTable, Store, StoreTx, TripQuery, WithdrawalQuery};
use crate::entities::{
    ledger_sum, Booking, LedgerEntry, LedgerKind, Posting, Review, Trip, TripStatus,
    WalletAccount, Withdrawal,
};
use crate::error::{amount_overflow_error, duplicate_posting_error, not_found_error, Error};

#[derive(Debug, Default)]
struct Tables {
    trips: HashMap<Uuid, Trip>,
    bookings: HashMap<Uuid, Booking>,
    entries: Vec<LedgerEntry>,
    entry_keys: HashSet<(LedgerKind, Uuid)>,
    balances: HashMap<Uuid, Decimal>,
    withdrawals: HashMap<Uuid, Withdrawal>,
    reviews: HashMap<(Uuid, Uuid), Review>,
}

#[derive(Debug)]
struct Inner {
    tables: RwLock<Tables>,
    locks: LockTable,
    lock_timeout: Duration,
}

/// In-process store with the same locking contract as Postgres: per-entity mutexes taken
/// under a timeout, writes buffered in the transaction and applied at commit.
#[derive(Clone, Debug)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                tables: RwLock::new(Tables::default()),
                locks: LockTable::new(),
                lock_timeout,
            }),
        }
    }
}

#[derive(Debug, Default)]
struct Pending {
    trips: HashMap<Uuid, Trip>,
    bookings: HashMap<Uuid, Booking>,
    entries: Vec<LedgerEntry>,
    withdrawals: HashMap<Uuid, Withdrawal>,
    reviews: Vec<Review>,
}

pub struct MemoryTx {
    inner: Arc<Inner>,
    guards: HashMap<LockKey, OwnedMutexGuard<()>>,
    pending: Pending,
}

impl MemoryTx {
    async fn lock(&mut self, key: LockKey) -> Result<(), Error> {
        if self.guards.contains_key(&key) {
            return Ok(());
        }

        let guard = self.inner.locks.acquire(key, self.inner.lock_timeout).await?;
        self.guards.insert(key, guard);

        Ok(())
    }

    fn pending_balance(&self, account_id: &Uuid) -> Result<Decimal, Error> {
        ledger_sum(
            self.pending
                .entries
                .iter()
                .filter(|e| &e.account_id == account_id),
        )
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, Error> {
        Ok(MemoryTx {
            inner: self.inner.clone(),
            guards: HashMap::new(),
            pending: Pending::default(),
        })
    }

    async fn find_trip(&self, id: &Uuid) -> Result<Option<Trip>, Error> {
        Ok(self.inner.tables.read().await.trips.get(id).cloned())
    }

    async fn search_trips(&self, query: &TripQuery) -> Result<Vec<Trip>, Error> {
        let tables = self.inner.tables.read().await;

        let mut trips: Vec<Trip> = tables
            .trips
            .values()
            .filter(|t| t.status == TripStatus::Active && query.matches(t))
            .cloned()
            .collect();
        trips.sort_by_key(|t| t.scheduled_at);

        Ok(trips)
    }

    async fn find_booking(&self, id: &Uuid) -> Result<Option<Booking>, Error> {
        Ok(self.inner.tables.read().await.bookings.get(id).cloned())
    }

    async fn list_bookings_for_trip(&self, trip_id: &Uuid) -> Result<Vec<Booking>, Error> {
        let tables = self.inner.tables.read().await;

        Ok(sorted_bookings(
            tables.bookings.values().filter(|b| &b.trip_id == trip_id),
        ))
    }

    async fn list_bookings_for_passenger(
        &self,
        passenger_id: &Uuid,
    ) -> Result<Vec<Booking>, Error> {
        let tables = self.inner.tables.read().await;

        Ok(sorted_bookings(
            tables
                .bookings
                .values()
                .filter(|b| &b.passenger_id == passenger_id),
        ))
    }

    async fn find_wallet(&self, account_id: &Uuid) -> Result<WalletAccount, Error> {
        let tables = self.inner.tables.read().await;
        let balance = tables
            .balances
            .get(account_id)
            .copied()
            .unwrap_or(Decimal::ZERO);

        Ok(WalletAccount::new(*account_id, balance))
    }

    async fn list_ledger_entries(&self, account_id: &Uuid) -> Result<Vec<LedgerEntry>, Error> {
        let tables = self.inner.tables.read().await;

        Ok(tables
            .entries
            .iter()
            .rev()
            .filter(|e| &e.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn find_withdrawal(&self, id: &Uuid) -> Result<Option<Withdrawal>, Error> {
        Ok(self.inner.tables.read().await.withdrawals.get(id).cloned())
    }

    async fn list_withdrawals(&self, query: &WithdrawalQuery) -> Result<Vec<Withdrawal>, Error> {
        let tables = self.inner.tables.read().await;

        let mut withdrawals: Vec<Withdrawal> = tables
            .withdrawals
            .values()
            .filter(|w| query.matches(w))
            .cloned()
            .collect();
        withdrawals.sort_by_key(|w| w.created_at);

        Ok(withdrawals)
    }

    async fn list_reviews_for_driver(&self, driver_id: &Uuid) -> Result<Vec<Review>, Error> {
        let tables = self.inner.tables.read().await;

        let mut reviews: Vec<Review> = tables
            .reviews
            .values()
            .filter(|r| &r.driver_id == driver_id)
            .cloned()
            .collect();
        reviews.sort_by_key(|r| r.created_at);

        Ok(reviews)
    }
}

fn sorted_bookings<'a>(bookings: impl Iterator<Item = &'a Booking>) -> Vec<Booking> {
    let mut bookings: Vec<Booking> = bookings.cloned().collect();
    bookings.sort_by_key(|b| b.created_at);
    bookings
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn fetch_trip_for_update(&mut self, id: &Uuid) -> Result<Trip, Error> {
        self.lock(LockKey::Trip(*id)).await?;

        if let Some(trip) = self.pending.trips.get(id) {
            return Ok(trip.clone());
        }

        self.inner
            .tables
            .read()
            .await
            .trips
            .get(id)
            .cloned()
            .ok_or_else(not_found_error)
    }

    async fn insert_trip(&mut self, trip: &Trip) -> Result<(), Error> {
        self.pending.trips.insert(trip.id, trip.clone());
        Ok(())
    }

    async fn update_trip(&mut self, trip: &Trip) -> Result<(), Error> {
        self.pending.trips.insert(trip.id, trip.clone());
        Ok(())
    }

    async fn fetch_booking(&mut self, id: &Uuid) -> Result<Booking, Error> {
        if let Some(booking) = self.pending.bookings.get(id) {
            return Ok(booking.clone());
        }

        self.inner
            .tables
            .read()
            .await
            .bookings
            .get(id)
            .cloned()
            .ok_or_else(not_found_error)
    }

    async fn fetch_bookings_for_trip(&mut self, trip_id: &Uuid) -> Result<Vec<Booking>, Error> {
        let tables = self.inner.tables.read().await;

        let mut merged: HashMap<Uuid, &Booking> = tables
            .bookings
            .values()
            .filter(|b| &b.trip_id == trip_id)
            .map(|b| (b.id, b))
            .collect();

        for booking in self.pending.bookings.values() {
            if &booking.trip_id == trip_id {
                merged.insert(booking.id, booking);
            }
        }

        Ok(sorted_bookings(merged.into_values()))
    }

    async fn insert_booking(&mut self, booking: &Booking) -> Result<(), Error> {
        self.pending.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn update_booking(&mut self, booking: &Booking) -> Result<(), Error> {
        self.pending.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn lock_account(&mut self, account_id: &Uuid) -> Result<WalletAccount, Error> {
        self.lock(LockKey::Account(*account_id)).await?;

        let committed = self
            .inner
            .tables
            .read()
            .await
            .balances
            .get(account_id)
            .copied()
            .unwrap_or(Decimal::ZERO);

        let balance = committed
            .checked_add(self.pending_balance(account_id)?)
            .ok_or_else(amount_overflow_error)?;

        Ok(WalletAccount::new(*account_id, balance))
    }

    async fn append_entry(&mut self, entry: &LedgerEntry) -> Result<Posting, Error> {
        self.lock(LockKey::Account(entry.account_id)).await?;

        let key = entry.key();
        let seen = self.inner.tables.read().await.entry_keys.contains(&key)
            || self.pending.entries.iter().any(|e| e.key() == key);

        if seen {
            return Ok(Posting::Duplicate);
        }

        self.pending.entries.push(entry.clone());

        Ok(Posting::Posted(entry.clone()))
    }

    async fn sum_entries(&mut self, account_id: &Uuid) -> Result<Decimal, Error> {
        let committed = ledger_sum(
            self.inner
                .tables
                .read()
                .await
                .entries
                .iter()
                .filter(|e| &e.account_id == account_id),
        )?;

        committed
            .checked_add(self.pending_balance(account_id)?)
            .ok_or_else(amount_overflow_error)
    }

    async fn fetch_withdrawal_for_update(&mut self, id: &Uuid) -> Result<Withdrawal, Error> {
        self.lock(LockKey::Withdrawal(*id)).await?;

        if let Some(withdrawal) = self.pending.withdrawals.get(id) {
            return Ok(withdrawal.clone());
        }

        self.inner
            .tables
            .read()
            .await
            .withdrawals
            .get(id)
            .cloned()
            .ok_or_else(not_found_error)
    }

    async fn insert_withdrawal(&mut self, withdrawal: &Withdrawal) -> Result<(), Error> {
        self.pending
            .withdrawals
            .insert(withdrawal.id, withdrawal.clone());
        Ok(())
    }

    async fn update_withdrawal(&mut self, withdrawal: &Withdrawal) -> Result<(), Error> {
        self.pending
            .withdrawals
            .insert(withdrawal.id, withdrawal.clone());
        Ok(())
    }

    async fn review_exists(&mut self, trip_id: &Uuid, reviewer_id: &Uuid) -> Result<bool, Error> {
        let pending = self
            .pending
            .reviews
            .iter()
            .any(|r| &r.trip_id == trip_id && &r.reviewer_id == reviewer_id);

        Ok(pending
            || self
                .inner
                .tables
                .read()
                .await
                .reviews
                .contains_key(&(*trip_id, *reviewer_id)))
    }

    async fn insert_review(&mut self, review: &Review) -> Result<(), Error> {
        self.pending.reviews.push(review.clone());
        Ok(())
    }

    async fn commit(self) -> Result<(), Error> {
        let MemoryTx {
            inner,
            guards,
            pending,
        } = self;

        let mut tables = inner.tables.write().await;

        // all-or-nothing: validate before touching any table
        if let Some(entry) = pending
            .entries
            .iter()
            .find(|e| tables.entry_keys.contains(&e.key()))
        {
            tracing::error!(
                kind = ?entry.kind,
                reference_id = %entry.reference_id,
                "ledger key committed concurrently"
            );
            return Err(duplicate_posting_error());
        }

        let mut balances: HashMap<Uuid, Decimal> = HashMap::new();
        for entry in &pending.entries {
            let current = match balances.get(&entry.account_id) {
                Some(balance) => *balance,
                None => tables
                    .balances
                    .get(&entry.account_id)
                    .copied()
                    .unwrap_or(Decimal::ZERO),
            };

            let next = current.checked_add(entry.amount).ok_or_else(|| {
                tracing::error!(account_id = %entry.account_id, "wallet balance overflow");
                amount_overflow_error()
            })?;

            balances.insert(entry.account_id, next);
        }

        tables.trips.extend(pending.trips);
        tables.bookings.extend(pending.bookings);
        tables.withdrawals.extend(pending.withdrawals);

        for review in pending.reviews {
            tables
                .reviews
                .insert((review.trip_id, review.reviewer_id), review);
        }

        tables.balances.extend(balances);

        for entry in pending.entries {
            tables.entry_keys.insert(entry.key());
            tables.entries.push(entry);
        }

        drop(tables);
        drop(guards);

        Ok(())
    }
}

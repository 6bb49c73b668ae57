use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    types::Json,
    Executor, Pool, Postgres, Row, Transaction,
};
use uuid::Uuid;

use super::{Store, StoreTx, TripQuery, WithdrawalQuery};
use crate::entities::{
    Booking, LedgerEntry, Posting, Review, Trip, TripStatus, WalletAccount, Withdrawal,
};
use crate::error::{not_found_error, Error};

pub struct PgStore {
    pool: Pool<Postgres>,
    lock_timeout: Duration,
}

impl PgStore {
    #[tracing::instrument(name = "PgStore::new", skip(db_uri))]
    pub async fn new(
        db_uri: &str,
        max_connections: u32,
        lock_timeout: Duration,
    ) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(db_uri)
            .await?;

        // TODO: move this to migrations
        pool.execute("CREATE TABLE IF NOT EXISTS trips (id UUID PRIMARY KEY, driver_id UUID NOT NULL, status VARCHAR NOT NULL, scheduled_at TIMESTAMPTZ NOT NULL, data JSONB NOT NULL)")
            .await?;
        pool.execute("CREATE TABLE IF NOT EXISTS bookings (id UUID PRIMARY KEY, trip_id UUID NOT NULL REFERENCES trips(id), passenger_id UUID NOT NULL, status VARCHAR NOT NULL, created_at TIMESTAMPTZ NOT NULL, data JSONB NOT NULL)")
            .await?;
        pool.execute("CREATE TABLE IF NOT EXISTS ledger_entries (id UUID PRIMARY KEY, account_id UUID NOT NULL, kind VARCHAR NOT NULL, reference_id UUID NOT NULL, amount NUMERIC NOT NULL, created_at TIMESTAMPTZ NOT NULL, data JSONB NOT NULL, UNIQUE (kind, reference_id))")
            .await?;
        pool.execute("CREATE TABLE IF NOT EXISTS wallets (account_id UUID PRIMARY KEY, balance NUMERIC NOT NULL DEFAULT 0)")
            .await?;
        pool.execute("CREATE TABLE IF NOT EXISTS withdrawals (id UUID PRIMARY KEY, account_id UUID NOT NULL, status VARCHAR NOT NULL, created_at TIMESTAMPTZ NOT NULL, data JSONB NOT NULL)")
            .await?;
        pool.execute("CREATE TABLE IF NOT EXISTS reviews (trip_id UUID NOT NULL REFERENCES trips(id), reviewer_id UUID NOT NULL, driver_id UUID NOT NULL, created_at TIMESTAMPTZ NOT NULL, data JSONB NOT NULL, PRIMARY KEY (trip_id, reviewer_id))")
            .await?;

        Ok(Self { pool, lock_timeout })
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

fn data<T: DeserializeOwned>(row: &PgRow) -> Result<T, Error> {
    let Json(value): Json<T> = row.try_get("data")?;

    Ok(value)
}

fn all<T: DeserializeOwned>(rows: &[PgRow]) -> Result<Vec<T>, Error> {
    rows.iter().map(data).collect()
}

#[async_trait]
impl Store for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx, Error> {
        let mut tx = self.pool.begin().await?;

        // a blocked row lock surfaces as SQLSTATE 55P03, reported as busy
        tx.execute(
            format!(
                "SET LOCAL lock_timeout = '{}ms'",
                self.lock_timeout.as_millis()
            )
            .as_str(),
        )
        .await?;

        Ok(PgTx { tx })
    }

    async fn find_trip(&self, id: &Uuid) -> Result<Option<Trip>, Error> {
        sqlx::query("SELECT data FROM trips WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(data)
            .transpose()
    }

    async fn search_trips(&self, query: &TripQuery) -> Result<Vec<Trip>, Error> {
        let rows = sqlx::query("SELECT data FROM trips WHERE status = $1 ORDER BY scheduled_at")
            .bind(TripStatus::Active.name())
            .fetch_all(&self.pool)
            .await?;

        let trips: Vec<Trip> = all(&rows)?;

        Ok(trips.into_iter().filter(|t| query.matches(t)).collect())
    }

    async fn find_booking(&self, id: &Uuid) -> Result<Option<Booking>, Error> {
        sqlx::query("SELECT data FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(data)
            .transpose()
    }

    async fn list_bookings_for_trip(&self, trip_id: &Uuid) -> Result<Vec<Booking>, Error> {
        let rows = sqlx::query("SELECT data FROM bookings WHERE trip_id = $1 ORDER BY created_at")
            .bind(trip_id)
            .fetch_all(&self.pool)
            .await?;

        all(&rows)
    }

    async fn list_bookings_for_passenger(
        &self,
        passenger_id: &Uuid,
    ) -> Result<Vec<Booking>, Error> {
        let rows =
            sqlx::query("SELECT data FROM bookings WHERE passenger_id = $1 ORDER BY created_at")
                .bind(passenger_id)
                .fetch_all(&self.pool)
                .await?;

        all(&rows)
    }

    async fn find_wallet(&self, account_id: &Uuid) -> Result<WalletAccount, Error> {
        let balance: Option<Decimal> =
            sqlx::query_scalar("SELECT balance FROM wallets WHERE account_id = $1")
                .bind(account_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(WalletAccount::new(
            *account_id,
            balance.unwrap_or(Decimal::ZERO),
        ))
    }

    async fn list_ledger_entries(&self, account_id: &Uuid) -> Result<Vec<LedgerEntry>, Error> {
        let rows = sqlx::query(
            "SELECT data FROM ledger_entries WHERE account_id = $1 ORDER BY created_at DESC",
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        all(&rows)
    }

    async fn find_withdrawal(&self, id: &Uuid) -> Result<Option<Withdrawal>, Error> {
        sqlx::query("SELECT data FROM withdrawals WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(data)
            .transpose()
    }

    async fn list_withdrawals(&self, query: &WithdrawalQuery) -> Result<Vec<Withdrawal>, Error> {
        let rows = sqlx::query(
            "SELECT data FROM withdrawals
             WHERE ($1::VARCHAR IS NULL OR status = $1)
               AND ($2::UUID IS NULL OR account_id = $2)
             ORDER BY created_at",
        )
        .bind(query.status.map(|s| s.name()))
        .bind(query.account_id)
        .fetch_all(&self.pool)
        .await?;

        all(&rows)
    }

    async fn list_reviews_for_driver(&self, driver_id: &Uuid) -> Result<Vec<Review>, Error> {
        let rows = sqlx::query("SELECT data FROM reviews WHERE driver_id = $1 ORDER BY created_at")
            .bind(driver_id)
            .fetch_all(&self.pool)
            .await?;

        all(&rows)
    }
}

#[async_trait]
impl StoreTx for PgTx {
    #[tracing::instrument(skip(self))]
    async fn fetch_trip_for_update(&mut self, id: &Uuid) -> Result<Trip, Error> {
        let row = sqlx::query("SELECT data FROM trips WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut self.tx)
            .await?
            .ok_or_else(not_found_error)?;

        data(&row)
    }

    async fn insert_trip(&mut self, trip: &Trip) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO trips (id, driver_id, status, scheduled_at, data) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&trip.id)
        .bind(&trip.driver_id)
        .bind(trip.status.name())
        .bind(&trip.scheduled_at)
        .bind(Json(trip))
        .execute(&mut self.tx)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self, trip), fields(trip_id = %trip.id))]
    async fn update_trip(&mut self, trip: &Trip) -> Result<(), Error> {
        sqlx::query("UPDATE trips SET status = $2, data = $3 WHERE id = $1")
            .bind(&trip.id)
            .bind(trip.status.name())
            .bind(Json(trip))
            .execute(&mut self.tx)
            .await?;

        Ok(())
    }

    async fn fetch_booking(&mut self, id: &Uuid) -> Result<Booking, Error> {
        let row = sqlx::query("SELECT data FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut self.tx)
            .await?
            .ok_or_else(not_found_error)?;

        data(&row)
    }

    async fn fetch_bookings_for_trip(&mut self, trip_id: &Uuid) -> Result<Vec<Booking>, Error> {
        let rows = sqlx::query("SELECT data FROM bookings WHERE trip_id = $1 ORDER BY created_at")
            .bind(trip_id)
            .fetch_all(&mut self.tx)
            .await?;

        all(&rows)
    }

    async fn insert_booking(&mut self, booking: &Booking) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO bookings (id, trip_id, passenger_id, status, created_at, data) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&booking.id)
        .bind(&booking.trip_id)
        .bind(&booking.passenger_id)
        .bind(booking.status.name())
        .bind(&booking.created_at)
        .bind(Json(booking))
        .execute(&mut self.tx)
        .await?;

        Ok(())
    }

    async fn update_booking(&mut self, booking: &Booking) -> Result<(), Error> {
        sqlx::query("UPDATE bookings SET status = $2, data = $3 WHERE id = $1")
            .bind(&booking.id)
            .bind(booking.status.name())
            .bind(Json(booking))
            .execute(&mut self.tx)
            .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn lock_account(&mut self, account_id: &Uuid) -> Result<WalletAccount, Error> {
        sqlx::query(
            "INSERT INTO wallets (account_id, balance) VALUES ($1, 0) ON CONFLICT (account_id) DO NOTHING",
        )
        .bind(account_id)
        .execute(&mut self.tx)
        .await?;

        let balance: Decimal =
            sqlx::query_scalar("SELECT balance FROM wallets WHERE account_id = $1 FOR UPDATE")
                .bind(account_id)
                .fetch_one(&mut self.tx)
                .await?;

        Ok(WalletAccount::new(*account_id, balance))
    }

    #[tracing::instrument(skip(self, entry), fields(kind = ?entry.kind, reference_id = %entry.reference_id))]
    async fn append_entry(&mut self, entry: &LedgerEntry) -> Result<Posting, Error> {
        let inserted = sqlx::query(
            "INSERT INTO ledger_entries (id, account_id, kind, reference_id, amount, created_at, data)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (kind, reference_id) DO NOTHING",
        )
        .bind(&entry.id)
        .bind(&entry.account_id)
        .bind(entry.kind.name())
        .bind(&entry.reference_id)
        .bind(&entry.amount)
        .bind(&entry.created_at)
        .bind(Json(entry))
        .execute(&mut self.tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            return Ok(Posting::Duplicate);
        }

        sqlx::query(
            "INSERT INTO wallets (account_id, balance) VALUES ($1, $2)
             ON CONFLICT (account_id) DO UPDATE SET balance = wallets.balance + EXCLUDED.balance",
        )
        .bind(&entry.account_id)
        .bind(&entry.amount)
        .execute(&mut self.tx)
        .await?;

        Ok(Posting::Posted(entry.clone()))
    }

    async fn sum_entries(&mut self, account_id: &Uuid) -> Result<Decimal, Error> {
        let total: Decimal = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0) FROM ledger_entries WHERE account_id = $1",
        )
        .bind(account_id)
        .fetch_one(&mut self.tx)
        .await?;

        Ok(total)
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_withdrawal_for_update(&mut self, id: &Uuid) -> Result<Withdrawal, Error> {
        let row = sqlx::query("SELECT data FROM withdrawals WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut self.tx)
            .await?
            .ok_or_else(not_found_error)?;

        data(&row)
    }

    async fn insert_withdrawal(&mut self, withdrawal: &Withdrawal) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO withdrawals (id, account_id, status, created_at, data) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&withdrawal.id)
        .bind(&withdrawal.account_id)
        .bind(withdrawal.status.name())
        .bind(&withdrawal.created_at)
        .bind(Json(withdrawal))
        .execute(&mut self.tx)
        .await?;

        Ok(())
    }

    async fn update_withdrawal(&mut self, withdrawal: &Withdrawal) -> Result<(), Error> {
        sqlx::query("UPDATE withdrawals SET status = $2, data = $3 WHERE id = $1")
            .bind(&withdrawal.id)
            .bind(withdrawal.status.name())
            .bind(Json(withdrawal))
            .execute(&mut self.tx)
            .await?;

        Ok(())
    }

    async fn review_exists(&mut self, trip_id: &Uuid, reviewer_id: &Uuid) -> Result<bool, Error> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM reviews WHERE trip_id = $1 AND reviewer_id = $2)",
        )
        .bind(trip_id)
        .bind(reviewer_id)
        .fetch_one(&mut self.tx)
        .await?;

        Ok(exists)
    }

    async fn insert_review(&mut self, review: &Review) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO reviews (trip_id, reviewer_id, driver_id, created_at, data) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&review.trip_id)
        .bind(&review.reviewer_id)
        .bind(&review.driver_id)
        .bind(&review.created_at)
        .bind(Json(review))
        .execute(&mut self.tx)
        .await?;

        Ok(())
    }

    async fn commit(self) -> Result<(), Error> {
        self.tx.commit().await?;

        Ok(())
    }
}

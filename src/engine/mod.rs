mod booking_api;
mod helpers;
mod review_api;
mod trip_api;
mod wallet_api;
mod withdrawal_api;

use oso::Oso;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    api::API,
    auth::authorizor,
    config::Settings,
    db::{Store, StoreTx},
    entities::{LedgerEntry, Posting},
    error::{invalid_amount_error, unauthorized_error, Error},
    notifier::{Event, Notifier},
};

pub struct Engine<S: Store> {
    store: S,
    authorizor: Oso,
    notifier: Notifier,
    settings: Settings,
}

impl<S: Store> Engine<S> {
    #[tracing::instrument(name = "Engine::new", skip_all)]
    pub fn new(store: S, notifier: Notifier, settings: Settings) -> Result<Self, Error> {
        Ok(Self {
            store,
            authorizor: authorizor::new()?,
            notifier,
            settings,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn authorize<Actor, Action, Resource>(
        &self,
        actor: Actor,
        action: Action,
        resource: Resource,
    ) -> Result<(), Error>
    where
        Actor: oso::ToPolar,
        Action: oso::ToPolar,
        Resource: oso::ToPolar,
    {
        if self.authorizor.is_allowed(actor, action, resource)? {
            return Ok(());
        }

        Err(unauthorized_error())
    }

    /// Commits, then hands the collected events to the notifier. Nothing is published for a
    /// transaction that fails to commit.
    async fn commit(&self, tx: S::Tx, events: Vec<Event>) -> Result<(), Error> {
        tx.commit().await?;
        self.notifier.publish_all(events);

        Ok(())
    }

    /// Posts the credit for a completed trip. Re-posting the same trip is a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn credit(
        &self,
        account_id: Uuid,
        amount: Decimal,
        trip_id: Uuid,
    ) -> Result<Posting, Error> {
        if amount.is_sign_negative() {
            return Err(invalid_amount_error());
        }

        self.post(LedgerEntry::trip_credit(account_id, amount, trip_id))
            .await
    }

    /// Posts the debit for an approved withdrawal. Re-posting the same withdrawal is a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn debit(
        &self,
        account_id: Uuid,
        amount: Decimal,
        withdrawal_id: Uuid,
    ) -> Result<Posting, Error> {
        if amount <= Decimal::ZERO {
            return Err(invalid_amount_error());
        }

        self.post(LedgerEntry::withdrawal_debit(
            account_id,
            amount,
            withdrawal_id,
        ))
        .await
    }

    async fn post(&self, entry: LedgerEntry) -> Result<Posting, Error> {
        let mut tx = self.store.begin().await?;
        let mut events = vec![];

        tx.lock_account(&entry.account_id).await?;
        let posting = helpers::post_entry(&mut tx, &entry, &mut events).await?;

        self.commit(tx, events).await?;

        Ok(posting)
    }
}

impl<S: Store> API for Engine<S> {}

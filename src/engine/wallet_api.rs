use super::helpers::post_entry;
use super::Engine;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    api::{NewAdjustment, WalletAPI},
    auth::{Account, Platform, User},
    db::{Store, StoreTx},
    entities::{LedgerEntry, Posting, WalletAccount},
    error::{balance_mismatch_error, invalid_amount_error, invalid_input_error, Error},
};

#[async_trait]
impl<S: Store> WalletAPI for Engine<S> {
    #[tracing::instrument(skip(self))]
    async fn find_wallet(&self, user: User, account_id: Uuid) -> Result<WalletAccount, Error> {
        self.authorize(user, "read", Account::new(account_id))?;

        self.store.find_wallet(&account_id).await
    }

    #[tracing::instrument(skip(self))]
    async fn list_ledger_entries(
        &self,
        user: User,
        account_id: Uuid,
    ) -> Result<Vec<LedgerEntry>, Error> {
        self.authorize(user, "read", Account::new(account_id))?;

        self.store.list_ledger_entries(&account_id).await
    }

    #[tracing::instrument(skip(self))]
    async fn reconcile_wallet(
        &self,
        user: User,
        account_id: Uuid,
    ) -> Result<WalletAccount, Error> {
        self.authorize(user, "read", Account::new(account_id))?;

        // read-only: the transaction only exists to hold the account lock
        let mut tx = self.store.begin().await?;

        let cached = tx.lock_account(&account_id).await?;
        let computed = tx.sum_entries(&account_id).await?;

        if cached.balance != computed {
            tracing::error!(
                cached = %cached.balance,
                %computed,
                "wallet balance disagrees with its ledger"
            );
            return Err(balance_mismatch_error());
        }

        Ok(WalletAccount::new(account_id, computed))
    }

    #[tracing::instrument(skip(self, params), fields(amount = %params.amount, reference_id = %params.reference_id))]
    async fn post_adjustment(
        &self,
        user: User,
        account_id: Uuid,
        params: NewAdjustment,
    ) -> Result<Posting, Error> {
        self.authorize(user, "administer", Platform::default())?;

        if params.amount.is_zero() {
            return Err(invalid_amount_error());
        }

        let note = params.note.trim();
        if note.is_empty() {
            return Err(invalid_input_error());
        }

        let entry =
            LedgerEntry::adjustment(account_id, params.amount, params.reference_id, note.into());

        let mut tx = self.store.begin().await?;
        let mut events = vec![];

        tx.lock_account(&account_id).await?;
        let posting = post_entry(&mut tx, &entry, &mut events).await?;

        self.commit(tx, events).await?;

        Ok(posting)
    }
}

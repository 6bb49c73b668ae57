use super::helpers::post_entry;
use super::Engine;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    api::{NewWithdrawal, WithdrawalAPI},
    auth::{Account, Platform, User},
    db::{Store, StoreTx, WithdrawalQuery},
    entities::{LedgerEntry, Posting, Withdrawal, WithdrawalStatus},
    error::{duplicate_posting_error, insufficient_balance_error, not_found_error, Error},
    notifier::Event,
};

#[async_trait]
impl<S: Store> WithdrawalAPI for Engine<S> {
    /// Records the request only; no money moves until an admin approves it.
    #[tracing::instrument(skip(self, params), fields(amount = %params.amount))]
    async fn request_withdrawal(
        &self,
        user: User,
        params: NewWithdrawal,
    ) -> Result<Withdrawal, Error> {
        let account_id = user.id;

        self.authorize(user, "request_withdrawal", Account::new(account_id))?;

        let withdrawal = Withdrawal::new(account_id, params.amount, params.method)?;

        let mut tx = self.store.begin().await?;
        let wallet = tx.lock_account(&account_id).await?;

        if !wallet.covers(withdrawal.amount) {
            tracing::warn!(balance = %wallet.balance, "withdrawal exceeds balance");
            return Err(insufficient_balance_error());
        }

        tx.insert_withdrawal(&withdrawal).await?;

        self.commit(
            tx,
            vec![Event::WithdrawalRequested {
                withdrawal_id: withdrawal.id,
                account_id,
                amount: withdrawal.amount,
            }],
        )
        .await?;

        tracing::info!(withdrawal_id = %withdrawal.id, "withdrawal requested");

        Ok(withdrawal)
    }

    /// Balance re-check, debit and status flip commit together or not at all.
    #[tracing::instrument(skip(self))]
    async fn approve_withdrawal(&self, user: User, id: Uuid) -> Result<Withdrawal, Error> {
        self.authorize(user, "administer", Platform::default())?;

        let account_id = self
            .store
            .find_withdrawal(&id)
            .await?
            .ok_or_else(not_found_error)?
            .account_id;

        let mut tx = self.store.begin().await?;

        // account before withdrawal, matching every other wallet mutation
        let wallet = tx.lock_account(&account_id).await?;
        let mut withdrawal = tx.fetch_withdrawal_for_update(&id).await?;

        withdrawal.approve()?;

        if !wallet.covers(withdrawal.amount) {
            tracing::warn!(
                balance = %wallet.balance,
                amount = %withdrawal.amount,
                "balance no longer covers withdrawal"
            );
            return Err(insufficient_balance_error());
        }

        let mut events = vec![];
        let entry = LedgerEntry::withdrawal_debit(account_id, withdrawal.amount, withdrawal.id);

        if let Posting::Duplicate = post_entry(&mut tx, &entry, &mut events).await? {
            tracing::error!("debit already posted for a pending withdrawal");
            return Err(duplicate_posting_error());
        }

        tx.update_withdrawal(&withdrawal).await?;

        events.push(Event::WithdrawalApproved {
            withdrawal_id: id,
            account_id,
            amount: withdrawal.amount,
        });

        self.commit(tx, events).await?;

        tracing::info!("withdrawal approved");

        Ok(withdrawal)
    }

    #[tracing::instrument(skip(self, reason))]
    async fn reject_withdrawal(
        &self,
        user: User,
        id: Uuid,
        reason: String,
    ) -> Result<Withdrawal, Error> {
        self.authorize(user, "administer", Platform::default())?;

        let mut tx = self.store.begin().await?;
        let mut withdrawal = tx.fetch_withdrawal_for_update(&id).await?;

        withdrawal.reject(reason)?;

        tx.update_withdrawal(&withdrawal).await?;

        self.commit(
            tx,
            vec![Event::WithdrawalRejected {
                withdrawal_id: id,
                account_id: withdrawal.account_id,
            }],
        )
        .await?;

        tracing::info!("withdrawal rejected");

        Ok(withdrawal)
    }

    #[tracing::instrument(skip(self))]
    async fn find_withdrawal(&self, user: User, id: Uuid) -> Result<Withdrawal, Error> {
        let withdrawal = self
            .store
            .find_withdrawal(&id)
            .await?
            .ok_or_else(not_found_error)?;

        self.authorize(user, "read", withdrawal.clone())?;

        Ok(withdrawal)
    }

    #[tracing::instrument(skip(self))]
    async fn list_withdrawals(
        &self,
        user: User,
        status: Option<WithdrawalStatus>,
    ) -> Result<Vec<Withdrawal>, Error> {
        let account_id = if user.is_admin() { None } else { Some(user.id) };

        self.store
            .list_withdrawals(&WithdrawalQuery { status, account_id })
            .await
    }
}

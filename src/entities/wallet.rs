use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::LedgerEntry;
use crate::error::{amount_overflow_error, Error};

/// Driver wallet. The balance is derived from the ledger and is never written on its own.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletAccount {
    pub account_id: Uuid,
    pub balance: Decimal,
    pub standing: Standing,
}

/// A negative balance means the driver owes the platform (e.g. commission on cash rides).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Standing {
    InCredit,
    Settled,
    Owing,
}

impl WalletAccount {
    pub fn new(account_id: Uuid, balance: Decimal) -> Self {
        let standing = if balance.is_zero() {
            Standing::Settled
        } else if balance.is_sign_negative() {
            Standing::Owing
        } else {
            Standing::InCredit
        };

        Self {
            account_id,
            balance,
            standing,
        }
    }

    pub fn from_entries<'a>(
        account_id: Uuid,
        entries: impl IntoIterator<Item = &'a LedgerEntry>,
    ) -> Result<Self, Error> {
        Ok(Self::new(account_id, sum(entries)?))
    }

    pub fn may_accept_cash_rides(&self) -> bool {
        self.standing != Standing::Owing
    }

    pub fn covers(&self, amount: Decimal) -> bool {
        self.balance >= amount
    }
}

pub fn sum<'a>(entries: impl IntoIterator<Item = &'a LedgerEntry>) -> Result<Decimal, Error> {
    entries.into_iter().try_fold(Decimal::ZERO, |total, entry| {
        total
            .checked_add(entry.amount)
            .ok_or_else(amount_overflow_error)
    })
}

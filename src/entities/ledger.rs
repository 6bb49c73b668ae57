use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{invalid_amount_error, Error};

/// Largest magnitude a single posting may carry.
pub const MAX_POSTING: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// Append-only financial record. `(kind, reference_id)` is unique across the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub account_id: Uuid,
    pub amount: Decimal,
    pub kind: Kind,
    pub reference_id: Uuid,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    TripCredit,
    WithdrawalDebit,
    Adjustment,
}

impl Kind {
    pub fn name(&self) -> String {
        match self {
            Self::TripCredit => "trip_credit".into(),
            Self::WithdrawalDebit => "withdrawal_debit".into(),
            Self::Adjustment => "adjustment".into(),
        }
    }
}

impl LedgerEntry {
    pub fn trip_credit(account_id: Uuid, amount: Decimal, trip_id: Uuid) -> Self {
        Self::new(account_id, amount, Kind::TripCredit, trip_id, None)
    }

    pub fn withdrawal_debit(account_id: Uuid, amount: Decimal, withdrawal_id: Uuid) -> Self {
        Self::new(account_id, -amount.abs(), Kind::WithdrawalDebit, withdrawal_id, None)
    }

    pub fn adjustment(account_id: Uuid, amount: Decimal, reference_id: Uuid, note: String) -> Self {
        Self::new(account_id, amount, Kind::Adjustment, reference_id, Some(note))
    }

    fn new(
        account_id: Uuid,
        amount: Decimal,
        kind: Kind,
        reference_id: Uuid,
        note: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            amount,
            kind,
            reference_id,
            note,
            created_at: Utc::now(),
        }
    }

    pub fn check_amount(&self) -> Result<(), Error> {
        if self.amount.abs() > MAX_POSTING {
            return Err(invalid_amount_error());
        }

        Ok(())
    }

    pub fn key(&self) -> (Kind, Uuid) {
        (self.kind, self.reference_id)
    }
}

/// Outcome of appending to the ledger; a repeated key is a no-op, not a second posting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "entry", rename_all = "snake_case")]
pub enum Posting {
    Posted(LedgerEntry),
    Duplicate,
}

impl Posting {
    pub fn is_posted(&self) -> bool {
        matches!(self, Self::Posted(_))
    }
}

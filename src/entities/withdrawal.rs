use chrono::{DateTime, Utc};
use oso::PolarClass;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{
    already_resolved_error, invalid_amount_error, invalid_input_error,
    invalid_payout_details_error, Error,
};

#[derive(Clone, Debug, Serialize, Deserialize, PolarClass)]
pub struct Withdrawal {
    #[polar(attribute)]
    pub id: Uuid,
    #[polar(attribute)]
    pub account_id: Uuid,
    pub amount: Decimal,
    pub method: PayoutMethod,
    pub status: Status,
    pub admin_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PayoutMethod {
    Upi {
        upi_id: String,
    },
    Bank {
        account_number: String,
        ifsc: String,
        #[serde(default)]
        holder_name: String,
    },
}

impl PayoutMethod {
    pub fn validate(&self) -> Result<(), Error> {
        let complete = match self {
            Self::Upi { upi_id } => !upi_id.trim().is_empty(),
            Self::Bank {
                account_number,
                ifsc,
                holder_name: _,
            } => !account_number.trim().is_empty() && !ifsc.trim().is_empty(),
        };

        if !complete {
            return Err(invalid_payout_details_error());
        }

        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Approved,
    Rejected,
}

impl Status {
    pub fn name(&self) -> String {
        match self {
            Self::Pending => "pending".into(),
            Self::Approved => "approved".into(),
            Self::Rejected => "rejected".into(),
        }
    }
}

impl Withdrawal {
    pub fn new(account_id: Uuid, amount: Decimal, method: PayoutMethod) -> Result<Self, Error> {
        if amount <= Decimal::ZERO {
            return Err(invalid_amount_error());
        }

        method.validate()?;

        Ok(Self {
            id: Uuid::new_v4(),
            account_id,
            amount,
            method,
            status: Status::Pending,
            admin_note: None,
            created_at: Utc::now(),
            resolved_at: None,
        })
    }

    #[tracing::instrument(skip(self), fields(withdrawal_id = %self.id))]
    pub fn approve(&mut self) -> Result<(), Error> {
        self.resolve(Status::Approved, None)
    }

    #[tracing::instrument(skip(self), fields(withdrawal_id = %self.id))]
    pub fn reject(&mut self, reason: String) -> Result<(), Error> {
        if reason.trim().is_empty() {
            return Err(invalid_input_error());
        }

        self.resolve(Status::Rejected, Some(reason.trim().to_string()))
    }

    fn resolve(&mut self, status: Status, note: Option<String>) -> Result<(), Error> {
        if self.status != Status::Pending {
            return Err(already_resolved_error());
        }

        self.status = status;
        self.admin_note = note;
        self.resolved_at = Some(Utc::now());

        Ok(())
    }
}

use async_channel::{Receiver, Sender, TrySendError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::LedgerKind;

/// Domain events handed to external subscribers (UI refresh, push). Delivery is best effort
/// and unordered with respect to later reads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    TripPublished { trip_id: Uuid, driver_id: Uuid },
    BookingRequested { booking_id: Uuid, trip_id: Uuid, driver_id: Uuid, seats: i32 },
    BookingApproved { booking_id: Uuid, trip_id: Uuid, passenger_id: Uuid },
    BookingRejected { booking_id: Uuid, trip_id: Uuid, passenger_id: Uuid },
    BookingCancelled { booking_id: Uuid, trip_id: Uuid, passenger_id: Uuid, driver_id: Uuid },
    TripFull { trip_id: Uuid },
    TripReopened { trip_id: Uuid },
    OtpIssued { trip_id: Uuid, passenger_ids: Vec<Uuid>, code: String },
    TripStarted { trip_id: Uuid },
    TripCompleted { trip_id: Uuid, driver_id: Uuid, fare: Decimal },
    TripCancelled { trip_id: Uuid, passenger_ids: Vec<Uuid> },
    LedgerPosted { account_id: Uuid, kind: LedgerKind, reference_id: Uuid, amount: Decimal },
    WithdrawalRequested { withdrawal_id: Uuid, account_id: Uuid, amount: Decimal },
    WithdrawalApproved { withdrawal_id: Uuid, account_id: Uuid, amount: Decimal },
    WithdrawalRejected { withdrawal_id: Uuid, account_id: Uuid },
    ReviewSubmitted { trip_id: Uuid, driver_id: Uuid, rating: u8 },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Self::TripPublished { .. } => "trip_published",
            Self::BookingRequested { .. } => "booking_requested",
            Self::BookingApproved { .. } => "booking_approved",
            Self::BookingRejected { .. } => "booking_rejected",
            Self::BookingCancelled { .. } => "booking_cancelled",
            Self::TripFull { .. } => "trip_full",
            Self::TripReopened { .. } => "trip_reopened",
            Self::OtpIssued { .. } => "otp_issued",
            Self::TripStarted { .. } => "trip_started",
            Self::TripCompleted { .. } => "trip_completed",
            Self::TripCancelled { .. } => "trip_cancelled",
            Self::LedgerPosted { .. } => "ledger_posted",
            Self::WithdrawalRequested { .. } => "withdrawal_requested",
            Self::WithdrawalApproved { .. } => "withdrawal_approved",
            Self::WithdrawalRejected { .. } => "withdrawal_rejected",
            Self::ReviewSubmitted { .. } => "review_submitted",
        }
    }
}

/// Outbound side of the event channel. Publishing never waits: a full or closed channel
/// drops the event with a warning.
#[derive(Clone, Debug)]
pub struct Notifier {
    tx: Sender<Event>,
}

impl Notifier {
    pub fn new(capacity: usize) -> (Self, Receiver<Event>) {
        let (tx, rx) = async_channel::bounded(capacity.max(1));

        (Self { tx }, rx)
    }

    pub fn publish(&self, event: Event) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::warn!(event = event.name(), "event channel full, dropping event");
            }
            Err(TrySendError::Closed(event)) => {
                tracing::debug!(event = event.name(), "no event subscribers");
            }
        }
    }

    pub fn publish_all(&self, events: impl IntoIterator<Item = Event>) {
        for event in events {
            self.publish(event);
        }
    }
}

/// Drains the channel into the log. Stands in for the push/UI collaborator when none is wired.
pub fn spawn_log_sink(rx: Receiver<Event>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(payload) => tracing::info!(event = event.name(), %payload, "event"),
                Err(err) => tracing::warn!(event = event.name(), %err, "unserializable event"),
            }
        }
    })
}

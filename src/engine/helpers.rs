use uuid::Uuid;

use crate::{
    db::StoreTx,
    entities::{LedgerEntry, Posting, Trip},
    error::Error,
    notifier::Event,
};

/// Locks the trip row and refuses to work on a corrupted seat inventory.
#[tracing::instrument(skip(tx))]
pub async fn lock_trip<T: StoreTx>(tx: &mut T, id: &Uuid) -> Result<Trip, Error> {
    let trip = tx.fetch_trip_for_update(id).await?;
    trip.check_integrity()?;

    Ok(trip)
}

/// Compensating path shared by rejection, cancellation and trip-level cascades.
pub fn release_seats(trip: &mut Trip, seats: i32, events: &mut Vec<Event>) -> Result<(), Error> {
    if trip.release_seats(seats)? {
        tracing::info!(trip_id = %trip.id, "trip reopened");
        events.push(Event::TripReopened { trip_id: trip.id });
    }

    Ok(())
}

#[tracing::instrument(skip(tx, entry, events), fields(kind = ?entry.kind, reference_id = %entry.reference_id))]
pub async fn post_entry<T: StoreTx>(
    tx: &mut T,
    entry: &LedgerEntry,
    events: &mut Vec<Event>,
) -> Result<Posting, Error> {
    entry.check_amount()?;

    let posting = tx.append_entry(entry).await?;

    match &posting {
        Posting::Posted(entry) => {
            tracing::info!(account_id = %entry.account_id, amount = %entry.amount, "ledger entry posted");
            events.push(Event::LedgerPosted {
                account_id: entry.account_id,
                kind: entry.kind,
                reference_id: entry.reference_id,
                amount: entry.amount,
            });
        }
        Posting::Duplicate => {
            tracing::info!("ledger entry already posted, skipping");
        }
    }

    Ok(posting)
}

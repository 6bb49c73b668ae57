use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::error::{busy_error, unexpected_error, Error};

/// Lock granularity. Callers that need several locks take them in declaration order:
/// trip, then account, then withdrawal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LockKey {
    Trip(Uuid),
    Account(Uuid),
    Withdrawal(Uuid),
}

/// Per-entity async mutexes, created on first use.
#[derive(Debug, Default)]
pub struct LockTable {
    locks: Mutex<HashMap<LockKey, Arc<AsyncMutex<()>>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits at most `timeout` for the entity lock; a timeout is reported as `Busy`.
    #[tracing::instrument(skip(self))]
    pub async fn acquire(
        &self,
        key: LockKey,
        timeout: Duration,
    ) -> Result<OwnedMutexGuard<()>, Error> {
        let lock = {
            let mut locks = self.locks.lock().map_err(|_| unexpected_error())?;
            locks.entry(key).or_default().clone()
        };

        tokio::time::timeout(timeout, lock.lock_owned())
            .await
            .map_err(|_| {
                tracing::warn!(?key, "lock wait timed out");
                busy_error()
            })
    }
}

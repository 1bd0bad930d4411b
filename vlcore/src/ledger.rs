//! Call ledger: one deduplicated record per unordered user pair.

use crate::store::error::StoreError;
use crate::store::traits::CallLedgerStore;
use crate::types::call::{CallRecord, CallStatus};
use crate::types::user::UserId;
use chrono::{DateTime, Utc};
use log::warn;
use std::sync::Arc;

/// Thin façade over the ledger store. Every failure is logged and
/// swallowed here: call signaling must never abort because a durable
/// write did not land.
#[derive(Clone)]
pub struct CallLedger {
    store: Arc<dyn CallLedgerStore>,
}

impl CallLedger {
    pub fn new(store: Arc<dyn CallLedgerStore>) -> Self {
        Self { store }
    }

    /// Stamp a call attempt between `a` and `b`, creating the pair row on
    /// first contact. Direction does not matter.
    pub async fn note_attempt(&self, a: &UserId, b: &UserId, at: DateTime<Utc>) {
        if let Err(e) = self.store.upsert_attempt(a, b, at).await {
            warn!("ledger attempt for {a}/{b} failed: {e}");
        }
    }

    /// Record how the most recent call between `a` and `b` ended. An
    /// outcome without a recorded attempt indicates a session that was
    /// never properly initiated; it is logged and dropped.
    pub async fn note_outcome(&self, a: &UserId, b: &UserId, duration_secs: i64, status: CallStatus) {
        match self
            .store
            .record_outcome(a, b, duration_secs, status, Utc::now())
            .await
        {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) => {
                warn!("ledger outcome for {a}/{b} without a recorded attempt");
            }
            Err(e) => warn!("ledger outcome for {a}/{b} failed: {e}"),
        }
    }

    /// All rows touching `user`. Presence joining and ordering belong to
    /// the directory service.
    pub async fn contacts_for(&self, user: &UserId) -> Vec<CallRecord> {
        match self.store.records_for(user).await {
            Ok(records) => records,
            Err(e) => {
                warn!("ledger read for {user} failed: {e}");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBackend;
    use crate::types::call::PairKey;

    #[tokio::test]
    async fn attempts_in_either_direction_update_one_row() {
        let store = Arc::new(MemoryBackend::new());
        let ledger = CallLedger::new(store.clone());
        let a = UserId::from("alice");
        let b = UserId::from("bob");

        ledger.note_attempt(&a, &b, Utc::now()).await;
        ledger.note_attempt(&b, &a, Utc::now()).await;
        ledger.note_outcome(&b, &a, 17, CallStatus::Completed).await;

        let rows = ledger.contacts_for(&a).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].duration_secs, 17);
        assert_eq!(rows[0].status, CallStatus::Completed);
        assert_eq!(rows[0].pair_key(), PairKey::new(&a, &b));
    }

    #[tokio::test]
    async fn orphan_outcome_is_swallowed() {
        let store = Arc::new(MemoryBackend::new());
        let ledger = CallLedger::new(store);
        let a = UserId::from("alice");
        let b = UserId::from("bob");

        // no attempt recorded; must not panic and must not create a row
        ledger.note_outcome(&a, &b, 5, CallStatus::Declined).await;
        assert!(ledger.contacts_for(&a).await.is_empty());
    }
}

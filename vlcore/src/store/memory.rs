use crate::store::error::{Result, StoreError};
use crate::store::traits::{CallLedgerStore, PresenceStore, UserStore};
use crate::types::call::{CallRecord, CallStatus, PairKey};
use crate::types::presence::PresenceRecord;
use crate::types::user::{UserId, UserRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A simple in-memory backend. Used by the test suites and as the default
/// store when durability is not needed; upsert atomicity comes from the
/// per-map write locks.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    users: Arc<RwLock<HashMap<UserId, UserRecord>>>,
    presence: Arc<RwLock<HashMap<UserId, PresenceRecord>>>,
    ledger: Arc<RwLock<HashMap<PairKey, CallRecord>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryBackend {
    async fn put_user(&self, user: &UserRecord) -> Result<()> {
        let mut users = self.users.write().await;
        users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn get_user(&self, id: &UserId) -> Result<Option<UserRecord>> {
        let users = self.users.read().await;
        Ok(users.get(id).cloned())
    }

    async fn search_users(&self, needle: &str) -> Result<Vec<UserRecord>> {
        let needle = needle.to_lowercase();
        let users = self.users.read().await;
        Ok(users
            .values()
            .filter(|u| u.username.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PresenceStore for MemoryBackend {
    async fn put_presence(&self, record: &PresenceRecord) -> Result<()> {
        let mut presence = self.presence.write().await;
        presence.insert(record.user_id.clone(), record.clone());
        Ok(())
    }

    async fn get_presence(&self, id: &UserId) -> Result<Option<PresenceRecord>> {
        let presence = self.presence.read().await;
        Ok(presence.get(id).cloned())
    }
}

#[async_trait]
impl CallLedgerStore for MemoryBackend {
    async fn upsert_attempt(&self, a: &UserId, b: &UserId, at: DateTime<Utc>) -> Result<()> {
        let key = PairKey::new(a, b);
        let mut ledger = self.ledger.write().await;
        ledger
            .entry(key)
            .or_insert_with(|| CallRecord::new(a, b, at))
            .last_called = at;
        Ok(())
    }

    async fn record_outcome(
        &self,
        a: &UserId,
        b: &UserId,
        duration_secs: i64,
        status: CallStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let key = PairKey::new(a, b);
        let mut ledger = self.ledger.write().await;
        let record = ledger
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        record.duration_secs = duration_secs;
        record.status = status;
        record.last_called = at;
        Ok(())
    }

    async fn get_record(&self, pair: &PairKey) -> Result<Option<CallRecord>> {
        let ledger = self.ledger.read().await;
        Ok(ledger.get(pair).cloned())
    }

    async fn records_for(&self, user: &UserId) -> Result<Vec<CallRecord>> {
        let ledger = self.ledger.read().await;
        Ok(ledger
            .values()
            .filter(|r| r.involves(user))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upserts_from_both_directions_share_one_row() {
        let store = MemoryBackend::new();
        let a = UserId::from("alice");
        let b = UserId::from("bob");

        store.upsert_attempt(&a, &b, Utc::now()).await.unwrap();
        store.upsert_attempt(&b, &a, Utc::now()).await.unwrap();

        let rows = store.records_for(&a).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].pair_key(), PairKey::new(&b, &a));
    }

    #[tokio::test]
    async fn outcome_without_attempt_is_not_found() {
        let store = MemoryBackend::new();
        let a = UserId::from("alice");
        let b = UserId::from("bob");

        let err = store
            .record_outcome(&a, &b, 10, CallStatus::Completed, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn search_is_case_insensitive_substring() {
        let store = MemoryBackend::new();
        store
            .put_user(&UserRecord::new("u1", "Alice"))
            .await
            .unwrap();
        store
            .put_user(&UserRecord::new("u2", "malice"))
            .await
            .unwrap();
        store.put_user(&UserRecord::new("u3", "bob")).await.unwrap();

        let hits = store.search_users("ali").await.unwrap();
        assert_eq!(hits.len(), 2);
    }
}

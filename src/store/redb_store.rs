use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redb::{
    Builder, Database, ReadableTable, TableDefinition, TableError, backends::InMemoryBackend,
};
use std::path::Path;
use std::sync::Arc;
use vlcore::store::error::{Result, StoreError};
use vlcore::store::traits::{CallLedgerStore, PresenceStore, UserStore};
use vlcore::types::call::{CallRecord, CallStatus, PairKey};
use vlcore::types::presence::PresenceRecord;
use vlcore::types::user::{UserId, UserRecord};

macro_rules! open_table_or_default {
    ($txn:expr, $table:expr, $default:expr) => {
        match $txn.open_table($table) {
            Ok(t) => t,
            Err(TableError::TableDoesNotExist(_)) => return Ok($default),
            Err(e) => return Err(StoreError::Database(e.to_string())),
        }
    };
}

const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");
const PRESENCE: TableDefinition<&str, &[u8]> = TableDefinition::new("presence");
const CALL_LEDGER: TableDefinition<&str, &[u8]> = TableDefinition::new("call_ledger");

/// Durable backend over a single redb file. Pair-key upsert atomicity
/// comes from redb's single-writer transactions.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    pub async fn new<P: AsRef<Path> + Send + 'static>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let db = tokio::task::spawn_blocking(move || -> Result<Database> {
            Database::create(&path).map_err(|e| StoreError::Database(e.to_string()))
        })
        .await
        .map_err(|e| StoreError::Database(e.to_string()))??;

        Ok(Self { db: Arc::new(db) })
    }

    pub fn in_memory() -> Result<Self> {
        let db = Builder::new()
            .create_with_backend(InMemoryBackend::new())
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(Self { db: Arc::new(db) })
    }

    fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl UserStore for RedbStore {
    async fn put_user(&self, user: &UserRecord) -> Result<()> {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        {
            let mut table = txn
                .open_table(USERS)
                .map_err(|e| StoreError::Database(e.to_string()))?;
            let bytes = Self::encode(user)?;
            table
                .insert(user.id.as_str(), bytes.as_slice())
                .map_err(|e| StoreError::Database(e.to_string()))?;
        }
        txn.commit().map_err(|e| StoreError::Database(e.to_string()))
    }

    async fn get_user(&self, id: &UserId) -> Result<Option<UserRecord>> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let table = open_table_or_default!(txn, USERS, None);
        let bytes = table
            .get(id.as_str())
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|guard| guard.value().to_vec());
        bytes.map(|b| Self::decode(&b)).transpose()
    }

    async fn search_users(&self, needle: &str) -> Result<Vec<UserRecord>> {
        let needle = needle.to_lowercase();
        let txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let table = open_table_or_default!(txn, USERS, Vec::new());
        let mut hits = Vec::new();
        for item in table
            .iter()
            .map_err(|e| StoreError::Database(e.to_string()))?
        {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            let record: UserRecord = Self::decode(value.value())?;
            if record.username.to_lowercase().contains(&needle) {
                hits.push(record);
            }
        }
        Ok(hits)
    }
}

#[async_trait]
impl PresenceStore for RedbStore {
    async fn put_presence(&self, record: &PresenceRecord) -> Result<()> {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        {
            let mut table = txn
                .open_table(PRESENCE)
                .map_err(|e| StoreError::Database(e.to_string()))?;
            let bytes = Self::encode(record)?;
            table
                .insert(record.user_id.as_str(), bytes.as_slice())
                .map_err(|e| StoreError::Database(e.to_string()))?;
        }
        txn.commit().map_err(|e| StoreError::Database(e.to_string()))
    }

    async fn get_presence(&self, id: &UserId) -> Result<Option<PresenceRecord>> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let table = open_table_or_default!(txn, PRESENCE, None);
        let bytes = table
            .get(id.as_str())
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|guard| guard.value().to_vec());
        bytes.map(|b| Self::decode(&b)).transpose()
    }
}

#[async_trait]
impl CallLedgerStore for RedbStore {
    async fn upsert_attempt(&self, a: &UserId, b: &UserId, at: DateTime<Utc>) -> Result<()> {
        let key = PairKey::new(a, b);
        let txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        {
            let mut table = txn
                .open_table(CALL_LEDGER)
                .map_err(|e| StoreError::Database(e.to_string()))?;
            let existing = table
                .get(key.as_str())
                .map_err(|e| StoreError::Database(e.to_string()))?
                .map(|guard| guard.value().to_vec());
            let mut record = match existing {
                Some(bytes) => Self::decode::<CallRecord>(&bytes)?,
                None => CallRecord::new(a, b, at),
            };
            record.last_called = at;
            let bytes = Self::encode(&record)?;
            table
                .insert(key.as_str(), bytes.as_slice())
                .map_err(|e| StoreError::Database(e.to_string()))?;
        }
        txn.commit().map_err(|e| StoreError::Database(e.to_string()))
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
        let txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        {
            let mut table = txn
                .open_table(CALL_LEDGER)
                .map_err(|e| StoreError::Database(e.to_string()))?;
            let existing = table
                .get(key.as_str())
                .map_err(|e| StoreError::Database(e.to_string()))?
                .map(|guard| guard.value().to_vec());
            let Some(bytes) = existing else {
                return Err(StoreError::NotFound(key.to_string()));
            };
            let mut record: CallRecord = Self::decode(&bytes)?;
            record.duration_secs = duration_secs;
            record.status = status;
            record.last_called = at;
            let bytes = Self::encode(&record)?;
            table
                .insert(key.as_str(), bytes.as_slice())
                .map_err(|e| StoreError::Database(e.to_string()))?;
        }
        txn.commit().map_err(|e| StoreError::Database(e.to_string()))
    }

    async fn get_record(&self, pair: &PairKey) -> Result<Option<CallRecord>> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let table = open_table_or_default!(txn, CALL_LEDGER, None);
        let bytes = table
            .get(pair.as_str())
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|guard| guard.value().to_vec());
        bytes.map(|b| Self::decode(&b)).transpose()
    }

    async fn records_for(&self, user: &UserId) -> Result<Vec<CallRecord>> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let table = open_table_or_default!(txn, CALL_LEDGER, Vec::new());
        let mut records = Vec::new();
        for item in table
            .iter()
            .map_err(|e| StoreError::Database(e.to_string()))?
        {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            let record: CallRecord = Self::decode(value.value())?;
            if record.involves(user) {
                records.push(record);
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn users_round_trip() {
        let store = RedbStore::in_memory().unwrap();
        let record = UserRecord::new("u1", "alice");
        store.put_user(&record).await.unwrap();

        assert_eq!(
            store.get_user(&UserId::from("u1")).await.unwrap(),
            Some(record)
        );
        assert_eq!(store.get_user(&UserId::from("u2")).await.unwrap(), None);

        let hits = store.search_users("ALI").await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn ledger_upserts_are_direction_independent() {
        let store = RedbStore::in_memory().unwrap();
        let a = UserId::from("alice");
        let b = UserId::from("bob");

        store.upsert_attempt(&a, &b, Utc::now()).await.unwrap();
        store.upsert_attempt(&b, &a, Utc::now()).await.unwrap();
        store
            .record_outcome(&b, &a, 42, CallStatus::Completed, Utc::now())
            .await
            .unwrap();

        let rows = store.records_for(&a).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].duration_secs, 42);
    }

    #[tokio::test]
    async fn outcome_without_attempt_is_not_found() {
        let store = RedbStore::in_memory().unwrap();
        let err = store
            .record_outcome(
                &UserId::from("a"),
                &UserId::from("b"),
                1,
                CallStatus::Missed,
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voicelink.redb");

        {
            let store = RedbStore::new(path.clone()).await.unwrap();
            store.put_user(&UserRecord::new("u1", "alice")).await.unwrap();
            store
                .put_presence(&PresenceRecord {
                    user_id: UserId::from("u1"),
                    online: false,
                    last_seen: Utc::now(),
                })
                .await
                .unwrap();
        }

        let store = RedbStore::new(path).await.unwrap();
        assert!(store.get_user(&UserId::from("u1")).await.unwrap().is_some());
        let presence = store
            .get_presence(&UserId::from("u1"))
            .await
            .unwrap()
            .unwrap();
        assert!(!presence.online);
    }
}

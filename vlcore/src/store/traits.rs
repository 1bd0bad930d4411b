use crate::store::error::Result;
use crate::types::call::{CallRecord, CallStatus, PairKey};
use crate::types::presence::PresenceRecord;
use crate::types::user::{UserId, UserRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Directory of known user identities, written at registration time.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn put_user(&self, user: &UserRecord) -> Result<()>;
    async fn get_user(&self, id: &UserId) -> Result<Option<UserRecord>>;

    /// Case-insensitive substring match over usernames. Filtering out the
    /// requester, sorting and capping are the directory service's job.
    async fn search_users(&self, needle: &str) -> Result<Vec<UserRecord>>;
}

/// Durable presence state. The live handle is process-local and never
/// persisted; only the online flag and last-seen timestamp survive.
#[async_trait]
pub trait PresenceStore: Send + Sync {
    async fn put_presence(&self, record: &PresenceRecord) -> Result<()>;
    async fn get_presence(&self, id: &UserId) -> Result<Option<PresenceRecord>>;
}

/// One call record per unordered user pair.
#[async_trait]
pub trait CallLedgerStore: Send + Sync {
    /// Find-or-create the row for the pair and stamp `last_called`.
    /// Must be atomic per pair key: racing attempts in opposite directions
    /// must land on a single row.
    async fn upsert_attempt(&self, a: &UserId, b: &UserId, at: DateTime<Utc>) -> Result<()>;

    /// Rewrite duration/status of an existing row. Returns
    /// [`StoreError::NotFound`](crate::store::error::StoreError::NotFound)
    /// when no attempt was ever recorded for the pair.
    async fn record_outcome(
        &self,
        a: &UserId,
        b: &UserId,
        duration_secs: i64,
        status: CallStatus,
        at: DateTime<Utc>,
    ) -> Result<()>;

    async fn get_record(&self, pair: &PairKey) -> Result<Option<CallRecord>>;

    /// Every row touching `user`, in no particular order.
    async fn records_for(&self, user: &UserId) -> Result<Vec<CallRecord>>;
}

/// The full persistence surface the coordinator needs.
pub trait Backend: UserStore + PresenceStore + CallLedgerStore {}

impl<T: UserStore + PresenceStore + CallLedgerStore> Backend for T {}

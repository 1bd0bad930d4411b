//! Presence registry: user identity → live connection handle.

use crate::connection::{ClientHandle, HandleId};
use crate::store::traits::PresenceStore;
use crate::types::events::ServerEvent;
use crate::types::presence::PresenceRecord;
use crate::types::user::UserId;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::{debug, warn};
use std::sync::Arc;

/// In-memory presence state for one user. At most one entry per user id;
/// `online` implies a live handle. Entries are never removed, only marked
/// offline, so last-seen stays reportable.
#[derive(Debug, Clone)]
pub struct PresenceEntry {
    pub user_id: UserId,
    pub username: String,
    pub handle: Option<ClientHandle>,
    pub online: bool,
    pub last_seen: DateTime<Utc>,
}

impl PresenceEntry {
    pub fn record(&self) -> PresenceRecord {
        PresenceRecord {
            user_id: self.user_id.clone(),
            online: self.online,
            last_seen: self.last_seen,
        }
    }
}

/// Tracks which users currently hold an open control channel.
///
/// Mutations are linearizable per user id through the map's entry locks;
/// no map guard is ever held across an await. Durable writes go through
/// the [`PresenceStore`] after the in-memory state is settled and are
/// logged-and-swallowed on failure: presence correctness never depends on
/// the store answering synchronously.
pub struct PresenceRegistry {
    store: Arc<dyn PresenceStore>,
    entries: DashMap<UserId, PresenceEntry>,
    by_handle: DashMap<HandleId, UserId>,
}

impl PresenceRegistry {
    pub fn new(store: Arc<dyn PresenceStore>) -> Arc<Self> {
        Arc::new(Self {
            store,
            entries: DashMap::new(),
            by_handle: DashMap::new(),
        })
    }

    /// Bind `user_id` to `handle`, superseding any previous handle for the
    /// same user (reconnect without a clean disconnect). Broadcasts the
    /// presence change to every other online connection.
    pub async fn register(&self, user_id: UserId, username: String, handle: ClientHandle) {
        let now = Utc::now();
        let superseded = {
            let mut entry = self
                .entries
                .entry(user_id.clone())
                .or_insert_with(|| PresenceEntry {
                    user_id: user_id.clone(),
                    username: username.clone(),
                    handle: None,
                    online: false,
                    last_seen: now,
                });
            let old = entry.handle.take();
            entry.username = username.clone();
            entry.handle = Some(handle.clone());
            entry.online = true;
            entry.last_seen = now;
            old
        };
        if let Some(old) = superseded {
            debug!("presence: {user_id} reconnected, superseding handle {}", old.id);
            self.by_handle.remove(&old.id);
        }
        self.by_handle.insert(handle.id, user_id.clone());

        self.persist(PresenceRecord {
            user_id: user_id.clone(),
            online: true,
            last_seen: now,
        })
        .await;

        self.broadcast(
            ServerEvent::PresenceChanged {
                user_id,
                username,
                online: true,
                last_seen: now,
            },
            Some(handle.id),
        )
        .await;
    }

    /// Mark the owning user offline. No-op when `handle_id` is not the
    /// currently registered handle for its user (already superseded by a
    /// reconnect). Returns the owning user id when the entry was cleared.
    pub async fn unregister(&self, handle_id: HandleId) -> Option<UserId> {
        let user_id = self.by_handle.get(&handle_id).map(|u| u.clone())?;
        let now = Utc::now();
        let mut cleared = None;
        if let Some(mut entry) = self.entries.get_mut(&user_id) {
            if entry.handle.as_ref().is_some_and(|h| h.id == handle_id) {
                entry.handle = None;
                entry.online = false;
                entry.last_seen = now;
                cleared = Some(entry.username.clone());
            }
        }
        self.by_handle.remove(&handle_id);
        // a newer registration owns this user now
        let username = cleared?;

        self.persist(PresenceRecord {
            user_id: user_id.clone(),
            online: false,
            last_seen: now,
        })
        .await;

        self.broadcast(
            ServerEvent::PresenceChanged {
                user_id: user_id.clone(),
                username,
                online: false,
                last_seen: now,
            },
            None,
        )
        .await;
        Some(user_id)
    }

    /// Read-only snapshot of a user's presence.
    pub fn lookup(&self, user_id: &UserId) -> Option<PresenceEntry> {
        self.entries.get(user_id).map(|e| e.clone())
    }

    /// The live handle for `user_id`, when online.
    pub fn online_handle(&self, user_id: &UserId) -> Option<ClientHandle> {
        self.entries
            .get(user_id)
            .filter(|e| e.online)
            .and_then(|e| e.handle.clone())
    }

    pub fn user_for_handle(&self, handle_id: HandleId) -> Option<UserId> {
        self.by_handle.get(&handle_id).map(|u| u.clone())
    }

    /// Presence for directory queries: the live entry when known to this
    /// process, the durable record otherwise.
    pub async fn presence_of(&self, user_id: &UserId) -> Option<PresenceRecord> {
        if let Some(record) = self.entries.get(user_id).map(|e| e.record()) {
            return Some(record);
        }
        match self.store.get_presence(user_id).await {
            Ok(record) => record,
            Err(e) => {
                warn!("presence read for {user_id} failed: {e}");
                None
            }
        }
    }

    async fn persist(&self, record: PresenceRecord) {
        if let Err(e) = self.store.put_presence(&record).await {
            warn!("presence write for {} failed: {e}", record.user_id);
        }
    }

    /// Deliver `event` to every online connection except `except`.
    async fn broadcast(&self, event: ServerEvent, except: Option<HandleId>) {
        let targets: Vec<ClientHandle> = self
            .entries
            .iter()
            .filter(|e| e.online)
            .filter_map(|e| e.handle.clone())
            .filter(|h| Some(h.id) != except)
            .collect();
        for handle in targets {
            if !handle.deliver(event.clone()).await {
                debug!("presence broadcast to dead handle {}", handle.id);
            }
        }
    }
}

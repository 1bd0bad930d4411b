//! Directory queries: contact lists and name search.

use crate::ledger::CallLedger;
use crate::presence::PresenceRegistry;
use crate::store::traits::UserStore;
use crate::types::events::{ContactRow, SearchRow};
use crate::types::user::UserId;
use log::warn;
use std::sync::Arc;
use thiserror::Error;

/// Shortest accepted search query, to keep scans bounded.
pub const MIN_QUERY_LEN: usize = 2;
/// Upper bound on returned search rows.
pub const SEARCH_RESULT_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("search query must be at least {MIN_QUERY_LEN} characters long")]
    TooShort,
}

/// Read-only joins over ledger, user directory and live presence.
#[derive(Clone)]
pub struct Directory {
    registry: Arc<PresenceRegistry>,
    ledger: CallLedger,
    users: Arc<dyn UserStore>,
}

impl Directory {
    pub fn new(
        registry: Arc<PresenceRegistry>,
        ledger: CallLedger,
        users: Arc<dyn UserStore>,
    ) -> Self {
        Self {
            registry,
            ledger,
            users,
        }
    }

    /// Everyone `user` has ever exchanged a call with, enriched with live
    /// presence at read time. Online contacts first, then most recently
    /// called.
    pub async fn contact_list(&self, user: &UserId) -> Vec<ContactRow> {
        let records = self.ledger.contacts_for(user).await;
        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let Some(other) = record.other_party(user) else {
                continue;
            };
            let username = match self.users.get_user(other).await {
                Ok(Some(u)) => u.username,
                Ok(None) => other.to_string(),
                Err(e) => {
                    warn!("user lookup for {other} failed: {e}");
                    other.to_string()
                }
            };
            let presence = self.registry.presence_of(other).await;
            rows.push(ContactRow {
                user_id: other.clone(),
                username,
                online: presence.as_ref().is_some_and(|p| p.online),
                last_seen: presence.map(|p| p.last_seen),
                last_called: record.last_called,
                duration_secs: record.duration_secs,
                status: record.status,
            });
        }
        rows.sort_by(|a, b| {
            b.online
                .cmp(&a.online)
                .then(b.last_called.cmp(&a.last_called))
        });
        rows
    }

    /// Case-insensitive substring search over known usernames, excluding
    /// the requester. Online users first, then alphabetical; capped at
    /// [`SEARCH_RESULT_LIMIT`] rows.
    pub async fn search(
        &self,
        query: &str,
        exclude: &UserId,
    ) -> Result<Vec<SearchRow>, QueryError> {
        let needle = query.trim();
        if needle.chars().count() < MIN_QUERY_LEN {
            return Err(QueryError::TooShort);
        }

        let candidates = match self.users.search_users(needle).await {
            Ok(users) => users,
            Err(e) => {
                warn!("user search for {needle:?} failed: {e}");
                Vec::new()
            }
        };

        let mut rows = Vec::with_capacity(candidates.len());
        for user in candidates {
            if user.id == *exclude {
                continue;
            }
            let presence = self.registry.presence_of(&user.id).await;
            rows.push(SearchRow {
                user_id: user.id,
                username: user.username,
                online: presence.as_ref().is_some_and(|p| p.online),
                last_seen: presence.map(|p| p.last_seen),
            });
        }
        rows.sort_by(|a, b| b.online.cmp(&a.online).then(a.username.cmp(&b.username)));
        rows.truncate(SEARCH_RESULT_LIMIT);
        Ok(rows)
    }
}

use super::user::UserId;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one call attempt. Doubles as the correlation token the
/// callee echoes back when accepting or declining an invitation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random session id (32 uppercase hex chars).
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::rng().fill_bytes(&mut bytes);
        let mut s = String::with_capacity(32);
        for b in bytes {
            s.push_str(&format!("{b:02X}"));
        }
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Order-independent key for a pair of users: calls in either direction
/// address the same ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PairKey(String);

impl PairKey {
    pub fn new(a: &UserId, b: &UserId) -> Self {
        let (lo, hi) = if a.as_str() <= b.as_str() {
            (a, b)
        } else {
            (b, a)
        };
        Self(format!("{}|{}", lo.as_str(), hi.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of the most recent call between a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Completed,
    Missed,
    Declined,
}

/// The ledger row: one per unordered user pair, upserted on every attempt
/// and rewritten when an outcome is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    /// The two parties in pair-key order.
    pub user_a: UserId,
    pub user_b: UserId,
    pub last_called: DateTime<Utc>,
    pub duration_secs: i64,
    pub status: CallStatus,
}

impl CallRecord {
    pub fn new(a: &UserId, b: &UserId, at: DateTime<Utc>) -> Self {
        let (lo, hi) = if a.as_str() <= b.as_str() {
            (a, b)
        } else {
            (b, a)
        };
        Self {
            user_a: lo.clone(),
            user_b: hi.clone(),
            last_called: at,
            duration_secs: 0,
            status: CallStatus::Completed,
        }
    }

    pub fn pair_key(&self) -> PairKey {
        PairKey::new(&self.user_a, &self.user_b)
    }

    pub fn involves(&self, user: &UserId) -> bool {
        self.user_a == *user || self.user_b == *user
    }

    /// Resolve the counterpart of `user` in this row, if `user` is a party.
    pub fn other_party(&self, user: &UserId) -> Option<&UserId> {
        if self.user_a == *user {
            Some(&self.user_b)
        } else if self.user_b == *user {
            Some(&self.user_a)
        } else {
            None
        }
    }
}

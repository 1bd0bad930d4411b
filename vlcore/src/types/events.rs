//! Wire-level events exchanged with connected clients.
//!
//! The transport layer only (de)serializes these; every payload the
//! coordinator emits or consumes is defined here so the core stays
//! testable without a live connection.

use super::call::{CallStatus, SessionId};
use super::user::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// STUN/TURN endpoint handed to clients so they can build their peer
/// connection without a second round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    pub fn stun(urls: impl Into<String>) -> Self {
        Self {
            urls: urls.into(),
            username: None,
            credential: None,
        }
    }

    pub fn turn(
        urls: impl Into<String>,
        username: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            urls: urls.into(),
            username: Some(username.into()),
            credential: Some(credential.into()),
        }
    }
}

/// One row of a contact list: the most recent call with `user_id`, joined
/// with that user's live presence at query time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactRow {
    pub user_id: UserId,
    pub username: String,
    pub online: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub last_called: DateTime<Utc>,
    pub duration_secs: i64,
    pub status: CallStatus,
}

/// One row of a directory search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRow {
    pub user_id: UserId,
    pub username: String,
    pub online: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Events received from a client over its control channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Bind this connection to a verified identity. Must precede every
    /// other event on the channel.
    Register { user_id: UserId, username: String },
    ListContacts,
    Search { query: String },
    Call { callee_id: UserId },
    Accept { session_id: SessionId },
    Decline { session_id: SessionId },
    End {
        session_id: SessionId,
        duration_secs: i64,
    },
    NegotiationPayload {
        session_id: SessionId,
        payload: serde_json::Value,
    },
}

/// Events emitted to a client over its control channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    PresenceChanged {
        user_id: UserId,
        username: String,
        online: bool,
        last_seen: DateTime<Utc>,
    },
    ContactList {
        contacts: Vec<ContactRow>,
    },
    SearchResults {
        users: Vec<SearchRow>,
    },
    SearchFailed {
        message: String,
    },
    /// Answer to a successful `call`: the caller learns the session id it
    /// will use for end/negotiation events.
    CallInitiated {
        session_id: SessionId,
        callee_id: UserId,
        callee_name: String,
    },
    IncomingCall {
        session_id: SessionId,
        caller_id: UserId,
        caller_name: String,
        ice_servers: Vec<IceServer>,
    },
    CallAccepted {
        session_id: SessionId,
        callee_id: UserId,
        callee_name: String,
        ice_servers: Vec<IceServer>,
    },
    CallDeclined {
        session_id: SessionId,
    },
    CallFailed {
        code: String,
        message: String,
    },
    CallEnded {
        session_id: SessionId,
    },
    NegotiationPayload {
        session_id: SessionId,
        payload: serde_json::Value,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_events_use_kebab_case_tags() {
        let ev: ClientEvent = serde_json::from_str(
            r#"{"type":"call","callee_id":"u-2"}"#,
        )
        .unwrap();
        assert_eq!(
            ev,
            ClientEvent::Call {
                callee_id: UserId::from("u-2")
            }
        );

        let ev: ClientEvent = serde_json::from_str(r#"{"type":"list-contacts"}"#).unwrap();
        assert_eq!(ev, ClientEvent::ListContacts);

        let ev: ClientEvent = serde_json::from_str(
            r#"{"type":"negotiation-payload","session_id":"S1","payload":{"sdp":"x"}}"#,
        )
        .unwrap();
        match ev {
            ClientEvent::NegotiationPayload { session_id, payload } => {
                assert_eq!(session_id.as_str(), "S1");
                assert_eq!(payload["sdp"], "x");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn server_event_tags_match_the_contract() {
        let cases: Vec<(ServerEvent, &str)> = vec![
            (
                ServerEvent::CallDeclined {
                    session_id: SessionId::new("S1"),
                },
                "call-declined",
            ),
            (
                ServerEvent::SearchFailed {
                    message: "too short".into(),
                },
                "search-failed",
            ),
            (
                ServerEvent::NegotiationPayload {
                    session_id: SessionId::new("S1"),
                    payload: serde_json::json!({"candidate": "c"}),
                },
                "negotiation-payload",
            ),
        ];
        for (event, tag) in cases {
            let value = serde_json::to_value(&event).unwrap();
            assert_eq!(value["type"], tag);
        }
    }

    #[test]
    fn opaque_payload_round_trips_verbatim() {
        let payload = serde_json::json!({
            "sdp": {"type": "offer", "body": "v=0 ..."},
            "candidates": [1, 2, 3],
        });
        let event = ServerEvent::NegotiationPayload {
            session_id: SessionId::new("S1"),
            payload: payload.clone(),
        };
        let text = serde_json::to_string(&event).unwrap();
        let back: ServerEvent = serde_json::from_str(&text).unwrap();
        match back {
            ServerEvent::NegotiationPayload { payload: p, .. } => assert_eq!(p, payload),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}

//! Call session state machine.

use crate::connection::{ClientHandle, HandleId};
use crate::types::call::{CallStatus, SessionId};
use crate::types::user::UserId;
use chrono::{DateTime, Utc};

/// Current state of a call session.
///
/// There is no `Idle` record: a session object exists only from the
/// moment an invitation is delivered. `Ended` is terminal; the manager
/// discards the record once the ledger write and notifications are done.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// Invitation delivered, waiting for the callee.
    Ringing { invited_at: DateTime<Utc> },
    /// Callee accepted; negotiation payloads may flow.
    Active { started_at: DateTime<Utc> },
    /// Terminal, with the outcome destined for the ledger.
    Ended {
        status: CallStatus,
        duration_secs: i64,
    },
}

impl SessionState {
    pub fn is_ringing(&self) -> bool {
        matches!(self, Self::Ringing { .. })
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }

    pub fn is_ended(&self) -> bool {
        matches!(self, Self::Ended { .. })
    }
}

/// State transitions for sessions.
#[derive(Debug, Clone, Copy)]
pub enum SessionTransition {
    /// Callee confirmed the invitation.
    Accept,
    /// Callee rejected the invitation.
    Decline,
    /// Either participant hung up, reporting the observed duration.
    Terminate { duration_secs: i64 },
    /// A participant's connection dropped while the session was live.
    ConnectionLost,
}

/// Which side of a session a handle belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Caller,
    Callee,
}

/// One in-flight call attempt.
///
/// Handles are pinned: the callee's at origination, the caller's
/// re-resolved once at accept time. Payloads addressed to a handle that
/// was superseded afterwards are dropped, not redirected.
#[derive(Debug, Clone)]
pub struct CallSession {
    pub id: SessionId,
    pub caller_id: UserId,
    pub caller_name: String,
    pub caller_handle: ClientHandle,
    pub callee_id: UserId,
    pub callee_name: String,
    pub callee_handle: ClientHandle,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
}

impl CallSession {
    pub fn new(
        caller_id: UserId,
        caller_name: String,
        caller_handle: ClientHandle,
        callee_id: UserId,
        callee_name: String,
        callee_handle: ClientHandle,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::generate(),
            caller_id,
            caller_name,
            caller_handle,
            callee_id,
            callee_name,
            callee_handle,
            state: SessionState::Ringing { invited_at: now },
            created_at: now,
        }
    }

    pub fn involves(&self, handle: HandleId) -> bool {
        self.caller_handle.id == handle || self.callee_handle.id == handle
    }

    pub fn role_of(&self, handle: HandleId) -> Option<Role> {
        if self.caller_handle.id == handle {
            Some(Role::Caller)
        } else if self.callee_handle.id == handle {
            Some(Role::Callee)
        } else {
            None
        }
    }

    /// The pinned handle of the participant opposite `handle`.
    pub fn counterpart(&self, handle: HandleId) -> Option<&ClientHandle> {
        match self.role_of(handle)? {
            Role::Caller => Some(&self.callee_handle),
            Role::Callee => Some(&self.caller_handle),
        }
    }

    /// Apply a state transition. Returns an error if the transition is
    /// invalid in the current state.
    pub fn apply_transition(
        &mut self,
        transition: SessionTransition,
    ) -> Result<(), InvalidTransition> {
        let new_state = match (&self.state, transition) {
            (SessionState::Ringing { .. }, SessionTransition::Accept) => SessionState::Active {
                started_at: Utc::now(),
            },
            (SessionState::Ringing { .. }, SessionTransition::Decline) => SessionState::Ended {
                status: CallStatus::Declined,
                duration_secs: 0,
            },
            // A withdrawal before accept still closes the pair's record.
            (SessionState::Ringing { .. }, SessionTransition::Terminate { duration_secs }) => {
                SessionState::Ended {
                    status: CallStatus::Completed,
                    duration_secs,
                }
            }
            (SessionState::Ringing { .. }, SessionTransition::ConnectionLost) => {
                SessionState::Ended {
                    status: CallStatus::Missed,
                    duration_secs: 0,
                }
            }
            (SessionState::Active { .. }, SessionTransition::Terminate { duration_secs }) => {
                SessionState::Ended {
                    status: CallStatus::Completed,
                    duration_secs,
                }
            }
            (SessionState::Active { started_at }, SessionTransition::ConnectionLost) => {
                let duration = Utc::now().signed_duration_since(*started_at).num_seconds();
                SessionState::Ended {
                    status: CallStatus::Completed,
                    duration_secs: duration.max(0),
                }
            }
            (current, transition) => {
                return Err(InvalidTransition {
                    current_state: format!("{:?}", current),
                    attempted: format!("{:?}", transition),
                });
            }
        };
        self.state = new_state;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct InvalidTransition {
    pub current_state: String,
    pub attempted: String,
}

impl std::fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid transition {} in state {}",
            self.attempted, self.current_state
        )
    }
}

impl std::error::Error for InvalidTransition {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::mock;

    fn make_session() -> CallSession {
        let (caller, _) = mock::handle(1);
        let (callee, _) = mock::handle(2);
        CallSession::new(
            UserId::from("alice"),
            "alice".into(),
            caller,
            UserId::from("bob"),
            "bob".into(),
            callee,
        )
    }

    /// Flow: Ringing → Active → Ended with reported duration.
    #[test]
    fn accepted_call_flow() {
        let mut session = make_session();
        assert!(session.state.is_ringing());

        session.apply_transition(SessionTransition::Accept).unwrap();
        assert!(session.state.is_active());

        session
            .apply_transition(SessionTransition::Terminate { duration_secs: 42 })
            .unwrap();
        assert_eq!(
            session.state,
            SessionState::Ended {
                status: CallStatus::Completed,
                duration_secs: 42
            }
        );
    }

    #[test]
    fn declined_call_records_zero_duration() {
        let mut session = make_session();
        session.apply_transition(SessionTransition::Decline).unwrap();
        assert_eq!(
            session.state,
            SessionState::Ended {
                status: CallStatus::Declined,
                duration_secs: 0
            }
        );
    }

    #[test]
    fn lost_connection_while_ringing_is_missed() {
        let mut session = make_session();
        session
            .apply_transition(SessionTransition::ConnectionLost)
            .unwrap();
        assert_eq!(
            session.state,
            SessionState::Ended {
                status: CallStatus::Missed,
                duration_secs: 0
            }
        );
    }

    #[test]
    fn lost_connection_while_active_completes_with_elapsed_time() {
        let mut session = make_session();
        session.apply_transition(SessionTransition::Accept).unwrap();
        session
            .apply_transition(SessionTransition::ConnectionLost)
            .unwrap();
        match session.state {
            SessionState::Ended {
                status: CallStatus::Completed,
                duration_secs,
            } => assert!(duration_secs >= 0),
            ref other => panic!("unexpected state: {other:?}"),
        }
    }

    #[test]
    fn ended_sessions_reject_further_transitions() {
        let mut session = make_session();
        session.apply_transition(SessionTransition::Decline).unwrap();

        assert!(session.apply_transition(SessionTransition::Accept).is_err());
        assert!(
            session
                .apply_transition(SessionTransition::Terminate { duration_secs: 1 })
                .is_err()
        );
    }

    #[test]
    fn decline_after_accept_is_invalid() {
        let mut session = make_session();
        session.apply_transition(SessionTransition::Accept).unwrap();
        assert!(session.apply_transition(SessionTransition::Decline).is_err());
    }

    #[test]
    fn roles_and_counterparts_resolve_by_handle() {
        let session = make_session();
        assert_eq!(session.role_of(HandleId::new(1)), Some(Role::Caller));
        assert_eq!(session.role_of(HandleId::new(2)), Some(Role::Callee));
        assert_eq!(session.role_of(HandleId::new(9)), None);
        assert_eq!(
            session.counterpart(HandleId::new(1)).unwrap().id,
            HandleId::new(2)
        );
    }
}

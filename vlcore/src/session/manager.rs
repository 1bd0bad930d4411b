//! Session manager: owns the set of in-flight call attempts.

use super::error::CallError;
use super::state::{CallSession, SessionState, SessionTransition};
use crate::connection::{ClientHandle, HandleId};
use crate::ledger::CallLedger;
use crate::presence::PresenceRegistry;
use crate::types::call::SessionId;
use crate::types::events::{IceServer, ServerEvent};
use crate::types::user::UserId;
use chrono::Utc;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Drives the call lifecycle for every pair of users.
///
/// The session set is owned exclusively by this type and only reachable
/// through the operations below; the relay and the registry never touch
/// it directly. Sessions leave the map the moment they reach a terminal
/// state, after ledger and notification side effects are issued, so a
/// second terminate (or any event naming a finished session) finds
/// nothing and is silently ignored.
pub struct SessionManager {
    registry: Arc<PresenceRegistry>,
    ledger: CallLedger,
    ice_servers: Vec<IceServer>,
    sessions: RwLock<HashMap<SessionId, CallSession>>,
}

impl SessionManager {
    pub fn new(
        registry: Arc<PresenceRegistry>,
        ledger: CallLedger,
        ice_servers: Vec<IceServer>,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            ledger,
            ice_servers,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    /// Start a call attempt against `callee_id`.
    ///
    /// The callee must resolve to an online presence entry, and must not
    /// already be the callee of a live session. On success the callee has
    /// been invited and the caller told its session id; failures are
    /// reported synchronously and leave no session behind.
    pub async fn originate(
        &self,
        caller_id: &UserId,
        caller_name: &str,
        caller_handle: ClientHandle,
        callee_id: &UserId,
    ) -> Result<SessionId, CallError> {
        let callee = self
            .registry
            .lookup(callee_id)
            .filter(|entry| entry.online)
            .ok_or(CallError::TargetUnreachable)?;
        let callee_handle = callee.handle.clone().ok_or(CallError::TargetUnreachable)?;

        let session = CallSession::new(
            caller_id.clone(),
            caller_name.to_string(),
            caller_handle.clone(),
            callee_id.clone(),
            callee.username.clone(),
            callee_handle.clone(),
        );
        let session_id = session.id.clone();

        {
            let mut sessions = self.sessions.write().await;
            let busy = sessions
                .values()
                .any(|s| s.callee_id == *callee_id && !s.state.is_ended());
            if busy {
                return Err(CallError::TargetBusy);
            }
            sessions.insert(session_id.clone(), session);
        }

        self.ledger
            .note_attempt(caller_id, callee_id, Utc::now())
            .await;

        caller_handle
            .deliver(ServerEvent::CallInitiated {
                session_id: session_id.clone(),
                callee_id: callee_id.clone(),
                callee_name: callee.username.clone(),
            })
            .await;

        let invited = callee_handle
            .deliver(ServerEvent::IncomingCall {
                session_id: session_id.clone(),
                caller_id: caller_id.clone(),
                caller_name: caller_name.to_string(),
                ice_servers: self.ice_servers.clone(),
            })
            .await;
        if !invited {
            // The registry still pointed at a connection that is gone.
            self.sessions.write().await.remove(&session_id);
            return Err(CallError::TargetUnreachable);
        }

        Ok(session_id)
    }

    /// Callee confirms the invitation: Ringing → Active.
    ///
    /// The caller's handle is re-resolved here — it may have changed since
    /// the invitation was sent — and stays pinned for the rest of the
    /// session.
    pub async fn accept(&self, session_id: &SessionId, from: HandleId) {
        let notify = {
            let mut sessions = self.sessions.write().await;
            let Some(session) = sessions.get_mut(session_id) else {
                debug!("accept for unknown session {session_id}");
                return;
            };
            if session.callee_handle.id != from {
                debug!("accept for {session_id} from non-callee handle {from}");
                return;
            }
            if let Err(e) = session.apply_transition(SessionTransition::Accept) {
                debug!("accept for {session_id}: {e}");
                return;
            }
            if let Some(current) = self.registry.online_handle(&session.caller_id) {
                session.caller_handle = current;
            }
            (
                session.caller_handle.clone(),
                session.callee_id.clone(),
                session.callee_name.clone(),
            )
        };

        let (caller_handle, callee_id, callee_name) = notify;
        if !caller_handle
            .deliver(ServerEvent::CallAccepted {
                session_id: session_id.clone(),
                callee_id,
                callee_name,
                ice_servers: self.ice_servers.clone(),
            })
            .await
        {
            debug!("accepted notice for {session_id} hit a dead caller handle");
        }
    }

    /// Callee rejects the invitation: Ringing → Declined → gone.
    pub async fn decline(&self, session_id: &SessionId, from: HandleId) {
        let session = {
            let mut sessions = self.sessions.write().await;
            let Some(session) = sessions.get_mut(session_id) else {
                debug!("decline for unknown session {session_id}");
                return;
            };
            if session.callee_handle.id != from {
                debug!("decline for {session_id} from non-callee handle {from}");
                return;
            }
            if let Err(e) = session.apply_transition(SessionTransition::Decline) {
                debug!("decline for {session_id}: {e}");
                return;
            }
            sessions.remove(session_id).expect("session present")
        };

        self.ledger
            .note_outcome(
                &session.caller_id,
                &session.callee_id,
                0,
                crate::types::call::CallStatus::Declined,
            )
            .await;
        session
            .caller_handle
            .deliver(ServerEvent::CallDeclined {
                session_id: session_id.clone(),
            })
            .await;
    }

    /// Either participant hangs up. Idempotent: once a session has ended
    /// the record is gone and repeated terminations fall through.
    pub async fn terminate(&self, session_id: &SessionId, from: HandleId, duration_secs: i64) {
        let session = {
            let mut sessions = self.sessions.write().await;
            let Some(session) = sessions.get_mut(session_id) else {
                debug!("end for unknown session {session_id}");
                return;
            };
            if session.role_of(from).is_none() {
                debug!("end for {session_id} from uninvolved handle {from}");
                return;
            }
            if let Err(e) = session.apply_transition(SessionTransition::Terminate {
                duration_secs: duration_secs.max(0),
            }) {
                debug!("end for {session_id}: {e}");
                return;
            }
            sessions.remove(session_id).expect("session present")
        };

        self.finish(session, from).await;
    }

    /// Forward an opaque negotiation payload to the other participant's
    /// pinned handle. Valid only while the session is active; a dead
    /// destination drops the payload (the browser's own timeout governs).
    pub async fn relay(&self, session_id: &SessionId, from: HandleId, payload: serde_json::Value) {
        let destination = {
            let sessions = self.sessions.read().await;
            let Some(session) = sessions.get(session_id) else {
                debug!("payload for unknown session {session_id}");
                return;
            };
            if !session.state.is_active() {
                debug!("payload for {session_id} before accept; dropped");
                return;
            }
            match session.counterpart(from) {
                Some(handle) => handle.clone(),
                None => {
                    debug!("payload for {session_id} from uninvolved handle {from}");
                    return;
                }
            }
        };

        if !destination
            .deliver(ServerEvent::NegotiationPayload {
                session_id: session_id.clone(),
                payload,
            })
            .await
        {
            debug!("payload for {session_id} dropped: destination {} gone", destination.id);
        }
    }

    /// Force-terminate every session referencing a departing handle.
    ///
    /// Called from the connection teardown path before the registry entry
    /// is cleared: a ringing session ends as missed, an active one as
    /// completed with the elapsed duration. Each session ends exactly
    /// once — the records are removed under the same lock that found
    /// them.
    pub async fn handle_disconnect(&self, handle: HandleId) {
        let ended: Vec<CallSession> = {
            let mut sessions = self.sessions.write().await;
            let ids: Vec<SessionId> = sessions
                .values()
                .filter(|s| s.involves(handle))
                .map(|s| s.id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| {
                    let mut session = sessions.remove(&id)?;
                    if let Err(e) = session.apply_transition(SessionTransition::ConnectionLost) {
                        warn!("force-end of {id}: {e}");
                    }
                    Some(session)
                })
                .collect()
        };

        for session in ended {
            self.finish(session, handle).await;
        }
    }

    /// Ledger write plus counterpart notification for a session that just
    /// reached `Ended`. `from` is the participant that caused the end.
    async fn finish(&self, session: CallSession, from: HandleId) {
        let SessionState::Ended {
            status,
            duration_secs,
        } = session.state
        else {
            warn!("finish called on live session {}", session.id);
            return;
        };

        self.ledger
            .note_outcome(&session.caller_id, &session.callee_id, duration_secs, status)
            .await;

        if let Some(peer) = session.counterpart(from) {
            if !peer
                .deliver(ServerEvent::CallEnded {
                    session_id: session.id.clone(),
                })
                .await
            {
                debug!("end notice for {} hit a dead handle", session.id);
            }
        }
    }

    /// Snapshot of one session's state, mainly for diagnostics and tests.
    pub async fn state_of(&self, session_id: &SessionId) -> Option<SessionState> {
        let sessions = self.sessions.read().await;
        sessions.get(session_id).map(|s| s.state.clone())
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

//! Per-connection event handling: one function per inbound event,
//! dispatched from a single match so each transition is explicit.

use crate::server::ServerState;
use log::{debug, info, warn};
use std::sync::Arc;
use vlcore::connection::ClientHandle;
use vlcore::types::call::SessionId;
use vlcore::types::events::{ClientEvent, ServerEvent};
use vlcore::types::user::{UserId, UserRecord};

/// State of one client connection: its handle plus, once `register` has
/// been seen, the verified identity bound to it.
pub struct Connection {
    state: Arc<ServerState>,
    handle: ClientHandle,
    identity: Option<UserId>,
}

impl Connection {
    pub fn new(state: Arc<ServerState>, handle: ClientHandle) -> Self {
        Self {
            state,
            handle,
            identity: None,
        }
    }

    pub async fn dispatch(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Register { user_id, username } => {
                self.on_register(user_id, username).await;
            }
            ClientEvent::ListContacts => self.on_list_contacts().await,
            ClientEvent::Search { query } => self.on_search(&query).await,
            ClientEvent::Call { callee_id } => self.on_call(&callee_id).await,
            ClientEvent::Accept { session_id } => self.on_accept(&session_id).await,
            ClientEvent::Decline { session_id } => self.on_decline(&session_id).await,
            ClientEvent::End {
                session_id,
                duration_secs,
            } => self.on_end(&session_id, duration_secs).await,
            ClientEvent::NegotiationPayload {
                session_id,
                payload,
            } => self.on_payload(&session_id, payload).await,
        }
    }

    /// The identity bound to this connection, or `None` (logged) when the
    /// client talks before registering.
    fn identity(&self) -> Option<UserId> {
        if self.identity.is_none() {
            debug!("{}: event before register; ignored", self.handle.id);
        }
        self.identity.clone()
    }

    async fn on_register(&mut self, user_id: UserId, username: String) {
        // The identity arrives already verified by the auth layer; record
        // it in the user directory so search can find it later.
        if let Err(e) = self
            .state
            .users
            .put_user(&UserRecord::new(user_id.clone(), username.clone()))
            .await
        {
            warn!("user record write for {user_id} failed: {e}");
        }
        self.state
            .registry
            .register(user_id.clone(), username, self.handle.clone())
            .await;
        info!("{user_id} registered ({})", self.handle.id);
        self.identity = Some(user_id);
    }

    async fn on_list_contacts(&self) {
        let Some(me) = self.identity() else { return };
        let contacts = self.state.directory.contact_list(&me).await;
        self.handle
            .deliver(ServerEvent::ContactList { contacts })
            .await;
    }

    async fn on_search(&self, query: &str) {
        let Some(me) = self.identity() else { return };
        let event = match self.state.directory.search(query, &me).await {
            Ok(users) => ServerEvent::SearchResults { users },
            Err(e) => ServerEvent::SearchFailed {
                message: e.to_string(),
            },
        };
        self.handle.deliver(event).await;
    }

    async fn on_call(&self, callee_id: &UserId) {
        let Some(me) = self.identity() else { return };
        let my_name = self
            .state
            .registry
            .lookup(&me)
            .map(|entry| entry.username)
            .unwrap_or_else(|| me.to_string());
        if let Err(e) = self
            .state
            .sessions
            .originate(&me, &my_name, self.handle.clone(), callee_id)
            .await
        {
            self.handle
                .deliver(ServerEvent::CallFailed {
                    code: e.code().to_string(),
                    message: e.to_string(),
                })
                .await;
        }
    }

    async fn on_accept(&self, session_id: &SessionId) {
        if self.identity().is_none() {
            return;
        }
        self.state.sessions.accept(session_id, self.handle.id).await;
    }

    async fn on_decline(&self, session_id: &SessionId) {
        if self.identity().is_none() {
            return;
        }
        self.state
            .sessions
            .decline(session_id, self.handle.id)
            .await;
    }

    async fn on_end(&self, session_id: &SessionId, duration_secs: i64) {
        if self.identity().is_none() {
            return;
        }
        self.state
            .sessions
            .terminate(session_id, self.handle.id, duration_secs)
            .await;
    }

    async fn on_payload(&self, session_id: &SessionId, payload: serde_json::Value) {
        if self.identity().is_none() {
            return;
        }
        self.state
            .sessions
            .relay(session_id, self.handle.id, payload)
            .await;
    }
}

use crate::types::events::ServerEvent;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Identifier of one live control channel. Handles are process-local and
/// never cross the wire; a reconnect always produces a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(u64);

impl HandleId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Delivery side of a connection handle.
///
/// Implementations push one event into the client's outbound queue.
/// Returning `false` means the connection is gone; a dead sink is
/// "target unreachable", never an error.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn deliver(&self, event: ServerEvent) -> bool;
}

/// A live connection handle: the id plus the way to reach its client.
///
/// The registry and session set hold these as weak references to the
/// connection's lifecycle — dropping a handle never closes the channel.
#[derive(Clone)]
pub struct ClientHandle {
    pub id: HandleId,
    sink: Arc<dyn EventSink>,
}

impl ClientHandle {
    pub fn new(id: HandleId, sink: Arc<dyn EventSink>) -> Self {
        Self { id, sink }
    }

    pub async fn deliver(&self, event: ServerEvent) -> bool {
        self.sink.deliver(event).await
    }
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle").field("id", &self.id).finish()
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Records every delivered event; can be killed to simulate a dead
    /// connection.
    #[derive(Default)]
    pub struct RecordingSink {
        events: Mutex<Vec<ServerEvent>>,
        dead: AtomicBool,
    }

    impl RecordingSink {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn kill(&self) {
            self.dead.store(true, Ordering::SeqCst);
        }

        pub fn events(&self) -> Vec<ServerEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn deliver(&self, event: ServerEvent) -> bool {
            if self.dead.load(Ordering::SeqCst) {
                return false;
            }
            self.events.lock().unwrap().push(event);
            true
        }
    }

    pub fn handle(id: u64) -> (ClientHandle, Arc<RecordingSink>) {
        let sink = RecordingSink::new();
        (ClientHandle::new(HandleId::new(id), sink.clone()), sink)
    }
}

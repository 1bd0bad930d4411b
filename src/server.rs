//! WebSocket transport: accept loop, per-connection read pump and the
//! outbound queue backing each connection handle.

use crate::handlers::Connection;
use anyhow::Result;
use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use vlcore::connection::{ClientHandle, EventSink, HandleId};
use vlcore::store::traits::{Backend, UserStore};
use vlcore::types::events::{ClientEvent, IceServer, ServerEvent};
use vlcore::{CallLedger, Directory, PresenceRegistry, SessionManager};

/// Outbound events queued per connection before backpressure kicks in.
const OUTBOUND_QUEUE: usize = 64;

/// Everything the per-connection handlers share.
pub struct ServerState {
    pub registry: Arc<PresenceRegistry>,
    pub sessions: Arc<SessionManager>,
    pub directory: Directory,
    pub users: Arc<dyn UserStore>,
    next_handle: AtomicU64,
}

impl ServerState {
    pub fn new<B>(backend: Arc<B>, ice_servers: Vec<IceServer>) -> Arc<Self>
    where
        B: Backend + 'static,
    {
        let registry = PresenceRegistry::new(backend.clone());
        let ledger = CallLedger::new(backend.clone());
        let sessions = SessionManager::new(registry.clone(), ledger.clone(), ice_servers);
        let directory = Directory::new(registry.clone(), ledger, backend.clone());
        Arc::new(Self {
            registry,
            sessions,
            directory,
            users: backend,
            next_handle: AtomicU64::new(1),
        })
    }

    fn next_handle_id(&self) -> HandleId {
        HandleId::new(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }
}

/// Accept connections forever, one task per client.
pub async fn run(state: Arc<ServerState>, listener: TcpListener) -> Result<()> {
    loop {
        let (stream, addr) = listener.accept().await?;
        let state = state.clone();
        tokio::spawn(async move {
            debug!("connection from {addr}");
            if let Err(e) = handle_connection(state, stream).await {
                debug!("connection {addr} closed: {e}");
            }
        });
    }
}

/// [`EventSink`] backed by the connection's outbound queue. The writer
/// task drains the queue into the socket, so delivery order per
/// connection is the queue order.
struct ChannelSink {
    tx: mpsc::Sender<Message>,
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn deliver(&self, event: ServerEvent) -> bool {
        let text = match serde_json::to_string(&event) {
            Ok(text) => text,
            Err(e) => {
                warn!("failed to encode outbound event: {e}");
                return false;
            }
        };
        self.tx.send(Message::text(text)).await.is_ok()
    }
}

async fn write_pump(
    mut sink: SplitSink<WebSocketStream<TcpStream>, Message>,
    mut rx: mpsc::Receiver<Message>,
) {
    while let Some(message) = rx.recv().await {
        if let Err(e) = sink.send(message).await {
            debug!("write failed: {e}");
            break;
        }
    }
    let _ = sink.close().await;
}

async fn handle_connection(state: Arc<ServerState>, stream: TcpStream) -> Result<()> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (ws_sink, mut ws_stream) = ws.split();

    let (tx, rx) = mpsc::channel::<Message>(OUTBOUND_QUEUE);
    tokio::spawn(write_pump(ws_sink, rx));

    let handle_id = state.next_handle_id();
    let handle = ClientHandle::new(handle_id, Arc::new(ChannelSink { tx: tx.clone() }));
    let mut connection = Connection::new(state.clone(), handle);

    while let Some(frame) = ws_stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(text.as_str()) {
                Ok(event) => connection.dispatch(event).await,
                Err(e) => warn!("{handle_id}: unparseable event: {e}"),
            },
            Ok(Message::Ping(data)) => {
                let _ = tx.send(Message::Pong(data)).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("{handle_id}: read error: {e}");
                break;
            }
        }
    }

    // Sessions first: counterparts must hear call-ended before the
    // presence change, and the registry entry must still resolve while
    // forced terminations run.
    state.sessions.handle_disconnect(handle_id).await;
    if let Some(user) = state.registry.unregister(handle_id).await {
        info!("{user} disconnected ({handle_id})");
    }
    Ok(())
}

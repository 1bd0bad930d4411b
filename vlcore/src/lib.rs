//! Core of the voicelink rendezvous service: presence, call sessions,
//! the call ledger and directory queries. Transport-free — the server
//! crate plugs a WebSocket connection in through [`connection::EventSink`].

pub mod connection;
pub mod directory;
pub mod ledger;
pub mod presence;
pub mod session;
pub mod store;
pub mod types;

pub use connection::{ClientHandle, EventSink, HandleId};
pub use directory::{Directory, QueryError};
pub use ledger::CallLedger;
pub use presence::PresenceRegistry;
pub use session::{CallError, SessionManager};

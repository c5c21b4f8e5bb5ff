//! Session lifecycle against the messaging network.
//!
//! [`SessionManager`] owns the connection state machine: it loads
//! credentials, connects a transport, re-binds event handling on every
//! (re)connect, classifies disconnects into recoverable vs. terminal, and
//! applies exponential backoff between attempts. The transport protocol
//! itself lives behind [`ChatTransport`]; the supplied implementation talks
//! to a Baileys-style sidecar over WebSocket.

pub mod credentials;
pub mod error;
pub mod manager;
pub mod outbound;
pub mod transport;
pub mod ws;

pub use {
    credentials::{CredentialStore, FileCredentialStore},
    error::{Error, Result},
    manager::{InboundSink, ReconnectPolicy, SessionEnd, SessionManager, SessionState},
    outbound::SessionOutbound,
    transport::{
        ChatTransport, ConnectionUpdate, CredentialBundle, DisconnectReason, LinkState, Outbound,
        TransportEvent, TransportHandle,
    },
    ws::SidecarTransport,
};

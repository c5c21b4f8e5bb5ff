//! Abstract transport contracts consumed by the session manager.

use std::sync::Arc;

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    tokio::sync::mpsc,
};

use bixbot_common::{InboundMessage, OutboundPayload};

use crate::error::Result;

/// Opaque credential bundle. The transport produces and rotates it, the
/// credential store persists it; nothing in the core inspects its shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialBundle(pub serde_json::Value);

/// Why the transport link closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The user revoked this session. Terminal: reconnecting is pointless
    /// until the operator re-pairs.
    LoggedOut,
    /// Anything recoverable: network blip, server restart, stream error.
    Other(String),
}

impl DisconnectReason {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::LoggedOut)
    }
}

/// Link state carried by a connection update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Handshake still in progress (possibly waiting for pairing).
    Connecting,
    Open,
    Closed,
}

/// One connection-update event from the transport.
#[derive(Debug, Clone)]
pub struct ConnectionUpdate {
    pub state: LinkState,
    /// Set when `state` is `Closed`.
    pub disconnect_reason: Option<DisconnectReason>,
    /// Pairing code to surface to the operator during a fresh handshake.
    pub pairing_code: Option<String>,
}

impl ConnectionUpdate {
    #[must_use]
    pub fn open() -> Self {
        Self {
            state: LinkState::Open,
            disconnect_reason: None,
            pairing_code: None,
        }
    }

    #[must_use]
    pub fn closed(reason: DisconnectReason) -> Self {
        Self {
            state: LinkState::Closed,
            disconnect_reason: Some(reason),
            pairing_code: None,
        }
    }

    #[must_use]
    pub fn pairing(code: impl Into<String>) -> Self {
        Self {
            state: LinkState::Connecting,
            disconnect_reason: None,
            pairing_code: Some(code.into()),
        }
    }
}

/// Events a transport feeds into the session manager: exactly one
/// subscription per event class per transport instance.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    CredentialsUpdate(CredentialBundle),
    ConnectionUpdate(ConnectionUpdate),
    Message(InboundMessage),
}

/// Outbound send surface of a live transport.
#[async_trait]
pub trait Outbound: Send + Sync {
    async fn send(&self, peer_id: &str, payload: OutboundPayload) -> Result<()>;
}

/// A live transport connection.
///
/// The event receiver is owned by exactly one manager drive loop; dropping
/// the handle invalidates the subscription, so a replaced transport can
/// never fire stale handlers.
pub struct TransportHandle {
    pub events: mpsc::Receiver<TransportEvent>,
    pub sender: Arc<dyn Outbound>,
}

/// Abstract messaging-network transport factory.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Establish one connection. Passing `None` for credentials starts a
    /// fresh pairing handshake.
    async fn connect(&self, credentials: Option<CredentialBundle>) -> Result<TransportHandle>;
}

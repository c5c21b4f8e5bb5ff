//! WebSocket transport to a Baileys-style messaging sidecar.
//!
//! The sidecar owns the actual messaging-network protocol (handshake,
//! encryption, multi-device sync) and exposes it as JSON frames over a
//! local WebSocket. Each `connect()` yields a fresh transport generation:
//! its own socket, reader task, writer task, and event feed.

use std::sync::Arc;

use {
    async_trait::async_trait,
    base64::Engine,
    futures::{SinkExt, StreamExt},
    serde::{Deserialize, Serialize},
    tokio::sync::mpsc,
    tokio_tungstenite::{connect_async, tungstenite::Message},
    tracing::{debug, warn},
};

use bixbot_common::{Delivery, InboundMessage, OutboundPayload};

use crate::{
    error::{Error, Result},
    transport::{
        ChatTransport, ConnectionUpdate, CredentialBundle, DisconnectReason, Outbound,
        TransportEvent, TransportHandle,
    },
};

/// Default port of the bundled sidecar.
pub const DEFAULT_SIDECAR_URL: &str = "ws://127.0.0.1:3459";

const EVENT_BUFFER: usize = 64;

/// Disconnect reason string the sidecar uses for a revoked session.
const REASON_LOGGED_OUT: &str = "logged_out";

// ── Wire frames ─────────────────────────────────────────────────────────────

/// Frames we send to the sidecar.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum GatewayFrame<'a> {
    /// Start (or resume) the messaging session.
    Login {
        #[serde(skip_serializing_if = "Option::is_none")]
        credentials: Option<&'a serde_json::Value>,
    },
    SendText {
        id: String,
        to: &'a str,
        text: &'a str,
    },
    SendImage {
        id: String,
        to: &'a str,
        bytes_b64: String,
        mime_type: &'a str,
        caption: &'a str,
    },
}

/// Frames the sidecar sends us.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SidecarFrame {
    Qr {
        code: String,
    },
    Connected,
    Disconnected {
        #[serde(default)]
        reason: Option<String>,
    },
    CredsUpdate {
        credentials: serde_json::Value,
    },
    Message {
        peer_id: String,
        #[serde(default)]
        text: Option<String>,
        /// Extended/styled body; used when `text` is absent.
        #[serde(default)]
        extended_text: Option<String>,
        #[serde(default)]
        delivery: Option<String>,
        #[serde(default)]
        from_me: bool,
    },
}

fn translate(frame: SidecarFrame) -> TransportEvent {
    match frame {
        SidecarFrame::Qr { code } => {
            TransportEvent::ConnectionUpdate(ConnectionUpdate::pairing(code))
        },
        SidecarFrame::Connected => TransportEvent::ConnectionUpdate(ConnectionUpdate::open()),
        SidecarFrame::Disconnected { reason } => {
            let reason = match reason.as_deref() {
                Some(REASON_LOGGED_OUT) => DisconnectReason::LoggedOut,
                Some(other) => DisconnectReason::Other(other.to_string()),
                None => DisconnectReason::Other("connection closed".into()),
            };
            TransportEvent::ConnectionUpdate(ConnectionUpdate::closed(reason))
        },
        SidecarFrame::CredsUpdate { credentials } => {
            TransportEvent::CredentialsUpdate(CredentialBundle(credentials))
        },
        SidecarFrame::Message {
            peer_id,
            text,
            extended_text,
            delivery,
            from_me,
        } => TransportEvent::Message(InboundMessage {
            peer_id,
            text: text.or(extended_text),
            is_self_echo: from_me,
            delivery: match delivery.as_deref() {
                Some("notify") => Delivery::Notify,
                _ => Delivery::Historical,
            },
        }),
    }
}

// ── Transport implementation ────────────────────────────────────────────────

/// `ChatTransport` over a sidecar WebSocket.
pub struct SidecarTransport {
    url: String,
}

impl SidecarTransport {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl ChatTransport for SidecarTransport {
    async fn connect(&self, credentials: Option<CredentialBundle>) -> Result<TransportHandle> {
        let (socket, _response) = connect_async(self.url.as_str()).await?;
        let (mut ws_sink, mut ws_reader) = socket.split();

        // Login first so the sidecar can resume the stored session.
        let login = serde_json::to_string(&GatewayFrame::Login {
            credentials: credentials.as_ref().map(|bundle| &bundle.0),
        })?;
        ws_sink.send(Message::Text(login.into())).await?;
        debug!(url = %self.url, "sidecar login sent");

        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (write_tx, mut write_rx) = mpsc::unbounded_channel::<String>();

        // Writer: forward serialized frames to the socket.
        tokio::spawn(async move {
            while let Some(text) = write_rx.recv().await {
                if let Err(e) = ws_sink.send(Message::Text(text.into())).await {
                    warn!(error = %e, "sidecar write failed");
                    break;
                }
            }
        });

        // Reader: translate sidecar frames into transport events. The feed
        // closes when this task ends, which the manager observes as a
        // recoverable disconnect unless a final Disconnected frame said
        // otherwise.
        tokio::spawn(async move {
            while let Some(message) = ws_reader.next().await {
                match message {
                    Ok(Message::Text(text)) => match serde_json::from_str::<SidecarFrame>(&text) {
                        Ok(frame) => {
                            if event_tx.send(translate(frame)).await.is_err() {
                                // manager moved on to a newer generation
                                return;
                            }
                        },
                        Err(e) => {
                            warn!(error = %e, "ignoring malformed sidecar frame");
                        },
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {},
                    Err(e) => {
                        let _ = event_tx
                            .send(TransportEvent::ConnectionUpdate(ConnectionUpdate::closed(
                                DisconnectReason::Other(e.to_string()),
                            )))
                            .await;
                        return;
                    },
                }
            }
            let _ = event_tx
                .send(TransportEvent::ConnectionUpdate(ConnectionUpdate::closed(
                    DisconnectReason::Other("sidecar stream ended".into()),
                )))
                .await;
        });

        Ok(TransportHandle {
            events: event_rx,
            sender: Arc::new(SidecarSender { write_tx }),
        })
    }
}

/// Outbound side of one sidecar connection.
struct SidecarSender {
    write_tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Outbound for SidecarSender {
    async fn send(&self, peer_id: &str, payload: OutboundPayload) -> Result<()> {
        let frame = match &payload {
            OutboundPayload::Text { text } => serde_json::to_string(&GatewayFrame::SendText {
                id: uuid::Uuid::new_v4().to_string(),
                to: peer_id,
                text,
            })?,
            OutboundPayload::Image {
                bytes,
                mime_type,
                caption,
            } => serde_json::to_string(&GatewayFrame::SendImage {
                id: uuid::Uuid::new_v4().to_string(),
                to: peer_id,
                bytes_b64: base64::engine::general_purpose::STANDARD.encode(bytes),
                mime_type,
                caption,
            })?,
        };
        self.write_tx
            .send(frame)
            .map_err(|_| Error::NotConnected)?;
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    /// Minimal scripted sidecar: asserts the login frame, then plays the
    /// given frames and echoes back everything it receives over a channel.
    /// With `keep_open = false` the socket is dropped after the script.
    async fn start_sidecar(
        frames: Vec<serde_json::Value>,
        keep_open: bool,
    ) -> (String, mpsc::UnboundedReceiver<serde_json::Value>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (received_tx, received_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let (mut sink, mut reader) = ws.split();

            // first frame must be the login
            let login = reader.next().await.unwrap().unwrap();
            let login: serde_json::Value =
                serde_json::from_str(login.to_text().unwrap()).unwrap();
            assert_eq!(login["type"], "login");
            received_tx.send(login).unwrap();

            for frame in frames {
                sink.send(Message::Text(frame.to_string().into()))
                    .await
                    .unwrap();
            }

            if !keep_open {
                return;
            }

            while let Some(Ok(Message::Text(text))) = reader.next().await {
                let value: serde_json::Value = serde_json::from_str(&text).unwrap();
                received_tx.send(value).unwrap();
            }
        });

        (format!("ws://{addr}"), received_rx)
    }

    #[tokio::test]
    async fn translates_sidecar_frames_into_events() {
        let (url, mut received) = start_sidecar(vec![
            serde_json::json!({ "type": "qr", "code": "PAIR-1234" }),
            serde_json::json!({ "type": "connected" }),
            serde_json::json!({
                "type": "creds_update",
                "credentials": { "noise_key": "k1" },
            }),
            serde_json::json!({
                "type": "message",
                "peer_id": "123@s.whatsapp.net",
                "extended_text": "/gen cat",
                "delivery": "notify",
                "from_me": false,
            }),
            serde_json::json!({ "type": "disconnected", "reason": "logged_out" }),
        ], true)
        .await;

        let transport = SidecarTransport::new(url.as_str());
        let mut handle = transport
            .connect(Some(CredentialBundle(serde_json::json!({ "resume": true }))))
            .await
            .unwrap();

        let login = received.recv().await.unwrap();
        assert_eq!(login["credentials"]["resume"], true);

        let event = handle.events.recv().await.unwrap();
        assert!(matches!(
            event,
            TransportEvent::ConnectionUpdate(ConnectionUpdate {
                pairing_code: Some(code),
                ..
            }) if code == "PAIR-1234"
        ));

        let event = handle.events.recv().await.unwrap();
        assert!(matches!(
            event,
            TransportEvent::ConnectionUpdate(ConnectionUpdate {
                state: crate::transport::LinkState::Open,
                ..
            })
        ));

        let event = handle.events.recv().await.unwrap();
        assert!(matches!(
            event,
            TransportEvent::CredentialsUpdate(CredentialBundle(value))
                if value["noise_key"] == "k1"
        ));

        let event = handle.events.recv().await.unwrap();
        let TransportEvent::Message(message) = event else {
            panic!("expected message event");
        };
        // extended body used when the plain body is absent
        assert_eq!(message.text.as_deref(), Some("/gen cat"));
        assert_eq!(message.delivery, Delivery::Notify);
        assert!(!message.is_self_echo);

        let event = handle.events.recv().await.unwrap();
        assert!(matches!(
            event,
            TransportEvent::ConnectionUpdate(ConnectionUpdate {
                disconnect_reason: Some(DisconnectReason::LoggedOut),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn sends_are_serialized_as_frames() {
        let (url, mut received) = start_sidecar(vec![], true).await;

        let transport = SidecarTransport::new(url.as_str());
        let handle = transport.connect(None).await.unwrap();

        let login = received.recv().await.unwrap();
        assert!(login.get("credentials").is_none());

        handle
            .sender
            .send("peer-1", OutboundPayload::text("hello"))
            .await
            .unwrap();
        let frame = received.recv().await.unwrap();
        assert_eq!(frame["type"], "send_text");
        assert_eq!(frame["to"], "peer-1");
        assert_eq!(frame["text"], "hello");

        handle
            .sender
            .send(
                "peer-1",
                OutboundPayload::Image {
                    bytes: vec![1, 2, 3],
                    mime_type: "image/png".into(),
                    caption: "a cat".into(),
                },
            )
            .await
            .unwrap();
        let frame = received.recv().await.unwrap();
        assert_eq!(frame["type"], "send_image");
        assert_eq!(frame["mime_type"], "image/png");
        assert_eq!(frame["caption"], "a cat");
        assert_eq!(
            frame["bytes_b64"],
            base64::engine::general_purpose::STANDARD.encode([1, 2, 3])
        );
    }

    #[tokio::test]
    async fn socket_close_surfaces_as_recoverable_disconnect() {
        let (url, _received) = start_sidecar(vec![], false).await;

        let transport = SidecarTransport::new(url.as_str());
        let mut handle = transport.connect(None).await.unwrap();
        drop(transport);

        // sidecar task ends after its script; the reader reports the closed
        // stream as a recoverable disconnect
        let event = handle.events.recv().await.unwrap();
        assert!(matches!(
            event,
            TransportEvent::ConnectionUpdate(ConnectionUpdate {
                disconnect_reason: Some(DisconnectReason::Other(_)),
                ..
            })
        ));
    }

    #[test]
    fn unknown_delivery_is_historical() {
        let event = translate(SidecarFrame::Message {
            peer_id: "p".into(),
            text: Some("old".into()),
            extended_text: None,
            delivery: Some("append".into()),
            from_me: false,
        });
        let TransportEvent::Message(message) = event else {
            panic!("expected message event");
        };
        assert_eq!(message.delivery, Delivery::Historical);
    }
}

//! Connection state machine: connect, recover, or give up.

use std::sync::{
    Arc, RwLock,
    atomic::{AtomicU64, Ordering},
};

use {
    async_trait::async_trait,
    rand::Rng,
    tokio::time::Duration,
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use bixbot_common::{Delivery, InboundMessage};

use crate::{
    credentials::CredentialStore,
    error::Result,
    outbound::SessionOutbound,
    transport::{ChatTransport, DisconnectReason, LinkState, TransportEvent, TransportHandle},
};

/// Consumer of actionable inbound messages (the command pipeline).
#[async_trait]
pub trait InboundSink: Send + Sync {
    async fn handle(&self, message: InboundMessage);
}

/// Backoff policy for recoverable disconnects.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Consecutive failed attempts before giving up; `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (1-based): exponential with
    /// a cap, ±50% jitter so a fleet of bots doesn't thundering-herd the
    /// server after it restarts.
    fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let capped = self
            .initial_delay
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_delay);
        capped.mul_f64(rand::rng().random_range(0.5..1.5))
    }
}

/// Observable connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Open,
    Closed(DisconnectReason),
    Terminated,
}

/// How a completed [`SessionManager::run`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The network revoked the session; re-pairing is required.
    LoggedOut,
    /// The reconnect budget was exhausted.
    GaveUp { attempts: u32 },
    /// Shutdown was requested via the cancellation token.
    Cancelled,
}

enum DriveEnd {
    LoggedOut,
    Disconnected {
        reason: Option<String>,
        was_open: bool,
    },
    Cancelled,
}

/// Owns the transport lifecycle and feeds actionable messages to the sink.
pub struct SessionManager {
    transport: Arc<dyn ChatTransport>,
    store: Arc<dyn CredentialStore>,
    sink: Arc<dyn InboundSink>,
    outbound: Arc<SessionOutbound>,
    policy: ReconnectPolicy,
    cancel: CancellationToken,
    state: RwLock<SessionState>,
    generation: AtomicU64,
}

impl SessionManager {
    #[must_use]
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        store: Arc<dyn CredentialStore>,
        sink: Arc<dyn InboundSink>,
        outbound: Arc<SessionOutbound>,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            transport,
            store,
            sink,
            outbound,
            policy,
            cancel: CancellationToken::new(),
            state: RwLock::new(SessionState::Idle),
            generation: AtomicU64::new(0),
        }
    }

    /// Token that stops the manager (and any in-flight reconnect wait).
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_state(&self, state: SessionState) {
        debug!(?state, "session state");
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Run the session until it terminates.
    ///
    /// Returns `Ok` with how the session ended; `Err` only for fatal faults
    /// (credential load/persist failure).
    pub async fn run(&self) -> Result<SessionEnd> {
        let mut failed_attempts: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(SessionEnd::Cancelled);
            }

            self.set_state(SessionState::Connecting);
            let credentials = self.store.load().await?;
            if credentials.is_none() {
                info!("no stored credentials; transport will start a fresh pairing handshake");
            }

            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            let outcome = match self.transport.connect(credentials).await {
                Ok(handle) => {
                    self.outbound.install(generation, Arc::clone(&handle.sender));
                    let end = self.drive(handle).await;
                    self.outbound.clear(generation);
                    end?
                },
                Err(e) => {
                    warn!(error = %e, "transport connect failed");
                    DriveEnd::Disconnected {
                        reason: Some(e.to_string()),
                        was_open: false,
                    }
                },
            };

            match outcome {
                DriveEnd::Cancelled => return Ok(SessionEnd::Cancelled),
                DriveEnd::LoggedOut => {
                    self.set_state(SessionState::Terminated);
                    error!(
                        "session logged out by the messaging network; \
                         delete the auth directory and pair again"
                    );
                    return Ok(SessionEnd::LoggedOut);
                },
                DriveEnd::Disconnected { reason, was_open } => {
                    let reason_text = reason.unwrap_or_else(|| "connection closed".into());
                    self.set_state(SessionState::Closed(DisconnectReason::Other(
                        reason_text.clone(),
                    )));
                    if was_open {
                        // the link worked; start the backoff ladder over
                        failed_attempts = 0;
                    }
                    failed_attempts += 1;

                    if let Some(max) = self.policy.max_attempts
                        && failed_attempts > max
                    {
                        self.set_state(SessionState::Terminated);
                        error!(attempts = max, "giving up after repeated reconnect failures");
                        return Ok(SessionEnd::GaveUp { attempts: max });
                    }

                    let delay = self.policy.delay_for(failed_attempts);
                    info!(
                        attempt = failed_attempts,
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason_text,
                        "reconnecting after delay"
                    );
                    tokio::select! {
                        () = self.cancel.cancelled() => return Ok(SessionEnd::Cancelled),
                        () = tokio::time::sleep(delay) => {},
                    }
                },
            }
        }
    }

    /// Consume one transport generation's event feed until it ends.
    async fn drive(&self, mut handle: TransportHandle) -> Result<DriveEnd> {
        let mut was_open = false;

        loop {
            let event = tokio::select! {
                () = self.cancel.cancelled() => return Ok(DriveEnd::Cancelled),
                event = handle.events.recv() => event,
            };
            let Some(event) = event else {
                // feed closed without a final connection update
                return Ok(DriveEnd::Disconnected {
                    reason: None,
                    was_open,
                });
            };

            match event {
                TransportEvent::CredentialsUpdate(bundle) => {
                    // Persisted before the next event is consumed; losing a
                    // key rotation breaks every future reconnect.
                    if let Err(e) = self.store.save(&bundle).await {
                        error!(error = %e, "failed to persist rotated credentials");
                        return Err(e);
                    }
                    debug!("persisted credential update");
                },
                TransportEvent::ConnectionUpdate(update) => {
                    if let Some(code) = &update.pairing_code {
                        info!(code = %code, "pairing required; link this device with the code");
                    }
                    match update.state {
                        LinkState::Connecting => {},
                        LinkState::Open => {
                            info!("session open");
                            was_open = true;
                            self.set_state(SessionState::Open);
                        },
                        LinkState::Closed => {
                            return Ok(match update.disconnect_reason {
                                Some(DisconnectReason::LoggedOut) => DriveEnd::LoggedOut,
                                Some(DisconnectReason::Other(reason)) => DriveEnd::Disconnected {
                                    reason: Some(reason),
                                    was_open,
                                },
                                None => DriveEnd::Disconnected {
                                    reason: None,
                                    was_open,
                                },
                            });
                        },
                    }
                },
                TransportEvent::Message(message) => {
                    if message.delivery != Delivery::Notify {
                        debug!(peer_id = %message.peer_id, "ignoring non-notify message");
                        continue;
                    }
                    // Each message is an independent task; a slow generation
                    // must never delay connection-state handling.
                    let sink = Arc::clone(&self.sink);
                    tokio::spawn(async move {
                        sink.handle(message).await;
                    });
                },
            }
        }
    }
}

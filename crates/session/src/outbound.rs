//! Reconnect-stable outbound handle.
//!
//! The pipeline holds one `Arc<dyn Outbound>` for the life of the process;
//! this type routes each send to whichever transport generation is currently
//! live, so the pipeline never holds a stale transport reference across a
//! reconnect boundary.

use std::sync::{Arc, RwLock};

use {async_trait::async_trait, tracing::warn};

use bixbot_common::OutboundPayload;

use crate::{
    error::{Error, Result},
    transport::Outbound,
};

#[derive(Default)]
pub struct SessionOutbound {
    inner: RwLock<Option<(u64, Arc<dyn Outbound>)>>,
}

impl SessionOutbound {
    /// Install the sender for a transport generation. A stale generation
    /// can never replace a newer one.
    pub fn install(&self, generation: u64, sender: Arc<dyn Outbound>) {
        let mut slot = self.inner.write().unwrap_or_else(|e| e.into_inner());
        match slot.as_ref() {
            Some((current, _)) if *current > generation => {
                warn!(generation, current, "ignoring stale transport sender");
            },
            _ => *slot = Some((generation, sender)),
        }
    }

    /// Drop the sender for a generation, if it is still the live one.
    pub fn clear(&self, generation: u64) {
        let mut slot = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if matches!(slot.as_ref(), Some((current, _)) if *current == generation) {
            *slot = None;
        }
    }

    fn current(&self) -> Option<Arc<dyn Outbound>> {
        let slot = self.inner.read().unwrap_or_else(|e| e.into_inner());
        slot.as_ref().map(|(_, sender)| Arc::clone(sender))
    }
}

#[async_trait]
impl Outbound for SessionOutbound {
    async fn send(&self, peer_id: &str, payload: OutboundPayload) -> Result<()> {
        let sender = self.current().ok_or(Error::NotConnected)?;
        sender.send(peer_id, payload).await
    }
}

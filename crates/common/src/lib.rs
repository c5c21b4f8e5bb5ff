//! Message and payload types shared across the bixbot crates.

pub mod types;

pub use types::{Delivery, InboundMessage, OutboundPayload};

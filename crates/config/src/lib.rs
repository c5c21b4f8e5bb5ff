//! Configuration for the bixbot process.
//!
//! One TOML file describes the session transport, command prefixes, canned
//! reply texts, moderation word list, and the two generation providers. The
//! original deployments drifted apart as near-identical copies; everything
//! that differed between them is a field here.

pub mod loader;
pub mod schema;

pub use {
    loader::{default_config_path, load},
    schema::{
        BotConfig, CommandConfig, CompletionConfig, ImageConfig, ModerationConfig,
        ReconnectConfig, ReplyConfig, SessionConfig,
    },
};

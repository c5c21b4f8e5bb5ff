use std::path::PathBuf;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Top-level bot configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub session: SessionConfig,
    pub commands: CommandConfig,
    pub replies: ReplyConfig,
    pub moderation: ModerationConfig,
    pub image: ImageConfig,
    pub completion: CompletionConfig,
    /// Curated prompts used for `/gen random`. Drawn uniformly; never
    /// moderated, so keep the list safe.
    pub random_prompts: Vec<String>,
}

impl BotConfig {
    /// The curated random-prompt list, falling back to the built-in set
    /// when the config leaves it empty.
    #[must_use]
    pub fn random_prompts(&self) -> Vec<String> {
        if self.random_prompts.is_empty() {
            DEFAULT_RANDOM_PROMPTS
                .iter()
                .map(ToString::to_string)
                .collect()
        } else {
            self.random_prompts.clone()
        }
    }
}

/// Built-in curated prompts for `/gen random`.
pub const DEFAULT_RANDOM_PROMPTS: &[&str] = &[
    "cat in space",
    "cyberpunk elephant",
    "robot eating pizza",
    "desert city at dusk",
    "matrix waterfall",
    "sunset over mountains",
    "futuristic cityscape",
    "cute puppy playing",
    "mystical forest",
    "robot painting a portrait",
    "space nebula with stars",
    "vintage car on a road",
    "fantasy dragon flying",
];

/// Session transport and reconnect policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// WebSocket URL of the messaging sidecar.
    pub sidecar_url: String,
    /// Directory holding the persisted credential bundle. Defaults to the
    /// platform data dir when unset.
    pub auth_dir: Option<PathBuf>,
    /// Treat our own outgoing messages as commands (operator test traffic).
    pub allow_self_commands: bool,
    pub reconnect: ReconnectConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sidecar_url: "ws://127.0.0.1:3459".into(),
            auth_dir: None,
            allow_self_commands: false,
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Reconnect backoff policy for recoverable disconnects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Give up (and exit non-zero) after this many consecutive failed
    /// attempts. Unset means retry forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_attempts: None,
        }
    }
}

/// Command surface exposed to chat peers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub help: String,
    pub image: String,
    pub chat: String,
    /// Remainders (lowercased) that request a random curated prompt.
    pub random_aliases: Vec<String>,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            help: "/help".into(),
            image: "/gen".into(),
            chat: "/bixx".into(),
            random_aliases: vec!["random".into(), "רנדומלי".into()],
        }
    }
}

/// Canned reply texts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplyConfig {
    /// Instructional text for `/help` and for image/chat commands missing
    /// their argument.
    pub help_text: String,
    /// Sent when moderation blocks a prompt.
    pub forbidden_text: String,
    /// Sent on any adapter failure. The underlying cause is logged, never
    /// sent to the peer.
    pub apology_text: String,
    /// Optional acknowledgment sent before a slow image generation.
    pub ack_text: Option<String>,
    /// Image caption template; `{prompt}` and `{seed}` are substituted.
    pub caption_template: String,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            help_text: "*Image generation over chat*\n\n\
                        Commands:\n\
                        /help - show this message\n\
                        /gen <text> - generate an image from text\n\
                        /gen random - generate a random image\n\
                        /bixx <text> - ask the assistant"
                .into(),
            forbidden_text: "You used a forbidden word.".into(),
            apology_text: "⚠️ Could not generate a reply.".into(),
            ack_text: None,
            caption_template: "🧠 {prompt} · seed {seed}".into(),
        }
    }
}

/// Moderation word list source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationConfig {
    /// Path to the denylist file (newline- or comma-separated). Unset
    /// disables moderation.
    pub word_list: Option<PathBuf>,
}

/// Image-synthesis provider endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub base_url: String,
    /// Ask the provider to skip its watermark.
    pub nologo: bool,
    pub timeout_secs: u64,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            base_url: "https://image.pollinations.ai".into(),
            nologo: true,
            timeout_secs: 30,
        }
    }
}

/// Streaming chat-completion provider (OpenAI-compatible).
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub base_url: String,
    /// API key; the chat command is disabled when unset.
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_opt_secret"
    )]
    pub api_key: Option<Secret<String>>,
    pub model: String,
    pub system_prompt: String,
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            api_key: None,
            model: "gpt-4o-mini".into(),
            system_prompt: "You are a concise, friendly chat assistant replying inside a \
                            messaging app. Keep answers short."
                .into(),
            timeout_secs: 60,
        }
    }
}

impl std::fmt::Debug for CompletionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

fn serialize_opt_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(secret) => serializer.serialize_str(secret.expose_secret()),
        None => serializer.serialize_none(),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = BotConfig::default();
        assert_eq!(config.commands.image, "/gen");
        assert_eq!(config.commands.chat, "/bixx");
        assert!(config.completion.api_key.is_none());
        assert!(!config.session.allow_self_commands);
        assert_eq!(config.session.reconnect.initial_delay_ms, 1_000);
        assert!(config.random_prompts().len() >= 8);
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = CompletionConfig {
            api_key: Some(Secret::new("sk-very-secret".into())),
            ..CompletionConfig::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-very-secret"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn explicit_random_prompts_override_builtin() {
        let config = BotConfig {
            random_prompts: vec!["just this".into()],
            ..BotConfig::default()
        };
        assert_eq!(config.random_prompts(), vec!["just this".to_string()]);
    }
}

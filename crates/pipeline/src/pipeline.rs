//! Orchestration: one inbound message in, at most one reply group out.

use std::sync::Arc;

use {
    async_trait::async_trait,
    rand::Rng,
    tracing::{debug, info, warn},
};

use {
    bixbot_common::{Delivery, InboundMessage, OutboundPayload},
    bixbot_config::{BotConfig, CommandConfig, ReplyConfig},
    bixbot_moderation::ModerationFilter,
    bixbot_providers::{ChatCompletionProvider, ImageProvider},
    bixbot_session::{InboundSink, Outbound},
};

use crate::command::{self, Command};

/// Everything that varied between the original near-identical deployments:
/// prefixes, canned texts, the curated random list, and which adapters run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub commands: CommandConfig,
    pub replies: ReplyConfig,
    pub random_prompts: Vec<String>,
    pub allow_self_commands: bool,
    pub chat_system_prompt: String,
}

impl PipelineConfig {
    #[must_use]
    pub fn from_bot_config(config: &BotConfig) -> Self {
        Self {
            commands: config.commands.clone(),
            replies: config.replies.clone(),
            random_prompts: config.random_prompts(),
            allow_self_commands: config.session.allow_self_commands,
            chat_system_prompt: config.completion.system_prompt.clone(),
        }
    }
}

/// The per-message command pipeline.
pub struct CommandPipeline {
    config: PipelineConfig,
    moderation: Arc<ModerationFilter>,
    image: Arc<dyn ImageProvider>,
    chat: Option<Arc<dyn ChatCompletionProvider>>,
    outbound: Arc<dyn Outbound>,
}

impl CommandPipeline {
    #[must_use]
    pub fn new(
        config: PipelineConfig,
        moderation: Arc<ModerationFilter>,
        image: Arc<dyn ImageProvider>,
        chat: Option<Arc<dyn ChatCompletionProvider>>,
        outbound: Arc<dyn Outbound>,
    ) -> Self {
        Self {
            config,
            moderation,
            image,
            chat,
            outbound,
        }
    }

    async fn send_text(&self, peer_id: &str, text: &str) {
        if let Err(e) = self
            .outbound
            .send(peer_id, OutboundPayload::text(text))
            .await
        {
            warn!(peer_id, error = %e, "failed to send reply");
        }
    }

    fn pick_random_prompt(&self) -> String {
        let prompts = &self.config.random_prompts;
        prompts[rand::rng().random_range(0..prompts.len())].clone()
    }

    /// Moderate operator-supplied text; returns false (after replying) when
    /// the prompt is blocked.
    async fn passes_moderation(&self, peer_id: &str, prompt: &str) -> bool {
        match self.moderation.is_blocked(prompt) {
            Some(term) => {
                info!(peer_id, term, "prompt blocked by moderation");
                self.send_text(peer_id, &self.config.replies.forbidden_text)
                    .await;
                false
            },
            None => true,
        }
    }

    async fn handle_image(&self, peer_id: &str, prompt: String, is_random_request: bool) {
        let final_prompt = if is_random_request {
            // drawn from the curated list, so it skips moderation
            self.pick_random_prompt()
        } else {
            if !self.passes_moderation(peer_id, &prompt).await {
                return;
            }
            prompt
        };

        if let Some(ack) = &self.config.replies.ack_text {
            // an extra send, never a replacement for the real reply
            self.send_text(peer_id, ack).await;
        }

        match self.image.generate(&final_prompt, None).await {
            Ok(image) => {
                let caption = self
                    .config
                    .replies
                    .caption_template
                    .replace("{prompt}", &final_prompt)
                    .replace("{seed}", &image.seed.to_string());
                info!(
                    peer_id,
                    seed = image.seed,
                    bytes = image.bytes.len(),
                    elapsed_ms = image.elapsed.as_millis() as u64,
                    "image generated"
                );
                if let Err(e) = self
                    .outbound
                    .send(
                        peer_id,
                        OutboundPayload::Image {
                            bytes: image.bytes,
                            mime_type: image.mime_type,
                            caption,
                        },
                    )
                    .await
                {
                    warn!(peer_id, error = %e, "failed to send image reply");
                }
            },
            Err(e) => {
                // the cause stays in the logs; the peer gets the fixed apology
                warn!(peer_id, error = %e, "image generation failed");
                self.send_text(peer_id, &self.config.replies.apology_text)
                    .await;
            },
        }
    }

    async fn handle_chat(&self, peer_id: &str, prompt: String) {
        let Some(chat) = &self.chat else {
            debug!(peer_id, "chat command received but no completion provider configured");
            return;
        };

        if !self.passes_moderation(peer_id, &prompt).await {
            return;
        }

        match chat
            .complete(&self.config.chat_system_prompt, &prompt)
            .await
        {
            Ok(content) => self.send_text(peer_id, &content).await,
            Err(e) => {
                warn!(peer_id, error = %e, "chat completion failed");
                self.send_text(peer_id, &self.config.replies.apology_text)
                    .await;
            },
        }
    }
}

#[async_trait]
impl InboundSink for CommandPipeline {
    async fn handle(&self, message: InboundMessage) {
        if message.delivery != Delivery::Notify {
            return;
        }
        if message.is_self_echo && !self.config.allow_self_commands {
            debug!(peer_id = %message.peer_id, "ignoring self-echo message");
            return;
        }
        let Some(text) = message.text.as_deref() else {
            return;
        };

        match command::parse(text, &self.config.commands) {
            Command::Help | Command::Empty => {
                self.send_text(&message.peer_id, &self.config.replies.help_text)
                    .await;
            },
            Command::Unrecognized => {},
            Command::GenerateImage {
                prompt,
                is_random_request,
            } => {
                self.handle_image(&message.peer_id, prompt, is_random_request)
                    .await;
            },
            Command::Chat { prompt } => {
                self.handle_chat(&message.peer_id, prompt).await;
            },
        }
    }
}

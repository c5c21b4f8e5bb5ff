//! Generation adapters: image synthesis and streaming chat completion.
//!
//! Both adapters hide their HTTP details behind small traits so the
//! pipeline can be exercised with in-memory fakes. Network failure,
//! non-2xx responses, malformed bodies, timeouts, and empty results all
//! surface through the same typed [`Error`].

pub mod completion;
pub mod error;
pub mod image;

use std::time::Duration;

use async_trait::async_trait;

pub use {
    completion::OpenAiCompatChat,
    error::{Error, Result},
    image::PollinationsImage,
};

/// A generated image plus the metadata needed for the reply caption.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    /// Seed actually used by the provider; reported back for
    /// reproducibility even when we picked it ourselves.
    pub seed: u64,
    pub elapsed: Duration,
}

/// Image-synthesis adapter.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Generate one image for `prompt`. When `seed` is absent the provider
    /// picks one and reports it in the result.
    async fn generate(&self, prompt: &str, seed: Option<u64>) -> Result<GeneratedImage>;
}

/// Streaming chat-completion adapter.
///
/// The stream is fully accumulated before returning; the pipeline sends one
/// reply, not a stream of edits.
#[async_trait]
pub trait ChatCompletionProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

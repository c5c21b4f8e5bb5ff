//! OpenAI-compatible streaming chat completion.
//!
//! The adapter consumes the SSE token stream and accumulates it into one
//! final string; partial output is never delivered to the chat session.

use std::{pin::Pin, time::Duration};

use {
    async_trait::async_trait,
    futures::{Stream, StreamExt},
    secrecy::{ExposeSecret, Secret},
    tracing::{debug, trace},
};

use crate::{
    ChatCompletionProvider,
    error::{Error, Result},
};

/// Incremental events from the completion stream.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Text content delta.
    Delta(String),
    /// Stream completed.
    Done,
    /// An error occurred mid-stream.
    Error(String),
}

/// Chat-completion provider speaking the OpenAI Chat Completions API.
pub struct OpenAiCompatChat {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<Secret<String>>,
    model: String,
    timeout: Duration,
}

impl OpenAiCompatChat {
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<Secret<String>>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            timeout,
        }
    }

    /// Open the SSE stream and yield delta/done/error events.
    fn stream(
        &self,
        system_prompt: String,
        user_prompt: String,
    ) -> Pin<Box<dyn Stream<Item = StreamEvent> + Send + '_>> {
        Box::pin(async_stream::stream! {
            let body = serde_json::json!({
                "model": self.model,
                "messages": [
                    { "role": "system", "content": system_prompt },
                    { "role": "user", "content": user_prompt },
                ],
                "stream": true,
            });

            debug!(model = %self.model, "completion stream request");

            let mut request = self
                .client
                .post(format!("{}/chat/completions", self.base_url))
                .header("content-type", "application/json")
                .json(&body);
            if let Some(key) = &self.api_key {
                request = request.header("Authorization", format!("Bearer {}", key.expose_secret()));
            }

            let resp = match request.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if !status.is_success() {
                        let body_text = resp.text().await.unwrap_or_default();
                        yield StreamEvent::Error(format!("HTTP {status}: {body_text}"));
                        return;
                    }
                    resp
                },
                Err(e) => {
                    yield StreamEvent::Error(e.to_string());
                    return;
                },
            };

            let mut byte_stream = resp.bytes_stream();
            let mut buf = String::new();

            while let Some(chunk) = byte_stream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield StreamEvent::Error(e.to_string());
                        return;
                    },
                };
                buf.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(pos) = buf.find('\n') {
                    let line = buf[..pos].trim().to_string();
                    buf = buf[pos + 1..].to_string();

                    match parse_sse_line(&line) {
                        SseLine::Done => {
                            yield StreamEvent::Done;
                            return;
                        },
                        SseLine::Delta(delta) => yield StreamEvent::Delta(delta),
                        SseLine::Skip => {},
                    }
                }
            }

            // Some compatible providers close the stream without a [DONE]
            // frame or trailing newline; flush the residual line.
            match parse_sse_line(buf.trim()) {
                SseLine::Delta(delta) => yield StreamEvent::Delta(delta),
                SseLine::Done | SseLine::Skip => {},
            }
            yield StreamEvent::Done;
        })
    }
}

enum SseLine {
    Delta(String),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line
        .strip_prefix("data: ")
        .or_else(|| line.strip_prefix("data:"))
    else {
        return SseLine::Skip;
    };
    if data == "[DONE]" {
        return SseLine::Done;
    }
    let Ok(evt) = serde_json::from_str::<serde_json::Value>(data) else {
        return SseLine::Skip;
    };
    match evt["choices"][0]["delta"]["content"].as_str() {
        Some(content) if !content.is_empty() => SseLine::Delta(content.to_string()),
        _ => SseLine::Skip,
    }
}

#[async_trait]
impl ChatCompletionProvider for OpenAiCompatChat {
    fn name(&self) -> &str {
        "openai-compat"
    }

    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let consume = async {
            let mut stream = self.stream(system_prompt.to_string(), user_prompt.to_string());
            let mut accumulated = String::new();
            while let Some(event) = stream.next().await {
                match event {
                    StreamEvent::Delta(delta) => {
                        trace!(len = delta.len(), "completion delta");
                        accumulated.push_str(&delta);
                    },
                    StreamEvent::Done => break,
                    StreamEvent::Error(message) => return Err(Error::malformed(message)),
                }
            }
            Ok(accumulated)
        };

        let accumulated = tokio::time::timeout(self.timeout, consume)
            .await
            .map_err(|_| Error::Timeout { after: self.timeout })??;

        if accumulated.trim().is_empty() {
            return Err(Error::EmptyResult);
        }
        Ok(accumulated)
    }
}

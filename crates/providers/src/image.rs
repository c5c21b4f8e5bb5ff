//! Pollinations-style image synthesis over plain HTTP GET.

use std::time::{Duration, Instant};

use {async_trait::async_trait, rand::Rng, tracing::debug};

use crate::{
    GeneratedImage, ImageProvider,
    error::{Error, Result},
};

/// Highest seed handed to the provider when we pick one ourselves.
const SEED_RANGE: u64 = 1_000_000_000;

/// Image provider backed by an `image.pollinations.ai`-compatible endpoint.
pub struct PollinationsImage {
    client: reqwest::Client,
    base_url: String,
    nologo: bool,
    timeout: Duration,
}

impl PollinationsImage {
    #[must_use]
    pub fn new(base_url: impl Into<String>, nologo: bool, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            nologo,
            timeout,
        }
    }

    fn request_url(&self, prompt: &str, seed: u64) -> String {
        let encoded = urlencoding::encode(prompt);
        let mut url = format!("{}/prompt/{encoded}?seed={seed}", self.base_url);
        if self.nologo {
            url.push_str("&nologo=true");
        }
        url
    }
}

#[async_trait]
impl ImageProvider for PollinationsImage {
    fn name(&self) -> &str {
        "pollinations"
    }

    async fn generate(&self, prompt: &str, seed: Option<u64>) -> Result<GeneratedImage> {
        let seed = seed.unwrap_or_else(|| rand::rng().random_range(0..SEED_RANGE));
        let url = self.request_url(prompt, seed);
        let started = Instant::now();

        debug!(seed, url = %url, "requesting image");

        let resp = tokio::time::timeout(self.timeout, self.client.get(&url).send())
            .await
            .map_err(|_| Error::Timeout { after: self.timeout })??;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::status(status.as_u16(), body));
        }

        let mime_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or(value).trim().to_string())
            .unwrap_or_else(|| "image/png".to_string());

        let bytes = tokio::time::timeout(self.timeout, resp.bytes())
            .await
            .map_err(|_| Error::Timeout { after: self.timeout })??;
        if bytes.is_empty() {
            return Err(Error::malformed("image body is empty"));
        }

        let elapsed = started.elapsed();
        debug!(
            seed,
            bytes = bytes.len(),
            mime_type,
            elapsed_ms = elapsed.as_millis() as u64,
            "image generated"
        );

        Ok(GeneratedImage {
            bytes: bytes.to_vec(),
            mime_type,
            seed,
            elapsed,
        })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{
        Router,
        extract::{Path, RawQuery, State},
        http::StatusCode,
        response::IntoResponse,
        routing::get,
    };

    use super::*;

    #[derive(Clone, Default)]
    struct Captured {
        requests: Arc<Mutex<Vec<(String, String)>>>,
    }

    async fn serve_png(
        State(captured): State<Captured>,
        Path(prompt): Path<String>,
        RawQuery(query): RawQuery,
    ) -> impl IntoResponse {
        captured
            .requests
            .lock()
            .unwrap()
            .push((prompt, query.unwrap_or_default()));
        (
            [(axum::http::header::CONTENT_TYPE, "image/png")],
            vec![0x89u8, b'P', b'N', b'G'],
        )
    }

    async fn start_mock(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn provider(base_url: &str) -> PollinationsImage {
        PollinationsImage::new(base_url, true, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn generates_and_reports_the_supplied_seed() {
        let captured = Captured::default();
        let router = Router::new()
            .route("/prompt/{prompt}", get(serve_png))
            .with_state(captured.clone());
        let base_url = start_mock(router).await;

        let image = provider(&base_url)
            .generate("cat in a hat", Some(42))
            .await
            .unwrap();

        assert_eq!(image.seed, 42);
        assert_eq!(image.mime_type, "image/png");
        assert!(!image.bytes.is_empty());

        let requests = captured.requests.lock().unwrap();
        let (prompt, query) = &requests[0];
        // axum decodes the path segment; the wire form was url-encoded
        assert_eq!(prompt, "cat in a hat");
        assert!(query.contains("seed=42"));
        assert!(query.contains("nologo=true"));
    }

    #[tokio::test]
    async fn picks_a_seed_when_none_supplied() {
        let captured = Captured::default();
        let router = Router::new()
            .route("/prompt/{prompt}", get(serve_png))
            .with_state(captured.clone());
        let base_url = start_mock(router).await;

        let image = provider(&base_url).generate("ocean", None).await.unwrap();
        assert!(image.seed < SEED_RANGE);

        let requests = captured.requests.lock().unwrap();
        assert!(requests[0].1.contains(&format!("seed={}", image.seed)));
    }

    #[tokio::test]
    async fn url_encodes_the_prompt() {
        let provider = provider("http://unused");
        let url = provider.request_url("cat in a hat & more", 7);
        assert!(url.contains("/prompt/cat%20in%20a%20hat%20%26%20more"));
    }

    #[tokio::test]
    async fn non_2xx_is_a_status_error() {
        let router = Router::new().route(
            "/prompt/{prompt}",
            get(|| async { (StatusCode::BAD_GATEWAY, "upstream sad") }),
        );
        let base_url = start_mock(router).await;

        let err = provider(&base_url).generate("x", Some(1)).await.unwrap_err();
        assert!(matches!(err, Error::Status { status: 502, .. }));
    }

    #[tokio::test]
    async fn empty_body_is_malformed() {
        let router = Router::new().route(
            "/prompt/{prompt}",
            get(|| async { ([(axum::http::header::CONTENT_TYPE, "image/png")], vec![]) }),
        );
        let base_url = start_mock(router).await;

        let err = provider(&base_url).generate("x", Some(1)).await.unwrap_err();
        assert!(matches!(err, Error::Malformed { .. }));
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let router = Router::new().route(
            "/prompt/{prompt}",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        let base_url = start_mock(router).await;

        let provider = PollinationsImage::new(&base_url, true, Duration::from_millis(50));
        let err = provider.generate("x", Some(1)).await.unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[tokio::test]
    async fn connection_refused_is_a_network_error() {
        let provider = provider("http://127.0.0.1:1");
        let err = provider.generate("x", Some(1)).await.unwrap_err();
        assert!(matches!(err, Error::Network { .. }));
    }
}

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::Client;
use serde_json::{json, Value};

use crate::core::config::{BackendConfig, RetryConfig};
use crate::core::PipelineError;
use crate::llm::provider::{GenerativeBackend, ImagePayload};
use crate::llm::retry::{with_retries, CallFailure};

/// Gemini `generateContent` client. Every call goes through the shared
/// retry loop; image calls run under a tighter timeout than text calls.
#[derive(Clone)]
pub struct GeminiBackend {
    base_url: String,
    model: String,
    api_key: String,
    text_timeout: Duration,
    image_timeout: Duration,
    retry: RetryConfig,
    client: Client,
}

impl GeminiBackend {
    pub fn new(backend: &BackendConfig, retry: &RetryConfig) -> Self {
        Self {
            base_url: backend.base_url.trim_end_matches('/').to_string(),
            model: backend.model.clone(),
            api_key: backend.api_key.clone(),
            text_timeout: Duration::from_secs(backend.text_timeout_secs),
            image_timeout: Duration::from_secs(backend.image_timeout_secs),
            retry: retry.clone(),
            client: Client::new(),
        }
    }

    async fn generate(&self, body: &Value, timeout: Duration) -> Result<String, CallFailure> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let res = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(CallFailure::transport)?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(CallFailure {
                status: Some(status.as_u16()),
                message: format!("backend error {status}: {text}"),
            });
        }

        let payload: Value = res.json().await.map_err(CallFailure::transport)?;
        let content = payload["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .unwrap_or_default()
            .trim()
            .to_string();
        // Blocked or empty candidates count as failures so the retry loop
        // gets another try.
        if content.is_empty() {
            return Err(CallFailure {
                status: None,
                message: "backend returned no text".to_string(),
            });
        }
        Ok(content)
    }
}

#[async_trait]
impl GenerativeBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, PipelineError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "maxOutputTokens": max_tokens },
        });
        with_retries(&self.retry, "text generation", || {
            self.generate(&body, self.text_timeout)
        })
        .await
    }

    async fn complete_with_image(
        &self,
        prompt: &str,
        image: &ImagePayload,
        max_tokens: u32,
    ) -> Result<String, PipelineError> {
        let body = json!({
            "contents": [{
                "parts": [
                    {
                        "inline_data": {
                            "mime_type": image.mime_type,
                            "data": BASE64.encode(&image.bytes),
                        }
                    },
                    { "text": prompt },
                ]
            }],
            "generationConfig": { "maxOutputTokens": max_tokens },
        });
        with_retries(&self.retry, "image description", || {
            self.generate(&body, self.image_timeout)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::testdeck::png_1x1;
    use crate::llm::image::normalize_for_upload;

    fn live_backend() -> Option<GeminiBackend> {
        let api_key = std::env::var("GOOGLE_API_KEY").ok()?;
        if api_key.is_empty() {
            return None;
        }
        let backend = BackendConfig {
            api_key,
            ..BackendConfig::default()
        };
        Some(GeminiBackend::new(&backend, &RetryConfig::default()))
    }

    // Live tests; run with `--ignored` and GOOGLE_API_KEY set.
    #[tokio::test]
    #[ignore]
    async fn test_live_text_generation() {
        let Some(backend) = live_backend() else {
            eprintln!("skipping: GOOGLE_API_KEY not set");
            return;
        };
        let out = backend
            .complete("Reply with the single word: ready", 20)
            .await
            .unwrap();
        assert!(!out.is_empty());
    }

    #[tokio::test]
    #[ignore]
    async fn test_live_image_description() {
        let Some(backend) = live_backend() else {
            eprintln!("skipping: GOOGLE_API_KEY not set");
            return;
        };
        let payload = normalize_for_upload(&png_1x1(), "png");
        let out = backend
            .complete_with_image("Describe this image in one short sentence.", &payload, 60)
            .await
            .unwrap();
        assert!(!out.is_empty());
    }
}

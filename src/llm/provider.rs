use async_trait::async_trait;

use crate::core::PipelineError;

/// Image bytes ready for upload, in a format the backend accepts.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// return the backend name (e.g. "gemini")
    fn name(&self) -> &str;

    /// text-only completion
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, PipelineError>;

    /// image-conditioned completion
    async fn complete_with_image(
        &self,
        prompt: &str,
        image: &ImagePayload,
        max_tokens: u32,
    ) -> Result<String, PipelineError>;
}

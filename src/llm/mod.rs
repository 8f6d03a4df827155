pub mod gemini;
pub mod image;
pub mod provider;
pub mod retry;

#[cfg(test)]
pub(crate) mod testing;

pub use gemini::GeminiBackend;
pub use image::normalize_for_upload;
pub use provider::{GenerativeBackend, ImagePayload};
pub use retry::{is_quota_exhausted, with_retries, CallFailure};

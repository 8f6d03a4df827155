use thiserror::Error;

/// Error taxonomy for one processing run.
///
/// Parse and store failures abort the operation that raised them; generation
/// failures are caught per chunk or per slide and degraded to fallback
/// content, so a run that parses its document always produces output.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to parse presentation: {0}")]
    Parse(String),
    #[error("collection store unreachable: {0}")]
    StoreUnavailable(String),
    #[error("collection store request failed: {0}")]
    StoreRequest(String),
    #[error("presentation contains no indexable text")]
    EmptyKnowledgeBase,
    #[error("collection '{0}' has no records")]
    EmptyCollection(String),
    #[error("no slide with number {0} in the collection")]
    SlideNotFound(u32),
    #[error("generation failed after {attempts} attempts: {reason}")]
    GenerationFailed { attempts: u32, reason: String },
    #[error("run cancelled")]
    Cancelled,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn parse<E: std::fmt::Display>(err: E) -> Self {
        PipelineError::Parse(err.to_string())
    }

    pub fn store_unavailable<E: std::fmt::Display>(err: E) -> Self {
        PipelineError::StoreUnavailable(err.to_string())
    }

    pub fn store_request<E: std::fmt::Display>(err: E) -> Self {
        PipelineError::StoreRequest(err.to_string())
    }

    pub fn generation(attempts: u32, reason: impl Into<String>) -> Self {
        PipelineError::GenerationFailed {
            attempts,
            reason: reason.into(),
        }
    }
}

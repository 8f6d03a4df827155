//! Scripted backend for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::PipelineError;
use crate::llm::provider::{GenerativeBackend, ImagePayload};

pub(crate) struct RecordedCall {
    pub prompt: String,
    pub max_tokens: u32,
    pub with_image: bool,
    pub mime_type: Option<String>,
}

/// Replays scripted outcomes in order; records every call it sees.
pub(crate) struct FakeBackend {
    outcomes: Mutex<VecDeque<Result<String, String>>>,
    fallback: Option<String>,
    pub calls: Mutex<Vec<RecordedCall>>,
}

impl FakeBackend {
    pub(crate) fn scripted(outcomes: Vec<Result<String, String>>) -> Self {
        FakeBackend {
            outcomes: Mutex::new(outcomes.into()),
            fallback: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answers every call with the same text.
    pub(crate) fn always(text: &str) -> Self {
        FakeBackend {
            outcomes: Mutex::new(VecDeque::new()),
            fallback: Some(text.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|c| c.prompt.clone()).collect()
    }

    fn next(&self) -> Result<String, PipelineError> {
        let scripted = self.outcomes.lock().unwrap().pop_front();
        match scripted {
            Some(Ok(text)) => Ok(text),
            Some(Err(reason)) => Err(PipelineError::generation(3, reason)),
            None => match &self.fallback {
                Some(text) => Ok(text.clone()),
                None => Err(PipelineError::generation(3, "no scripted outcome left")),
            },
        }
    }
}

#[async_trait]
impl GenerativeBackend for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, PipelineError> {
        self.calls.lock().unwrap().push(RecordedCall {
            prompt: prompt.to_string(),
            max_tokens,
            with_image: false,
            mime_type: None,
        });
        self.next()
    }

    async fn complete_with_image(
        &self,
        prompt: &str,
        image: &ImagePayload,
        max_tokens: u32,
    ) -> Result<String, PipelineError> {
        self.calls.lock().unwrap().push(RecordedCall {
            prompt: prompt.to_string(),
            max_tokens,
            with_image: true,
            mime_type: Some(image.mime_type.clone()),
        });
        self.next()
    }
}

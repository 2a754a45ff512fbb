//! Text generation abstraction.
//!
//! A [`TextGenerator`] turns one [`GenerationRequest`] into a lazy stream of
//! text increments. Dropping the stream closes the underlying transport.

pub mod ollama;

pub use ollama::OllamaClient;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::config::GenerationSettings;
use crate::error::GenerationResult;

/// One call to the model server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub endpoint: String,
}

impl GenerationRequest {
    pub fn new(model: &str, prompt: String, endpoint: &str) -> Self {
        Self {
            model: model.to_string(),
            prompt,
            endpoint: endpoint.to_string(),
        }
    }
}

/// Which model to call and where, as configured by the host application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model: String,
    pub endpoint: String,
}

impl ModelConfig {
    pub fn new(model: &str, endpoint: &str) -> Self {
        Self {
            model: model.to_string(),
            endpoint: endpoint.to_string(),
        }
    }

    pub fn request(&self, prompt: String) -> GenerationRequest {
        GenerationRequest::new(&self.model, prompt, &self.endpoint)
    }
}

impl From<&GenerationSettings> for ModelConfig {
    fn from(settings: &GenerationSettings) -> Self {
        Self::new(&settings.model, &settings.endpoint)
    }
}

/// Ordered, finite sequence of text increments.
pub type TextStream = BoxStream<'static, GenerationResult<String>>;

/// Streaming text generation backend
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Open a generation call.
    ///
    /// Errors returned here happened before any text arrived. Errors yielded
    /// by the stream happened mid-generation.
    async fn generate(&self, request: GenerationRequest) -> GenerationResult<TextStream>;
}

/// Run one generation call to completion.
///
/// `on_increment` sees every increment in receipt order; the concatenated
/// text is returned only if the stream finished cleanly.
pub async fn generate_text<F>(
    generator: &dyn TextGenerator,
    request: GenerationRequest,
    mut on_increment: F,
) -> GenerationResult<String>
where
    F: FnMut(&str),
{
    let mut stream = generator.generate(request).await?;
    let mut text = String::new();

    while let Some(increment) = stream.next().await {
        let increment = increment?;
        on_increment(&increment);
        text.push_str(&increment);
    }

    Ok(text)
}

/// Cut a prompt down to at most `max_chars` characters.
///
/// Oversized prompts are truncated rather than rejected.
pub fn truncate_prompt(prompt: &str, max_chars: usize) -> String {
    match prompt.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => {
            tracing::warn!(
                original_chars = prompt.chars().count(),
                max_chars,
                "Prompt truncated"
            );
            prompt[..byte_idx].to_string()
        }
        None => prompt.to_string(),
    }
}

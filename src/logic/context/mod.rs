//! Context Module - LLM analyst summaries
//!
//! ## Structure
//! - `prompt`: Prompt built from a feature document
//! - `ollama`: Ollama `/api/chat` generator

pub mod ollama;
pub mod prompt;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::DependencyError;

pub use ollama::OllamaGenerator;
pub use prompt::{build_prompt, ContextPrompt, SYSTEM_PROMPT};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LlmError {
    #[error(transparent)]
    Dependency(#[from] DependencyError),

    #[error("model `{0}` is not available on the LLM server")]
    ModelNotFound(String),
}

impl LlmError {
    pub fn kind(&self) -> &'static str {
        match self {
            LlmError::Dependency(e) => e.kind(),
            LlmError::ModelNotFound(_) => "model_not_found",
        }
    }
}

/// Text generator for `context.summary`
#[async_trait]
pub trait ContextGenerator: Send + Sync {
    /// Trimmed, non-empty response text
    async fn generate(&self, prompt: &ContextPrompt) -> Result<String, LlmError>;

    /// Written to `context.summary_model`
    fn model_name(&self) -> &str;
}

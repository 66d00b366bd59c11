//! Ollama Context Generator
//!
//! Non-streaming `/api/chat` call. The reply content is returned verbatim
//! (trimmed); an empty reply is an invalid response.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ContextGenerator, ContextPrompt, LlmError};
use crate::config::OllamaConfig;
use crate::error::{Dependency, DependencyError, FatalConfigError};
use crate::logic::retry::RetryPolicy;

const SERVICE: Dependency = Dependency::ContextGenerator;

/// Health checks are cheap; don't wait the full generation budget
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ChatReply>,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
}

pub struct OllamaGenerator {
    url: String,
    model: String,
    temperature: f32,
    retry: RetryPolicy,
    client: Client,
}

impl OllamaGenerator {
    pub fn new(config: &OllamaConfig, retry: RetryPolicy) -> Result<Self, FatalConfigError> {
        // LLM_TIMEOUT_SECS bounds the whole call, retries included
        let client = Client::builder()
            .timeout(retry.attempt_timeout(Duration::from_secs(config.timeout_secs)))
            .build()
            .map_err(|e| FatalConfigError::HttpClient {
                service: SERVICE,
                message: e.to_string(),
            })?;

        Ok(Self {
            url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            retry,
            client,
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.url)
    }

    fn tags_url(&self) -> String {
        format!("{}/api/tags", self.url)
    }

    /// `Ok(true)` when the server is up and has the configured model pulled
    pub async fn health_check(&self) -> Result<bool, LlmError> {
        let response = self
            .client
            .get(self.tags_url())
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(|e| DependencyError::from_reqwest(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DependencyError::from_status(SERVICE, status.as_u16(), body).into());
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| DependencyError::from_reqwest(SERVICE, e))?;
        Ok(tags.models.iter().any(|m| m.name.starts_with(&self.model)))
    }

    async fn chat_once(&self, prompt: &ContextPrompt) -> Result<String, DependencyError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage { role: "system", content: &prompt.system },
                ChatMessage { role: "user", content: &prompt.user },
            ],
            stream: false,
            options: ChatOptions { temperature: self.temperature },
        };

        let response = self
            .client
            .post(self.chat_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| DependencyError::from_reqwest(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DependencyError::from_status(SERVICE, status.as_u16(), body));
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| DependencyError::from_reqwest(SERVICE, e))?;

        let content = reply
            .message
            .map(|m| m.content.trim().to_string())
            .unwrap_or_default();
        if content.is_empty() {
            return Err(DependencyError::invalid(SERVICE, "empty response content"));
        }
        Ok(content)
    }
}

#[async_trait]
impl ContextGenerator for OllamaGenerator {
    async fn generate(&self, prompt: &ContextPrompt) -> Result<String, LlmError> {
        let result = self
            .retry
            .run("ollama.chat", || self.chat_once(prompt))
            .await;

        match result {
            Ok(text) => {
                debug!(chars = text.len(), "ollama reply received");
                Ok(text)
            }
            Err(DependencyError::Rejected { status: 404, .. }) => Err(LlmError::ModelNotFound(self.model.clone())),
            Err(e) => Err(e.into()),
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::error::ChatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// The chat-completion collaborator. Implementations must be safe to share
/// across tasks; callers never mutate them.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Send `messages` to `model` and return the assistant reply text.
    async fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<String, ChatError>;
}

// Structures matching Ollama's /api/chat endpoint
#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool, // We want the full response, not a stream
}

#[derive(Deserialize, Debug)]
struct OllamaChatResponse {
    message: OllamaReply,
    // model, created_at, done, timings etc. are ignored
}

#[derive(Deserialize, Debug)]
struct OllamaReply {
    content: String,
}

/// `ChatClient` backed by a local Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    chat_url: String,
}

impl OllamaClient {
    /// Fails only if the HTTP client itself cannot be set up (e.g. no TLS
    /// backend); that is a setup error, not a chat `Transport` failure.
    pub fn new(base_url: &str, timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            chat_url: format!("{}/api/chat", base_url.trim_end_matches('/')),
        })
    }

    pub fn chat_url(&self) -> &str {
        &self.chat_url
    }
}

#[async_trait]
impl ChatClient for OllamaClient {
    #[instrument(skip(self, messages), fields(turns = messages.len()))]
    async fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<String, ChatError> {
        let payload = OllamaChatRequest {
            model,
            messages,
            stream: false,
        };
        debug!(url = %self.chat_url, ?messages, "Sending chat request to Ollama");

        let response = self
            .client
            .post(&self.chat_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(%status, %body, "Ollama chat request failed");
            return Err(ChatError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed = response
            .json::<OllamaChatResponse>()
            .await
            .map_err(|e| ChatError::Decode(e.to_string()))?;

        debug!(reply = ?parsed.message.content, "Received Ollama reply");
        Ok(parsed.message.content)
    }
}

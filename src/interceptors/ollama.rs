//! Ollama adapters for the `/api/chat` and `/api/generate` endpoints.
//!
//! Ollama usage is `prompt_eval_count` / `eval_count`; both are absent on
//! cached prompt evaluations, in which case they count as zero.

use super::{join_prompt, GovernedProvider, ProviderAdapter};
use crate::client::{GovernanceClient, TokenUsage};
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const PROVIDER: &str = "ollama";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
    /// Base64 images; never part of the prompt.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            images: Vec::new(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<ChatMessage>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub prompt_eval_count: u64,
    #[serde(default)]
    pub eval_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub model: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub prompt_eval_count: u64,
    #[serde(default)]
    pub eval_count: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OllamaChatAdapter;

impl ProviderAdapter for OllamaChatAdapter {
    type Request = ChatRequest;
    type Response = ChatResponse;

    fn provider(&self) -> &str {
        PROVIDER
    }

    fn model(&self, request: &ChatRequest) -> String {
        request.model.clone()
    }

    fn extract_prompt(&self, request: &ChatRequest) -> Result<String> {
        let (system, rest): (Vec<_>, Vec<_>) =
            request.messages.iter().partition(|m| m.role == "system");
        Ok(join_prompt(
            system.into_iter().chain(rest).map(|m| m.content.as_str()),
        ))
    }

    fn response_text(&self, response: &ChatResponse) -> String {
        response
            .message
            .as_ref()
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }

    fn token_usage(&self, response: &ChatResponse) -> TokenUsage {
        TokenUsage::new(response.prompt_eval_count, response.eval_count)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OllamaGenerateAdapter;

impl ProviderAdapter for OllamaGenerateAdapter {
    type Request = GenerateRequest;
    type Response = GenerateResponse;

    fn provider(&self) -> &str {
        PROVIDER
    }

    fn model(&self, request: &GenerateRequest) -> String {
        request.model.clone()
    }

    fn extract_prompt(&self, request: &GenerateRequest) -> Result<String> {
        Ok(join_prompt(
            request
                .system
                .as_deref()
                .into_iter()
                .chain(std::iter::once(request.prompt.as_str())),
        ))
    }

    fn response_text(&self, response: &GenerateResponse) -> String {
        response.response.clone()
    }

    fn token_usage(&self, response: &GenerateResponse) -> TokenUsage {
        TokenUsage::new(response.prompt_eval_count, response.eval_count)
    }
}

/// Wrap an Ollama `/api/chat` call with pre-check and audit.
pub fn wrap_chat<F>(
    client: &GovernanceClient,
    user_token: impl Into<String>,
    invoke: F,
) -> GovernedProvider<OllamaChatAdapter, F> {
    GovernedProvider::from_client(client, OllamaChatAdapter, invoke, user_token)
}

/// Wrap an Ollama `/api/generate` call with pre-check and audit.
pub fn wrap_generate<F>(
    client: &GovernanceClient,
    user_token: impl Into<String>,
    invoke: F,
) -> GovernedProvider<OllamaGenerateAdapter, F> {
    GovernedProvider::from_client(client, OllamaGenerateAdapter, invoke, user_token)
}

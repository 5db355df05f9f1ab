//! Anthropic Messages API 拦截适配器
//!
//! Anthropic messages adapter. Key differences from OpenAI:
//! - The system prompt is a top-level `system` field (string or text blocks).
//! - Message `content` is a string or an array of typed blocks.
//! - Response text lives in `content[].text`; usage is `input_tokens` /
//!   `output_tokens` with no total.

use super::{join_prompt, GovernedProvider, ProviderAdapter};
use crate::client::{GovernanceClient, TokenUsage};
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const PROVIDER: &str = "anthropic";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagesRequest {
    pub model: String,
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<Content>,
    pub messages: Vec<Message>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: Content,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: Content::Text(text.into()),
        }
    }
}

/// String shorthand or list of content blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl Content {
    pub(crate) fn text_fragments(&self) -> Vec<&str> {
        match self {
            Content::Text(s) => vec![s.as_str()],
            Content::Blocks(blocks) => blocks.iter().filter_map(ContentBlock::as_text).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".into(),
            text: Some(text.into()),
            extra: Map::new(),
        }
    }

    pub(crate) fn as_text(&self) -> Option<&str> {
        if self.kind == "text" {
            self.text.as_deref()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: Usage,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicAdapter;

impl ProviderAdapter for AnthropicAdapter {
    type Request = MessagesRequest;
    type Response = MessagesResponse;

    fn provider(&self) -> &str {
        PROVIDER
    }

    fn model(&self, request: &MessagesRequest) -> String {
        request.model.clone()
    }

    fn extract_prompt(&self, request: &MessagesRequest) -> Result<String> {
        let system = request.system.iter().flat_map(Content::text_fragments);
        let messages = request.messages.iter().flat_map(|m| m.content.text_fragments());
        Ok(join_prompt(system.chain(messages)))
    }

    fn response_text(&self, response: &MessagesResponse) -> String {
        join_prompt(response.content.iter().filter_map(ContentBlock::as_text))
    }

    fn token_usage(&self, response: &MessagesResponse) -> TokenUsage {
        TokenUsage::new(response.usage.input_tokens, response.usage.output_tokens)
    }
}

/// Wrap an Anthropic messages call with pre-check and audit.
pub fn wrap<F>(
    client: &GovernanceClient,
    user_token: impl Into<String>,
    invoke: F,
) -> GovernedProvider<AnthropicAdapter, F> {
    GovernedProvider::from_client(client, AnthropicAdapter, invoke, user_token)
}

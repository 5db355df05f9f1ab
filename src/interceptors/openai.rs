//! OpenAI Chat Completions 拦截适配器
//!
//! OpenAI chat completions adapter.
//!
//! - Message `content` is either a string or an array of typed parts; only
//!   `type: "text"` parts contribute to the prompt.
//! - System messages are moved to the front of the prompt.
//! - Usage comes from `usage.{prompt,completion,total}_tokens`.
//! - Unknown fields survive a serde round trip through `extra`.

use super::{join_prompt, GovernedProvider, ProviderAdapter};
use crate::client::{GovernanceClient, TokenUsage};
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const PROVIDER: &str = "openai";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatCompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatMessage {
    pub fn text(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: Some(MessageContent::Text(text.into())),
            extra: Map::new(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::text("system", text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::text("user", text)
    }

    fn text_fragments(&self) -> Vec<&str> {
        match &self.content {
            Some(MessageContent::Text(s)) => vec![s.as_str()],
            Some(MessageContent::Parts(parts)) => parts
                .iter()
                .filter(|p| p.kind == "text")
                .filter_map(|p| p.text.as_deref())
                .collect(),
            None => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// One element of an array `content`. Image and audio parts keep their
/// payload in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    pub message: ChatMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiAdapter;

impl ProviderAdapter for OpenAiAdapter {
    type Request = ChatCompletionRequest;
    type Response = ChatCompletionResponse;

    fn provider(&self) -> &str {
        PROVIDER
    }

    fn model(&self, request: &ChatCompletionRequest) -> String {
        request.model.clone()
    }

    fn extract_prompt(&self, request: &ChatCompletionRequest) -> Result<String> {
        let (system, rest): (Vec<_>, Vec<_>) =
            request.messages.iter().partition(|m| m.role == "system");
        Ok(join_prompt(
            system
                .into_iter()
                .chain(rest)
                .flat_map(ChatMessage::text_fragments),
        ))
    }

    fn response_text(&self, response: &ChatCompletionResponse) -> String {
        response
            .choices
            .first()
            .map(|c| join_prompt(c.message.text_fragments()))
            .unwrap_or_default()
    }

    fn token_usage(&self, response: &ChatCompletionResponse) -> TokenUsage {
        match response.usage {
            Some(u) => TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            },
            None => TokenUsage::default(),
        }
    }
}

/// Wrap an OpenAI chat call with pre-check and audit.
pub fn wrap<F>(
    client: &GovernanceClient,
    user_token: impl Into<String>,
    invoke: F,
) -> GovernedProvider<OpenAiAdapter, F> {
    GovernedProvider::from_client(client, OpenAiAdapter, invoke, user_token)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::FakeGateway;
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn request() -> ChatCompletionRequest {
        serde_json::from_value(json!({
            "model": "gpt-4o",
            "temperature": 0.2,
            "messages": [
                {"role": "user", "content": "What is the capital of France?"},
                {"role": "system", "content": "Be brief."},
                {"role": "user", "content": [
                    {"type": "text", "text": "Answer in English."},
                    {"type": "image_url", "image_url": {"url": "https://x/img.png"}}
                ]}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn prompt_puts_system_first_and_skips_images() {
        let prompt = OpenAiAdapter.extract_prompt(&request()).unwrap();
        assert_eq!(
            prompt,
            "Be brief. What is the capital of France? Answer in English."
        );
    }

    #[test]
    fn unknown_fields_survive_round_trip() {
        let req = request();
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["temperature"], json!(0.2));
        assert_eq!(
            v["messages"][2]["content"][1]["image_url"]["url"],
            json!("https://x/img.png")
        );
    }

    #[test]
    fn response_text_and_usage() {
        let resp: ChatCompletionResponse = serde_json::from_value(json!({
            "id": "cmpl-1",
            "model": "gpt-4o",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Paris."},
                         "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 20, "completion_tokens": 2, "total_tokens": 22}
        }))
        .unwrap();
        assert_eq!(OpenAiAdapter.response_text(&resp), "Paris.");
        assert_eq!(OpenAiAdapter.token_usage(&resp).total_tokens, 22);
        assert_eq!(
            OpenAiAdapter.token_usage(&ChatCompletionResponse::default()),
            TokenUsage::default()
        );
    }

    #[tokio::test]
    async fn rejected_prompt_never_reaches_provider() {
        let gw = FakeGateway::rejecting("PII detected");
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let governed = GovernedProvider::new(
            OpenAiAdapter,
            move |_req: ChatCompletionRequest| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, String>(ChatCompletionResponse::default()) }
            },
            gw.clone(),
            gw.dispatcher(),
            "user-1",
        );

        let err = governed.invoke(request()).await.unwrap_err();
        assert!(err.is_policy_violation());
        assert_eq!(err.as_policy_violation().unwrap().block_reason, "PII detected");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn approved_call_is_audited() {
        let gw = FakeGateway::approving();
        let dispatcher = gw.dispatcher();
        let governed = GovernedProvider::new(
            OpenAiAdapter,
            |req: ChatCompletionRequest| async move {
                assert_eq!(req.extra.get("temperature"), Some(&json!(0.2)));
                Ok::<_, String>(ChatCompletionResponse {
                    model: req.model,
                    choices: vec![Choice {
                        index: 0,
                        message: ChatMessage::text("assistant", "Paris."),
                        finish_reason: Some("stop".into()),
                    }],
                    usage: Some(Usage {
                        prompt_tokens: 10,
                        completion_tokens: 2,
                        total_tokens: 12,
                    }),
                    ..ChatCompletionResponse::default()
                })
            },
            gw.clone(),
            dispatcher.clone(),
            "user-1",
        );

        let resp = governed.invoke(request()).await.unwrap();
        assert_eq!(resp.model, "gpt-4o");
        dispatcher.flush().await;

        let audits = gw.audits.lock().unwrap();
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].provider, "openai");
        assert_eq!(audits[0].model, "gpt-4o");
        assert_eq!(audits[0].response_summary, "Paris.");
        assert_eq!(audits[0].token_usage.total_tokens, 12);
        assert_eq!(
            gw.prompts.lock().unwrap()[0],
            "Be brief. What is the capital of France? Answer in English."
        );
    }
}

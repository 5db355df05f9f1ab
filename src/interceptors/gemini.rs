//! Gemini generateContent 拦截适配器
//!
//! Google Gemini adapter.
//! - `contents[].parts[]` instead of messages; only parts with `text` count.
//! - System prompt is `systemInstruction` (camelCase on the wire).
//! - The model is part of the URL, not the body, so the adapter carries it.
//! - Usage comes from `usageMetadata`.

use super::{join_prompt, GovernedProvider, ProviderAdapter};
use crate::client::{GovernanceClient, TokenUsage};
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const PROVIDER: &str = "gemini";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    #[serde(default)]
    pub contents: Vec<Content>,
    #[serde(
        default,
        alias = "system_instruction",
        skip_serializing_if = "Option::is_none"
    )]
    pub system_instruction: Option<Content>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Some("user".into()),
            parts: vec![Part::text(text)],
        }
    }

    fn text_fragments(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|p| p.text.as_deref())
    }
}

/// A text part, or inline/file data kept opaque in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u64,
    #[serde(default)]
    pub candidates_token_count: u64,
    #[serde(default)]
    pub total_token_count: u64,
}

#[derive(Debug, Clone)]
pub struct GeminiAdapter {
    model: String,
}

impl GeminiAdapter {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }
}

impl ProviderAdapter for GeminiAdapter {
    type Request = GenerateContentRequest;
    type Response = GenerateContentResponse;

    fn provider(&self) -> &str {
        PROVIDER
    }

    fn model(&self, _request: &GenerateContentRequest) -> String {
        self.model.clone()
    }

    fn extract_prompt(&self, request: &GenerateContentRequest) -> Result<String> {
        let system = request
            .system_instruction
            .iter()
            .flat_map(Content::text_fragments);
        let contents = request.contents.iter().flat_map(Content::text_fragments);
        Ok(join_prompt(system.chain(contents)))
    }

    fn response_text(&self, response: &GenerateContentResponse) -> String {
        response
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| join_prompt(c.text_fragments()))
            .unwrap_or_default()
    }

    fn token_usage(&self, response: &GenerateContentResponse) -> TokenUsage {
        match response.usage_metadata {
            Some(u) => TokenUsage {
                prompt_tokens: u.prompt_token_count,
                completion_tokens: u.candidates_token_count,
                total_tokens: u.total_token_count,
            },
            None => TokenUsage::default(),
        }
    }
}

/// Wrap a Gemini generateContent call for `model` with pre-check and audit.
pub fn wrap<F>(
    client: &GovernanceClient,
    user_token: impl Into<String>,
    model: impl Into<String>,
    invoke: F,
) -> GovernedProvider<GeminiAdapter, F> {
    GovernedProvider::from_client(client, GeminiAdapter::new(model), invoke, user_token)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::FakeGateway;
    use super::*;
    use serde_json::json;

    #[test]
    fn prompt_reads_system_instruction_and_text_parts() {
        let req: GenerateContentRequest = serde_json::from_value(json!({
            "systemInstruction": {"parts": [{"text": "Reply in French."}]},
            "contents": [
                {"role": "user", "parts": [
                    {"text": "Hello"},
                    {"inlineData": {"mimeType": "image/png", "data": "AAAA"}}
                ]}
            ],
            "generationConfig": {"maxOutputTokens": 64}
        }))
        .unwrap();
        let adapter = GeminiAdapter::new("gemini-1.5-flash");
        assert_eq!(adapter.extract_prompt(&req).unwrap(), "Reply in French. Hello");
        assert_eq!(adapter.model(&req), "gemini-1.5-flash");

        let back = serde_json::to_value(&req).unwrap();
        assert!(back.get("systemInstruction").is_some());
        assert_eq!(back["generationConfig"]["maxOutputTokens"], json!(64));
    }

    #[test]
    fn snake_case_system_instruction_is_accepted() {
        let req: GenerateContentRequest = serde_json::from_value(json!({
            "system_instruction": {"parts": [{"text": "sys"}]},
            "contents": [{"role": "user", "parts": [{"text": "hi"}]}]
        }))
        .unwrap();
        assert_eq!(GeminiAdapter::new("m").extract_prompt(&req).unwrap(), "sys hi");
    }

    #[test]
    fn response_text_and_usage() {
        let resp: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": "Bonjour"}]},
                            "finishReason": "STOP"}],
            "usageMetadata": {"promptTokenCount": 7, "candidatesTokenCount": 2, "totalTokenCount": 9}
        }))
        .unwrap();
        let adapter = GeminiAdapter::new("m");
        assert_eq!(adapter.response_text(&resp), "Bonjour");
        assert_eq!(adapter.token_usage(&resp).total_tokens, 9);
        assert_eq!(adapter.response_text(&GenerateContentResponse::default()), "");
    }

    #[tokio::test]
    async fn rejected_gemini_call_reports_policies() {
        let gw = FakeGateway::rejecting("blocked topic");
        let governed = GovernedProvider::new(
            GeminiAdapter::new("gemini-1.5-pro"),
            |_req: GenerateContentRequest| async {
                Ok::<_, String>(GenerateContentResponse::default())
            },
            gw.clone(),
            gw.dispatcher(),
            "user-1",
        );
        let req = GenerateContentRequest {
            contents: vec![Content::user("something")],
            ..GenerateContentRequest::default()
        };
        let err = governed.invoke(req).await.unwrap_err();
        let violation = err.as_policy_violation().unwrap();
        assert_eq!(violation.policies, vec!["pii".to_string()]);
    }
}

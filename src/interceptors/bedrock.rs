//! AWS Bedrock InvokeModel 拦截适配器
//!
//! Bedrock `InvokeModel` adapter.
//!
//! The request body is opaque bytes whose JSON schema depends on the model
//! family, so the family is picked from the model id first and the body is
//! then decoded with the matching typed shape:
//!
//! | Model id contains | Prompt fields | Output / usage |
//! |-------------------|---------------|----------------|
//! | `anthropic.` | `system`, `messages[].content`, legacy `prompt` | `content[].text` or `completion`; `usage.input_tokens/output_tokens` |
//! | `amazon.titan` | `inputText` | `results[0].outputText`; `inputTextTokenCount`, `results[].tokenCount` |
//! | `meta.llama` | `prompt` | `generation`; `prompt_token_count`, `generation_token_count` |
//!
//! Other families fall back to a top-level `prompt` or `inputText`. A body
//! that is not valid JSON fails the call before the provider is invoked.

use super::anthropic::{Content, ContentBlock};
use super::{join_prompt, GovernedProvider, ProviderAdapter};
use crate::client::{GovernanceClient, TokenUsage};
use crate::{Error, ErrorContext, Result};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Deserialize;

pub const PROVIDER: &str = "bedrock";

/// Arguments of `InvokeModel`.
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeModelRequest {
    pub model_id: String,
    pub body: Bytes,
    pub content_type: String,
    pub accept: String,
}

impl InvokeModelRequest {
    pub fn new(model_id: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            model_id: model_id.into(),
            body: body.into(),
            content_type: "application/json".into(),
            accept: "application/json".into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvokeModelResponse {
    pub body: Bytes,
    pub content_type: String,
}

/// Body schema family, from the model id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    Claude,
    Titan,
    Llama,
    Other,
}

impl ModelFamily {
    /// Matches on substrings so regional inference profiles
    /// (`us.anthropic.claude-...`) resolve like plain ids.
    pub fn from_model_id(model_id: &str) -> Self {
        if model_id.contains("anthropic.") {
            ModelFamily::Claude
        } else if model_id.contains("amazon.titan") {
            ModelFamily::Titan
        } else if model_id.contains("meta.llama") {
            ModelFamily::Llama
        } else {
            ModelFamily::Other
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ClaudeRequestBody {
    #[serde(default)]
    system: Option<Content>,
    #[serde(default)]
    messages: Vec<ClaudeMessage>,
    #[serde(default)]
    prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClaudeMessage {
    content: Content,
}

#[derive(Debug, Default, Deserialize)]
struct ClaudeResponseBody {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    completion: Option<String>,
    #[serde(default)]
    usage: Option<ClaudeUsage>,
}

#[derive(Debug, Default, Clone, Copy, Deserialize)]
struct ClaudeUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TitanRequestBody {
    #[serde(default)]
    input_text: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TitanResponseBody {
    #[serde(default)]
    input_text_token_count: u64,
    #[serde(default)]
    results: Vec<TitanResult>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TitanResult {
    #[serde(default)]
    token_count: u64,
    #[serde(default)]
    output_text: String,
}

#[derive(Debug, Default, Deserialize)]
struct LlamaRequestBody {
    #[serde(default)]
    prompt: String,
}

#[derive(Debug, Default, Deserialize)]
struct LlamaResponseBody {
    #[serde(default)]
    generation: String,
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    generation_token_count: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenericRequestBody {
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    input_text: Option<String>,
}

fn decode_body<T: DeserializeOwned>(body: &[u8], model_id: &str) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| {
        Error::runtime_with_context(
            format!("bedrock request body is not valid JSON: {}", e),
            ErrorContext::new()
                .with_details(model_id.to_string())
                .with_source("bedrock_adapter"),
        )
    })
}

/// Response bodies are best effort: an undecodable one audits as empty.
fn decode_output<T: DeserializeOwned + Default>(body: &[u8]) -> T {
    serde_json::from_slice(body).unwrap_or_default()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BedrockAdapter;

impl ProviderAdapter for BedrockAdapter {
    type Request = InvokeModelRequest;
    type Response = InvokeModelResponse;

    fn provider(&self) -> &str {
        PROVIDER
    }

    fn model(&self, request: &InvokeModelRequest) -> String {
        request.model_id.clone()
    }

    fn extract_prompt(&self, request: &InvokeModelRequest) -> Result<String> {
        let id = request.model_id.as_str();
        let body = &request.body[..];
        let prompt = match ModelFamily::from_model_id(id) {
            ModelFamily::Claude => {
                let b: ClaudeRequestBody = decode_body(body, id)?;
                let system = b.system.iter().flat_map(Content::text_fragments);
                let messages = b.messages.iter().flat_map(|m| m.content.text_fragments());
                join_prompt(system.chain(messages).chain(b.prompt.as_deref()))
            }
            ModelFamily::Titan => decode_body::<TitanRequestBody>(body, id)?.input_text,
            ModelFamily::Llama => decode_body::<LlamaRequestBody>(body, id)?.prompt,
            ModelFamily::Other => {
                let b: GenericRequestBody = decode_body(body, id)?;
                b.prompt.or(b.input_text).unwrap_or_default()
            }
        };
        Ok(prompt)
    }

    fn response_text(&self, response: &InvokeModelResponse) -> String {
        // The response does not carry the model id; try each family in turn.
        let claude: ClaudeResponseBody = decode_output(&response.body);
        if !claude.content.is_empty() || claude.completion.is_some() {
            let blocks = claude.content.iter().filter_map(ContentBlock::as_text);
            return join_prompt(blocks.chain(claude.completion.as_deref()));
        }
        let titan: TitanResponseBody = decode_output(&response.body);
        if let Some(first) = titan.results.first() {
            return first.output_text.clone();
        }
        decode_output::<LlamaResponseBody>(&response.body).generation
    }

    fn token_usage(&self, response: &InvokeModelResponse) -> TokenUsage {
        let claude: ClaudeResponseBody = decode_output(&response.body);
        if let Some(u) = claude.usage {
            return TokenUsage::new(u.input_tokens, u.output_tokens);
        }
        let titan: TitanResponseBody = decode_output(&response.body);
        if !titan.results.is_empty() {
            let completion = titan.results.iter().map(|r| r.token_count).sum();
            return TokenUsage::new(titan.input_text_token_count, completion);
        }
        let llama: LlamaResponseBody = decode_output(&response.body);
        TokenUsage::new(llama.prompt_token_count, llama.generation_token_count)
    }
}

/// Wrap a Bedrock `InvokeModel` call with pre-check and audit.
pub fn wrap<F>(
    client: &GovernanceClient,
    user_token: impl Into<String>,
    invoke: F,
) -> GovernedProvider<BedrockAdapter, F> {
    GovernedProvider::from_client(client, BedrockAdapter, invoke, user_token)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::FakeGateway;
    use super::super::InterceptError;
    use super::*;
    use serde_json::json;

    fn body(v: serde_json::Value) -> Bytes {
        Bytes::from(serde_json::to_vec(&v).unwrap())
    }

    #[test]
    fn family_detection() {
        assert_eq!(
            ModelFamily::from_model_id("anthropic.claude-3-sonnet-20240229-v1:0"),
            ModelFamily::Claude
        );
        assert_eq!(
            ModelFamily::from_model_id("us.anthropic.claude-3-5-haiku-20241022-v1:0"),
            ModelFamily::Claude
        );
        assert_eq!(
            ModelFamily::from_model_id("amazon.titan-text-express-v1"),
            ModelFamily::Titan
        );
        assert_eq!(
            ModelFamily::from_model_id("meta.llama3-70b-instruct-v1:0"),
            ModelFamily::Llama
        );
        assert_eq!(
            ModelFamily::from_model_id("mistral.mistral-7b-instruct-v0:2"),
            ModelFamily::Other
        );
    }

    #[test]
    fn claude_prompt_and_output() {
        let req = InvokeModelRequest::new(
            "anthropic.claude-3-haiku-20240307-v1:0",
            body(json!({
                "anthropic_version": "bedrock-2023-05-31",
                "max_tokens": 100,
                "system": "Be kind.",
                "messages": [{"role": "user", "content": [{"type": "text", "text": "Hi"}]}]
            })),
        );
        assert_eq!(BedrockAdapter.extract_prompt(&req).unwrap(), "Be kind. Hi");

        let resp = InvokeModelResponse {
            body: body(json!({
                "content": [{"type": "text", "text": "Hello!"}],
                "usage": {"input_tokens": 9, "output_tokens": 2}
            })),
            content_type: "application/json".into(),
        };
        assert_eq!(BedrockAdapter.response_text(&resp), "Hello!");
        assert_eq!(BedrockAdapter.token_usage(&resp), TokenUsage::new(9, 2));
    }

    #[test]
    fn titan_prompt_and_output() {
        let req = InvokeModelRequest::new(
            "amazon.titan-text-express-v1",
            body(json!({"inputText": "List three colors", "textGenerationConfig": {}})),
        );
        assert_eq!(BedrockAdapter.extract_prompt(&req).unwrap(), "List three colors");

        let resp = InvokeModelResponse {
            body: body(json!({
                "inputTextTokenCount": 4,
                "results": [{"tokenCount": 6, "outputText": "red, green, blue"}]
            })),
            ..InvokeModelResponse::default()
        };
        assert_eq!(BedrockAdapter.response_text(&resp), "red, green, blue");
        assert_eq!(BedrockAdapter.token_usage(&resp), TokenUsage::new(4, 6));
    }

    #[test]
    fn llama_prompt_and_output() {
        let req = InvokeModelRequest::new(
            "meta.llama3-8b-instruct-v1:0",
            body(json!({"prompt": "Tell me a joke", "max_gen_len": 64})),
        );
        assert_eq!(BedrockAdapter.extract_prompt(&req).unwrap(), "Tell me a joke");

        let resp = InvokeModelResponse {
            body: body(json!({
                "generation": "Why did...",
                "prompt_token_count": 5,
                "generation_token_count": 12
            })),
            ..InvokeModelResponse::default()
        };
        assert_eq!(BedrockAdapter.response_text(&resp), "Why did...");
        assert_eq!(BedrockAdapter.token_usage(&resp).total_tokens, 17);
    }

    #[test]
    fn unknown_family_falls_back() {
        let req = InvokeModelRequest::new("cohere.command-text-v14", body(json!({"prompt": "hey"})));
        assert_eq!(BedrockAdapter.extract_prompt(&req).unwrap(), "hey");
        let garbage = InvokeModelResponse {
            body: Bytes::from_static(b"not json"),
            ..InvokeModelResponse::default()
        };
        assert_eq!(BedrockAdapter.response_text(&garbage), "");
        assert_eq!(BedrockAdapter.token_usage(&garbage), TokenUsage::default());
    }

    #[tokio::test]
    async fn malformed_body_fails_closed() {
        let gw = FakeGateway::approving();
        let governed = GovernedProvider::new(
            BedrockAdapter,
            |_req: InvokeModelRequest| async {
                Ok::<_, String>(InvokeModelResponse::default())
            },
            gw.clone(),
            gw.dispatcher(),
            "user-1",
        );
        let req = InvokeModelRequest::new("anthropic.claude-v2", Bytes::from_static(b"{oops"));
        let err = governed.invoke(req).await.unwrap_err();
        let InterceptError::Governance(inner) = err else {
            panic!("expected a governance error");
        };
        let ctx = inner.context().unwrap();
        assert_eq!(ctx.source.as_deref(), Some("bedrock_adapter"));
        assert_eq!(ctx.details.as_deref(), Some("anthropic.claude-v2"));
        assert!(gw.prompts.lock().unwrap().is_empty());
    }
}

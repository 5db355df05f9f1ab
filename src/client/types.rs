//! Wire types exchanged with the governance service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Free-form request context forwarded to the server.
pub type Context = HashMap<String, Value>;

/// The server encodes empty collections as `null`; read that as empty.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

pub mod request_types {
    pub const CHAT: &str = "chat";
    pub const SQL: &str = "sql";
    pub const MCP_QUERY: &str = "mcp-query";
    pub const MULTI_AGENT_PLAN: &str = "multi-agent-plan";
    pub const EXECUTE_PLAN: &str = "execute-plan";
    pub const LLM_CHAT: &str = "llm_chat";
}

/// Outbound payload of `POST /api/request`.
///
/// `request_type` is an open set interpreted only by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernedRequest {
    pub query: String,
    pub user_token: String,
    #[serde(default)]
    pub client_id: String,
    pub request_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub context: Context,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyInfo {
    #[serde(default, deserialize_with = "null_as_default")]
    pub policies_evaluated: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub static_checks: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

/// Normalized response of a governed query.
///
/// Three independent axes:
/// - `blocked`: refused by policy, nothing ran downstream;
/// - `success == false` with `error`: governance was reached but the
///   downstream action failed;
/// - an `Err` from the client: governance could not be reached (unless the
///   client failed open, in which case `success` is true and `error` holds the
///   fail-open notice).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GovernedResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub blocked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_info: Option<PolicyInfo>,
}

impl GovernedResponse {
    /// Synthetic success returned when governance is unreachable in production mode.
    pub fn fail_open(cause: &crate::Error) -> Self {
        Self {
            success: true,
            error: Some(format!(
                "governance service unavailable, request allowed (fail-open): {}",
                cause
            )),
            ..Self::default()
        }
    }

    /// Successful, not blocked: the only shape the cache accepts.
    pub fn is_cacheable(&self) -> bool {
        self.success && !self.blocked
    }

    /// Turn a blocked response into a [`crate::PolicyViolation`] error.
    pub fn into_policy_result(self) -> crate::Result<Self> {
        if self.blocked {
            let policies = self
                .policy_info
                .as_ref()
                .map(|p| p.policies_evaluated.clone())
                .unwrap_or_default();
            return Err(crate::PolicyViolation::new(
                self.block_reason.unwrap_or_else(|| "blocked by policy".to_string()),
                policies,
            )
            .into());
        }
        Ok(self)
    }
}

/// Prompt submitted for a policy decision before a provider call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreCheckRequest {
    pub user_token: String,
    pub query: String,
    pub data_sources: Vec<String>,
    pub context: Context,
}

impl PreCheckRequest {
    pub fn new(user_token: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            user_token: user_token.into(),
            query: query.into(),
            data_sources: Vec::new(),
            context: Context::new(),
        }
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn with_data_sources(mut self, sources: Vec<String>) -> Self {
        self.data_sources = sources;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateLimitInfo {
    #[serde(default)]
    pub limit: u64,
    #[serde(default)]
    pub remaining: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<DateTime<Utc>>,
}

/// Outcome of a policy pre-check.
///
/// `context_id` correlates the later audit call and stops being valid at `expires_at`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyPreCheckResult {
    #[serde(default)]
    pub context_id: String,
    #[serde(default)]
    pub approved: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub policies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitInfo>,
}

impl PolicyPreCheckResult {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(exp) if now > exp)
    }

    pub fn violation(&self) -> crate::PolicyViolation {
        crate::PolicyViolation::new(
            self.block_reason
                .clone()
                .unwrap_or_else(|| "request not approved by policy".to_string()),
            self.policies.clone(),
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Post-hoc record of a completed provider call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditRequest {
    pub context_id: String,
    pub response_summary: String,
    pub provider: String,
    pub model: String,
    pub token_usage: TokenUsage,
    pub latency_ms: u64,
    pub metadata: Context,
    /// Copied from the pre-check result; audits past this instant are rejected locally.
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuditRequest {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(exp) if now > exp)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_id: Option<String>,
}

// Request bodies as sent on the wire; `client_id` is filled from the config.

#[derive(Debug, Serialize)]
pub(crate) struct PreCheckPayload<'a> {
    pub user_token: &'a str,
    pub client_id: &'a str,
    pub query: &'a str,
    pub data_sources: &'a [String],
    pub context: &'a Context,
}

#[derive(Debug, Serialize)]
pub(crate) struct AuditPayload<'a> {
    pub context_id: &'a str,
    pub client_id: &'a str,
    pub response_summary: &'a str,
    pub provider: &'a str,
    pub model: &'a str,
    pub token_usage: TokenUsage,
    pub latency_ms: u64,
    pub metadata: &'a Context,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn pre_check_result_decodes_and_expires() {
        let r: PolicyPreCheckResult = serde_json::from_str(
            r#"{"context_id":"ctx-1","approved":false,"policies":["pii"],
                "expires_at":"2030-01-01T00:00:00Z","block_reason":"PII detected"}"#,
        )
        .unwrap();
        assert_eq!(r.context_id, "ctx-1");
        assert!(!r.approved);
        let exp = r.expires_at.unwrap();
        assert!(!r.is_expired_at(exp));
        assert!(r.is_expired_at(exp + Duration::seconds(1)));
        let v = r.violation();
        assert_eq!(v.block_reason, "PII detected");
        assert_eq!(v.policies, vec!["pii".to_string()]);
    }

    #[test]
    fn blocked_response_becomes_violation() {
        let resp = GovernedResponse {
            blocked: true,
            block_reason: Some("SQL injection".into()),
            policy_info: Some(PolicyInfo {
                policies_evaluated: vec!["sqli".into()],
                ..PolicyInfo::default()
            }),
            ..GovernedResponse::default()
        };
        assert!(!resp.is_cacheable());
        let err = resp.into_policy_result().unwrap_err();
        let v = err.as_policy_violation().unwrap();
        assert_eq!(v.block_reason, "SQL injection");
        assert_eq!(v.policies, vec!["sqli".to_string()]);
    }

    #[test]
    fn null_collections_decode_as_empty() {
        let r: PolicyPreCheckResult =
            serde_json::from_str(r#"{"context_id":"c","approved":true,"policies":null}"#).unwrap();
        assert!(r.approved);
        assert!(r.policies.is_empty());

        let resp: GovernedResponse = serde_json::from_str(
            r#"{"success":true,"metadata":null,"data":null,
                "policy_info":{"policies_evaluated":null,"static_checks":null,"tenant_id":null}}"#,
        )
        .unwrap();
        assert!(resp.success);
        assert!(resp.metadata.is_none());
        let info = resp.policy_info.unwrap();
        assert!(info.policies_evaluated.is_empty());
        assert!(info.static_checks.is_empty());

        let req: GovernedRequest = serde_json::from_str(
            r#"{"query":"q","user_token":"u","request_type":"chat","context":null}"#,
        )
        .unwrap();
        assert!(req.context.is_empty());
    }

    #[test]
    fn omitted_collections_decode_as_empty() {
        let r: PolicyPreCheckResult = serde_json::from_str(r#"{"approved":false}"#).unwrap();
        assert!(r.policies.is_empty());
        assert_eq!(r.violation().block_reason, "request not approved by policy");
        let info: PolicyInfo = serde_json::from_str("{}").unwrap();
        assert_eq!(info, PolicyInfo::default());
    }

    #[test]
    fn token_usage_totals() {
        let u = TokenUsage::new(12, 30);
        assert_eq!(u.total_tokens, 42);
    }
}

//! LLM 拦截器：在调用第三方模型前做策略预检，调用后异步审计。
//!
//! LLM provider interceptors.
//!
//! A [`GovernedProvider`] wraps a caller-supplied provider call with:
//!
//! 1. prompt extraction from the provider-specific request,
//! 2. a policy pre-check (fail closed: no approval, no provider call),
//! 3. the provider call with the original, unmodified request,
//! 4. a non-blocking audit of the result.
//!
//! Provider errors are passed through untouched as [`InterceptError::Provider`].
//! Audit failures never reach the caller.
//!
//! Per-provider request/response shapes live in [`openai`], [`anthropic`],
//! [`gemini`], [`ollama`] and [`bedrock`]; each supplies a [`ProviderAdapter`].

pub mod anthropic;
pub mod bedrock;
pub mod gemini;
pub mod ollama;
pub mod openai;

use crate::client::{
    AuditDispatcher, AuditRequest, Context, GovernanceClient, PolicyGateway, PreCheckRequest,
    TokenUsage,
};
use crate::utils::truncate;
use crate::{Error, PolicyViolation};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Characters of provider output kept in the audit summary.
pub const SUMMARY_CHARS: usize = 100;

/// Knows how to read one provider's request and response shapes.
pub trait ProviderAdapter: Send + Sync {
    type Request: Send;
    type Response: Send;

    /// Provider name reported to governance (e.g. `"openai"`).
    fn provider(&self) -> &str;

    fn model(&self, request: &Self::Request) -> String;

    /// Flat prompt text: system prompt first, then textual message contents
    /// in order, space-joined. Non-text parts are skipped.
    fn extract_prompt(&self, request: &Self::Request) -> crate::Result<String>;

    /// Textual output of the response; truncated by the caller.
    fn response_text(&self, response: &Self::Response) -> String;

    /// Provider-reported usage, zero when unavailable.
    fn token_usage(&self, response: &Self::Response) -> TokenUsage;
}

/// Error returned by a governed provider call.
#[derive(Debug)]
pub enum InterceptError<E> {
    /// Pre-check refused the prompt; the provider was not called.
    Policy(PolicyViolation),
    /// Pre-check could not be completed; the provider was not called.
    Governance(Error),
    /// The provider call itself failed, error unchanged.
    Provider(E),
    /// The caller cancelled the operation.
    Cancelled,
}

impl<E> InterceptError<E> {
    pub fn is_policy_violation(&self) -> bool {
        matches!(self, InterceptError::Policy(_))
    }

    pub fn as_policy_violation(&self) -> Option<&PolicyViolation> {
        match self {
            InterceptError::Policy(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_provider_error(self) -> Option<E> {
        match self {
            InterceptError::Provider(e) => Some(e),
            _ => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for InterceptError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterceptError::Policy(v) => write!(f, "{}", v),
            InterceptError::Governance(e) => write!(f, "policy pre-check failed: {}", e),
            InterceptError::Provider(e) => write!(f, "provider error: {}", e),
            InterceptError::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for InterceptError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InterceptError::Policy(v) => Some(v),
            InterceptError::Governance(e) => Some(e),
            InterceptError::Provider(e) => Some(e),
            InterceptError::Cancelled => None,
        }
    }
}

/// A provider call wrapped with pre-check and audit.
pub struct GovernedProvider<A, F> {
    adapter: A,
    invoke: F,
    gateway: Arc<dyn PolicyGateway>,
    dispatcher: AuditDispatcher,
    user_token: String,
}

impl<A, F> GovernedProvider<A, F> {
    pub fn new(
        adapter: A,
        invoke: F,
        gateway: Arc<dyn PolicyGateway>,
        dispatcher: AuditDispatcher,
        user_token: impl Into<String>,
    ) -> Self {
        Self {
            adapter,
            invoke,
            gateway,
            dispatcher,
            user_token: user_token.into(),
        }
    }

    /// Wrap using a client's gateway and audit worker.
    pub fn from_client(
        client: &GovernanceClient,
        adapter: A,
        invoke: F,
        user_token: impl Into<String>,
    ) -> Self {
        Self::new(
            adapter,
            invoke,
            client.gateway(),
            client.audit_dispatcher(),
            user_token,
        )
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }
}

impl<A, F, Fut, E> GovernedProvider<A, F>
where
    A: ProviderAdapter,
    F: Fn(A::Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<A::Response, E>> + Send,
{
    /// Pre-check, call the provider, queue the audit.
    pub async fn invoke(&self, request: A::Request) -> Result<A::Response, InterceptError<E>> {
        let prompt = self
            .adapter
            .extract_prompt(&request)
            .map_err(InterceptError::Governance)?;
        let model = self.adapter.model(&request);
        let provider = self.adapter.provider().to_string();

        let mut context = Context::new();
        context.insert("provider".into(), Value::String(provider.clone()));
        context.insert("model".into(), Value::String(model.clone()));

        let approval = self
            .gateway
            .pre_check(PreCheckRequest::new(self.user_token.clone(), prompt).with_context(context))
            .await
            .map_err(InterceptError::Governance)?;

        if !approval.approved {
            debug!(%provider, %model, context_id = %approval.context_id, "provider call blocked by policy");
            return Err(InterceptError::Policy(approval.violation()));
        }

        let start = Instant::now();
        let response = (self.invoke)(request)
            .await
            .map_err(InterceptError::Provider)?;
        let latency_ms = start.elapsed().as_millis() as u64;

        let text = self.adapter.response_text(&response);
        let audit = AuditRequest {
            context_id: approval.context_id,
            response_summary: truncate(&text, SUMMARY_CHARS).to_string(),
            provider,
            model,
            token_usage: self.adapter.token_usage(&response),
            latency_ms,
            metadata: Context::new(),
            expires_at: approval.expires_at,
        };
        if !self.dispatcher.submit(audit) {
            debug!("audit not queued");
        }
        Ok(response)
    }

    /// [`GovernedProvider::invoke`] that gives up when `cancel` fires.
    ///
    /// Cancellation drops the in-flight pre-check or provider future. An audit
    /// already queued is not recalled.
    pub async fn invoke_with_cancel(
        &self,
        request: A::Request,
        cancel: &CancellationToken,
    ) -> Result<A::Response, InterceptError<E>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(provider = %self.adapter.provider(), "governed call cancelled");
                Err(InterceptError::Cancelled)
            }
            result = self.invoke(request) => result,
        }
    }
}

/// Space-join non-empty text fragments.
pub(crate) fn join_prompt<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::client::{
        AuditDispatcher, AuditRequest, AuditResult, PolicyGateway, PolicyPreCheckResult,
        PreCheckRequest,
    };
    use crate::telemetry::noop_observer;
    use crate::Result;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use tokio_util::sync::CancellationToken;

    /// Gateway with a fixed verdict that records what it saw.
    pub struct FakeGateway {
        pub approved: bool,
        pub block_reason: Option<String>,
        pub prompts: Mutex<Vec<String>>,
        pub audits: Mutex<Vec<AuditRequest>>,
    }

    impl FakeGateway {
        pub fn approving() -> Arc<Self> {
            Arc::new(Self {
                approved: true,
                block_reason: None,
                prompts: Mutex::new(Vec::new()),
                audits: Mutex::new(Vec::new()),
            })
        }

        pub fn rejecting(reason: &str) -> Arc<Self> {
            Arc::new(Self {
                approved: false,
                block_reason: Some(reason.to_string()),
                prompts: Mutex::new(Vec::new()),
                audits: Mutex::new(Vec::new()),
            })
        }

        pub fn dispatcher(self: &Arc<Self>) -> AuditDispatcher {
            AuditDispatcher::spawn(self.clone(), 16, noop_observer(), CancellationToken::new())
        }
    }

    #[async_trait]
    impl PolicyGateway for FakeGateway {
        async fn pre_check(&self, request: PreCheckRequest) -> Result<PolicyPreCheckResult> {
            self.prompts.lock().unwrap().push(request.query);
            Ok(PolicyPreCheckResult {
                context_id: "ctx-test".into(),
                approved: self.approved,
                policies: if self.approved { vec![] } else { vec!["pii".into()] },
                block_reason: self.block_reason.clone(),
                ..PolicyPreCheckResult::default()
            })
        }

        async fn audit(&self, request: AuditRequest) -> Result<AuditResult> {
            self.audits.lock().unwrap().push(request);
            Ok(AuditResult {
                success: true,
                audit_id: Some("audit-1".into()),
            })
        }
    }
}

//! Policy pre-check / audit gateway.
//!
//! A lighter alternative to the governed query used by interceptors: a fresh,
//! uncached, un-retried pre-check before the provider call, then an audit
//! record after it. Pre-check fails closed: every transport or status error is
//! returned to the caller.

use super::types::{
    AuditPayload, AuditRequest, AuditResult, PolicyPreCheckResult, PreCheckPayload, PreCheckRequest,
};
use crate::telemetry::{GovernanceEvent, GovernanceObserver};
use crate::transport::HttpTransport;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;

pub const PRE_CHECK_PATH: &str = "/api/policy/pre-check";
pub const AUDIT_PATH: &str = "/api/audit/llm-call";

/// The two calls an interceptor needs from the governance service.
#[async_trait]
pub trait PolicyGateway: Send + Sync {
    async fn pre_check(&self, request: PreCheckRequest) -> Result<PolicyPreCheckResult>;

    async fn audit(&self, request: AuditRequest) -> Result<AuditResult>;
}

/// HTTP implementation of [`PolicyGateway`].
pub struct PolicyClient {
    transport: Arc<HttpTransport>,
    client_id: String,
    observer: Arc<dyn GovernanceObserver>,
}

impl PolicyClient {
    pub fn new(
        transport: Arc<HttpTransport>,
        client_id: Option<String>,
        observer: Arc<dyn GovernanceObserver>,
    ) -> Self {
        Self {
            transport,
            client_id: client_id.unwrap_or_default(),
            observer,
        }
    }
}

/// Audits for an expired context are rejected before any network call.
pub(crate) fn ensure_fresh(request: &AuditRequest) -> Result<()> {
    if request.is_expired_at(Utc::now()) {
        return Err(Error::runtime_with_context(
            "policy context expired before audit",
            ErrorContext::new()
                .with_details(request.context_id.clone())
                .with_source("policy_gateway"),
        ));
    }
    Ok(())
}

#[async_trait]
impl PolicyGateway for PolicyClient {
    async fn pre_check(&self, request: PreCheckRequest) -> Result<PolicyPreCheckResult> {
        let payload = PreCheckPayload {
            user_token: &request.user_token,
            client_id: &self.client_id,
            query: &request.query,
            data_sources: &request.data_sources,
            context: &request.context,
        };

        let start = Instant::now();
        let body = self.transport.post_json(PRE_CHECK_PATH, &payload).await?;
        let result: PolicyPreCheckResult = serde_json::from_slice(&body)?;

        self.observer.on_event(&GovernanceEvent::PreCheck {
            context_id: result.context_id.clone(),
            approved: result.approved,
            latency_ms: start.elapsed().as_millis() as u64,
        });
        Ok(result)
    }

    async fn audit(&self, request: AuditRequest) -> Result<AuditResult> {
        ensure_fresh(&request)?;
        let payload = AuditPayload {
            context_id: &request.context_id,
            client_id: &self.client_id,
            response_summary: &request.response_summary,
            provider: &request.provider,
            model: &request.model,
            token_usage: request.token_usage,
            latency_ms: request.latency_ms,
            metadata: &request.metadata,
        };
        let body = self.transport.post_json(AUDIT_PATH, &payload).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

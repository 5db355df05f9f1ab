use super::dispatch::AuditDispatcher;
use super::gateway::{PolicyClient, PolicyGateway};
use super::normalize::decode_governed_response;
use super::types::{
    request_types, AuditRequest, AuditResult, Context, GovernedRequest, GovernedResponse,
    PolicyPreCheckResult, PreCheckRequest,
};
use crate::cache::{CacheKey, CacheStats, ResponseCache};
use crate::config::GovernanceConfig;
use crate::resilience::Retrier;
use crate::telemetry::{GovernanceEvent, GovernanceObserver};
use crate::transport::HttpTransport;
use crate::utils::{fingerprint, preview};
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const REQUEST_PATH: &str = "/api/request";
pub const HEALTH_PATH: &str = "/health";

/// Characters of user content kept in log lines and events.
const LOG_QUERY_CHARS: usize = 50;

/// Client for the governance control plane.
///
/// Cloning is cheap; clones share the cache, the audit worker and the
/// background lifecycle. Background tasks stop on [`GovernanceClient::close`]
/// or when the last clone is dropped.
#[derive(Clone)]
pub struct GovernanceClient {
    pub(crate) inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    pub(crate) config: GovernanceConfig,
    pub(crate) transport: Arc<HttpTransport>,
    pub(crate) gateway: Arc<PolicyClient>,
    pub(crate) cache: Option<ResponseCache<GovernedResponse>>,
    pub(crate) retrier: Option<Retrier>,
    pub(crate) dispatcher: AuditDispatcher,
    pub(crate) observer: Arc<dyn GovernanceObserver>,
    pub(crate) shutdown: CancellationToken,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl GovernanceClient {
    /// Create a client with the default observer.
    pub async fn new(config: GovernanceConfig) -> Result<Self> {
        crate::client::builder::GovernanceClientBuilder::new(config)
            .build()
            .await
    }

    /// Create a client from `GOVERNANCE_*` environment variables.
    pub async fn from_env() -> Result<Self> {
        Self::new(GovernanceConfig::from_env()?).await
    }

    pub fn config(&self) -> &GovernanceConfig {
        &self.inner.config
    }

    /// Start a fluent governed query.
    pub fn query(&self, query: impl Into<String>) -> crate::client::query::QueryBuilder<'_> {
        crate::client::query::QueryBuilder::new(self, query.into())
    }

    /// Send a query through governance.
    ///
    /// Order of operations: cache lookup, (retried) HTTP call, fail-open on
    /// governance outage in production mode, nested-failure normalization,
    /// and caching of plain successes.
    pub async fn execute_query(
        &self,
        user_token: &str,
        query: &str,
        request_type: &str,
        context: Context,
    ) -> Result<GovernedResponse> {
        let request = self.build_request(user_token, query, request_type, context);
        self.execute(request, true).await
    }

    /// [`GovernanceClient::execute_query`] that returns [`Error::Cancelled`]
    /// once `cancel` fires. The in-flight request and any pending retry sleep
    /// are dropped; nothing is cached.
    pub async fn execute_query_with_cancel(
        &self,
        user_token: &str,
        query: &str,
        request_type: &str,
        context: Context,
        cancel: &CancellationToken,
    ) -> Result<GovernedResponse> {
        with_cancel(cancel, self.execute_query(user_token, query, request_type, context)).await
    }

    /// Policy pre-check that gives up with [`Error::Cancelled`] when `cancel` fires.
    pub async fn pre_check_with_cancel(
        &self,
        request: PreCheckRequest,
        cancel: &CancellationToken,
    ) -> Result<PolicyPreCheckResult> {
        with_cancel(cancel, self.inner.gateway.pre_check(request)).await
    }

    fn build_request(
        &self,
        user_token: &str,
        query: &str,
        request_type: &str,
        context: Context,
    ) -> GovernedRequest {
        GovernedRequest {
            query: query.to_string(),
            user_token: user_token.to_string(),
            client_id: self.inner.config.client_id.clone().unwrap_or_default(),
            request_type: request_type.to_string(),
            context,
        }
    }

    /// Shared pipeline. `use_cache` is off for calls whose outcome depends on
    /// context the cache key does not cover.
    async fn execute(&self, request: GovernedRequest, use_cache: bool) -> Result<GovernedResponse> {
        let inner = &self.inner;
        let cache = inner.cache.as_ref().filter(|_| use_cache);
        let key = CacheKey::new(&request.request_type, &request.query, &request.user_token);

        if let Some(cache) = cache {
            if let Some(hit) = cache.get(&key) {
                inner.observer.on_event(&GovernanceEvent::CacheHit {
                    request_type: request.request_type.clone(),
                });
                return Ok(hit);
            }
        }

        inner.observer.on_event(&GovernanceEvent::RequestSent {
            request_type: request.request_type.clone(),
            query_preview: preview(&request.query, LOG_QUERY_CHARS),
            user: fingerprint(&request.user_token),
        });
        debug!(
            request_type = %request.request_type,
            query = %preview(&request.query, LOG_QUERY_CHARS),
            authenticated = inner.transport.has_credentials(),
            "sending governed request"
        );

        let start = Instant::now();
        let request = &request;
        let outcome = match &inner.retrier {
            Some(retrier) => {
                let observer = Arc::clone(&inner.observer);
                retrier
                    .run_with_hook(
                        move |_| self.send_once(request),
                        move |attempt, delay, err| {
                            observer.on_event(&GovernanceEvent::RetryScheduled {
                                attempt,
                                delay_ms: delay.as_millis() as u64,
                                error: err.to_string(),
                            })
                        },
                    )
                    .await
            }
            None => self.send_once(request).await,
        };

        let response = match outcome {
            Ok(resp) => resp,
            Err(err) if inner.config.fail_open() && err.is_governance_unavailable() => {
                inner.observer.on_event(&GovernanceEvent::FailOpen {
                    error: err.to_string(),
                });
                return Ok(GovernedResponse::fail_open(&err));
            }
            Err(err) => return Err(err),
        };

        inner.observer.on_event(&GovernanceEvent::ResponseReceived {
            request_type: request.request_type.clone(),
            success: response.success,
            blocked: response.blocked,
            latency_ms: start.elapsed().as_millis() as u64,
        });

        if response.is_cacheable() {
            if let Some(cache) = cache {
                cache.set(&key, response.clone());
            }
        }
        Ok(response)
    }

    async fn send_once(&self, request: &GovernedRequest) -> Result<GovernedResponse> {
        let body = self.inner.transport.post_json(REQUEST_PATH, request).await?;
        decode_governed_response(&body)
    }

    /// `GET /health`: true only on HTTP 200. Unreachable means unhealthy, not an error.
    pub async fn health_check(&self) -> bool {
        match self.inner.transport.get_status(HEALTH_PATH).await {
            Ok(status) => status == 200,
            Err(e) => {
                debug!(error = %e, "health check failed");
                false
            }
        }
    }

    /// Ask the orchestrator for a multi-agent plan.
    pub async fn generate_plan(
        &self,
        user_token: &str,
        query: &str,
        domain: Option<&str>,
    ) -> Result<GovernedResponse> {
        let mut context = Context::new();
        if let Some(d) = domain {
            context.insert("domain".into(), Value::String(d.to_string()));
        }
        let request =
            self.build_request(user_token, query, request_types::MULTI_AGENT_PLAN, context);
        self.execute(request, false).await
    }

    /// Execute a previously generated plan.
    pub async fn execute_plan(&self, user_token: &str, plan_id: &str) -> Result<GovernedResponse> {
        let mut context = Context::new();
        context.insert("plan_id".into(), Value::String(plan_id.to_string()));
        let request = self.build_request(user_token, "", request_types::EXECUTE_PLAN, context);
        self.execute(request, false).await
    }

    /// Query an MCP connector through governance.
    pub async fn query_connector(
        &self,
        user_token: &str,
        connector: &str,
        query: &str,
        params: Context,
    ) -> Result<GovernedResponse> {
        let mut context = Context::new();
        context.insert("connector".into(), Value::String(connector.to_string()));
        context.insert(
            "params".into(),
            Value::Object(params.into_iter().collect()),
        );
        let request = self.build_request(user_token, query, request_types::MCP_QUERY, context);
        self.execute(request, false).await
    }

    /// Gateway used by interceptors; shares this client's transport and observer.
    pub fn gateway(&self) -> Arc<dyn PolicyGateway> {
        self.inner.gateway.clone()
    }

    pub fn audit_dispatcher(&self) -> AuditDispatcher {
        self.inner.dispatcher.clone()
    }

    /// Wait for queued audits to be sent.
    pub async fn flush_audits(&self) {
        self.inner.dispatcher.flush().await;
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.inner.cache.as_ref().map(|c| c.stats())
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.inner.cache {
            cache.clear();
        }
    }

    /// Stop the cache sweep and the audit worker. Queued audits are dropped.
    ///
    /// Queries keep working after close; they just no longer get background
    /// maintenance or audit delivery.
    pub fn close(&self) {
        self.inner.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }
}

async fn with_cancel<T>(
    cancel: &CancellationToken,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!("governance call cancelled");
            Err(Error::Cancelled)
        }
        result = fut => result,
    }
}

#[async_trait]
impl PolicyGateway for GovernanceClient {
    async fn pre_check(&self, request: PreCheckRequest) -> Result<PolicyPreCheckResult> {
        self.inner.gateway.pre_check(request).await
    }

    async fn audit(&self, request: AuditRequest) -> Result<AuditResult> {
        self.inner.gateway.audit(request).await
    }
}

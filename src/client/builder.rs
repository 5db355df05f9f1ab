use crate::cache::ResponseCache;
use crate::client::core::{ClientInner, GovernanceClient};
use crate::client::dispatch::AuditDispatcher;
use crate::client::gateway::PolicyClient;
use crate::config::GovernanceConfig;
use crate::resilience::Retrier;
use crate::telemetry::{default_observer, GovernanceObserver};
use crate::transport::HttpTransport;
use crate::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Builder for creating clients with custom configuration.
///
/// Keep this surface area small and predictable (developer-friendly).
pub struct GovernanceClientBuilder {
    config: GovernanceConfig,
    observer: Option<Arc<dyn GovernanceObserver>>,
}

impl GovernanceClientBuilder {
    pub fn new(config: GovernanceConfig) -> Self {
        Self {
            config,
            observer: None,
        }
    }

    /// Inject an observer. Default: tracing when `debug` is set, otherwise no-op.
    pub fn observer(mut self, observer: Arc<dyn GovernanceObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Build the client.
    ///
    /// Must run inside a tokio runtime: the cache sweep and the audit worker
    /// are spawned here.
    pub async fn build(self) -> Result<GovernanceClient> {
        let config = self.config.with_defaults();
        config.validate()?;

        let observer = self
            .observer
            .unwrap_or_else(|| default_observer(config.debug));
        let transport = Arc::new(HttpTransport::new(&config)?);
        let gateway = Arc::new(PolicyClient::new(
            Arc::clone(&transport),
            config.client_id.clone(),
            Arc::clone(&observer),
        ));

        let shutdown = CancellationToken::new();
        let cache = config
            .cache
            .enabled
            .then(|| ResponseCache::with_sweeper(config.cache.ttl, shutdown.child_token()));
        let retrier = config.retry.enabled.then(|| Retrier::new(&config.retry));
        let dispatcher = AuditDispatcher::spawn(
            gateway.clone(),
            config.audit_queue_capacity,
            Arc::clone(&observer),
            shutdown.child_token(),
        );

        info!(
            endpoint = %config.endpoint,
            mode = config.mode.as_str(),
            loopback = config.is_loopback(),
            retry = config.retry.enabled,
            cache = config.cache.enabled,
            "governance client initialized"
        );

        Ok(GovernanceClient {
            inner: Arc::new(ClientInner {
                config,
                transport,
                gateway,
                cache,
                retrier,
                dispatcher,
                observer,
                shutdown,
            }),
        })
    }
}

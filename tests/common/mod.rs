//! Mock governance server fixture for integration tests

#![allow(dead_code)]

use ai_governance_sdk::config::{CacheConfig, RetryConfig};
use ai_governance_sdk::telemetry::InMemoryObserver;
use ai_governance_sdk::{GovernanceClient, GovernanceClientBuilder, GovernanceConfig, Mode};
use mockito::{Mock, Server, ServerGuard};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Route SDK logs to the test harness; `RUST_LOG=ai_governance_sdk=debug` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Test fixture that owns a mock governance server
pub struct MockServerFixture {
    pub server: ServerGuard,
    pub base_url: String,
}

impl MockServerFixture {
    pub async fn new() -> Self {
        init_tracing();
        let server = Server::new_async().await;
        let base_url = server.url();
        Self { server, base_url }
    }

    /// Sandbox config with fast retries, pointed at the mock server
    pub fn config(&self) -> GovernanceConfig {
        GovernanceConfig::new(&self.base_url)
            .with_client_id("test-client")
            .with_client_secret("test-secret")
            .with_mode(Mode::Sandbox)
            .with_timeout(Duration::from_secs(5))
            .with_retry(
                RetryConfig::default()
                    .with_max_attempts(3)
                    .with_initial_delay(Duration::from_millis(1)),
            )
            .with_cache(CacheConfig::default().with_ttl(Duration::from_secs(60)))
    }

    pub async fn client(&self, config: GovernanceConfig) -> (GovernanceClient, Arc<InMemoryObserver>) {
        let observer = Arc::new(InMemoryObserver::new());
        let client = GovernanceClientBuilder::new(config)
            .observer(observer.clone())
            .build()
            .await
            .expect("client should build");
        (client, observer)
    }

    /// JSON response for `POST path`, expected exactly `hits` times
    pub async fn mock_json(&mut self, path: &str, status: usize, body: &str, hits: usize) -> Mock {
        self.server
            .mock("POST", path)
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(body)
            .expect(hits)
            .create_async()
            .await
    }
}

/// An endpoint on loopback with nothing listening
pub async fn unreachable_endpoint() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{}", addr)
}

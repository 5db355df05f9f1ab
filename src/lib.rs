//! # ai-governance-sdk
//!
//! AI 治理客户端 SDK：受治理查询、策略预检、审计与 LLM 调用拦截。
//!
//! Client-side SDK for an AI governance control plane.
//!
//! ## Overview
//!
//! Applications route queries and LLM calls through a remote governance
//! service that decides whether each one is allowed, records an audit trail,
//! and may return results or plans. This crate is the client side of that
//! contract: it sends governed queries, caches successful answers, retries
//! transient failures, fails open in production when governance is
//! unreachable, and wraps third-party LLM calls with a pre-check and a
//! non-blocking audit.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ai_governance_sdk::{GovernanceClient, GovernanceConfig};
//!
//! #[tokio::main]
//! async fn main() -> ai_governance_sdk::Result<()> {
//!     let client = GovernanceClient::new(
//!         GovernanceConfig::new("https://governance.example.com")
//!             .with_client_id("acme")
//!             .with_client_secret("s3cret"),
//!     )
//!     .await?;
//!
//!     let resp = client
//!         .query("total revenue last quarter")
//!         .user_token("user-42")
//!         .request_type("sql")
//!         .send_enforced()
//!         .await?;
//!     println!("{:?}", resp.result);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | Client configuration, env/YAML/keyring loading |
//! | [`client`] | Governed queries, pre-check/audit gateway, audit dispatch |
//! | [`cache`] | TTL response cache with background sweep |
//! | [`resilience`] | Exponential backoff retrier |
//! | [`transport`] | HTTP transport with auth headers and error tagging |
//! | [`telemetry`] | Governance events and observers |
//! | `interceptors` | Governed wrappers for OpenAI, Anthropic, Gemini, Ollama, Bedrock |

pub mod cache;
pub mod client;
pub mod config;
pub mod resilience;
pub mod telemetry;
pub mod transport;
pub mod utils;

#[cfg(feature = "interceptors")]
pub mod interceptors;

// Re-export main types for convenience
pub use client::{
    GovernanceClient, GovernanceClientBuilder, GovernedRequest, GovernedResponse, PolicyGateway,
    PolicyPreCheckResult,
};
pub use config::{GovernanceConfig, Mode};
pub use telemetry::{GovernanceEvent, GovernanceObserver};

#[cfg(feature = "interceptors")]
pub use interceptors::{GovernedProvider, InterceptError, ProviderAdapter};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext, PolicyViolation};

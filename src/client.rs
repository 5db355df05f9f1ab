//! 治理客户端模块：受治理查询、策略预检与审计。
//!
//! Governance client.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`GovernanceClient`] | Governed query pipeline (cache, retry, fail-open, normalization) |
//! | [`GovernanceClientBuilder`] | Construction with an injected observer |
//! | [`PolicyGateway`] / [`PolicyClient`] | Pre-check and audit calls used by interceptors |
//! | [`AuditDispatcher`] | Bounded fire-and-forget audit worker |

mod builder;
mod core;
mod dispatch;
mod gateway;
mod normalize;
mod query;
pub mod types;

pub use self::core::{GovernanceClient, HEALTH_PATH, REQUEST_PATH};
pub use builder::GovernanceClientBuilder;
pub use dispatch::AuditDispatcher;
pub use gateway::{PolicyClient, PolicyGateway, AUDIT_PATH, PRE_CHECK_PATH};
pub use normalize::{decode_governed_response, hoist_nested_failure};
pub use query::QueryBuilder;
pub use types::{
    request_types, AuditRequest, AuditResult, Context, GovernedRequest, GovernedResponse,
    PolicyInfo, PolicyPreCheckResult, PreCheckRequest, RateLimitInfo, TokenUsage,
};

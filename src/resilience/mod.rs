//! 弹性模式模块：带指数退避的重试。
//!
//! # Resilience Primitives Module
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`retry::Retrier`] | Bounded retries with exponential backoff and 4xx short-circuit |
//!
//! ```rust
//! use ai_governance_sdk::config::RetryConfig;
//! use ai_governance_sdk::resilience::Retrier;
//! use std::time::Duration;
//!
//! let retrier = Retrier::new(
//!     &RetryConfig::default()
//!         .with_max_attempts(3)
//!         .with_initial_delay(Duration::from_millis(200)),
//! );
//! assert_eq!(retrier.delay_before(3), Duration::from_millis(400));
//! ```

pub mod retry;

pub use retry::Retrier;

//! 客户端配置：端点、凭据、运行模式、重试与缓存策略。
//!
//! Client configuration.
//!
//! A [`GovernanceConfig`] is built once, either in code, from environment
//! variables ([`GovernanceConfig::from_env`]) or from a YAML document
//! ([`GovernanceConfig::from_yaml_str`]). Zero-valued knobs are replaced with
//! fixed defaults by [`GovernanceConfig::with_defaults`] when the client is
//! constructed; after that the configuration is never mutated.

use crate::{Error, ErrorContext, Result};
use keyring::Entry;
use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);
pub const DEFAULT_AUDIT_QUEUE_CAPACITY: usize = 256;

/// Keyring service under which client secrets may be stored.
pub const KEYRING_SERVICE: &str = "ai-governance";

/// Set to `1`/`true` to accept invalid TLS certificates (local development only).
pub const INSECURE_TLS_ENV: &str = "GOVERNANCE_INSECURE_SKIP_VERIFY";

/// Execution mode of the client.
///
/// `Production` fails open when the governance service is unreachable or answers 5xx;
/// `Sandbox` surfaces every failure so policy behaviour can be tested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Production,
    Sandbox,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Production => "production",
            Mode::Sandbox => "sandbox",
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "production" | "prod" => Ok(Mode::Production),
            "sandbox" => Ok(Mode::Sandbox),
            other => Err(Error::configuration_with_context(
                format!("unknown mode '{}'", other),
                ErrorContext::new()
                    .with_field_path("config.mode")
                    .with_details("expected 'production' or 'sandbox'"),
            )),
        }
    }
}

/// How credentials are attached to outbound requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    /// `X-Client-Secret` / `X-License-Key` headers.
    #[default]
    Headers,
    /// `Authorization: Basic base64(client_id:client_secret)`.
    Basic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    pub enabled: bool,
    /// Total tries, including the first one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    /// Optional upper bound on a single backoff delay. `None` keeps pure exponential growth.
    pub max_delay: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: None,
        }
    }
}

impl RetryConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, cap: Duration) -> Self {
        self.max_delay = Some(cap);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: DEFAULT_CACHE_TTL,
        }
    }
}

impl CacheConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// Configuration consumed by [`crate::GovernanceClient`].
#[derive(Clone)]
pub struct GovernanceConfig {
    pub endpoint: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub license_key: Option<String>,
    pub auth_scheme: AuthScheme,
    pub mode: Mode,
    pub debug: bool,
    pub timeout: Duration,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
    pub audit_queue_capacity: usize,
}

impl fmt::Debug for GovernanceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GovernanceConfig")
            .field("endpoint", &self.endpoint)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("license_key", &self.license_key.as_ref().map(|_| "<redacted>"))
            .field("auth_scheme", &self.auth_scheme)
            .field("mode", &self.mode)
            .field("debug", &self.debug)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("cache", &self.cache)
            .field("audit_queue_capacity", &self.audit_queue_capacity)
            .finish()
    }
}

impl GovernanceConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client_id: None,
            client_secret: None,
            license_key: None,
            auth_scheme: AuthScheme::default(),
            mode: Mode::default(),
            debug: false,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
            audit_queue_capacity: DEFAULT_AUDIT_QUEUE_CAPACITY,
        }
    }

    pub fn with_client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }

    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    pub fn with_license_key(mut self, key: impl Into<String>) -> Self {
        self.license_key = Some(key.into());
        self
    }

    pub fn with_auth_scheme(mut self, scheme: AuthScheme) -> Self {
        self.auth_scheme = scheme;
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_audit_queue_capacity(mut self, capacity: usize) -> Self {
        self.audit_queue_capacity = capacity;
        self
    }

    /// Fill zero-valued knobs with their fixed defaults.
    pub fn with_defaults(mut self) -> Self {
        if self.timeout.is_zero() {
            self.timeout = DEFAULT_TIMEOUT;
        }
        if self.retry.max_attempts == 0 {
            self.retry.max_attempts = DEFAULT_MAX_ATTEMPTS;
        }
        if self.retry.initial_delay.is_zero() {
            self.retry.initial_delay = DEFAULT_INITIAL_DELAY;
        }
        if self.cache.ttl.is_zero() {
            self.cache.ttl = DEFAULT_CACHE_TTL;
        }
        if self.audit_queue_capacity == 0 {
            self.audit_queue_capacity = DEFAULT_AUDIT_QUEUE_CAPACITY;
        }
        self.endpoint = self.endpoint.trim().trim_end_matches('/').to_string();
        self
    }

    /// Reject configurations the client cannot work with.
    pub fn validate(&self) -> Result<()> {
        let parsed = url::Url::parse(&self.endpoint).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid endpoint URL: {}", e),
                ErrorContext::new()
                    .with_field_path("config.endpoint")
                    .with_details(self.endpoint.clone()),
            )
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(Error::configuration_with_context(
                format!("unsupported endpoint scheme '{}'", parsed.scheme()),
                ErrorContext::new().with_field_path("config.endpoint"),
            ));
        }
        if self.auth_scheme == AuthScheme::Basic
            && self.client_secret.is_some()
            && self.client_id.is_none()
        {
            return Err(Error::configuration_with_context(
                "basic auth requires a client id",
                ErrorContext::new().with_field_path("config.client_id"),
            ));
        }
        Ok(())
    }

    /// Self-hosted deployments on loopback skip authentication entirely.
    pub fn is_loopback(&self) -> bool {
        is_loopback_endpoint(&self.endpoint)
    }

    pub fn fail_open(&self) -> bool {
        self.mode == Mode::Production
    }

    /// Build a configuration from `GOVERNANCE_*` environment variables.
    ///
    /// The client secret is looked up in the OS keyring first
    /// (service [`KEYRING_SERVICE`], user = client id), then in
    /// `GOVERNANCE_CLIENT_SECRET`.
    pub fn from_env() -> Result<Self> {
        let endpoint = env::var("GOVERNANCE_ENDPOINT").map_err(|_| {
            Error::configuration_with_context(
                "GOVERNANCE_ENDPOINT is not set",
                ErrorContext::new()
                    .with_field_path("GOVERNANCE_ENDPOINT")
                    .with_source("config_loader"),
            )
        })?;

        let mut cfg = Self::new(endpoint);
        cfg.client_id = non_empty_env("GOVERNANCE_CLIENT_ID");
        cfg.client_secret = cfg
            .client_id
            .as_deref()
            .and_then(keyring_secret)
            .or_else(|| non_empty_env("GOVERNANCE_CLIENT_SECRET"));
        cfg.license_key = non_empty_env("GOVERNANCE_LICENSE_KEY");

        if let Some(mode) = non_empty_env("GOVERNANCE_MODE") {
            cfg.mode = mode.parse()?;
        }
        if let Some(scheme) = non_empty_env("GOVERNANCE_AUTH_SCHEME") {
            cfg.auth_scheme = if scheme.eq_ignore_ascii_case("basic") {
                AuthScheme::Basic
            } else {
                AuthScheme::Headers
            };
        }
        cfg.debug = env_flag("GOVERNANCE_DEBUG");
        if let Some(secs) = env_parse::<u64>("GOVERNANCE_TIMEOUT_SECS") {
            cfg.timeout = Duration::from_secs(secs);
        }
        if let Some(n) = env_parse::<u32>("GOVERNANCE_RETRY_MAX_ATTEMPTS") {
            cfg.retry.max_attempts = n;
        }
        if let Some(secs) = env_parse::<u64>("GOVERNANCE_CACHE_TTL_SECS") {
            cfg.cache.ttl = Duration::from_secs(secs);
        }
        Ok(cfg)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let file: FileConfig = serde_yaml::from_str(yaml).map_err(|e| {
            Error::configuration_with_context(
                format!("failed to parse configuration: {}", e),
                ErrorContext::new().with_source("config_loader"),
            )
        })?;
        Ok(file.into())
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration_with_context(
                format!("failed to read configuration: {}", e),
                ErrorContext::new()
                    .with_details(path.display().to_string())
                    .with_source("config_loader"),
            )
        })?;
        Self::from_yaml_str(&raw)
    }
}

/// Substring match on `localhost` / `127.0.0.1`.
pub fn is_loopback_endpoint(endpoint: &str) -> bool {
    endpoint.contains("localhost") || endpoint.contains("127.0.0.1")
}

pub(crate) fn insecure_tls_requested() -> bool {
    env_flag(INSECURE_TLS_ENV)
}

fn keyring_secret(client_id: &str) -> Option<String> {
    let entry = Entry::new(KEYRING_SERVICE, client_id).ok()?;
    entry.get_password().ok().filter(|s| !s.is_empty())
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}

fn env_flag(key: &str) -> bool {
    matches!(
        env::var(key).ok().as_deref().map(str::trim),
        Some("1") | Some("true") | Some("TRUE") | Some("yes")
    )
}

/// On-disk shape; durations are milliseconds.
#[derive(Debug, Deserialize)]
struct FileConfig {
    endpoint: String,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    license_key: Option<String>,
    #[serde(default)]
    auth_scheme: AuthScheme,
    #[serde(default)]
    mode: Mode,
    #[serde(default)]
    debug: bool,
    #[serde(default)]
    timeout_ms: u64,
    #[serde(default)]
    retry: Option<FileRetry>,
    #[serde(default)]
    cache: Option<FileCache>,
    #[serde(default)]
    audit_queue_capacity: usize,
}

#[derive(Debug, Deserialize)]
struct FileRetry {
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default)]
    max_attempts: u32,
    #[serde(default)]
    initial_delay_ms: u64,
    #[serde(default)]
    max_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FileCache {
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default)]
    ttl_ms: u64,
}

fn default_true() -> bool {
    true
}

impl From<FileConfig> for GovernanceConfig {
    fn from(f: FileConfig) -> Self {
        let retry = match f.retry {
            Some(r) => RetryConfig {
                enabled: r.enabled,
                max_attempts: r.max_attempts,
                initial_delay: Duration::from_millis(r.initial_delay_ms),
                max_delay: r.max_delay_ms.map(Duration::from_millis),
            },
            None => RetryConfig::default(),
        };
        let cache = match f.cache {
            Some(c) => CacheConfig {
                enabled: c.enabled,
                ttl: Duration::from_millis(c.ttl_ms),
            },
            None => CacheConfig::default(),
        };
        GovernanceConfig {
            endpoint: f.endpoint,
            client_id: f.client_id,
            client_secret: f.client_secret,
            license_key: f.license_key,
            auth_scheme: f.auth_scheme,
            mode: f.mode,
            debug: f.debug,
            timeout: Duration::from_millis(f.timeout_ms),
            retry,
            cache,
            audit_queue_capacity: f.audit_queue_capacity,
        }
    }
}

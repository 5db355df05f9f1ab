use crate::transport::{TransportError, TransportErrorKind};
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "config.endpoint")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected format, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "config_loader", "audit_dispatcher")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// A request that reached the governance service and was refused by policy.
///
/// This is not a transport or status failure: the call succeeded and the
/// answer was "no". Callers must not proceed with the blocked content.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("request blocked by policy: {block_reason}")]
pub struct PolicyViolation {
    pub block_reason: String,
    pub policies: Vec<String>,
}

impl PolicyViolation {
    pub fn new(block_reason: impl Into<String>, policies: Vec<String>) -> Self {
        Self {
            block_reason: block_reason.into(),
            policies,
        }
    }
}

/// Unified error type for the governance SDK.
///
/// Variants map one-to-one onto the failure kinds a caller may want to branch on:
/// no response at all, a non-2xx response, an undecodable payload, a policy
/// refusal, or a retry loop that gave up.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Network transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Governance API error: HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    PolicyViolation(#[from] PolicyViolation),

    #[error("max retries exceeded after {attempts} attempts: {last}")]
    RetryExhausted { attempts: u32, last: Box<Error> },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Runtime error: {message}{}", format_context(.context))]
    Runtime {
        message: String,
        context: ErrorContext,
    },

    #[error("operation cancelled")]
    Cancelled,
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Create a new runtime error with structured context
    pub fn runtime_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Runtime {
            message: msg.into(),
            context,
        }
    }

    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. } | Error::Runtime { context, .. } => Some(context),
            _ => None,
        }
    }

    /// HTTP status of the response that produced this error, if one was received.
    ///
    /// Looks through retry exhaustion to the last underlying error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Status { status, .. } => Some(*status),
            Error::RetryExhausted { last, .. } => last.status(),
            _ => None,
        }
    }

    /// 4xx: deterministic, retrying cannot change the outcome.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::Status { status, .. } if (400..500).contains(status))
    }

    pub fn is_server_error(&self) -> bool {
        matches!(self, Error::Status { status, .. } if *status >= 500)
    }

    /// Whether a single failed attempt is worth repeating.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(e) => e.kind() != TransportErrorKind::Build,
            Error::Status { status, .. } => *status >= 500 || *status < 400,
            _ => false,
        }
    }

    /// The governance service could not be reached or could not serve the request.
    ///
    /// Transport failures are decided from the kind tag set when the error was
    /// created; a 5xx counts as an outage of the governance tier, a 4xx does not.
    /// A retry loop that gave up is unavailable only if its last attempt was.
    pub fn is_governance_unavailable(&self) -> bool {
        match self {
            Error::Transport(e) => e.is_unavailable(),
            Error::Status { status, .. } => *status >= 500,
            Error::RetryExhausted { last, .. } => last.is_governance_unavailable(),
            _ => false,
        }
    }

    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self, Error::RetryExhausted { .. })
    }

    pub fn is_policy_violation(&self) -> bool {
        matches!(self, Error::PolicyViolation(_))
    }

    pub fn as_policy_violation(&self) -> Option<&PolicyViolation> {
        match self {
            Error::PolicyViolation(v) => Some(v),
            _ => None,
        }
    }
}

//! 可观测性模块：注入式的治理事件观察者（替代全局调试日志）。
//!
//! Observability hooks.
//!
//! The client reports what it does through a [`GovernanceObserver`] injected
//! at construction instead of writing to a process-wide logger, so tests can
//! capture or silence output deterministically.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`GovernanceEvent`] | Typed event enum |
//! | [`GovernanceObserver`] | Trait for event destinations |
//! | [`NoopObserver`] | Discards everything (default when `debug` is off) |
//! | [`TracingObserver`] | Forwards to `tracing` (default when `debug` is on) |
//! | [`InMemoryObserver`] | Keeps events in memory for tests |
//! | [`CompositeObserver`] | Fans out to several observers |
//!
//! Events never carry raw user tokens; query text is already truncated.

use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum GovernanceEvent {
    RequestSent {
        request_type: String,
        query_preview: String,
        user: String,
    },
    ResponseReceived {
        request_type: String,
        success: bool,
        blocked: bool,
        latency_ms: u64,
    },
    CacheHit {
        request_type: String,
    },
    RetryScheduled {
        attempt: u32,
        delay_ms: u64,
        error: String,
    },
    FailOpen {
        error: String,
    },
    PreCheck {
        context_id: String,
        approved: bool,
        latency_ms: u64,
    },
    AuditRecorded {
        context_id: String,
    },
    AuditDropped {
        context_id: String,
        reason: String,
    },
    AuditFailed {
        context_id: String,
        error: String,
    },
}

impl GovernanceEvent {
    pub fn name(&self) -> &'static str {
        match self {
            GovernanceEvent::RequestSent { .. } => "request_sent",
            GovernanceEvent::ResponseReceived { .. } => "response_received",
            GovernanceEvent::CacheHit { .. } => "cache_hit",
            GovernanceEvent::RetryScheduled { .. } => "retry_scheduled",
            GovernanceEvent::FailOpen { .. } => "fail_open",
            GovernanceEvent::PreCheck { .. } => "pre_check",
            GovernanceEvent::AuditRecorded { .. } => "audit_recorded",
            GovernanceEvent::AuditDropped { .. } => "audit_dropped",
            GovernanceEvent::AuditFailed { .. } => "audit_failed",
        }
    }
}

/// Destination for governance events. Must not block.
pub trait GovernanceObserver: Send + Sync {
    fn on_event(&self, event: &GovernanceEvent);
}

pub struct NoopObserver;

impl GovernanceObserver for NoopObserver {
    fn on_event(&self, _event: &GovernanceEvent) {}
}

pub fn noop_observer() -> Arc<dyn GovernanceObserver> {
    Arc::new(NoopObserver)
}

/// Forwards events to `tracing`. Failures that lose data are `warn`, the rest `debug`.
pub struct TracingObserver;

impl GovernanceObserver for TracingObserver {
    fn on_event(&self, event: &GovernanceEvent) {
        match event {
            GovernanceEvent::RequestSent {
                request_type,
                query_preview,
                user,
            } => debug!(%request_type, query = %query_preview, %user, "governed request sent"),
            GovernanceEvent::ResponseReceived {
                request_type,
                success,
                blocked,
                latency_ms,
            } => debug!(%request_type, success, blocked, latency_ms, "governed response received"),
            GovernanceEvent::CacheHit { request_type } => {
                debug!(%request_type, "cache hit")
            }
            GovernanceEvent::RetryScheduled {
                attempt,
                delay_ms,
                error,
            } => debug!(attempt, delay_ms, %error, "retry scheduled"),
            GovernanceEvent::FailOpen { error } => {
                warn!(%error, "governance unavailable, failing open")
            }
            GovernanceEvent::PreCheck {
                context_id,
                approved,
                latency_ms,
            } => debug!(%context_id, approved, latency_ms, "policy pre-check"),
            GovernanceEvent::AuditRecorded { context_id } => {
                debug!(%context_id, "audit recorded")
            }
            GovernanceEvent::AuditDropped { context_id, reason } => {
                warn!(%context_id, %reason, "audit dropped")
            }
            GovernanceEvent::AuditFailed { context_id, error } => {
                warn!(%context_id, %error, "audit failed")
            }
        }
    }
}

/// In-memory observer for testing.
pub struct InMemoryObserver {
    events: RwLock<Vec<GovernanceEvent>>,
}

impl InMemoryObserver {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(Vec::new()),
        }
    }
    pub fn events(&self) -> Vec<GovernanceEvent> {
        self.events
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
    pub fn count(&self, name: &str) -> usize {
        self.events
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|e| e.name() == name)
            .count()
    }
    pub fn clear(&self) {
        self.events
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl Default for InMemoryObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl GovernanceObserver for InMemoryObserver {
    fn on_event(&self, event: &GovernanceEvent) {
        self.events
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
    }
}

/// Composite observer for multiple destinations.
pub struct CompositeObserver {
    observers: Vec<Arc<dyn GovernanceObserver>>,
}

impl CompositeObserver {
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }
    pub fn add(mut self, observer: Arc<dyn GovernanceObserver>) -> Self {
        self.observers.push(observer);
        self
    }
}

impl Default for CompositeObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl GovernanceObserver for CompositeObserver {
    fn on_event(&self, event: &GovernanceEvent) {
        for o in &self.observers {
            o.on_event(event);
        }
    }
}

/// Default observer for a client: tracing when `debug` is set, otherwise silent.
pub fn default_observer(debug: bool) -> Arc<dyn GovernanceObserver> {
    if debug {
        info!("governance client debug logging enabled");
        Arc::new(TracingObserver)
    } else {
        noop_observer()
    }
}

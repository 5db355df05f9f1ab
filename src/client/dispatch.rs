//! Bounded fire-and-forget audit dispatch.
//!
//! Audits are queued on a bounded channel and sent one at a time by a single
//! worker task, so audit volume cannot fan out into unbounded concurrent
//! requests. A full queue drops the audit. Dropped or failed audits are lost
//! telemetry; they never affect the governed call that produced them.

use super::gateway::{ensure_fresh, PolicyGateway};
use super::types::AuditRequest;
use crate::telemetry::{GovernanceEvent, GovernanceObserver};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;

enum AuditJob {
    Record(AuditRequest),
    Flush(oneshot::Sender<()>),
}

/// Handle to the audit worker. Cheap to clone.
///
/// The worker exits when every handle is dropped or `shutdown` is cancelled.
#[derive(Clone)]
pub struct AuditDispatcher {
    tx: mpsc::Sender<AuditJob>,
    observer: Arc<dyn GovernanceObserver>,
}

impl AuditDispatcher {
    /// Spawn the worker on the current tokio runtime.
    pub fn spawn(
        gateway: Arc<dyn PolicyGateway>,
        capacity: usize,
        observer: Arc<dyn GovernanceObserver>,
        shutdown: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(run_worker(gateway, rx, Arc::clone(&observer), shutdown));
        Self { tx, observer }
    }

    /// Queue an audit without waiting. Returns `false` if it was dropped.
    pub fn submit(&self, request: AuditRequest) -> bool {
        match self.tx.try_send(AuditJob::Record(request)) {
            Ok(()) => true,
            Err(err) => {
                let (request, reason) = match err {
                    mpsc::error::TrySendError::Full(AuditJob::Record(r)) => (r, "queue full"),
                    mpsc::error::TrySendError::Closed(AuditJob::Record(r)) => {
                        (r, "dispatcher closed")
                    }
                    _ => return false,
                };
                self.observer.on_event(&GovernanceEvent::AuditDropped {
                    context_id: request.context_id,
                    reason: reason.to_string(),
                });
                false
            }
        }
    }

    /// Wait until every audit queued before this call has been processed.
    ///
    /// Returns immediately if the worker has stopped.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(AuditJob::Flush(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

async fn run_worker(
    gateway: Arc<dyn PolicyGateway>,
    mut rx: mpsc::Receiver<AuditJob>,
    observer: Arc<dyn GovernanceObserver>,
    shutdown: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            job = rx.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        match job {
            AuditJob::Flush(done) => {
                let _ = done.send(());
            }
            AuditJob::Record(request) => {
                let context_id = request.context_id.clone();
                let outcome = match ensure_fresh(&request) {
                    Ok(()) => gateway.audit(request).await,
                    Err(e) => Err(e),
                };
                match outcome {
                    Ok(_) => observer.on_event(&GovernanceEvent::AuditRecorded { context_id }),
                    Err(e) => observer.on_event(&GovernanceEvent::AuditFailed {
                        context_id,
                        error: e.to_string(),
                    }),
                }
            }
        }
    }
    rx.close();
    debug!("audit dispatcher stopped");
}

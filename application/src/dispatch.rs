//! Resource dispatcher
//!
//! Bounds how many external agent calls are in flight at once. Admission is
//! FIFO through a semaphore; every task runs under a task-scoped
//! cancellation token derived from the dispatcher's shutdown token and the
//! caller's optional external token, so engine-level stop reaches every
//! in-flight call. A per-task timeout cancels that token too: a timeout is
//! just cancellation with a specific error tag.

use crate::signal;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("dispatcher is shutting down")]
    ShuttingDown,

    #[error("task timed out after {0:?}")]
    Timeout(Duration),

    #[error("shutdown drain window elapsed with tasks still running")]
    ShutdownTimeout,
}

#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    /// Per-task deadline; elapsing cancels the task token
    pub timeout: Option<Duration>,
    /// Additional cancellation source combined into the task token
    pub external: Option<CancellationToken>,
}

#[derive(Debug, Clone)]
pub struct ShutdownOptions {
    /// Wait for in-flight tasks to settle before returning
    pub await_idle: bool,
    /// Drain window for `await_idle`
    pub timeout: Duration,
}

impl Default for ShutdownOptions {
    fn default() -> Self {
        Self {
            await_idle: false,
            timeout: Duration::from_secs(30),
        }
    }
}

pub struct ResourceDispatcher {
    semaphore: Arc<Semaphore>,
    shutdown: CancellationToken,
    concurrency: usize,
    pending: Arc<AtomicUsize>,
}

struct PendingGuard(Arc<AtomicUsize>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ResourceDispatcher {
    pub fn new(concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            shutdown: CancellationToken::new(),
            concurrency,
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Queued plus running tasks
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Token fired when shutdown begins; tasks may watch it directly
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Run `task` once a permit is available. The task receives its scoped
    /// token and should pass it down into the transport call.
    pub async fn dispatch<T, F, Fut>(
        &self,
        options: DispatchOptions,
        task: F,
    ) -> Result<T, DispatchError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = T>,
    {
        if self.shutdown.is_cancelled() {
            return Err(DispatchError::ShuttingDown);
        }

        self.pending.fetch_add(1, Ordering::SeqCst);
        let _guard = PendingGuard(self.pending.clone());

        // Queued tasks observe shutdown instead of waiting forever
        let permit = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(DispatchError::ShuttingDown),
            permit = self.semaphore.acquire() => {
                permit.map_err(|_| DispatchError::ShuttingDown)?
            }
        };
        let _permit = permit;

        let mut sources = vec![self.shutdown.clone()];
        if let Some(external) = options.external {
            sources.push(external);
        }
        let task_token = signal::combine(sources);

        match options.timeout {
            Some(deadline) => match tokio::time::timeout(deadline, task(task_token.clone())).await
            {
                Ok(value) => Ok(value),
                Err(_) => {
                    // The task future is dropped here with its result lost:
                    // anything it allocated remotely (e.g. a sub-conversation
                    // created just before the deadline) is never reported
                    // back and cannot be cleaned up by the caller
                    task_token.cancel();
                    debug!(timeout_ms = deadline.as_millis() as u64, "dispatched task timed out");
                    Err(DispatchError::Timeout(deadline))
                }
            },
            None => Ok(task(task_token).await),
        }
    }

    /// Begin shutdown. Idempotent: later calls only re-run the optional
    /// drain. Queued-not-started tasks fail with `ShuttingDown`; in-flight
    /// tasks see their token fire and are drained when `await_idle` is set.
    pub async fn shutdown(&self, options: ShutdownOptions) -> Result<(), DispatchError> {
        self.shutdown.cancel();
        if !options.await_idle {
            return Ok(());
        }
        let drained = tokio::time::timeout(
            options.timeout,
            self.semaphore.acquire_many(self.concurrency as u32),
        )
        .await;
        match drained {
            Ok(Ok(_all_permits)) => Ok(()),
            Ok(Err(_)) => Ok(()),
            Err(_) => Err(DispatchError::ShutdownTimeout),
        }
    }
}

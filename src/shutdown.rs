use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use axum::{extract::Request, middleware::Next, response::Response};
use tokio::sync::Notify;

/// Converts external signals into an orderly drain (4.H). Tracks in-flight
/// work (HTTP requests and worker message processing) with a simple task
/// counter rather than `std::sync::WaitGroup` (no such primitive exists in
/// the standard library); `Notify` wakes the drain wait whenever the
/// counter reaches zero.
pub struct ShutdownBarrier {
    task_count: AtomicI64,
    drained: Notify,
    grace: Duration,
}

impl ShutdownBarrier {
    pub fn new(grace: Duration) -> Self {
        Self {
            task_count: AtomicI64::new(0),
            drained: Notify::new(),
            grace,
        }
    }

    pub fn add_task(&self) {
        self.task_count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn done_task(&self) {
        let prev = self.task_count.fetch_sub(1, Ordering::SeqCst);
        if prev == 1 {
            self.drained.notify_waiters();
        }
    }

    /// Axum middleware wrapping each inbound request in an add_task/done_task pair.
    pub async fn track_request(
        barrier: std::sync::Arc<ShutdownBarrier>,
        request: Request,
        next: Next,
    ) -> Response {
        barrier.add_task();
        let response = next.run(request).await;
        barrier.done_task();
        response
    }

    /// Blocks until the task counter reaches zero or the grace window
    /// elapses, whichever comes first (4.H step 2).
    pub async fn wait_for_drain(&self) {
        if self.task_count.load(Ordering::SeqCst) == 0 {
            return;
        }
        let drain = self.drained.notified();
        tokio::select! {
            _ = drain => {
                tracing::info!("all in-flight tasks drained");
            }
            _ = tokio::time::sleep(self.grace) => {
                tracing::warn!(
                    remaining = self.task_count.load(Ordering::SeqCst),
                    "shutdown grace window elapsed with tasks still in flight"
                );
            }
        }
    }
}

/// Waits for SIGINT or SIGTERM (4.H step 1 trigger). Cancels `token` so
/// axum's `with_graceful_shutdown` future (stopping new HTTP requests) and
/// this module's own drain wait observe the same signal exactly once.
pub async fn signal_watcher(token: tokio_util::sync::CancellationToken) {
    wait_for_signal().await;
    token.cancel();
}

async fn wait_for_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT, shutting down gracefully"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down gracefully"),
    }
}

/// Runs step 2-3 of the shutdown sequence after the HTTP server has
/// stopped accepting new requests (step 1, driven by `signal_watcher` via
/// axum's `with_graceful_shutdown`): drain in-flight tasks, then invoke
/// `close`.
pub async fn drain_and_close<F, Fut>(barrier: std::sync::Arc<ShutdownBarrier>, close: F)
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = ()>,
{
    tracing::info!("waiting for in-flight tasks to drain");
    barrier.wait_for_drain().await;
    tracing::info!("closing service resources");
    close().await;
    tracing::info!("graceful shutdown complete");
}

//! Cooperative cancellation/deadline signal threaded through one
//! optimization job (§5). Checked at every point the concurrency model
//! names: block-task entry, between the ILP and greedy chain-optimizer
//! backends, between local-search passes, and inside the router client
//! between HTTP chunks — so a long-running solve or a large chunked
//! `/table` request can still be stopped mid-flight rather than only at
//! the next coarse-grained join point.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cloning shares the same underlying flag and deadline.
#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    deadline: Instant,
}

impl CancellationToken {
    pub fn new(timeout: Duration) -> Self {
        Self { cancelled: Arc::new(AtomicBool::new(false)), deadline: Instant::now() + timeout }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// True once either signal fires — the one check every checkpoint
    /// named in §5 actually needs.
    pub fn should_stop(&self) -> bool {
        self.is_cancelled() || self.is_expired()
    }
}

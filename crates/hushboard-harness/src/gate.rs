//! Gates that hold simulated calls in flight.
//!
//! A collaborator passes through its gate at the start of every call. While
//! the gate is closed the call parks, so a test can change the session or
//! issue a second command while the first is still pending, then release it.

use std::sync::Arc;

use tokio::sync::watch;

/// Open/closed latch with an arrival counter.
///
/// Clones share state. A fresh gate is open.
#[derive(Debug, Clone)]
pub struct Gate {
    open: Arc<watch::Sender<bool>>,
    arrivals: Arc<watch::Sender<usize>>,
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

impl Gate {
    /// Create an open gate.
    pub fn new() -> Self {
        Self { open: Arc::new(watch::Sender::new(true)), arrivals: Arc::new(watch::Sender::new(0)) }
    }

    /// Park subsequent calls until [`Gate::open`].
    pub fn close(&self) {
        self.open.send_replace(false);
    }

    /// Release parked calls and let new ones through.
    pub fn open(&self) {
        self.open.send_replace(true);
    }

    /// Check if the gate is open.
    pub fn is_open(&self) -> bool {
        *self.open.borrow()
    }

    /// Number of calls that reached the gate so far.
    pub fn arrivals(&self) -> usize {
        *self.arrivals.borrow()
    }

    /// Register arrival and wait until the gate is open.
    pub async fn pass(&self) {
        self.arrivals.send_modify(|n| *n += 1);
        let mut open = self.open.subscribe();
        // The sender lives in `self`, so the channel cannot close while waiting
        let _ = open.wait_for(|open| *open).await;
    }

    /// Wait until at least `count` calls have reached the gate.
    pub async fn arrived(&self, count: usize) {
        let mut arrivals = self.arrivals.subscribe();
        let _ = arrivals.wait_for(|n| *n >= count).await;
    }
}

//! Graceful shutdown coordination
//!
//! A shared [`ShutdownCoordinator`] lets Ctrl+C stop a batch cleanly: the
//! orchestrator stops issuing new fetches, retry backoffs abort, and
//! in-flight images either finish or fail - but no half-written output ever
//! looks complete, because persistence is atomic.

use once_cell::sync::OnceCell;
use std::sync::Arc;
use tokio::sync::watch;

/// Shared handle to a shutdown coordinator.
pub type SharedShutdown = Arc<ShutdownCoordinator>;

static GLOBAL_SHUTDOWN: OnceCell<SharedShutdown> = OnceCell::new();

/// Register a global shutdown handle so subsystems can discover it lazily.
pub fn set_global_shutdown(handle: SharedShutdown) {
    let _ = GLOBAL_SHUTDOWN.set(handle);
}

/// Retrieve the registered global shutdown handle, if any.
pub fn get_global_shutdown() -> Option<SharedShutdown> {
    GLOBAL_SHUTDOWN.get().cloned()
}

/// Coordinates graceful shutdown across async tasks.
///
/// Backed by a watch channel holding a single "shutdown requested" flag;
/// requesting shutdown flips the flag and wakes every waiter. The flag never
/// flips back.
pub struct ShutdownCoordinator {
    flag: watch::Sender<bool>,
}

impl ShutdownCoordinator {
    /// Create a new coordinator.
    pub fn new() -> Self {
        let (flag, _) = watch::channel(false);
        Self { flag }
    }

    /// Create a new shared coordinator wrapped in [`Arc`].
    pub fn shared() -> SharedShutdown {
        Arc::new(Self::new())
    }

    /// Request shutdown, waking every task blocked in
    /// [`wait_for_shutdown`](Self::wait_for_shutdown). Safe to call more than
    /// once.
    pub fn request_shutdown(&self) {
        self.flag.send_replace(true);
    }

    /// Whether shutdown has been requested.
    pub fn is_shutdown_requested(&self) -> bool {
        *self.flag.borrow()
    }

    /// Wait until shutdown is requested. Returns immediately if already set.
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.flag.subscribe();
        // The sender lives in self, so wait_for cannot see a closed channel.
        let _ = rx.wait_for(|requested| *requested).await;
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("shutdown_requested", &self.is_shutdown_requested())
            .finish()
    }
}

//! Shared server state

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use crate::config::ShellConfig;
use crate::core_handshake::HandshakeCoordinator;
use crate::core_pty::PtySpawner;
use crate::shutdown::ShutdownCoordinator;

/// Server state shared across requests
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<HandshakeCoordinator>,
    pub spawner: Arc<dyn PtySpawner>,
    pub shell: Arc<ShellConfig>,
    pub shutdown: Arc<ShutdownCoordinator>,
    pub sessions: Arc<SessionTracker>,
    pub expose_failure_reasons: bool,
}

/// Counts live sessions so shutdown can wait for them
#[derive(Default)]
pub struct SessionTracker {
    active: AtomicUsize,
    idle: Notify,
}

impl SessionTracker {
    /// Count a session until the returned guard drops
    pub fn enter(self: &Arc<Self>) -> SessionGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        SessionGuard {
            tracker: self.clone(),
        }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Wait until no session is live, or `timeout` passes. Returns whether idle.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.idle.notified();
            if self.active() == 0 {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.active() == 0;
            }
        }
    }
}

pub struct SessionGuard {
    tracker: Arc<SessionTracker>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.tracker.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.tracker.idle.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_idle() {
        let tracker = Arc::new(SessionTracker::default());
        assert!(tracker.wait_idle(Duration::from_millis(10)).await);

        let guard = tracker.enter();
        assert_eq!(tracker.active(), 1);
        assert!(!tracker.wait_idle(Duration::from_millis(10)).await);

        let waiter = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.wait_idle(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(guard);
        assert!(waiter.await.unwrap());
    }
}

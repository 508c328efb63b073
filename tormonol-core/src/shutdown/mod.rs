//! Graceful shutdown coordinator
//!
//! One broadcast fan-out reaches the HTTP server (stop accepting), the store sweepers
//! and every live session bridge (close with code 4000 and kill the shell).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{error, info, warn};

/// Shutdown signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Close sessions cleanly, then stop
    Graceful,
}

/// Shutdown state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    ShuttingDown,
    Shutdown,
}

/// Graceful shutdown coordinator
pub struct ShutdownCoordinator {
    state: Arc<RwLock<ShutdownState>>,
    shutdown_tx: broadcast::Sender<ShutdownSignal>,
    timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(timeout: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);

        Self {
            state: Arc::new(RwLock::new(ShutdownState::Running)),
            shutdown_tx,
            timeout,
        }
    }

    /// Subscribe to shutdown notifications
    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownSignal> {
        self.shutdown_tx.subscribe()
    }

    /// How long the server waits for sessions to wind down
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Broadcast a graceful shutdown. Idempotent.
    pub async fn shutdown(&self) {
        let mut state = self.state.write().await;
        if *state != ShutdownState::Running {
            warn!("Shutdown already in progress");
            return;
        }
        *state = ShutdownState::ShuttingDown;
        drop(state);

        info!(timeout = ?self.timeout, "Initiating graceful shutdown");
        // No receivers simply means nothing is running yet
        if self.shutdown_tx.send(ShutdownSignal::Graceful).is_err() {
            info!("No components subscribed to shutdown");
        }
    }

    /// Record that every component has stopped
    pub async fn mark_complete(&self) {
        *self.state.write().await = ShutdownState::Shutdown;
        info!("Shutdown complete");
    }

    pub async fn is_shutting_down(&self) -> bool {
        let state = self.state.read().await;
        *state == ShutdownState::ShuttingDown || *state == ShutdownState::Shutdown
    }

    pub async fn state(&self) -> ShutdownState {
        *self.state.read().await
    }

    /// Future resolving on the first shutdown signal, suitable for
    /// `axum::serve(..).with_graceful_shutdown`.
    pub fn signalled(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.subscribe();
        async move {
            let _ = rx.recv().await;
        }
    }
}

/// Install SIGINT/SIGTERM handlers that trigger a graceful shutdown
#[cfg(unix)]
pub fn install_signal_handlers(coordinator: Arc<ShutdownCoordinator>) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    error!("Failed to install signal handlers: {}", e);
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
        coordinator.shutdown().await;
    });
}

/// Install a Ctrl+C handler that triggers a graceful shutdown
#[cfg(windows)]
pub fn install_signal_handlers(coordinator: Arc<ShutdownCoordinator>) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            return;
        }
        info!("Received Ctrl+C");
        coordinator.shutdown().await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_coordinator() {
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(100));
        let mut rx = coordinator.subscribe();

        assert_eq!(coordinator.state().await, ShutdownState::Running);
        coordinator.shutdown().await;

        assert!(coordinator.is_shutting_down().await);
        assert_eq!(rx.recv().await.unwrap(), ShutdownSignal::Graceful);

        coordinator.mark_complete().await;
        assert_eq!(coordinator.state().await, ShutdownState::Shutdown);
    }

    #[tokio::test]
    async fn test_second_shutdown_is_ignored() {
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(100));
        let mut rx = coordinator.subscribe();

        coordinator.shutdown().await;
        coordinator.shutdown().await;

        assert_eq!(rx.recv().await.unwrap(), ShutdownSignal::Graceful);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_signalled_future_resolves() {
        let coordinator = Arc::new(ShutdownCoordinator::new(Duration::from_millis(100)));
        let wait = tokio::spawn(coordinator.signalled());

        tokio::time::sleep(Duration::from_millis(10)).await;
        coordinator.shutdown().await;

        tokio::time::timeout(Duration::from_secs(1), wait)
            .await
            .unwrap()
            .unwrap();
    }
}

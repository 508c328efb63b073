//! HTTP + WebSocket server
//!
//! ```text
//! POST /challenge              → nonce
//! POST /ticket   nonce.sig     → id.serverSpki
//! POST /salt     id.peerSpki   → id.salt
//! GET  /sessions/:id?token=&dimensions=c,r   WebSocket upgrade, one shell per socket
//! ```
//!
//! Every handshake failure is a 500. Whether the body carries the short reason is
//! controlled by `server.expose_failure_reasons`.

pub mod api;
pub mod error;
pub mod handlers;
mod session;
pub mod state;

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::core_crypto::TrustAnchor;
use crate::core_handshake::HandshakeCoordinator;
use crate::core_pty::{NativePtySpawner, PtySpawner};
use crate::metrics;
use crate::shutdown::ShutdownCoordinator;

pub use api::{build_router, TRACEPARENT};
pub use error::{ApiError, ApiResult, GENERIC_FAILURE};
pub use state::{AppState, SessionTracker};

pub struct TormonolServer {
    state: Arc<AppState>,
    bind_address: SocketAddr,
    sweep_interval: Duration,
}

impl TormonolServer {
    pub fn new(
        config: &Config,
        trust: TrustAnchor,
        spawner: Arc<dyn PtySpawner>,
        shutdown: Arc<ShutdownCoordinator>,
    ) -> Self {
        let state = AppState {
            coordinator: Arc::new(HandshakeCoordinator::new(trust, &config.handshake)),
            spawner,
            shell: Arc::new(config.shell.clone()),
            shutdown,
            sessions: Arc::new(SessionTracker::default()),
            expose_failure_reasons: config.server.expose_failure_reasons,
        };
        Self {
            state: Arc::new(state),
            bind_address: config.server.bind_address,
            sweep_interval: config.handshake.sweep_interval,
        }
    }

    /// Load the trust anchor from `auth.authorized_key_path` and use the native pty system.
    pub fn from_config(config: &Config, shutdown: Arc<ShutdownCoordinator>) -> anyhow::Result<Self> {
        let path = &config.auth.authorized_key_path;
        let trust = TrustAnchor::load(path)
            .with_context(|| format!("loading authorized key from {}", path.display()))?;
        Ok(Self::new(config, trust, Arc::new(NativePtySpawner), shutdown))
    }

    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.bind_address)
            .await
            .with_context(|| format!("binding {}", self.bind_address))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until the shutdown coordinator fires, then wait
    /// for live sessions to close.
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        let local = listener.local_addr()?;
        info!(address = %local, "server listening");

        let mut background = self.state.coordinator.spawn_sweepers(self.sweep_interval);
        background.push(self.spawn_store_gauges());

        let shutdown = self.state.shutdown.clone();
        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown.signalled())
            .await;

        let sessions = &self.state.sessions;
        if sessions.active() > 0 {
            info!(active = sessions.active(), "waiting for sessions to close");
            if !sessions.wait_idle(shutdown.timeout()).await {
                warn!(active = sessions.active(), "sessions still open after shutdown timeout");
            }
        }

        for task in background {
            task.abort();
        }
        shutdown.mark_complete().await;
        info!("server stopped");

        result.context("serving http")
    }

    fn spawn_store_gauges(&self) -> JoinHandle<()> {
        let coordinator = self.state.coordinator.clone();
        let interval = self.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let sizes = coordinator.store_sizes();
                metrics::set_store_entries("nonces", sizes.nonces);
                metrics::set_store_entries("checkpoints", sizes.checkpoints);
                metrics::set_store_entries("session_keys", sizes.session_keys);
            }
        })
    }
}

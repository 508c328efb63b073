//! Shared setup for integration tests: a real server on an ephemeral port backed by
//! the scripted pty.

#![allow(dead_code)]

use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use tormonol_core::config::Config;
use tormonol_core::core_crypto::SigningIdentity;
use tormonol_core::server::{AppState, TormonolServer};
use tormonol_core::shutdown::ShutdownCoordinator;
use tormonol_core::test_utils::{recv_unbounded_timeout, test_config, FakePty, FakePtySpawner, DEFAULT_TEST_TIMEOUT};

pub struct Running {
    pub base: String,
    pub identity: SigningIdentity,
    pub spawner: Arc<FakePtySpawner>,
    pub ptys: mpsc::UnboundedReceiver<FakePty>,
    pub shutdown: Arc<ShutdownCoordinator>,
    pub state: Arc<AppState>,
    pub handle: JoinHandle<anyhow::Result<()>>,
}

impl Running {
    pub async fn next_pty(&mut self) -> FakePty {
        recv_unbounded_timeout(&mut self.ptys, DEFAULT_TEST_TIMEOUT)
            .await
            .expect("no shell spawned")
    }
}

pub async fn start() -> Running {
    start_with(test_config(), false).await
}

pub async fn start_with(config: Config, failing_shell: bool) -> Running {
    let identity = SigningIdentity::generate();
    let (spawner, ptys) = if failing_shell {
        FakePtySpawner::failing()
    } else {
        FakePtySpawner::new()
    };
    let shutdown = Arc::new(ShutdownCoordinator::new(config.server.shutdown_timeout));
    let server = TormonolServer::new(
        &config,
        identity.trust_anchor(),
        spawner.clone(),
        shutdown.clone(),
    );
    let state = server.state();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let handle = tokio::spawn(server.serve(listener));

    Running {
        base,
        identity,
        spawner,
        ptys,
        shutdown,
        state,
        handle,
    }
}

//! Handshake and admission handlers

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::error::{ApiError, ApiResult};
use super::session;
use super::state::AppState;
use crate::core_frame::Dimensions;
use crate::core_handshake::{HandshakeCoordinator, HandshakeError, HandshakeResult};
use crate::core_pty::SpawnRequest;

#[derive(Debug, Deserialize)]
pub struct AdmissionQuery {
    pub token: Option<String>,
    pub dimensions: Option<String>,
}

fn respond<T>(state: &AppState, result: HandshakeResult<T>) -> ApiResult<T> {
    result.map_err(|e| ApiError::handshake(&e, state.expose_failure_reasons))
}

/// Run a step that verifies signatures or does P-256 arithmetic on the blocking pool.
async fn offload<T, F>(state: &AppState, step: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&HandshakeCoordinator) -> HandshakeResult<T> + Send + 'static,
{
    let coordinator = state.coordinator.clone();
    let result = tokio::task::spawn_blocking(move || step(&coordinator))
        .await
        .unwrap_or_else(|e| Err(HandshakeError::Internal(format!("handshake step aborted: {}", e))));
    respond(state, result)
}

pub async fn challenge(State(state): State<Arc<AppState>>) -> String {
    state.coordinator.challenge()
}

pub async fn ticket(State(state): State<Arc<AppState>>, body: String) -> ApiResult<String> {
    offload(&state, move |coordinator| coordinator.ticket(&body)).await
}

pub async fn salt(State(state): State<Arc<AppState>>, body: String) -> ApiResult<String> {
    offload(&state, move |coordinator| coordinator.salt(&body)).await
}

/// `GET /sessions/:id?token=..&dimensions=c,r`
///
/// Keys are claimed before the upgrade completes. A rejected admission never spawns.
pub async fn admit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<AdmissionQuery>,
    upgrade: WebSocketUpgrade,
) -> ApiResult<Response> {
    // Unencoded '+' in a query string decodes as a space
    let token = query
        .token
        .map(|t| t.replace(' ', "+"))
        .ok_or_else(|| HandshakeError::Malformed("missing token".to_string()));
    let token = respond(&state, token)?;
    let claim = id.clone();
    let keys = offload(&state, move |coordinator| coordinator.admit(&claim, &token)).await?;

    let dimensions = session_dimensions(query.dimensions.as_deref(), state.shell.default_dimensions);
    let request = SpawnRequest::from_config(&state.shell, dimensions);
    info!(session = %id, %dimensions, "session admitted");

    Ok(upgrade.on_upgrade(move |socket| session::run(socket, state, id, keys, request)))
}

fn session_dimensions(requested: Option<&str>, default: Dimensions) -> Dimensions {
    match requested {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|e| {
            warn!(dimensions = raw, error = %e, "ignoring requested dimensions");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HandshakeConfig, ShellConfig};
    use crate::core_crypto::SigningIdentity;
    use crate::core_handshake::split_pair;
    use crate::server::SessionTracker;
    use crate::shutdown::ShutdownCoordinator;
    use crate::test_utils::FakePtySpawner;
    use axum::http::StatusCode;
    use std::time::Duration;

    fn state(identity: &SigningIdentity) -> Arc<AppState> {
        let (spawner, _ptys) = FakePtySpawner::new();
        Arc::new(AppState {
            coordinator: Arc::new(HandshakeCoordinator::new(
                identity.trust_anchor(),
                &HandshakeConfig::default(),
            )),
            spawner,
            shell: Arc::new(ShellConfig::default()),
            shutdown: Arc::new(ShutdownCoordinator::new(Duration::from_millis(100))),
            sessions: Arc::new(SessionTracker::default()),
            expose_failure_reasons: true,
        })
    }

    #[tokio::test]
    async fn test_steps_run_off_the_runtime_thread() {
        let state = state(&SigningIdentity::generate());
        let step_thread = offload(&state, |_| Ok(std::thread::current().id()))
            .await
            .unwrap();
        assert_ne!(step_thread, std::thread::current().id());
    }

    #[tokio::test]
    async fn test_ticket_handler() {
        let identity = SigningIdentity::generate();
        let state = state(&identity);
        let nonce = challenge(State(state.clone())).await;
        let body = crate::core_handshake::InitiatorHandshake::new(identity)
            .ticket_body(&nonce)
            .unwrap();

        let response = ticket(State(state.clone()), body.clone()).await.unwrap();
        assert!(split_pair(&response).is_ok());

        let replay = ticket(State(state), body).await.unwrap_err();
        assert_eq!(replay.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_aborted_step_is_an_internal_failure() {
        let state = state(&SigningIdentity::generate());
        let result: ApiResult<()> = offload(&state, |_| panic!("step blew up")).await;
        assert_eq!(result.unwrap_err().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_session_dimensions() {
        let default = Dimensions::new(80, 24).unwrap();
        assert_eq!(session_dimensions(None, default), default);
        assert_eq!(
            session_dimensions(Some("120,40"), default),
            Dimensions::new(120, 40).unwrap()
        );
        assert_eq!(session_dimensions(Some("0,40"), default), default);
        assert_eq!(session_dimensions(Some("wide"), default), default);
    }
}

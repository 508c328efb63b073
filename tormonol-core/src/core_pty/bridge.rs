/*
    SessionBridge - one admitted socket bound to one shell

        SPAWNING ──spawn ok──► ACTIVE ──exit | transport close | shutdown──► EXITING ──► CLOSED
            │                                                                              ▲
            └──────────────────────────── spawn failed ────────────────────────────────────┘

    ACTIVE:
      inbound DATA    → shell input, verbatim
      inbound RESIZE  → pty resize, then echo the effective size back as RESIZE
      shell output    → outbound DATA
    EXITING on shell exit: drain remaining output (bounded by a grace period), flush the
    outbound queue, close with 4001 + exit JSON.
    EXITING on transport close: stop inbound, kill the shell, abandon queued output.
    EXITING on shutdown: kill the shell, flush, close with 4000.

    The bridge is transport-agnostic. The server adapts its WebSocket into a
    `TransportEvent` receiver and a `WireOut` sender.
*/

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::close::{CloseReason, ExitInfo};
use super::spawner::{PtySpawner, SpawnRequest, SpawnedPty};
use crate::core_crypto::DirectionKeys;
use crate::core_frame::{ChannelEvent, SecureChannel};
use crate::metrics;
use crate::shutdown::ShutdownSignal;

/// How long output keeps draining after the shell has exited
pub const DEFAULT_DRAIN_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Spawning,
    Active,
    Exiting,
    Closed,
}

/// Message for the transport writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireOut {
    Frame(Vec<u8>),
    Close { code: u16, reason: String },
}

impl From<Vec<u8>> for WireOut {
    fn from(frame: Vec<u8>) -> Self {
        WireOut::Frame(frame)
    }
}

/// Message from the transport reader
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Frame(Vec<u8>),
    Closed { code: Option<u16>, reason: String },
}

pub struct SessionBridge {
    ctx: BridgeCtx,
    spawner: Arc<dyn PtySpawner>,
    request: SpawnRequest,
    keys: DirectionKeys,
}

struct BridgeCtx {
    id: String,
    drain_grace: Duration,
    state: watch::Sender<BridgeState>,
}

impl SessionBridge {
    pub fn new(
        id: impl Into<String>,
        spawner: Arc<dyn PtySpawner>,
        request: SpawnRequest,
        keys: DirectionKeys,
    ) -> Self {
        let (state, _) = watch::channel(BridgeState::Spawning);
        Self {
            ctx: BridgeCtx {
                id: id.into(),
                drain_grace: DEFAULT_DRAIN_GRACE,
                state,
            },
            spawner,
            request,
            keys,
        }
    }

    pub fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.ctx.drain_grace = grace;
        self
    }

    pub fn subscribe_state(&self) -> watch::Receiver<BridgeState> {
        self.ctx.state.subscribe()
    }

    /// Drive the session to completion and return why it ended.
    pub async fn run(
        self,
        mut transport: mpsc::Receiver<TransportEvent>,
        wire: mpsc::Sender<WireOut>,
        mut shutdown: broadcast::Receiver<ShutdownSignal>,
    ) -> CloseReason {
        let SessionBridge {
            ctx,
            spawner,
            request,
            keys,
        } = self;
        let dims = request.dimensions;

        let SpawnedPty {
            mut control,
            mut output,
            mut exit,
        } = match spawner.spawn(request).await {
            Ok(spawned) => spawned,
            Err(e) => {
                error!(session = %ctx.id, error = %e, "shell spawn failed");
                metrics::session_spawn_failed();
                let reason = CloseReason::SpawnFailed(e.to_string());
                let _ = wire
                    .send(WireOut::Close {
                        code: reason.code(),
                        reason: reason.reason_text(),
                    })
                    .await;
                ctx.transition(BridgeState::Closed);
                return reason;
            }
        };

        let (channel, mut events) = SecureChannel::bind(keys, wire.clone());
        if channel.send_resize(dims).await.is_err() {
            warn!(session = %ctx.id, "could not announce initial size");
        }

        ctx.transition(BridgeState::Active);
        metrics::session_opened();
        info!(session = %ctx.id, pid = ?control.pid(), %dims, "session active");

        let mut output_open = true;
        let mut shutdown_live = true;

        let reason = loop {
            tokio::select! {
                incoming = transport.recv() => match incoming {
                    Some(TransportEvent::Frame(raw)) => {
                        if channel.receive_frame(raw).await.is_err() {
                            warn!(session = %ctx.id, "inbound queue closed");
                        }
                    }
                    Some(TransportEvent::Closed { code, reason }) => {
                        break CloseReason::from_close(code, &reason);
                    }
                    None => {
                        break CloseReason::Unexpected { code: None, reason: "transport dropped".to_string() };
                    }
                },

                Some(event) = events.recv() => match event {
                    ChannelEvent::Data(bytes) => {
                        if let Err(e) = control.write(bytes) {
                            warn!(session = %ctx.id, error = %e, "shell input rejected");
                        }
                    }
                    ChannelEvent::Resize(next) => match control.resize(next) {
                        Ok(()) => {
                            debug!(session = %ctx.id, dims = %next, "resized");
                            let _ = channel.send_resize(next).await;
                        }
                        Err(e) => warn!(session = %ctx.id, error = %e, "resize failed"),
                    },
                },

                chunk = output.recv(), if output_open => match chunk {
                    Some(chunk) => {
                        let _ = channel.send_data(chunk).await;
                    }
                    None => output_open = false,
                },

                status = &mut exit => {
                    let info = status.unwrap_or_else(|_| ExitInfo::code(1));
                    ctx.transition(BridgeState::Exiting);
                    info!(session = %ctx.id, exit = %info, "shell exited");

                    if output_open {
                        ctx.drain(&mut output, &channel).await;
                    }
                    channel.shutdown().await;

                    let reason = CloseReason::Exited(info);
                    let _ = wire
                        .send(WireOut::Close { code: reason.code(), reason: reason.reason_text() })
                        .await;
                    ctx.finish(&reason);
                    return reason;
                },

                signal = shutdown.recv(), if shutdown_live => {
                    if matches!(signal, Err(broadcast::error::RecvError::Closed)) {
                        shutdown_live = false;
                        continue;
                    }
                    ctx.transition(BridgeState::Exiting);
                    info!(session = %ctx.id, "closing session for shutdown");
                    if let Err(e) = control.kill() {
                        debug!(session = %ctx.id, error = %e, "kill after shutdown");
                    }
                    channel.shutdown().await;

                    let reason = CloseReason::Disconnect;
                    let _ = wire
                        .send(WireOut::Close { code: reason.code(), reason: "server shutting down".to_string() })
                        .await;
                    ctx.finish(&reason);
                    return reason;
                },
            }
        };

        // Transport side closed first
        ctx.transition(BridgeState::Exiting);
        match &reason {
            CloseReason::Unexpected { code, reason: text } => {
                info!(session = %ctx.id, ?code, reason = %text, "unexpected close code");
            }
            _ => debug!(session = %ctx.id, "transport closed"),
        }

        channel.abort();
        if let Err(e) = control.kill() {
            debug!(session = %ctx.id, error = %e, "kill after disconnect");
        }

        ctx.finish(&reason);
        reason
    }
}

impl BridgeCtx {
    fn transition(&self, next: BridgeState) {
        debug!(session = %self.id, from = ?*self.state.borrow(), to = ?next, "bridge state");
        self.state.send_replace(next);
    }

    async fn drain(&self, output: &mut mpsc::Receiver<Vec<u8>>, channel: &SecureChannel) {
        let deadline = Instant::now() + self.drain_grace;
        loop {
            match tokio::time::timeout_at(deadline, output.recv()).await {
                Ok(Some(chunk)) => {
                    let _ = channel.send_data(chunk).await;
                }
                Ok(None) => break,
                Err(_) => {
                    debug!(session = %self.id, "output drain grace elapsed");
                    break;
                }
            }
        }
    }

    fn finish(&self, reason: &CloseReason) {
        metrics::session_closed(reason.label());
        self.transition(BridgeState::Closed);
        info!(session = %self.id, code = reason.code(), reason = reason.label(), "session closed");
    }
}

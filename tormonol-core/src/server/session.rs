//! WebSocket adapter for [`SessionBridge`]

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, Instrument};

use super::state::AppState;
use crate::core_crypto::DirectionKeys;
use crate::core_pty::{SessionBridge, SpawnRequest, TransportEvent, WireOut};

const WIRE_BUFFER: usize = 64;
const WRITER_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

pub(crate) async fn run(
    socket: WebSocket,
    state: Arc<AppState>,
    id: String,
    keys: DirectionKeys,
    request: SpawnRequest,
) {
    let span = tracing::info_span!("session", session = %id);
    async move {
        let _guard = state.sessions.enter();

        let (mut sink, mut stream) = socket.split();
        let (transport_tx, transport_rx) = mpsc::channel(WIRE_BUFFER);
        let (wire_tx, mut wire_rx) = mpsc::channel::<WireOut>(WIRE_BUFFER);

        let mut writer = tokio::spawn(
            async move {
                while let Some(out) = wire_rx.recv().await {
                    let (message, last) = match out {
                        WireOut::Frame(bytes) => (Message::Binary(bytes), false),
                        WireOut::Close { code, reason } => (
                            Message::Close(Some(CloseFrame {
                                code,
                                reason: reason.into(),
                            })),
                            true,
                        ),
                    };
                    if let Err(e) = sink.send(message).await {
                        debug!(error = %e, "socket write failed");
                        break;
                    }
                    if last {
                        break;
                    }
                }
                let _ = sink.close().await;
            }
            .in_current_span(),
        );

        let reader = tokio::spawn(
            async move {
                let closed = loop {
                    match stream.next().await {
                        Some(Ok(Message::Binary(bytes))) => {
                            if transport_tx.send(TransportEvent::Frame(bytes)).await.is_err() {
                                return;
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            break match frame {
                                Some(frame) => TransportEvent::Closed {
                                    code: Some(frame.code),
                                    reason: frame.reason.into_owned(),
                                },
                                None => TransportEvent::Closed {
                                    code: None,
                                    reason: String::new(),
                                },
                            };
                        }
                        Some(Ok(Message::Text(_))) => debug!("ignoring text message"),
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            break TransportEvent::Closed {
                                code: None,
                                reason: e.to_string(),
                            }
                        }
                        None => {
                            break TransportEvent::Closed {
                                code: None,
                                reason: "stream ended".to_string(),
                            }
                        }
                    }
                };
                let _ = transport_tx.send(closed).await;
            }
            .in_current_span(),
        );

        let bridge = SessionBridge::new(id, state.spawner.clone(), request, keys);
        let reason = bridge
            .run(transport_rx, wire_tx, state.shutdown.subscribe())
            .await;

        reader.abort();
        if tokio::time::timeout(WRITER_FLUSH_TIMEOUT, &mut writer)
            .await
            .is_err()
        {
            writer.abort();
        }

        debug!(code = reason.code(), "socket closed");
    }
    .instrument(span)
    .await
}

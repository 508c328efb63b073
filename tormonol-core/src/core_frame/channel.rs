/*
    SecureChannel - both directions of one admitted session

    Owns the session's direction keys, split into an encrypting half and a decrypting
    half, each behind its own SerialQueue:

      send_data / send_resize ─► [outbound queue] ─► seal ─► FrameSink
      receive_frame(raw)      ─► [inbound queue]  ─► open ─► ChannelEvent receiver

    Identical on both ends; only the `Role` baked into the keys differs.
    The decoded-event hop is unbounded: the task that submits raw frames is usually
    the same task that consumes events, so the opener must never wait on it.
    Undecryptable or malformed inbound frames are logged and dropped. A sink that has
    gone away is logged once per frame and otherwise ignored.
*/

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::cipher::FrameCipher;
use super::error::FrameResult;
use super::frame::{Dimensions, Frame};
use super::queue::{SerialQueue, Stage};
use crate::core_crypto::DirectionKeys;
use crate::metrics;

/// Transport went away while a frame was in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkClosed;

/// Where encoded frames go
#[async_trait]
pub trait FrameSink: Send + 'static {
    async fn send_frame(&mut self, frame: Vec<u8>) -> Result<(), SinkClosed>;
}

#[async_trait]
impl<T> FrameSink for mpsc::Sender<T>
where
    T: From<Vec<u8>> + Send + 'static,
{
    async fn send_frame(&mut self, frame: Vec<u8>) -> Result<(), SinkClosed> {
        self.send(T::from(frame)).await.map_err(|_| SinkClosed)
    }
}

/// Decoded inbound traffic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Data(Vec<u8>),
    Resize(Dimensions),
}

/// Outbound work item
#[derive(Debug)]
pub enum Outgoing {
    Data(Vec<u8>),
    Resize(Dimensions),
}

struct SealStage<S> {
    cipher: FrameCipher,
    sink: S,
    sink_closed: bool,
}

#[async_trait]
impl<S: FrameSink> Stage for SealStage<S> {
    type Input = Outgoing;

    async fn process(&mut self, input: Outgoing) {
        let frame = match input {
            Outgoing::Data(plaintext) => match self.cipher.seal(&plaintext) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(error = %e, "dropping outbound frame");
                    metrics::frame_dropped("outbound", e.cause());
                    return;
                }
            },
            Outgoing::Resize(dims) => Frame::Resize(dims),
        };

        if self.sink_closed {
            trace!(kind = frame.kind(), "sink closed, discarding outbound frame");
            return;
        }

        let kind = frame.kind();
        if self.sink.send_frame(frame.encode()).await.is_err() {
            debug!(kind, "transport closed with frame in flight");
            self.sink_closed = true;
            metrics::frame_dropped("outbound", "closed");
        }
    }
}

struct OpenStage {
    cipher: FrameCipher,
    events: mpsc::UnboundedSender<ChannelEvent>,
}

#[async_trait]
impl Stage for OpenStage {
    type Input = Vec<u8>;

    async fn process(&mut self, raw: Vec<u8>) {
        let event = match Frame::decode(&raw) {
            Ok(Frame::Data { iv, ciphertext }) => match self.cipher.open(&iv, &ciphertext) {
                Ok(plaintext) => ChannelEvent::Data(plaintext),
                Err(e) => {
                    warn!(error = %e, len = raw.len(), "dropping inbound frame");
                    metrics::frame_dropped("inbound", e.cause());
                    return;
                }
            },
            Ok(Frame::Resize(dims)) => ChannelEvent::Resize(dims),
            Err(e) => {
                warn!(error = %e, len = raw.len(), "dropping malformed inbound frame");
                metrics::frame_dropped("inbound", e.cause());
                return;
            }
        };

        if self.events.send(event).is_err() {
            trace!("event consumer gone, discarding inbound frame");
        }
    }
}

pub struct SecureChannel {
    outbound: SerialQueue<Outgoing>,
    inbound: SerialQueue<Vec<u8>>,
}

impl SecureChannel {
    /// Bind `keys` to a sink. Returns the channel and the stream of decoded inbound
    /// events. The keys are consumed; nothing else can use them afterwards.
    pub fn bind<S: FrameSink>(
        keys: DirectionKeys,
        sink: S,
    ) -> (Self, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let outbound = SerialQueue::spawn(
            "outbound",
            SealStage {
                cipher: FrameCipher::new(keys.encrypt_key()),
                sink,
                sink_closed: false,
            },
        );
        let inbound = SerialQueue::spawn(
            "inbound",
            OpenStage {
                cipher: FrameCipher::new(keys.decrypt_key()),
                events: events_tx,
            },
        );

        debug!(role = ?keys.role(), "secure channel bound");
        (Self { outbound, inbound }, events_rx)
    }

    pub async fn send_data(&self, plaintext: impl Into<Vec<u8>>) -> FrameResult<()> {
        self.outbound.submit(Outgoing::Data(plaintext.into())).await
    }

    pub async fn send_resize(&self, dims: Dimensions) -> FrameResult<()> {
        self.outbound.submit(Outgoing::Resize(dims)).await
    }

    /// Queue one raw frame from the transport for decoding.
    pub async fn receive_frame(&self, raw: Vec<u8>) -> FrameResult<()> {
        self.inbound.submit(raw).await
    }

    /// Flush queued outbound frames, then stop both directions.
    pub async fn shutdown(self) {
        self.inbound.abort();
        self.outbound.close().await;
    }

    /// Process everything already queued in both directions, then stop.
    /// The event receiver yields the remaining events and then ends.
    pub async fn close(self) {
        tokio::join!(self.inbound.close(), self.outbound.close());
    }

    /// Stop both directions immediately.
    pub fn abort(self) {
        self.inbound.abort();
        self.outbound.abort();
    }
}

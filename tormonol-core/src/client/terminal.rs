/*
    RemoteTerminal - client end of one admitted session

    A driver task owns the SecureChannel and mirrors the server's bridge:

      write / resize      ─► commands ─► channel ─► WireOut ─► socket writer
      socket reader ─► TransportEvent ─► channel ─► TerminalEvent receiver

    When the server closes, every frame received before the close is decoded and
    delivered before the final `TerminalEvent::Closed`.
*/

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::error::{ClientError, ClientResult};
use crate::core_frame::{ChannelEvent, Dimensions, SecureChannel};
use crate::core_pty::{CloseReason, TransportEvent, WireOut};

const COMMAND_BUFFER: usize = 64;

/// Something the server sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalEvent {
    /// Shell output
    Data(Vec<u8>),
    /// Effective terminal size, sent after spawn and after every applied resize
    Resize(Dimensions),
    /// Always the last event
    Closed(CloseReason),
}

enum Command {
    Data(Vec<u8>),
    Resize(Dimensions),
    Close,
}

pub struct RemoteTerminal {
    id: String,
    commands: mpsc::Sender<Command>,
    events: mpsc::UnboundedReceiver<TerminalEvent>,
    driver: JoinHandle<()>,
}

impl RemoteTerminal {
    /// Bind a channel to a transport. `wire` feeds the socket writer and `transport`
    /// is fed by the socket reader.
    pub(crate) fn start(
        id: String,
        channel: SecureChannel,
        channel_events: mpsc::UnboundedReceiver<ChannelEvent>,
        transport: mpsc::Receiver<TransportEvent>,
        wire: mpsc::Sender<WireOut>,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        // Unbounded so the driver never waits on a caller that is itself blocked in `write`
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let driver = tokio::spawn(drive(
            channel,
            channel_events,
            transport,
            commands_rx,
            wire,
            events_tx,
        ));

        Self {
            id,
            commands: commands_tx,
            events: events_rx,
            driver,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Send keystrokes, verbatim.
    pub async fn write(&self, data: impl Into<Vec<u8>>) -> ClientResult<()> {
        self.command(Command::Data(data.into())).await
    }

    pub async fn resize(&self, dimensions: Dimensions) -> ClientResult<()> {
        self.command(Command::Resize(dimensions)).await
    }

    /// Next event from the server. `None` after `Closed` has been delivered.
    pub async fn next_event(&mut self) -> Option<TerminalEvent> {
        self.events.recv().await
    }

    /// Flush pending input and close with 4000.
    pub async fn close(self) {
        let _ = self.commands.send(Command::Close).await;
        if let Err(e) = self.driver.await {
            debug!(error = %e, "terminal driver ended abnormally");
        }
    }

    async fn command(&self, command: Command) -> ClientResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ClientError::SessionClosed)
    }
}

async fn drive(
    channel: SecureChannel,
    mut channel_events: mpsc::UnboundedReceiver<ChannelEvent>,
    mut transport: mpsc::Receiver<TransportEvent>,
    mut commands: mpsc::Receiver<Command>,
    wire: mpsc::Sender<WireOut>,
    events: mpsc::UnboundedSender<TerminalEvent>,
) {
    let reason = loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Data(bytes)) => {
                    if channel.send_data(bytes).await.is_err() {
                        warn!("outbound queue closed");
                    }
                }
                Some(Command::Resize(dims)) => {
                    if channel.send_resize(dims).await.is_err() {
                        warn!("outbound queue closed");
                    }
                }
                Some(Command::Close) | None => {
                    channel.shutdown().await;
                    let reason = CloseReason::Disconnect;
                    let _ = wire
                        .send(WireOut::Close { code: reason.code(), reason: reason.reason_text() })
                        .await;
                    let _ = events.send(TerminalEvent::Closed(reason));
                    return;
                }
            },

            Some(event) = channel_events.recv() => {
                let _ = events.send(event.into());
            },

            incoming = transport.recv() => match incoming {
                Some(TransportEvent::Frame(raw)) => {
                    if channel.receive_frame(raw).await.is_err() {
                        warn!("inbound queue closed");
                    }
                }
                Some(TransportEvent::Closed { code, reason }) => {
                    break CloseReason::from_close(code, &reason);
                }
                None => {
                    break CloseReason::Unexpected { code: None, reason: "transport dropped".to_string() };
                }
            },
        }
    };

    debug!(code = reason.code(), "server closed session");
    let forward = async {
        while let Some(event) = channel_events.recv().await {
            let _ = events.send(event.into());
        }
    };
    tokio::join!(channel.close(), forward);
    let _ = events.send(TerminalEvent::Closed(reason));
}

impl From<ChannelEvent> for TerminalEvent {
    fn from(event: ChannelEvent) -> Self {
        match event {
            ChannelEvent::Data(bytes) => TerminalEvent::Data(bytes),
            ChannelEvent::Resize(dims) => TerminalEvent::Resize(dims),
        }
    }
}

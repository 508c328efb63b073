//! Local terminal attached to a remote session

use anyhow::Result;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::io::IsTerminal;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};

use tormonol_core::client::{TerminalClient, TerminalEvent};
use tormonol_core::core_frame::Dimensions;
use tormonol_core::core_pty::CloseReason;

const INPUT_CHUNK: usize = 1024;

struct RawModeGuard(bool);

impl RawModeGuard {
    fn new(enable: bool) -> Self {
        if !enable {
            return Self(false);
        }
        match enable_raw_mode() {
            Ok(()) => Self(true),
            Err(e) => {
                warn!(error = %e, "failed to enable raw mode");
                Self(false)
            }
        }
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.0 {
            let _ = disable_raw_mode();
        }
    }
}

/// Size of the local terminal, or the usual 80x24 when it cannot be read
fn local_dimensions() -> Dimensions {
    match crossterm::terminal::size() {
        Ok((cols, rows)) if cols > 0 && rows > 0 => Dimensions { cols, rows },
        _ => Dimensions { cols: 80, rows: 24 },
    }
}

/// Map how the session ended to a process exit code.
pub fn exit_code(reason: &CloseReason) -> i32 {
    match reason {
        CloseReason::Exited(info) => i32::try_from(info.exit_code).unwrap_or(1),
        CloseReason::Disconnect => 0,
        CloseReason::SpawnFailed(_) | CloseReason::Unexpected { .. } => 1,
    }
}

/// Connect, pump stdin/stdout until the session ends, and report why it ended.
pub async fn run(client: &TerminalClient) -> Result<CloseReason> {
    let mut terminal = client.connect(local_dimensions()).await?;
    debug!(session = terminal.id(), "attached");

    let _raw = RawModeGuard::new(std::io::stdin().is_terminal());
    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut resizes = WindowChanges::new();
    let mut input = vec![0u8; INPUT_CHUNK];

    loop {
        tokio::select! {
            read = stdin.read(&mut input) => match read {
                Ok(0) => break,
                Ok(n) => terminal.write(input[..n].to_vec()).await?,
                Err(e) => {
                    warn!(error = %e, "stdin read failed");
                    break;
                }
            },

            event = terminal.next_event() => match event {
                Some(TerminalEvent::Data(bytes)) => {
                    stdout.write_all(&bytes).await?;
                    stdout.flush().await?;
                }
                Some(TerminalEvent::Resize(dims)) => debug!(%dims, "remote size"),
                Some(TerminalEvent::Closed(reason)) => return Ok(reason),
                None => return Ok(CloseReason::Disconnect),
            },

            () = resizes.changed() => {
                terminal.resize(local_dimensions()).await?;
            }
        }
    }

    terminal.close().await;
    Ok(CloseReason::Disconnect)
}

#[cfg(unix)]
struct WindowChanges(Option<tokio::signal::unix::Signal>);

#[cfg(unix)]
impl WindowChanges {
    fn new() -> Self {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::window_change()) {
            Ok(sig) => Self(Some(sig)),
            Err(e) => {
                warn!(error = %e, "window size changes will not be forwarded");
                Self(None)
            }
        }
    }

    async fn changed(&mut self) {
        match &mut self.0 {
            Some(sig) => {
                if sig.recv().await.is_none() {
                    self.0 = None;
                    std::future::pending::<()>().await;
                }
            }
            None => std::future::pending().await,
        }
    }
}

#[cfg(not(unix))]
struct WindowChanges;

#[cfg(not(unix))]
impl WindowChanges {
    fn new() -> Self {
        Self
    }

    async fn changed(&mut self) {
        std::future::pending().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tormonol_core::core_pty::ExitInfo;

    #[test]
    fn test_exit_code() {
        assert_eq!(exit_code(&CloseReason::Exited(ExitInfo::code(3))), 3);
        assert_eq!(exit_code(&CloseReason::Disconnect), 0);
        assert_eq!(
            exit_code(&CloseReason::Unexpected {
                code: Some(1006),
                reason: String::new()
            }),
            1
        );
        assert_eq!(exit_code(&CloseReason::SpawnFailed("missing".to_string())), 1);
    }
}

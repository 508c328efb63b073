/*
    PtySpawner - capability that starts a shell on a pseudo-terminal

    The native implementation runs three OS threads per shell because portable-pty's
    handles are blocking:

      input   tokio mpsc ─► writer thread ─► master pty
      output  master pty ─► reader thread ─► tokio mpsc (chunks, ≤ 4 KiB)
      exit    child.wait() ─► waiter thread ─► oneshot ExitInfo

    Reader and waiter are independent so a background grandchild holding the pty open
    cannot delay the exit notification.
*/

use async_trait::async_trait;
use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, ExitStatus, MasterPty, PtySize};
use std::io::{Read, Write};
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use super::close::ExitInfo;
use super::error::{PtyError, PtyResult};
use crate::config::ShellConfig;
use crate::core_frame::Dimensions;

const READ_CHUNK: usize = 4096;
const OUTPUT_BUFFER: usize = 64;

/// Everything needed to start one shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub dimensions: Dimensions,
}

impl SpawnRequest {
    /// Build from the shell config. The environment is the fixed variables, `TERM`,
    /// and whichever passthrough names are set in the server's own environment.
    pub fn from_config(shell: &ShellConfig, dimensions: Dimensions) -> Self {
        let mut env: Vec<(String, String)> = shell
            .env_passthrough
            .iter()
            .filter_map(|name| std::env::var(name).ok().map(|value| (name.clone(), value)))
            .collect();
        env.push(("TERM".to_string(), shell.term.clone()));
        env.extend(shell.env.iter().map(|(k, v)| (k.clone(), v.clone())));

        Self {
            program: shell.program.clone(),
            args: shell.args.clone(),
            cwd: shell.cwd.clone(),
            env,
            dimensions,
        }
    }
}

/// Control half of a running shell
pub trait PtyControl: Send {
    /// Queue bytes for the shell's input, verbatim.
    fn write(&mut self, data: Vec<u8>) -> PtyResult<()>;

    fn resize(&mut self, dimensions: Dimensions) -> PtyResult<()>;

    fn kill(&mut self) -> PtyResult<()>;

    fn pid(&self) -> Option<u32> {
        None
    }
}

/// A started shell: control handle, output stream and exit notification
pub struct SpawnedPty {
    pub control: Box<dyn PtyControl>,
    pub output: mpsc::Receiver<Vec<u8>>,
    pub exit: oneshot::Receiver<ExitInfo>,
}

#[async_trait]
pub trait PtySpawner: Send + Sync {
    async fn spawn(&self, request: SpawnRequest) -> PtyResult<SpawnedPty>;
}

fn pty_size(dimensions: Dimensions) -> PtySize {
    PtySize {
        rows: dimensions.rows,
        cols: dimensions.cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

/// Spawner backed by the host's native pty system
#[derive(Debug, Default, Clone, Copy)]
pub struct NativePtySpawner;

#[async_trait]
impl PtySpawner for NativePtySpawner {
    async fn spawn(&self, request: SpawnRequest) -> PtyResult<SpawnedPty> {
        tokio::task::spawn_blocking(move || spawn_native(request))
            .await
            .map_err(|e| PtyError::Open(e.to_string()))?
    }
}

fn spawn_native(request: SpawnRequest) -> PtyResult<SpawnedPty> {
    let pair = native_pty_system()
        .openpty(pty_size(request.dimensions))
        .map_err(|e| PtyError::Open(e.to_string()))?;

    let mut cmd = CommandBuilder::new(&request.program);
    cmd.args(&request.args);
    cmd.env_clear();
    for (key, value) in &request.env {
        cmd.env(key, value);
    }
    if let Some(cwd) = &request.cwd {
        cmd.cwd(cwd);
    }

    let mut child = pair.slave.spawn_command(cmd).map_err(|e| PtyError::Spawn {
        program: request.program.clone(),
        message: e.to_string(),
    })?;
    // The child holds its own copy; ours would keep the pty open after exit.
    drop(pair.slave);

    let pid = child.process_id();
    let killer = child.clone_killer();
    let mut reader = pair
        .master
        .try_clone_reader()
        .map_err(|e| PtyError::Open(e.to_string()))?;
    let mut writer = pair
        .master
        .take_writer()
        .map_err(|e| PtyError::Open(e.to_string()))?;

    let (input_tx, mut input_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let (output_tx, output_rx) = mpsc::channel::<Vec<u8>>(OUTPUT_BUFFER);
    let (exit_tx, exit_rx) = oneshot::channel::<ExitInfo>();

    let label = pid.map(|p| p.to_string()).unwrap_or_else(|| "?".to_string());

    std::thread::Builder::new()
        .name(format!("pty-read-{}", label))
        .spawn(move || {
            let mut buf = vec![0u8; READ_CHUNK];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if output_tx.blocking_send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    // EIO once the last slave fd closes
                    Err(_) => break,
                }
            }
            trace!("pty reader finished");
        })?;

    std::thread::Builder::new()
        .name(format!("pty-write-{}", label))
        .spawn(move || {
            while let Some(data) = input_rx.blocking_recv() {
                if let Err(e) = writer.write_all(&data).and_then(|_| writer.flush()) {
                    debug!(error = %e, "pty input closed");
                    break;
                }
            }
        })?;

    std::thread::Builder::new()
        .name(format!("pty-wait-{}", label))
        .spawn(move || {
            let info = match child.wait() {
                Ok(status) => exit_info(&status),
                Err(e) => {
                    warn!(error = %e, "waiting for shell failed");
                    ExitInfo::code(1)
                }
            };
            let _ = exit_tx.send(info);
        })?;

    debug!(program = %request.program, pid = ?pid, dims = %request.dimensions, "shell spawned");

    Ok(SpawnedPty {
        control: Box::new(NativePtyControl {
            master: pair.master,
            input: input_tx,
            killer,
            pid,
        }),
        output: output_rx,
        exit: exit_rx,
    })
}

/// portable-pty keeps the signal private and only renders it through `Display`,
/// as `Terminated by <strsignal text>`.
fn exit_info(status: &ExitStatus) -> ExitInfo {
    let signal = if status.success() {
        None
    } else {
        signal_from_status_text(&status.to_string())
    };
    ExitInfo {
        exit_code: status.exit_code(),
        signal,
    }
}

fn signal_from_status_text(text: &str) -> Option<String> {
    let description = text.strip_prefix("Terminated by ")?.trim();
    let name = match description {
        "Hangup" => "SIGHUP",
        "Interrupt" => "SIGINT",
        "Quit" => "SIGQUIT",
        "Aborted" => "SIGABRT",
        "Killed" => "SIGKILL",
        "Segmentation fault" => "SIGSEGV",
        "Broken pipe" => "SIGPIPE",
        "Terminated" => "SIGTERM",
        other => return Some(other.to_string()),
    };
    Some(name.to_string())
}

struct NativePtyControl {
    master: Box<dyn MasterPty + Send>,
    input: mpsc::UnboundedSender<Vec<u8>>,
    killer: Box<dyn ChildKiller + Send + Sync>,
    pid: Option<u32>,
}

impl PtyControl for NativePtyControl {
    fn write(&mut self, data: Vec<u8>) -> PtyResult<()> {
        self.input.send(data).map_err(|_| PtyError::InputClosed)
    }

    fn resize(&mut self, dimensions: Dimensions) -> PtyResult<()> {
        self.master
            .resize(pty_size(dimensions))
            .map_err(|e| PtyError::Resize(e.to_string()))
    }

    fn kill(&mut self) -> PtyResult<()> {
        self.killer.kill().map_err(|e| PtyError::Kill(e.to_string()))
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn request(program: &str, args: &[&str]) -> SpawnRequest {
        SpawnRequest {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            cwd: None,
            env: vec![("PATH".to_string(), "/usr/bin:/bin".to_string())],
            dimensions: Dimensions { cols: 80, rows: 24 },
        }
    }

    async fn collect_output(output: &mut mpsc::Receiver<Vec<u8>>) -> Vec<u8> {
        let mut all = Vec::new();
        while let Ok(Some(chunk)) = timeout(Duration::from_secs(5), output.recv()).await {
            all.extend_from_slice(&chunk);
        }
        all
    }

    #[tokio::test]
    async fn test_exit_code_reported() {
        let mut spawned = NativePtySpawner
            .spawn(request("/bin/sh", &["-c", "exit 3"]))
            .await
            .unwrap();

        let info = timeout(Duration::from_secs(5), &mut spawned.exit)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(info.exit_code, 3);
        assert_eq!(info.signal, None);
    }

    #[tokio::test]
    async fn test_output_streamed() {
        let mut spawned = NativePtySpawner
            .spawn(request("/bin/sh", &["-c", "printf hello"]))
            .await
            .unwrap();

        let output = collect_output(&mut spawned.output).await;
        assert!(String::from_utf8_lossy(&output).contains("hello"));
    }

    #[tokio::test]
    async fn test_input_reaches_shell() {
        let mut spawned = NativePtySpawner
            .spawn(request("/bin/sh", &["-c", "read line; printf \"got:%s\" \"$line\""]))
            .await
            .unwrap();

        spawned.control.write(b"ping\n".to_vec()).unwrap();
        let output = collect_output(&mut spawned.output).await;
        assert!(String::from_utf8_lossy(&output).contains("got:ping"));
    }

    #[tokio::test]
    async fn test_kill_ends_process() {
        let mut spawned = NativePtySpawner
            .spawn(request("/bin/sh", &["-c", "sleep 30"]))
            .await
            .unwrap();

        spawned.control.kill().unwrap();
        let info = timeout(Duration::from_secs(5), &mut spawned.exit)
            .await
            .unwrap()
            .unwrap();
        assert_ne!(info.exit_code, 0);
        assert!(info.signal.is_some(), "signal missing from {}", info);
    }

    #[test]
    fn test_signal_from_status_text() {
        assert_eq!(signal_from_status_text("Terminated by Hangup").as_deref(), Some("SIGHUP"));
        assert_eq!(signal_from_status_text("Terminated by Killed").as_deref(), Some("SIGKILL"));
        assert_eq!(
            signal_from_status_text("Terminated by Signal 64").as_deref(),
            Some("Signal 64")
        );
        assert_eq!(signal_from_status_text("Exited with code 3"), None);
        assert_eq!(signal_from_status_text("Success"), None);
    }

    #[tokio::test]
    async fn test_missing_program_fails() {
        let result = NativePtySpawner
            .spawn(request("/definitely/not/a/shell", &[]))
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_request_from_config() {
        let mut shell = ShellConfig::default();
        shell.env_passthrough = vec!["TORMONOL_TEST_UNSET_VARIABLE".to_string()];
        shell.term = "xterm".to_string();

        let req = SpawnRequest::from_config(&shell, Dimensions { cols: 10, rows: 5 });
        assert!(req.env.contains(&("TERM".to_string(), "xterm".to_string())));
        assert!(req.env.contains(&("COLORTERM".to_string(), "truecolor".to_string())));
        assert!(!req.env.iter().any(|(k, _)| k == "TORMONOL_TEST_UNSET_VARIABLE"));
        assert_eq!(req.dimensions, Dimensions { cols: 10, rows: 5 });
    }
}

//! Scripted pseudo-terminal
//!
//! `FakePtySpawner` hands each spawned shell's far side to the test as a [`FakePty`]:
//! the test reads what the session wrote to the shell, pushes output, and decides when
//! and how the process exits.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

use super::async_helpers::{recv_unbounded_timeout, RecvTimeoutError, DEFAULT_TEST_TIMEOUT};
use crate::core_frame::Dimensions;
use crate::core_pty::{ExitInfo, PtyControl, PtyError, PtyResult, PtySpawner, SpawnRequest, SpawnedPty};

type ExitSlot = Arc<Mutex<Option<oneshot::Sender<ExitInfo>>>>;

fn fire(slot: &ExitSlot, info: ExitInfo) -> bool {
    match slot.lock() {
        Ok(mut guard) => guard.take().map(|tx| tx.send(info).is_ok()).unwrap_or(false),
        Err(_) => false,
    }
}

/// Test side of one fake shell
pub struct FakePty {
    pub request: SpawnRequest,
    input: mpsc::UnboundedReceiver<Vec<u8>>,
    resizes: mpsc::UnboundedReceiver<Dimensions>,
    output: mpsc::Sender<Vec<u8>>,
    exit: ExitSlot,
    killed: Arc<AtomicBool>,
}

impl FakePty {
    /// Next chunk the session wrote to the shell's input
    pub async fn next_input(&mut self) -> Result<Vec<u8>, RecvTimeoutError> {
        recv_unbounded_timeout(&mut self.input, DEFAULT_TEST_TIMEOUT).await
    }

    /// Next size applied to the terminal
    pub async fn next_resize(&mut self) -> Result<Dimensions, RecvTimeoutError> {
        recv_unbounded_timeout(&mut self.resizes, DEFAULT_TEST_TIMEOUT).await
    }

    /// Push bytes as if the shell printed them
    pub async fn emit(&self, bytes: impl Into<Vec<u8>>) {
        let _ = self.output.send(bytes.into()).await;
    }

    /// End the process with `info`. Output already emitted is still delivered.
    pub fn exit(&self, info: ExitInfo) {
        fire(&self.exit, info);
    }

    pub fn was_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }
}

struct FakeControl {
    input: mpsc::UnboundedSender<Vec<u8>>,
    resizes: mpsc::UnboundedSender<Dimensions>,
    exit: ExitSlot,
    killed: Arc<AtomicBool>,
}

impl PtyControl for FakeControl {
    fn write(&mut self, data: Vec<u8>) -> PtyResult<()> {
        self.input.send(data).map_err(|_| PtyError::InputClosed)
    }

    fn resize(&mut self, dimensions: Dimensions) -> PtyResult<()> {
        self.resizes
            .send(dimensions)
            .map_err(|e| PtyError::Resize(e.to_string()))
    }

    fn kill(&mut self) -> PtyResult<()> {
        self.killed.store(true, Ordering::SeqCst);
        fire(
            &self.exit,
            ExitInfo {
                exit_code: 1,
                signal: Some("SIGHUP".to_string()),
            },
        );
        Ok(())
    }

    fn pid(&self) -> Option<u32> {
        Some(4242)
    }
}

/// Spawner producing [`FakePty`]s
pub struct FakePtySpawner {
    shells: mpsc::UnboundedSender<FakePty>,
    fail: bool,
    spawned: AtomicUsize,
}

impl FakePtySpawner {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<FakePty>) {
        Self::build(false)
    }

    /// Every spawn fails, as if the shell binary were missing
    pub fn failing() -> (Arc<Self>, mpsc::UnboundedReceiver<FakePty>) {
        Self::build(true)
    }

    fn build(fail: bool) -> (Arc<Self>, mpsc::UnboundedReceiver<FakePty>) {
        let (shells, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                shells,
                fail,
                spawned: AtomicUsize::new(0),
            }),
            rx,
        )
    }

    /// Number of spawn attempts, failed ones included
    pub fn spawn_count(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PtySpawner for FakePtySpawner {
    async fn spawn(&self, request: SpawnRequest) -> PtyResult<SpawnedPty> {
        self.spawned.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PtyError::Spawn {
                program: request.program,
                message: "No such file or directory".to_string(),
            });
        }

        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (resize_tx, resize_rx) = mpsc::unbounded_channel();
        let (output_tx, output_rx) = mpsc::channel(64);
        let (exit_tx, exit_rx) = oneshot::channel();
        let exit: ExitSlot = Arc::new(Mutex::new(Some(exit_tx)));
        let killed = Arc::new(AtomicBool::new(false));

        let _ = self.shells.send(FakePty {
            request,
            input: input_rx,
            resizes: resize_rx,
            output: output_tx,
            exit: exit.clone(),
            killed: killed.clone(),
        });

        Ok(SpawnedPty {
            control: Box::new(FakeControl {
                input: input_tx,
                resizes: resize_tx,
                exit,
                killed,
            }),
            output: output_rx,
            exit: exit_rx,
        })
    }
}

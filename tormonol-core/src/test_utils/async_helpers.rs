//! Async test helpers
//!
//! Receive-with-timeout and completion assertions for channel-driven code.

use std::future::Future;
use tokio::sync::{mpsc, watch};
use tokio::time::{timeout, Duration};

/// Default timeout duration for tests (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Short timeout for tests that expect nothing to arrive (100ms)
pub const SHORT_TEST_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvTimeoutError {
    Timeout,
    Closed,
}

impl std::fmt::Display for RecvTimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecvTimeoutError::Timeout => write!(f, "receive operation timed out"),
            RecvTimeoutError::Closed => write!(f, "channel closed"),
        }
    }
}

impl std::error::Error for RecvTimeoutError {}

/// Receive from a bounded channel with a timeout
pub async fn recv_timeout<T>(
    rx: &mut mpsc::Receiver<T>,
    duration: Duration,
) -> Result<T, RecvTimeoutError> {
    timeout(duration, rx.recv())
        .await
        .map_err(|_| RecvTimeoutError::Timeout)?
        .ok_or(RecvTimeoutError::Closed)
}

/// Receive from an unbounded channel with a timeout
pub async fn recv_unbounded_timeout<T>(
    rx: &mut mpsc::UnboundedReceiver<T>,
    duration: Duration,
) -> Result<T, RecvTimeoutError> {
    timeout(duration, rx.recv())
        .await
        .map_err(|_| RecvTimeoutError::Timeout)?
        .ok_or(RecvTimeoutError::Closed)
}

/// Wait until a watched value satisfies `pred`
pub async fn wait_for_state<T, P>(
    rx: &mut watch::Receiver<T>,
    duration: Duration,
    pred: P,
) -> Result<(), RecvTimeoutError>
where
    P: FnMut(&T) -> bool,
{
    timeout(duration, rx.wait_for(pred))
        .await
        .map_err(|_| RecvTimeoutError::Timeout)?
        .map(|_| ())
        .map_err(|_| RecvTimeoutError::Closed)
}

/// Assert a future completes within duration
pub async fn assert_completes_within<F, T>(duration: Duration, future: F) -> T
where
    F: Future<Output = T>,
{
    match timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => panic!("Future did not complete within {:?}", duration),
    }
}

//! Session close codes
//!
//! `4000` is a plain disconnect, `4001` means the shell exited and the close reason
//! carries `{"exitCode":<u32>,"signal":<string|null>}`. Anything else is unexpected
//! but handled exactly like a disconnect.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const CLOSE_DISCONNECT: u16 = 4000;
pub const CLOSE_EXITED: u16 = 4001;
/// Shell never started
pub const CLOSE_SPAWN_FAILED: u16 = 1011;

/// How the shell process ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitInfo {
    pub exit_code: u32,
    pub signal: Option<String>,
}

impl ExitInfo {
    pub fn code(exit_code: u32) -> Self {
        Self {
            exit_code,
            signal: None,
        }
    }
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.signal {
            Some(signal) => write!(f, "exit code {} ({})", self.exit_code, signal),
            None => write!(f, "exit code {}", self.exit_code),
        }
    }
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    Disconnect,
    Exited(ExitInfo),
    SpawnFailed(String),
    Unexpected { code: Option<u16>, reason: String },
}

impl CloseReason {
    /// Interpret a close received from the transport
    pub fn from_close(code: Option<u16>, reason: &str) -> Self {
        match code {
            Some(CLOSE_DISCONNECT) => CloseReason::Disconnect,
            Some(CLOSE_EXITED) => match serde_json::from_str::<ExitInfo>(reason) {
                Ok(info) => CloseReason::Exited(info),
                Err(_) => CloseReason::Unexpected {
                    code,
                    reason: reason.to_string(),
                },
            },
            _ => CloseReason::Unexpected {
                code,
                reason: reason.to_string(),
            },
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            CloseReason::Disconnect => CLOSE_DISCONNECT,
            CloseReason::Exited(_) => CLOSE_EXITED,
            CloseReason::SpawnFailed(_) => CLOSE_SPAWN_FAILED,
            CloseReason::Unexpected { code, .. } => code.unwrap_or(CLOSE_DISCONNECT),
        }
    }

    /// Close frame reason text
    pub fn reason_text(&self) -> String {
        match self {
            CloseReason::Disconnect => "disconnect".to_string(),
            CloseReason::Exited(info) => {
                serde_json::to_string(info).unwrap_or_else(|_| "{}".to_string())
            }
            CloseReason::SpawnFailed(_) => "spawn failed".to_string(),
            CloseReason::Unexpected { reason, .. } => reason.clone(),
        }
    }

    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            CloseReason::Disconnect => "disconnect",
            CloseReason::Exited(_) => "exited",
            CloseReason::SpawnFailed(_) => "spawn_failed",
            CloseReason::Unexpected { .. } => "unexpected",
        }
    }
}

//! Pseudo-terminal sessions
//!
//! [`PtySpawner`] starts shells; [`SessionBridge`] ties one shell to one secure channel
//! and maps its exit, resize and teardown onto close codes.

pub mod bridge;
pub mod close;
pub mod error;
pub mod spawner;

pub use bridge::{BridgeState, SessionBridge, TransportEvent, WireOut, DEFAULT_DRAIN_GRACE};
pub use close::{CloseReason, ExitInfo, CLOSE_DISCONNECT, CLOSE_EXITED, CLOSE_SPAWN_FAILED};
pub use error::{PtyError, PtyResult};
pub use spawner::{NativePtySpawner, PtyControl, PtySpawner, SpawnRequest, SpawnedPty};

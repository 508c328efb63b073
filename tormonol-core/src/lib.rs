//! Tormonol core
//!
//! Authenticated key exchange, encrypted framing and pseudo-terminal bridging for a
//! browser-reachable remote shell.
//!
//! Layers, bottom up:
//! - [`core_registry`]: single-use expiring stores (nonces, checkpoints, session keys)
//! - [`core_crypto`]: signing identity, ECDH agreement and direction key derivation
//! - [`core_handshake`]: the four-step handshake, shared by both roles
//! - [`core_frame`]: wire frames, AES-GCM and the ordered per-direction queues
//! - [`core_pty`]: pseudo-terminal spawning and the session bridge
//! - [`server`] / [`client`]: HTTP + WebSocket endpoints for each side

pub mod client;
pub mod config;
pub mod core_crypto;
pub mod core_frame;
pub mod core_handshake;
pub mod core_keys;
pub mod core_pty;
pub mod core_registry;
pub mod logging;
pub mod metrics;
pub mod server;
pub mod shutdown;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::Config;
pub use core_handshake::{HandshakeCoordinator, HandshakeError};
pub use logging::{init_logging, LogLevel};

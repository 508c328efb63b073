//! Four-step authenticated key exchange
//!
//! Both ends of the protocol live here. [`HandshakeCoordinator`] is the responder,
//! driven by the HTTP server; [`InitiatorHandshake`] is the peer, driven by the client.
//! They agree on the same HKDF direction keys, oriented by [`Role`](crate::core_crypto::Role).

pub mod coordinator;
pub mod error;
pub mod initiator;
pub mod messages;

pub use coordinator::{HandshakeCoordinator, StoreSizes};
pub use error::{HandshakeError, HandshakeErrorKind, HandshakeResult};
pub use initiator::{Admission, InitiatorHandshake, PendingSalt};
pub use messages::{join_pair, split_pair};

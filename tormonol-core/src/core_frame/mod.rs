//! Secure frame codec
//!
//! Wire frames, per-direction AES-GCM, and the ordered queues that sit between the
//! transport and the session on both ends.

pub mod channel;
pub mod cipher;
pub mod error;
pub mod frame;
pub mod queue;

pub use channel::{ChannelEvent, FrameSink, Outgoing, SecureChannel, SinkClosed};
pub use cipher::FrameCipher;
pub use error::{FrameError, FrameResult};
pub use frame::{Dimensions, Frame, FRAME_DATA, FRAME_RESIZE, IV_LEN, TAG_LEN};
pub use queue::{SerialQueue, Stage};

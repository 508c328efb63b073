//! Test utilities shared by unit and integration tests
//!
//! A scripted fake pseudo-terminal, key fixtures and receive-with-timeout helpers.

pub mod async_helpers;
pub mod fake_pty;
pub mod fixtures;

pub use async_helpers::*;
pub use fake_pty::*;
pub use fixtures::*;

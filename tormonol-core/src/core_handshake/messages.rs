//! Handshake message bodies
//!
//! Every request and response body is two base64 fields joined by a single `.`, which
//! cannot occur inside standard base64.

use super::error::{HandshakeError, HandshakeResult};

/// Split `a.b` into its two non-empty parts.
pub fn split_pair(body: &str) -> HandshakeResult<(&str, &str)> {
    let body = body.trim();
    match body.split_once('.') {
        Some((first, second))
            if !first.is_empty() && !second.is_empty() && !second.contains('.') =>
        {
            Ok((first, second))
        }
        _ => Err(HandshakeError::Malformed(format!(
            "expected two '.'-separated fields, got {} bytes",
            body.len()
        ))),
    }
}

pub fn join_pair(first: &str, second: &str) -> String {
    format!("{}.{}", first, second)
}

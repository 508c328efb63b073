/*
    Frame - wire layout of every socket message

    ┌──────┬───────────────────────────────────────────┐
    │ 0x00 │ iv (12) │ AES-GCM ciphertext ││ tag (16)  │   DATA
    ├──────┼───────────────────────────────────────────┤
    │ 0x01 │ utf8 "<cols>,<rows>"                      │   RESIZE (plaintext)
    └──────┴───────────────────────────────────────────┘

    Decoding only checks structure. Authenticity of DATA is decided by the cipher.
*/

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::{FrameError, FrameResult};

pub const FRAME_DATA: u8 = 0;
pub const FRAME_RESIZE: u8 = 1;

pub const IV_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// Terminal size in character cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub cols: u16,
    pub rows: u16,
}

impl Dimensions {
    pub fn new(cols: u16, rows: u16) -> FrameResult<Self> {
        if cols == 0 || rows == 0 {
            return Err(FrameError::InvalidDimensions(format!("{},{}", cols, rows)));
        }
        Ok(Self { cols, rows })
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.cols, self.rows)
    }
}

impl FromStr for Dimensions {
    type Err = FrameError;

    /// Exactly two positive integers separated by one comma
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FrameError::InvalidDimensions(s.chars().take(32).collect());

        let mut parts = s.split(',');
        let (cols, rows) = match (parts.next(), parts.next(), parts.next()) {
            (Some(cols), Some(rows), None) => (cols.trim(), rows.trim()),
            _ => return Err(invalid()),
        };

        let cols: u16 = cols.parse().map_err(|_| invalid())?;
        let rows: u16 = rows.parse().map_err(|_| invalid())?;
        Self::new(cols, rows).map_err(|_| invalid())
    }
}

/// One decoded socket message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data {
        iv: [u8; IV_LEN],
        /// Ciphertext with the 16-byte tag appended
        ciphertext: Vec<u8>,
    },
    Resize(Dimensions),
}

impl Frame {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Frame::Data { iv, ciphertext } => {
                let mut out = Vec::with_capacity(1 + IV_LEN + ciphertext.len());
                out.push(FRAME_DATA);
                out.extend_from_slice(iv);
                out.extend_from_slice(ciphertext);
                out
            }
            Frame::Resize(dims) => {
                let text = dims.to_string();
                let mut out = Vec::with_capacity(1 + text.len());
                out.push(FRAME_RESIZE);
                out.extend_from_slice(text.as_bytes());
                out
            }
        }
    }

    pub fn decode(bytes: &[u8]) -> FrameResult<Self> {
        let (&kind, body) = bytes.split_first().ok_or(FrameError::Empty)?;

        match kind {
            FRAME_DATA => {
                if body.len() < IV_LEN + TAG_LEN {
                    return Err(FrameError::Truncated { len: bytes.len() });
                }
                let (iv, ciphertext) = body.split_at(IV_LEN);
                let mut iv_arr = [0u8; IV_LEN];
                iv_arr.copy_from_slice(iv);
                Ok(Frame::Data {
                    iv: iv_arr,
                    ciphertext: ciphertext.to_vec(),
                })
            }
            FRAME_RESIZE => {
                let text = std::str::from_utf8(body)
                    .map_err(|_| FrameError::InvalidDimensions("non-utf8".to_string()))?;
                Ok(Frame::Resize(text.parse()?))
            }
            other => Err(FrameError::UnknownType(other)),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Data { .. } => "data",
            Frame::Resize(_) => "resize",
        }
    }
}

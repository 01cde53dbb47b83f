//! Byte-stable encoding of commit records.
//!
//! Values are encoded with postcard. On disk each value is one frame: a
//! big-endian `u32` length followed by that many bytes.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::{self, Read};

/// Width of the length prefix in bytes
const PREFIX_LEN: usize = 4;

/// Values whose bytes feed the hash chain
pub trait CanonicalEncode: Serialize {
    /// Postcard bytes of `self`
    ///
    /// # Errors
    ///
    /// Returns error if postcard cannot represent the value
    fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        postcard::to_allocvec(self).map_err(|e| EncodeError(e.to_string()))
    }
}

/// A value postcard could not encode
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("value has no canonical encoding: {0}")]
pub struct EncodeError(pub String);

/// Failures reading or writing frames
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The value itself could not be encoded
    #[error(transparent)]
    Encode(#[from] EncodeError),
    /// Frame body does not fit a `u32` length
    #[error("frame of {0} bytes is too large")]
    Oversized(usize),
    /// The stream ends inside the frame starting at `offset`
    #[error("torn frame at byte {offset}")]
    Torn {
        /// Byte offset where the frame starts
        offset: u64,
    },
    /// Frame bytes are not a valid encoding of the expected type
    #[error("malformed frame at byte {offset}")]
    Malformed {
        /// Byte offset where the frame starts
        offset: u64,
    },
    /// The underlying reader or writer failed
    #[error("io: {0}")]
    Io(String),
}

impl From<io::Error> for FrameError {
    fn from(e: io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// One length-prefixed frame holding `value`
///
/// # Errors
///
/// Returns error if the value cannot be encoded or is too large for a frame
pub fn encode_frame<T: CanonicalEncode>(value: &T) -> Result<Vec<u8>, FrameError> {
    let body = value.encode()?;
    let len = u32::try_from(body.len()).map_err(|_| FrameError::Oversized(body.len()))?;
    let mut frame = Vec::with_capacity(PREFIX_LEN + body.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Reads length-prefixed frames back, tracking the byte offset
pub struct FrameReader<R> {
    inner: R,
    offset: u64,
}

impl<R: Read> FrameReader<R> {
    /// Wrap `inner`, positioned at byte 0
    pub fn new(inner: R) -> Self {
        Self { inner, offset: 0 }
    }

    /// Next frame, or `None` when the stream ends on a frame boundary
    ///
    /// # Errors
    ///
    /// Returns `Torn` if the stream stops mid-frame and `Malformed` if the
    /// body does not decode as `T`
    pub fn next_frame<T: DeserializeOwned>(&mut self) -> Result<Option<T>, FrameError> {
        let start = self.offset;
        let mut prefix = [0u8; PREFIX_LEN];
        match self.fill(&mut prefix)? {
            0 => return Ok(None),
            PREFIX_LEN => {}
            _ => return Err(FrameError::Torn { offset: start }),
        }

        let len = u32::from_be_bytes(prefix) as usize;
        let mut body = vec![0u8; len];
        if self.fill(&mut body)? < len {
            return Err(FrameError::Torn { offset: start });
        }
        self.offset = start + (PREFIX_LEN + len) as u64;

        postcard::from_bytes(&body)
            .map(Some)
            .map_err(|_| FrameError::Malformed { offset: start })
    }

    /// Offset just past the last complete frame
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    // Reads until `buf` is full or the stream ends; returns bytes read.
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize, FrameError> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }
}

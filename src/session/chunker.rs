//! Pure payload chunking for publish writes
//!
//! The chunker holds no progress of its own. The session passes in the
//! current offset and gets back the slice to write next.

use super::SessionError;
use bytes::Bytes;

/// Text published by the default workflow (1337 bytes)
pub const DEFAULT_PAYLOAD: &str = include_str!("payload.txt");

/// Default upper bound for a single write
pub const DEFAULT_CHUNK_SIZE: usize = 300;

/// One write's worth of payload
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub bytes: Bytes,
    /// True only for the chunk that ends exactly at the payload end
    pub is_final: bool,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Splits a fixed payload into contiguous chunks of at most `chunk_size` bytes
#[derive(Debug, Clone)]
pub struct PayloadChunker {
    payload: Bytes,
    chunk_size: usize,
}

impl PayloadChunker {
    pub fn new(payload: impl Into<Bytes>, chunk_size: usize) -> Result<Self, SessionError> {
        if chunk_size == 0 {
            return Err(SessionError::InvalidChunkSize);
        }
        Ok(Self {
            payload: payload.into(),
            chunk_size,
        })
    }

    /// Chunker over the built-in text with the default chunk size
    pub fn with_default_payload() -> Self {
        Self {
            payload: Bytes::from_static(DEFAULT_PAYLOAD.as_bytes()),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Return the chunk starting at `position` (pure function)
    ///
    /// An empty payload produces a single empty final chunk at position 0.
    pub fn next_chunk(&self, position: usize) -> Result<Chunk, SessionError> {
        let len = self.payload.len();
        if position > len || (position == len && len != 0) {
            return Err(SessionError::PositionOutOfRange {
                position,
                payload_len: len,
            });
        }

        let chunk_len = self.chunk_size.min(len - position);
        Ok(Chunk {
            bytes: self.payload.slice(position..position + chunk_len),
            is_final: position + chunk_len == len,
        })
    }

    /// Lengths of every chunk in write order
    pub fn chunk_lengths(&self) -> Vec<usize> {
        let mut lengths = Vec::new();
        let mut position = 0;
        while let Ok(chunk) = self.next_chunk(position) {
            lengths.push(chunk.len());
            position += chunk.len();
            if chunk.is_final {
                break;
            }
        }
        lengths
    }
}

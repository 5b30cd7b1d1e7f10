//! Error types for the decode pipeline.
//!
//! None of these escape the adapter hooks; they exist so each stage can
//! report *why* it produced nothing.

use thiserror::Error;

use crate::dispatcher::MessageKind;

/// Structural failure of the binary envelope or the message batch inside it.
#[derive(Debug, Error)]
pub enum FrameDecodeError {
    /// The outer push frame is not a valid protobuf message.
    #[error("invalid push frame: {0}")]
    Envelope(#[source] prost::DecodeError),

    /// The (decompressed) payload is not a valid message batch.
    #[error("invalid message batch: {0}")]
    Batch(#[source] prost::DecodeError),
}

/// Failure to decode one sub-message of a batch.
#[derive(Debug, Error)]
#[error("invalid {kind:?} payload: {source}")]
pub struct SubMessageError {
    /// The kind the sub-message was dispatched as.
    pub kind: MessageKind,
    /// The underlying protobuf error.
    #[source]
    pub source: prost::DecodeError,
}

impl SubMessageError {
    /// Creates a new sub-message error.
    pub fn new(kind: MessageKind, source: prost::DecodeError) -> Self {
        Self { kind, source }
    }
}

/// Result type for frame-level decoding.
pub type Result<T> = std::result::Result<T, FrameDecodeError>;

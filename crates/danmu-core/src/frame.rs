//! Push frame envelope parsing.

use prost::Message;

use crate::codec::try_decompress_payload;
use crate::error::{FrameDecodeError, Result};
use crate::proto::PushFrame;

/// Decodes the outer envelope without touching the payload.
pub fn decode_push_frame(raw: &[u8]) -> Result<PushFrame> {
    PushFrame::decode(raw).map_err(FrameDecodeError::Envelope)
}

/// Decodes a push frame and returns its (decompressed) payload.
///
/// Only a structurally invalid envelope is an error; a payload that is not
/// gzip is returned as-is.
pub fn parse_push_frame(raw: &[u8]) -> Result<Vec<u8>> {
    let frame = decode_push_frame(raw)?;
    let payload = try_decompress_payload(&frame.payload).into_owned();

    tracing::trace!(
        seq_id = frame.seq_id,
        payload_type = %frame.payload_type,
        compress_type = frame.header("compress_type").unwrap_or("none"),
        "Decoded push frame ({} -> {} bytes)",
        frame.payload.len(),
        payload.len()
    );

    Ok(payload)
}

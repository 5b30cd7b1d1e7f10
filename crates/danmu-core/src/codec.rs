//! Content-encoding and payload decompression.
//!
//! Every function here fails soft: when a stream cannot be decoded the input
//! is handed back unchanged and the caller's own parser decides what to do
//! with it.

use std::borrow::Cow;
use std::io::Read;

use flate2::read::GzDecoder;

/// Buffer size used by the Brotli decoder.
#[cfg(feature = "brotli")]
const BROTLI_BUFFER_SIZE: usize = 4096;

/// Largest decompressed output accepted from a single body or payload (16 MiB).
///
/// Anything that inflates past this is treated as undecodable.
pub const MAX_DECODED_SIZE: usize = 16 * 1024 * 1024;

/// HTTP `content-encoding` values the codec layer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentEncoding {
    /// No encoding, or one we do not handle.
    #[default]
    Identity,
    /// `gzip` / `x-gzip`.
    Gzip,
    /// `br`.
    Brotli,
}

impl ContentEncoding {
    /// Parses a `content-encoding` header value.
    ///
    /// Unknown or missing values map to [`ContentEncoding::Identity`].
    pub fn from_header(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return Self::Identity;
        };

        match value.trim().to_ascii_lowercase().as_str() {
            "gzip" | "x-gzip" => Self::Gzip,
            "br" => Self::Brotli,
            _ => Self::Identity,
        }
    }

    /// Returns the header token for this encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Gzip => "gzip",
            Self::Brotli => "br",
        }
    }
}

/// Reverses the declared content-encoding of an HTTP body.
///
/// Returns the original bytes if the stream is corrupt or the codec is not
/// compiled in.
pub fn decode_body(bytes: &[u8], encoding: ContentEncoding) -> Cow<'_, [u8]> {
    let decoded = match encoding {
        ContentEncoding::Identity => return Cow::Borrowed(bytes),
        ContentEncoding::Gzip => gunzip(bytes, MAX_DECODED_SIZE),
        ContentEncoding::Brotli => unbrotli(bytes, MAX_DECODED_SIZE),
    };

    match decoded {
        Ok(out) => Cow::Owned(out),
        Err(e) => {
            tracing::trace!("{} body left undecoded: {}", encoding.as_str(), e);
            Cow::Borrowed(bytes)
        }
    }
}

/// Decompresses an inner push-frame payload if it is compressed.
///
/// Payloads are usually gzip but some arrive raw, so any failure simply
/// returns the input.
pub fn try_decompress_payload(bytes: &[u8]) -> Cow<'_, [u8]> {
    match gunzip(bytes, MAX_DECODED_SIZE) {
        Ok(out) => Cow::Owned(out),
        Err(_) => Cow::Borrowed(bytes),
    }
}

/// Reads a decoder to the end, failing once more than `limit` bytes come out.
fn read_capped(reader: impl Read, limit: usize) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    reader.take(limit as u64 + 1).read_to_end(&mut out)?;

    if out.len() > limit {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("decoded size exceeds {} bytes", limit),
        ));
    }
    Ok(out)
}

fn gunzip(bytes: &[u8], limit: usize) -> std::io::Result<Vec<u8>> {
    read_capped(GzDecoder::new(bytes), limit)
}

#[cfg(feature = "brotli")]
fn unbrotli(bytes: &[u8], limit: usize) -> std::io::Result<Vec<u8>> {
    read_capped(brotli::Decompressor::new(bytes, BROTLI_BUFFER_SIZE), limit)
}

#[cfg(not(feature = "brotli"))]
fn unbrotli(_bytes: &[u8], _limit: usize) -> std::io::Result<Vec<u8>> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "brotli support not compiled in",
    ))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    pub(crate) fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[cfg(feature = "brotli")]
    fn brotli_compress(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut writer = brotli::CompressorWriter::new(&mut out, 4096, 5, 22);
            writer.write_all(data).unwrap();
        }
        out
    }

    // ==================== ContentEncoding Tests ====================

    #[test]
    fn content_encoding_from_header() {
        assert_eq!(ContentEncoding::from_header(Some("gzip")), ContentEncoding::Gzip);
        assert_eq!(ContentEncoding::from_header(Some(" GZIP ")), ContentEncoding::Gzip);
        assert_eq!(ContentEncoding::from_header(Some("x-gzip")), ContentEncoding::Gzip);
        assert_eq!(ContentEncoding::from_header(Some("br")), ContentEncoding::Brotli);
        assert_eq!(ContentEncoding::from_header(Some("zstd")), ContentEncoding::Identity);
        assert_eq!(ContentEncoding::from_header(None), ContentEncoding::Identity);
    }

    // ==================== decode_body Tests ====================

    #[test]
    fn decode_body_identity_is_borrowed() {
        let body = b"{\"a\":1}";
        let out = decode_body(body, ContentEncoding::Identity);
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(&*out, body);
    }

    #[test]
    fn decode_body_gzip() {
        let body = br#"{"data":{"room":{}}}"#;
        let compressed = gzip(body);
        let out = decode_body(&compressed, ContentEncoding::Gzip);
        assert_eq!(&*out, body);
    }

    #[test]
    fn decode_body_corrupt_gzip_returns_input() {
        let mut corrupt = gzip(b"hello world, hello world");
        corrupt.truncate(corrupt.len() / 2);
        let out = decode_body(&corrupt, ContentEncoding::Gzip);
        assert_eq!(&*out, corrupt.as_slice());
    }

    #[test]
    fn decode_body_plain_bytes_declared_gzip() {
        let body = b"not gzip at all";
        let out = decode_body(body, ContentEncoding::Gzip);
        assert_eq!(&*out, body);
    }

    #[cfg(feature = "brotli")]
    #[test]
    fn decode_body_brotli() {
        let body = "直播间 enter_room payload".repeat(20);
        let compressed = brotli_compress(body.as_bytes());
        let out = decode_body(&compressed, ContentEncoding::Brotli);
        assert_eq!(&*out, body.as_bytes());
    }

    #[cfg(feature = "brotli")]
    #[test]
    fn decode_body_corrupt_brotli_returns_input() {
        let mut corrupt = brotli_compress("some repeated text ".repeat(50).as_bytes());
        corrupt.truncate(corrupt.len() / 2);
        let out = decode_body(&corrupt, ContentEncoding::Brotli);
        assert_eq!(&*out, corrupt.as_slice());
    }

    #[cfg(not(feature = "brotli"))]
    #[test]
    fn decode_body_brotli_unavailable_returns_input() {
        let body = b"\x1b\x03\x00";
        let out = decode_body(body, ContentEncoding::Brotli);
        assert_eq!(&*out, body);
    }

    // ==================== try_decompress_payload Tests ====================

    #[test]
    fn try_decompress_payload_gzip() {
        let compressed = gzip(b"payload");
        let out = try_decompress_payload(&compressed);
        assert_eq!(&*out, b"payload");
    }

    #[test]
    fn try_decompress_payload_raw_passthrough() {
        let raw = [0x0a, 0x03, b'a', b'b', b'c'];
        let out = try_decompress_payload(&raw);
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(&*out, &raw);
    }

    #[test]
    fn try_decompress_payload_empty() {
        let out = try_decompress_payload(&[]);
        assert!(out.is_empty());
    }

    // ==================== Size Cap Tests ====================

    #[test]
    fn try_decompress_payload_rejects_oversized_output() {
        // A few KB of gzip that inflates past the cap.
        let compressed = gzip(&vec![0u8; MAX_DECODED_SIZE + 1]);
        assert!(compressed.len() < MAX_DECODED_SIZE / 100);

        let out = try_decompress_payload(&compressed);
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(&*out, compressed.as_slice());
    }

    #[test]
    fn try_decompress_payload_accepts_output_at_cap() {
        let compressed = gzip(&vec![7u8; MAX_DECODED_SIZE]);
        let out = try_decompress_payload(&compressed);
        assert_eq!(out.len(), MAX_DECODED_SIZE);
    }

    #[test]
    fn gunzip_limit_is_inclusive() {
        let compressed = gzip(b"0123456789");
        assert_eq!(gunzip(&compressed, 10).unwrap(), b"0123456789");

        let err = gunzip(&compressed, 9).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[test]
    fn decode_body_oversized_gzip_returns_input() {
        let compressed = gzip(&vec![b'a'; MAX_DECODED_SIZE + 1]);
        let out = decode_body(&compressed, ContentEncoding::Gzip);
        assert_eq!(&*out, compressed.as_slice());
    }

    #[cfg(feature = "brotli")]
    #[test]
    fn unbrotli_respects_cap() {
        let compressed = brotli_compress(&[b'x'; 4096]);
        assert_eq!(unbrotli(&compressed, 4096).unwrap().len(), 4096);
        assert!(unbrotli(&compressed, 4095).is_err());
    }
}

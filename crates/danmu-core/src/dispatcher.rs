//! Message batch decoding and method dispatch.
//!
//! The upstream batch carries dozens of message types. Only the kinds in
//! [`MessageKind`] are decoded; every other method is skipped without being
//! treated as an error.

use prost::Message;

use crate::error::{FrameDecodeError, Result, SubMessageError};
use crate::proto::{ChatMessage, GiftMessage, MessageEnvelope, SubMessage};

/// Method name of chat (danmaku) messages.
pub const CHAT_METHOD: &str = "WebcastChatMessage";

/// Method name of gift messages.
pub const GIFT_METHOD: &str = "WebcastGiftMessage";

/// The sub-message kinds the decoder recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Chat,
    Gift,
    /// Any other method. Skipped.
    Unrecognized,
}

impl MessageKind {
    /// Maps a method name to its kind by exact match.
    pub fn from_method(method: &str) -> Self {
        match method {
            CHAT_METHOD => Self::Chat,
            GIFT_METHOD => Self::Gift,
            _ => Self::Unrecognized,
        }
    }
}

/// A sub-message decoded according to its kind.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedMessage {
    Chat(ChatMessage),
    Gift(GiftMessage),
    /// An unrecognised method, carried by name for logging.
    Ignored(String),
}

/// Decodes a frame payload into its ordered list of sub-messages.
pub fn parse_messages(payload: &[u8]) -> Result<Vec<SubMessage>> {
    MessageEnvelope::decode(payload)
        .map(|envelope| envelope.messages)
        .map_err(FrameDecodeError::Batch)
}

/// Decodes one sub-message according to its method.
///
/// Unrecognised methods never fail; the payload is not even looked at.
pub fn decode_sub_message(
    message: &SubMessage,
) -> std::result::Result<DecodedMessage, SubMessageError> {
    let kind = MessageKind::from_method(&message.method);

    match kind {
        MessageKind::Chat => ChatMessage::decode(message.payload.as_slice())
            .map(DecodedMessage::Chat)
            .map_err(|e| SubMessageError::new(kind, e)),
        MessageKind::Gift => GiftMessage::decode(message.payload.as_slice())
            .map(DecodedMessage::Gift)
            .map_err(|e| SubMessageError::new(kind, e)),
        MessageKind::Unrecognized => Ok(DecodedMessage::Ignored(message.method.clone())),
    }
}

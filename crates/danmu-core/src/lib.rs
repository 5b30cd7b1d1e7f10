//! Danmu Core - Webcast push decoding and event normalisation.
//!
//! Turns intercepted Douyin live traffic into a line-oriented event stream.
//! The crate knows nothing about the proxy itself; the interception layer
//! hands it URLs, bodies and WebSocket frames through [`InterceptionAdapter`].
//!
//! ## Pipeline
//!
//! ```text
//! push frame ─► codec ─► frame ─► dispatcher ─► normalizer ─► room_tracker ─► sink
//! enter_room ─► codec ─────────────────────────► normalizer ─────────────────► sink
//! ```
//!
//! ## Failure policy
//!
//! Decoding is best effort. Malformed input produces no event (or, for a gift
//! that cannot be decoded, one placeholder gift event) and is never reported
//! to the caller as an error.

pub mod adapter;
pub mod codec;
pub mod dispatcher;
mod error;
pub mod events;
pub mod frame;
pub mod normalizer;
pub mod proto;
pub mod room_tracker;
pub mod sink;

pub use adapter::{
    AdapterConfig, FrameDirection, HttpResponseFlow, InterceptionAdapter, ResponsePolicy,
    WebSocketFlow,
};
pub use codec::{decode_body, try_decompress_payload, ContentEncoding, MAX_DECODED_SIZE};
pub use dispatcher::{decode_sub_message, parse_messages, DecodedMessage, MessageKind};
pub use error::{FrameDecodeError, SubMessageError};
pub use events::{
    AnchorInfoEvent, ChatEvent, DiscoveryEvent, GiftEvent, LiveEvent, UNKNOWN_ROOM,
};
pub use frame::parse_push_frame;
pub use normalizer::{normalize, parse_enter_room};
pub use room_tracker::{RoomTracker, DEFAULT_SWEEP_INTERVAL};
pub use sink::{EventSink, LineSink, NullSink, EVENT_LINE_PREFIX};

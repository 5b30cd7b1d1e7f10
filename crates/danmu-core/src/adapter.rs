//! The integration point driven by the interception framework.
//!
//! Two hooks: [`InterceptionAdapter::on_http_response`] for buffered HTTP
//! responses and [`InterceptionAdapter::on_websocket_message`] for single
//! WebSocket frames. Neither returns an error; every failure below them ends
//! as "no event" and the frame or body is forwarded untouched by the caller.
//!
//! ```text
//! HTTP response ─► enter_room? ─► decode_body ─► parse_enter_room ─► anchor_info
//!
//! WS frame ─► server→client? ─► push url? ─► parse_push_frame ─► parse_messages
//!                                                    │
//!                          room tracking ◄───────────┴─► decode_sub_message ─► normalize
//! ```

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::codec::{decode_body, ContentEncoding};
use crate::dispatcher::{decode_sub_message, parse_messages, MessageKind};
use crate::error::FrameDecodeError;
use crate::events::{GiftEvent, LiveEvent, UNKNOWN_ROOM};
use crate::frame::parse_push_frame;
use crate::normalizer::{normalize, parse_enter_room};
use crate::room_tracker::RoomTracker;
use crate::sink::EventSink;

/// URL marker of the live push WebSocket.
pub const DEFAULT_PUSH_PATH_MARKER: &str = "webcast/im/push";

/// URL marker of the enter-room HTTP endpoint.
pub const DEFAULT_ENTER_ROOM_MARKER: &str = "webcast/room/enter_room";

/// URL markers selecting which flows are decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Substring identifying the push WebSocket URL.
    pub push_path_marker: String,
    /// Substring identifying the enter-room endpoint.
    pub enter_room_marker: String,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            push_path_marker: DEFAULT_PUSH_PATH_MARKER.to_string(),
            enter_room_marker: DEFAULT_ENTER_ROOM_MARKER.to_string(),
        }
    }
}

/// What the proxy should do with an HTTP response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponsePolicy {
    /// Forward the body as it arrives without looking at it.
    Stream,
    /// Collect the full body and pass it to [`InterceptionAdapter::on_http_response`].
    Buffer,
}

/// A fully buffered HTTP response.
#[derive(Debug, Clone, Copy)]
pub struct HttpResponseFlow<'a> {
    pub url: &'a str,
    /// Raw `content-encoding` header value.
    pub content_encoding: Option<&'a str>,
    pub body: &'a [u8],
}

/// Which peer sent a WebSocket frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDirection {
    ClientToServer,
    ServerToClient,
}

/// One WebSocket frame and the URL of its connection.
#[derive(Debug, Clone, Copy)]
pub struct WebSocketFlow<'a> {
    pub url: &'a str,
    pub direction: FrameDirection,
    pub data: &'a [u8],
}

/// Binds decoding, room tracking and event output to the two hooks.
#[derive(Clone)]
pub struct InterceptionAdapter {
    config: AdapterConfig,
    tracker: Arc<RoomTracker>,
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for InterceptionAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptionAdapter")
            .field("config", &self.config)
            .field("known_rooms", &self.tracker.known_rooms())
            .field("sink", &"EventSink")
            .finish()
    }
}

impl InterceptionAdapter {
    pub fn new(
        config: AdapterConfig,
        tracker: Arc<RoomTracker>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            tracker,
            sink,
        }
    }

    /// Creates an adapter with default markers and a fresh tracker.
    pub fn with_sink(sink: Arc<dyn EventSink>) -> Self {
        Self::new(AdapterConfig::default(), Arc::new(RoomTracker::new()), sink)
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub fn tracker(&self) -> &Arc<RoomTracker> {
        &self.tracker
    }

    /// Decides whether a response must be buffered.
    ///
    /// Only the enter-room endpoint is buffered; everything else streams so
    /// media traffic is never held up.
    pub fn response_policy(&self, url: &str) -> ResponsePolicy {
        if url.contains(&self.config.enter_room_marker) {
            ResponsePolicy::Buffer
        } else {
            ResponsePolicy::Stream
        }
    }

    /// Whether frames on this WebSocket URL are decoded.
    pub fn is_push_url(&self, url: &str) -> bool {
        url.contains(&self.config.push_path_marker)
    }

    /// Handles a buffered HTTP response and returns the events emitted.
    pub fn on_http_response(&self, flow: &HttpResponseFlow<'_>) -> Vec<LiveEvent> {
        if self.response_policy(flow.url) != ResponsePolicy::Buffer {
            return Vec::new();
        }

        let encoding = ContentEncoding::from_header(flow.content_encoding);
        let body = decode_body(flow.body, encoding);

        let anchor = match parse_enter_room(&body) {
            Ok(Some(anchor)) => anchor,
            Ok(None) => {
                tracing::debug!("Enter-room body had no room object: {}", flow.url);
                return Vec::new();
            }
            Err(e) => {
                tracing::debug!("Enter-room body is not JSON ({}): {}", encoding.as_str(), e);
                return Vec::new();
            }
        };

        tracing::info!("Anchor info for room {}: {}", anchor.room_id, anchor.user);
        self.publish(vec![anchor.into()])
    }

    /// Handles one WebSocket frame and returns the events emitted.
    ///
    /// Client frames and non-push URLs are dropped before any decoding. A
    /// frame whose envelope or batch is invalid emits nothing, not even the
    /// room's discovery event.
    pub fn on_websocket_message(&self, flow: &WebSocketFlow<'_>) -> Vec<LiveEvent> {
        if flow.direction == FrameDirection::ClientToServer || !self.is_push_url(flow.url) {
            return Vec::new();
        }

        let room_id = room_id_from_url(flow.url);
        let decoded = match decode_frame(flow.data, &room_id) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::trace!("Dropped push frame for room {}: {}", room_id, e);
                return Vec::new();
            }
        };

        let mut events = Vec::with_capacity(decoded.len() + 1);
        if room_id != UNKNOWN_ROOM {
            self.tracker.maintenance_tick(Instant::now());
            if let Some(discovery) = self.tracker.on_room_seen(&room_id) {
                events.push(discovery.into());
            }
        }
        events.extend(decoded);

        self.publish(events)
    }

    fn publish(&self, events: Vec<LiveEvent>) -> Vec<LiveEvent> {
        for event in &events {
            self.sink.emit(event);
        }
        events
    }
}

/// Decodes one push frame into events, in batch order.
///
/// Envelope and batch failures are errors; sub-message failures are isolated.
/// A chat that fails to decode is skipped, a gift that fails to decode becomes
/// [`GiftEvent::malformed`].
pub fn decode_frame(raw: &[u8], room_id: &str) -> Result<Vec<LiveEvent>, FrameDecodeError> {
    let payload = parse_push_frame(raw)?;
    let messages = parse_messages(&payload)?;

    let events = messages
        .iter()
        .filter_map(|message| match decode_sub_message(message) {
            Ok(decoded) => normalize(&decoded, room_id),
            Err(e) if e.kind == MessageKind::Gift => {
                tracing::debug!("{}", e);
                Some(GiftEvent::malformed(room_id).into())
            }
            Err(e) => {
                tracing::debug!("{}", e);
                None
            }
        })
        .collect();

    Ok(events)
}

/// Reads the `room_id` query parameter, or [`UNKNOWN_ROOM`].
pub fn room_id_from_url(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.query_pairs()
                .find(|(key, _)| key == "room_id")
                .map(|(_, value)| value.into_owned())
        })
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| UNKNOWN_ROOM.to_string())
}

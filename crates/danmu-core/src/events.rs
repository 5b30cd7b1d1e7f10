//! Structured events published to the consumer.
//!
//! Each event serialises to one JSON object whose `type` field names the
//! variant, e.g. `{"type":"chat","room_id":"99","user":"U",...}`.

use serde::{Deserialize, Serialize};

/// Room id used when a flow does not identify its room.
pub const UNKNOWN_ROOM: &str = "UNKNOWN";

/// Placeholder user for a freshly discovered room.
pub const DISCOVERY_USER: &str = "获取中...";
/// Label carried by discovery events.
pub const DISCOVERY_CONTENT: &str = "检测到直播流";
/// Label carried by anchor info events.
pub const ANCHOR_INFO_CONTENT: &str = "主播信息更新";

/// Fallback user name when a message carries no user.
pub const UNKNOWN_USER: &str = "未知用户";
/// Fallback anchor nickname.
pub const UNKNOWN_ANCHOR: &str = "未知主播";
/// Fallback gift name.
pub const UNKNOWN_GIFT: &str = "未知礼物";
/// User name of the event emitted for an undecodable gift.
pub const MALFORMED_GIFT_USER: &str = "解析错误";
/// Gift name of the event emitted for an undecodable gift.
pub const MALFORMED_GIFT_NAME: &str = "未知";

/// An event on the output stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEvent {
    Discovery(DiscoveryEvent),
    AnchorInfo(AnchorInfoEvent),
    Chat(ChatEvent),
    Gift(GiftEvent),
}

impl LiveEvent {
    /// Returns the `type` discriminator.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Discovery(_) => "discovery",
            Self::AnchorInfo(_) => "anchor_info",
            Self::Chat(_) => "chat",
            Self::Gift(_) => "gift",
        }
    }

    /// Returns the room the event belongs to.
    pub fn room_id(&self) -> &str {
        match self {
            Self::Discovery(e) => &e.room_id,
            Self::AnchorInfo(e) => &e.room_id,
            Self::Chat(e) => &e.room_id,
            Self::Gift(e) => &e.room_id,
        }
    }
}

/// First sighting of a room since the last registry sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryEvent {
    pub room_id: String,
    pub user: String,
    pub content: String,
}

impl DiscoveryEvent {
    pub fn new(room_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            user: DISCOVERY_USER.to_string(),
            content: DISCOVERY_CONTENT.to_string(),
        }
    }
}

/// Anchor identity taken from the enter-room endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorInfoEvent {
    pub room_id: String,
    /// Anchor nickname.
    pub user: String,
    /// Human-readable handle, or the numeric short id when there is none.
    pub douyin_id: String,
    pub content: String,
}

/// A chat line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEvent {
    pub room_id: String,
    pub user: String,
    pub content: String,
    /// Upstream create time, empty when absent.
    pub timestamp: String,
}

/// A gift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiftEvent {
    pub room_id: String,
    pub user: String,
    pub gift_name: String,
    /// Always at least 1.
    pub count: u64,
    pub timestamp: String,
}

impl GiftEvent {
    /// The placeholder emitted when a gift payload cannot be decoded at all.
    pub fn malformed(room_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            user: MALFORMED_GIFT_USER.to_string(),
            gift_name: MALFORMED_GIFT_NAME.to_string(),
            count: 1,
            timestamp: String::new(),
        }
    }
}

impl From<DiscoveryEvent> for LiveEvent {
    fn from(event: DiscoveryEvent) -> Self {
        Self::Discovery(event)
    }
}

impl From<AnchorInfoEvent> for LiveEvent {
    fn from(event: AnchorInfoEvent) -> Self {
        Self::AnchorInfo(event)
    }
}

impl From<ChatEvent> for LiveEvent {
    fn from(event: ChatEvent) -> Self {
        Self::Chat(event)
    }
}

impl From<GiftEvent> for LiveEvent {
    fn from(event: GiftEvent) -> Self {
        Self::Gift(event)
    }
}

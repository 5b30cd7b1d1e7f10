//! Conversion of decoded structures into [`LiveEvent`]s.
//!
//! Protobuf fields are optional upstream and vary between app versions, so
//! every lookup here falls back to a documented sentinel instead of failing.
//! The enter-room endpoint is JSON and has shipped in two shapes; both are
//! tried in order by [`ROOM_LOOKUPS`].

use serde_json::Value;

use crate::dispatcher::DecodedMessage;
use crate::events::{
    AnchorInfoEvent, ChatEvent, GiftEvent, LiveEvent, ANCHOR_INFO_CONTENT, UNKNOWN_ANCHOR,
    UNKNOWN_GIFT, UNKNOWN_ROOM, UNKNOWN_USER,
};
use crate::proto::{ChatMessage, Common, GiftMessage, User};

/// Maps a decoded sub-message to its event. Ignored kinds yield `None`.
pub fn normalize(message: &DecodedMessage, room_id: &str) -> Option<LiveEvent> {
    match message {
        DecodedMessage::Chat(chat) => Some(chat_event(chat, room_id).into()),
        DecodedMessage::Gift(gift) => Some(gift_event(gift, room_id).into()),
        DecodedMessage::Ignored(_) => None,
    }
}

pub fn chat_event(chat: &ChatMessage, room_id: &str) -> ChatEvent {
    ChatEvent {
        room_id: room_id.to_string(),
        user: nickname(chat.user.as_ref()),
        content: chat.content.clone(),
        timestamp: create_time(chat.common.as_ref()),
    }
}

/// Builds a gift event, degrading field by field:
/// user `未知用户`, gift name `未知礼物`, count `1`, timestamp empty.
pub fn gift_event(gift: &GiftMessage, room_id: &str) -> GiftEvent {
    let gift_name = gift
        .gift
        .as_ref()
        .map(|g| g.name.as_str())
        .filter(|name| !name.is_empty())
        .unwrap_or(UNKNOWN_GIFT)
        .to_string();

    GiftEvent {
        room_id: room_id.to_string(),
        user: nickname(gift.user.as_ref()),
        gift_name,
        count: gift.combo_count.max(1),
        timestamp: create_time(gift.common.as_ref()),
    }
}

fn nickname(user: Option<&User>) -> String {
    user.map(|u| u.nick_name.as_str())
        .filter(|name| !name.is_empty())
        .unwrap_or(UNKNOWN_USER)
        .to_string()
}

fn create_time(common: Option<&Common>) -> String {
    match common {
        Some(c) if c.create_time != 0 => c.create_time.to_string(),
        _ => String::new(),
    }
}

// =============================================================================
// Enter-room JSON
// =============================================================================

/// A pure lookup of the room object inside an enter-room response.
pub type RoomLookup = fn(&Value) -> Option<&Value>;

/// Room lookups in priority order; the first non-empty object wins.
pub const ROOM_LOOKUPS: &[RoomLookup] = &[room_from_data_list, room_from_room_field];

/// `{"data": {"data": [room, ...]}}`
fn room_from_data_list(body: &Value) -> Option<&Value> {
    body.get("data")?.get("data")?.as_array()?.first()
}

/// `{"data": {"room": room}}`
fn room_from_room_field(body: &Value) -> Option<&Value> {
    body.get("data")?.get("room")
}

fn is_non_empty_object(value: &Value) -> bool {
    value.as_object().is_some_and(|o| !o.is_empty())
}

/// Locates the room object using [`ROOM_LOOKUPS`].
pub fn find_room(body: &Value) -> Option<&Value> {
    ROOM_LOOKUPS
        .iter()
        .filter_map(|lookup| lookup(body))
        .find(|room| is_non_empty_object(room))
}

/// Parses an (already decompressed) enter-room response body.
///
/// Returns `Err` only when the body is not JSON. A JSON body of an
/// unexpected shape is `Ok(None)`.
pub fn parse_enter_room(body: &[u8]) -> Result<Option<AnchorInfoEvent>, serde_json::Error> {
    let text = String::from_utf8_lossy(body);
    let json: Value = serde_json::from_str(&text)?;
    Ok(anchor_info(&json))
}

/// Extracts anchor info from a parsed enter-room body.
pub fn anchor_info(body: &Value) -> Option<AnchorInfoEvent> {
    let room = find_room(body)?;
    let owner = room.get("owner");

    let room_id = room
        .get("id_str")
        .and_then(scalar_to_string)
        .unwrap_or_else(|| UNKNOWN_ROOM.to_string());

    let user = owner
        .and_then(|o| o.get("nickname"))
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN_ANCHOR)
        .to_string();

    Some(AnchorInfoEvent {
        room_id,
        user,
        douyin_id: owner.map(douyin_id).unwrap_or_default(),
        content: ANCHOR_INFO_CONTENT.to_string(),
    })
}

/// `display_id` when non-empty, else the stringified `short_id`.
fn douyin_id(owner: &Value) -> String {
    if let Some(display_id) = owner
        .get("display_id")
        .and_then(scalar_to_string)
        .filter(|id| !id.is_empty())
    {
        return display_id;
    }

    owner
        .get("short_id")
        .and_then(scalar_to_string)
        .unwrap_or_default()
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::GiftStruct;
    use serde_json::json;

    fn user(nick: &str) -> Option<User> {
        Some(User {
            nick_name: nick.into(),
            ..Default::default()
        })
    }

    // ==================== Chat Tests ====================

    #[test]
    fn chat_event_fields() {
        let chat = ChatMessage {
            common: Some(Common {
                create_time: 1_700_000_000_123,
                ..Default::default()
            }),
            user: user("U"),
            content: "hi".into(),
        };

        let event = chat_event(&chat, "99");
        assert_eq!(event.room_id, "99");
        assert_eq!(event.user, "U");
        assert_eq!(event.content, "hi");
        assert_eq!(event.timestamp, "1700000000123");
    }

    #[test]
    fn chat_event_without_user_or_common() {
        let chat = ChatMessage {
            content: "hi".into(),
            ..Default::default()
        };

        let event = chat_event(&chat, "1");
        assert_eq!(event.user, UNKNOWN_USER);
        assert!(event.timestamp.is_empty());
    }

    // ==================== Gift Tests ====================

    #[test]
    fn gift_event_fields() {
        let gift = GiftMessage {
            common: Some(Common {
                create_time: 42,
                ..Default::default()
            }),
            combo_count: 10,
            user: user("G"),
            gift: Some(GiftStruct {
                name: "玫瑰".into(),
                ..Default::default()
            }),
            ..Default::default()
        };

        let event = gift_event(&gift, "5");
        assert_eq!(event.user, "G");
        assert_eq!(event.gift_name, "玫瑰");
        assert_eq!(event.count, 10);
        assert_eq!(event.timestamp, "42");
    }

    #[test]
    fn gift_event_missing_gift_struct() {
        let gift = GiftMessage {
            user: user("G"),
            ..Default::default()
        };

        let event = gift_event(&gift, "5");
        assert_eq!(event.gift_name, "未知礼物");
        assert_eq!(event.count, 1);
        assert_eq!(event.user, "G");
    }

    #[test]
    fn gift_event_empty_gift_name() {
        let gift = GiftMessage {
            gift: Some(GiftStruct::default()),
            ..Default::default()
        };

        let event = gift_event(&gift, "5");
        assert_eq!(event.gift_name, UNKNOWN_GIFT);
        assert_eq!(event.user, UNKNOWN_USER);
        assert_eq!(event.count, 1);
        assert!(event.timestamp.is_empty());
    }

    #[test]
    fn normalize_ignored_is_none() {
        assert!(normalize(&DecodedMessage::Ignored("WebcastLikeMessage".into()), "1").is_none());
    }

    #[test]
    fn normalize_dispatches_kind() {
        let event = normalize(&DecodedMessage::Chat(ChatMessage::default()), "1").unwrap();
        assert_eq!(event.kind(), "chat");

        let event = normalize(&DecodedMessage::Gift(GiftMessage::default()), "1").unwrap();
        assert_eq!(event.kind(), "gift");
    }

    // ==================== Enter-room Tests ====================

    #[test]
    fn enter_room_data_list_shape() {
        let body = br#"{"data":{"data":[{"id_str":"77","owner":{"nickname":"A","display_id":"a_id"}}]}}"#;
        let event = parse_enter_room(body).unwrap().unwrap();
        assert_eq!(event.room_id, "77");
        assert_eq!(event.user, "A");
        assert_eq!(event.douyin_id, "a_id");
        assert_eq!(event.content, ANCHOR_INFO_CONTENT);
    }

    #[test]
    fn enter_room_falls_back_to_short_id() {
        let body = json!({"data": {"data": [{
            "id_str": "77",
            "owner": {"nickname": "A", "display_id": "", "short_id": 555}
        }]}});
        let event = anchor_info(&body).unwrap();
        assert_eq!(event.douyin_id, "555");
    }

    #[test]
    fn enter_room_room_field_shape() {
        let body = json!({"data": {"data": [], "room": {
            "id_str": "88",
            "owner": {"nickname": "B", "display_id": "b_id"}
        }}});
        let event = anchor_info(&body).unwrap();
        assert_eq!(event.room_id, "88");
        assert_eq!(event.user, "B");
    }

    #[test]
    fn enter_room_empty_first_entry_falls_back() {
        let body = json!({"data": {"data": [{}], "room": {"id_str": "88"}}});
        let event = anchor_info(&body).unwrap();
        assert_eq!(event.room_id, "88");
        assert_eq!(event.user, UNKNOWN_ANCHOR);
        assert_eq!(event.douyin_id, "");
    }

    #[test]
    fn enter_room_numeric_id_str() {
        let body = json!({"data": {"room": {"id_str": 7_312_345_678_u64}}});
        assert_eq!(anchor_info(&body).unwrap().room_id, "7312345678");
    }

    #[test]
    fn enter_room_missing_id_str() {
        let body = json!({"data": {"room": {"owner": {"nickname": "C"}}}});
        assert_eq!(anchor_info(&body).unwrap().room_id, UNKNOWN_ROOM);
    }

    #[test]
    fn enter_room_shape_mismatch_is_none() {
        for body in [
            json!({}),
            json!({"data": null}),
            json!({"data": {"data": []}}),
            json!({"data": {"room": {}}}),
            json!({"data": {"data": "oops"}}),
            json!([1, 2, 3]),
        ] {
            assert!(anchor_info(&body).is_none(), "{body}");
        }
    }

    #[test]
    fn enter_room_not_json_is_error() {
        assert!(parse_enter_room(b"\x1f\x8b\x08garbage").is_err());
        assert!(parse_enter_room(b"").is_err());
    }
}

//! Wire events exchanged over a collaboration connection.
//!
//! Both directions use the envelope `{"event": "<name>", "data": {...}}`;
//! event names are kebab-case, payload fields camelCase. User identifiers,
//! edit deltas and cursor positions are opaque JSON passed through verbatim.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use codehive_core::WorkspaceId;

/// Events a client sends to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Enter a workspace room and announce presence to its members.
    #[serde(rename_all = "camelCase")]
    JoinWorkspace {
        workspace_id: WorkspaceId,
        user_id: JsonValue,
    },
    /// An edit to share with everyone else in the room.
    #[serde(rename_all = "camelCase")]
    FileChange {
        workspace_id: WorkspaceId,
        delta: JsonValue,
        version: JsonValue,
    },
    /// A cursor movement to share with everyone else in the room.
    #[serde(rename_all = "camelCase")]
    CursorUpdate {
        workspace_id: WorkspaceId,
        user_id: JsonValue,
        position: JsonValue,
    },
}

/// Events the server relays to room members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Someone joined the room. `timestamp` is epoch milliseconds.
    #[serde(rename_all = "camelCase")]
    UserJoined { user_id: JsonValue, timestamp: i64 },
    /// An edit made by another room member.
    #[serde(rename_all = "camelCase")]
    ContentUpdated { delta: JsonValue, version: JsonValue },
    /// Another member's cursor moved.
    #[serde(rename_all = "camelCase")]
    CursorMoved {
        user_id: JsonValue,
        position: JsonValue,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_events_use_the_tagged_envelope() {
        let raw = json!({
            "event": "join-workspace",
            "data": { "workspaceId": 12, "userId": "u-1" }
        });
        let event: ClientEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(
            event,
            ClientEvent::JoinWorkspace {
                workspace_id: WorkspaceId::new(12),
                user_id: json!("u-1"),
            }
        );
    }

    #[test]
    fn file_change_passes_delta_and_version_through() {
        let raw = json!({
            "event": "file-change",
            "data": {
                "workspaceId": 3,
                "delta": { "ops": [{ "insert": "fn main() {}" }] },
                "version": 41
            }
        });
        let event: ClientEvent = serde_json::from_value(raw).unwrap();
        match event {
            ClientEvent::FileChange { delta, version, .. } => {
                assert_eq!(delta["ops"][0]["insert"], json!("fn main() {}"));
                assert_eq!(version, json!(41));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn server_events_serialize_camel_case() {
        let event = ServerEvent::UserJoined {
            user_id: json!("u-9"),
            timestamp: 1_700_000_000_000,
        };
        let wire = serde_json::to_value(&event).unwrap();
        assert_eq!(wire["event"], json!("user-joined"));
        assert_eq!(wire["data"]["userId"], json!("u-9"));
        assert_eq!(wire["data"]["timestamp"], json!(1_700_000_000_000i64));

        let event = ServerEvent::CursorMoved {
            user_id: json!("u-9"),
            position: json!({ "line": 4, "column": 17 }),
        };
        let wire = serde_json::to_value(&event).unwrap();
        assert_eq!(wire["event"], json!("cursor-moved"));
        assert_eq!(wire["data"]["position"]["column"], json!(17));
    }

    #[test]
    fn unknown_event_names_fail_to_parse() {
        let raw = json!({ "event": "delete-everything", "data": {} });
        assert!(serde_json::from_value::<ClientEvent>(raw).is_err());
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Room (shared calendar group) model.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::db::Document;
use crate::models::schedule::{DateValue, Schedule};

/// Role of a member inside a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "bindings/")
)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Owner,
    #[default]
    Member,
}

/// A member entry inside a room document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RoomMember {
    #[serde(default)]
    pub nickname: String,
    #[serde(default, deserialize_with = "role_or_member")]
    pub role: MemberRole,
    #[serde(
        rename = "profileImage",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub profile_image: Option<String>,
    #[serde(default, deserialize_with = "schedules_from_list_or_map")]
    pub schedules: Vec<Schedule>,
}

impl RoomMember {
    pub fn new(nickname: &str, role: MemberRole) -> Self {
        Self {
            nickname: nickname.to_string(),
            role,
            profile_image: None,
            schedules: Vec::new(),
        }
    }
}

/// A shared calendar group.
///
/// The room document exclusively owns each member's schedule list; the
/// in-memory copy is a cache kept in step by the room sync reconciler.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Room {
    /// Document ID (not stored in the document body)
    #[serde(skip)]
    pub room_id: String,
    #[serde(rename = "roomName", default)]
    pub room_name: String,
    #[serde(rename = "inviteCode", default)]
    pub invite_code: String,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateValue>,
    /// Members keyed by user id
    #[serde(default, deserialize_with = "members_or_empty")]
    pub members: BTreeMap<String, RoomMember>,
}

impl Room {
    /// Build a room from a stored document.
    pub fn from_document(room_id: &str, document: Document) -> Result<Self, serde_json::Error> {
        let mut room: Room = serde_json::from_value(document)?;
        room.room_id = room_id.to_string();
        Ok(room)
    }

    /// Serialize the room body for storage.
    pub fn to_document(&self) -> Result<Document, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Structural equality of everything a remote snapshot can change.
    pub fn same_content(&self, other: &Room) -> bool {
        self.room_name == other.room_name
            && self.invite_code == other.invite_code
            && self.members == other.members
    }

    pub fn member(&self, user_id: &str) -> Option<&RoomMember> {
        self.members.get(user_id)
    }

    /// Nickname of a member, if set and non-empty.
    pub fn nickname_of(&self, user_id: &str) -> Option<&str> {
        self.member(user_id)
            .map(|m| m.nickname.as_str())
            .filter(|n| !n.is_empty())
    }
}

/// Accept a schedule array, the legacy id->schedule map, or anything else
/// (read as empty). Entries that are not readable schedules are skipped.
fn schedules_from_list_or_map<'de, D>(deserializer: D) -> Result<Vec<Schedule>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ListOrMap {
        List(Vec<Value>),
        Map(IndexMap<String, Value>),
        Other(Value),
    }

    let entries: Vec<Value> = match Option::<ListOrMap>::deserialize(deserializer)? {
        Some(ListOrMap::List(list)) => list,
        Some(ListOrMap::Map(map)) => map.into_values().collect(),
        Some(ListOrMap::Other(other)) => {
            tracing::warn!(value = %other, "Schedules field is neither a list nor a map");
            Vec::new()
        }
        None => Vec::new(),
    };

    Ok(entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<Schedule>(entry) {
            Ok(schedule) => Some(schedule),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable schedule");
                None
            }
        })
        .collect())
}

/// Unknown or missing roles read as [`MemberRole::Member`].
fn role_or_member<'de, D>(deserializer: D) -> Result<MemberRole, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default())
}

/// Members keyed by user id. Entries that cannot be read are skipped so the
/// rest of the room stays usable.
fn members_or_empty<'de, D>(deserializer: D) -> Result<BTreeMap<String, RoomMember>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(Value::Object(entries)) = Option::<Value>::deserialize(deserializer)? else {
        return Ok(BTreeMap::new());
    };

    Ok(entries
        .into_iter()
        .filter_map(|(user_id, entry)| match serde_json::from_value::<RoomMember>(entry) {
            Ok(member) => Some((user_id, member)),
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Skipping unreadable member entry");
                None
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_room_from_document() {
        let doc = json!({
            "roomName": "Kim family",
            "inviteCode": "AB12CD",
            "createdAt": {"seconds": 1717200000, "nanoseconds": 0},
            "members": {
                "uid-a": {"nickname": "Mom", "role": "owner"},
                "uid-b": {"nickname": "Kid", "role": "member", "profileImage": null,
                          "schedules": [{"scheduleId": "1", "scheduleTitle": "Piano"}]}
            }
        });

        let room = Room::from_document("room-1", doc).unwrap();

        assert_eq!(room.room_id, "room-1");
        assert_eq!(room.room_name, "Kim family");
        assert_eq!(room.member("uid-a").unwrap().role, MemberRole::Owner);
        assert_eq!(room.member("uid-b").unwrap().schedules.len(), 1);
        assert_eq!(room.nickname_of("uid-b"), Some("Kid"));
        assert_eq!(room.nickname_of("uid-c"), None);
    }

    #[test]
    fn test_legacy_schedule_map_is_read_as_list() {
        let doc = json!({
            "roomName": "r",
            "inviteCode": "AAAAAA",
            "members": {
                "uid-a": {"nickname": "Mom", "role": "owner", "schedules": {
                    "s1": {"scheduleId": "s1", "scheduleTitle": "One"},
                    "s2": {"scheduleId": "s2", "scheduleTitle": "Two"}
                }}
            }
        });

        let room = Room::from_document("r", doc).unwrap();
        let titles: Vec<_> = room.members["uid-a"]
            .schedules
            .iter()
            .map(|s| s.title.as_str())
            .collect();
        assert_eq!(titles, vec!["One", "Two"]);
    }

    #[test]
    fn test_missing_and_null_members() {
        let room = Room::from_document("r", json!({"roomName": "r", "members": null})).unwrap();
        assert!(room.members.is_empty());
        let room = Room::from_document("r", json!({"roomName": "r"})).unwrap();
        assert!(room.members.is_empty());
    }

    #[test]
    fn test_same_content_ignores_id_and_created_at() {
        let mut a = Room {
            room_id: "a".to_string(),
            room_name: "r".to_string(),
            invite_code: "AAAAAA".to_string(),
            created_at: None,
            members: BTreeMap::from([("u".to_string(), RoomMember::new("Mom", MemberRole::Owner))]),
        };
        let mut b = a.clone();
        b.room_id = "b".to_string();
        b.created_at = Some(DateValue::from("2024-01-01"));
        assert!(a.same_content(&b));

        a.members.get_mut("u").unwrap().nickname = "Mother".to_string();
        assert!(!a.same_content(&b));
    }

    #[test]
    fn test_to_document_omits_room_id() {
        let room = Room {
            room_id: "abc".to_string(),
            room_name: "r".to_string(),
            invite_code: "AAAAAA".to_string(),
            ..Default::default()
        };
        let doc = room.to_document().unwrap();
        assert!(doc.get("room_id").is_none());
        assert_eq!(doc["roomName"], "r");
    }

    #[test]
    fn test_malformed_member_fields_do_not_spoil_the_room() {
        let doc = json!({
            "roomName": "Kim family",
            "inviteCode": "AB12CD",
            "members": {
                "uid-a": {"nickname": "Mom", "role": "admin", "schedules": "x"},
                "uid-b": {"nickname": "Kid", "role": null, "schedules": [
                    {"scheduleId": "1", "scheduleTitle": "Piano", "isImportant": null},
                    7,
                    {"scheduleId": "2", "scheduleTitle": 42}
                ]},
                "uid-c": {"nickname": "Dad", "schedules": 5},
                "uid-d": "not a member",
                "uid-e": {"nickname": ["bad"]}
            }
        });

        let room = Room::from_document("r", doc).unwrap();

        assert_eq!(
            room.members.keys().collect::<Vec<_>>(),
            vec!["uid-a", "uid-b", "uid-c"]
        );
        assert_eq!(room.members["uid-a"].role, MemberRole::Member);
        assert!(room.members["uid-a"].schedules.is_empty());
        assert!(room.members["uid-c"].schedules.is_empty());

        let kid = &room.members["uid-b"];
        assert_eq!(kid.role, MemberRole::Member);
        assert_eq!(kid.schedules.len(), 1);
        assert_eq!(kid.schedules[0].title, "Piano");
        assert!(!kid.schedules[0].important);
    }

    #[test]
    fn test_members_of_wrong_shape_read_as_empty() {
        let room = Room::from_document("r", json!({"roomName": "r", "members": "x"})).unwrap();
        assert!(room.members.is_empty());
    }
}

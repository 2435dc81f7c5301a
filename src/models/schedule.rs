// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Schedule model as stored inside a room member entry.

use serde::{Deserialize, Deserializer, Serialize};

/// A date field as it appears on the wire.
///
/// Older clients wrote backend timestamp objects, newer ones ISO-8601
/// strings. Anything else is kept verbatim so a single malformed schedule
/// never prevents the room from being read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DateValue {
    Timestamp {
        #[serde(alias = "_seconds")]
        seconds: i64,
        #[serde(default, alias = "_nanoseconds")]
        nanoseconds: u32,
    },
    Text(String),
    Other(serde_json::Value),
}

impl Default for DateValue {
    fn default() -> Self {
        DateValue::Other(serde_json::Value::Null)
    }
}

impl From<&str> for DateValue {
    fn from(value: &str) -> Self {
        DateValue::Text(value.to_string())
    }
}

/// A titled, dated event owned by one room member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    #[serde(rename = "scheduleId", default)]
    pub schedule_id: String,
    #[serde(rename = "scheduleTitle", default)]
    pub title: String,
    #[serde(rename = "scheduleContent", default)]
    pub content: String,
    #[serde(rename = "scheduleDate", default)]
    pub start_date: DateValue,
    #[serde(rename = "scheduleEndDate", default)]
    pub end_date: DateValue,
    /// User id of the author
    #[serde(rename = "createdBy", default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    /// Author display name at creation time
    #[serde(rename = "userName", default)]
    pub user_name: String,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateValue>,
    #[serde(rename = "isImportant", default, deserialize_with = "bool_or_false")]
    pub important: bool,

    /// Nickname of the member whose list holds this schedule.
    /// Attached during aggregation, never read from the store.
    #[serde(
        rename = "ownerName",
        skip_deserializing,
        skip_serializing_if = "Option::is_none"
    )]
    pub owner_name: Option<String>,
    /// User id of the member whose list holds this schedule.
    #[serde(
        rename = "ownerId",
        skip_deserializing,
        skip_serializing_if = "Option::is_none"
    )]
    pub owner_id: Option<String>,
}

impl Schedule {
    /// Copy of this schedule tagged with its owning member.
    pub fn tagged(&self, owner_id: &str, owner_name: &str) -> Schedule {
        Schedule {
            owner_id: Some(owner_id.to_string()),
            owner_name: Some(owner_name.to_string()),
            ..self.clone()
        }
    }
}

/// `null` or a non-boolean reads as `false`.
fn bool_or_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_bool()).unwrap_or(false))
}

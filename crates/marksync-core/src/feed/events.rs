//! Change feed event types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MalformedEventError;
use crate::types::{Bookmark, BookmarkId, OwnerId};

use super::SubscriptionStatus;

/// A row-level change exactly as a feed transport delivered it.
///
/// Nothing here is trusted: the event type, the new row and the old row are
/// all optional until [`ChangeEvent::from_raw`] validates them. Field names
/// follow the realtime `postgres_changes` payload, with the client-library
/// spellings (`eventType`, `new`, `old`) accepted as aliases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawChange {
    /// `INSERT`, `UPDATE` or `DELETE`.
    #[serde(rename = "type", alias = "eventType", default)]
    pub event_type: Option<String>,

    /// The row after the change (inserts, updates).
    #[serde(rename = "record", alias = "new", default)]
    pub new: Option<Value>,

    /// The row before the change (deletes, updates).
    #[serde(rename = "old_record", alias = "old", default)]
    pub old: Option<Value>,

    /// When the change was committed, if the transport reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_timestamp: Option<String>,
}

impl RawChange {
    /// An insert carrying the given row.
    pub fn insert(record: &Bookmark) -> Self {
        Self {
            event_type: Some("INSERT".to_string()),
            new: serde_json::to_value(record).ok(),
            old: None,
            commit_timestamp: None,
        }
    }

    /// A delete carrying the full old row.
    pub fn delete(record: &Bookmark) -> Self {
        Self {
            event_type: Some("DELETE".to_string()),
            new: None,
            old: serde_json::to_value(record).ok(),
            commit_timestamp: None,
        }
    }
}

/// A validated row-level change on the bookmark collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A bookmark was created.
    Insert(Bookmark),

    /// A bookmark was removed.
    Delete { id: BookmarkId, owner: OwnerId },
}

impl ChangeEvent {
    /// Returns the owner the change belongs to.
    pub fn owner(&self) -> &OwnerId {
        match self {
            ChangeEvent::Insert(record) => &record.owner,
            ChangeEvent::Delete { owner, .. } => owner,
        }
    }

    /// Returns the id of the affected bookmark.
    pub fn id(&self) -> &BookmarkId {
        match self {
            ChangeEvent::Insert(record) => &record.id,
            ChangeEvent::Delete { id, .. } => id,
        }
    }

    /// Validate a raw change.
    ///
    /// Returns `Ok(None)` for well-formed events this collection does not
    /// track (e.g. `UPDATE`).
    pub fn from_raw(raw: &RawChange) -> Result<Option<Self>, MalformedEventError> {
        let event_type = raw
            .event_type
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(MalformedEventError::MissingEventType)?;

        if event_type.eq_ignore_ascii_case("INSERT") {
            let row = object_row(raw.new.as_ref()).ok_or_else(|| {
                MalformedEventError::MissingNewRecord {
                    event_type: event_type.to_string(),
                }
            })?;
            require_identity(row, event_type)?;

            let record: Bookmark = serde_json::from_value(Value::Object(row.clone()))
                .map_err(|e| MalformedEventError::InvalidRecord {
                    event_type: event_type.to_string(),
                    reason: e.to_string(),
                })?;
            Ok(Some(ChangeEvent::Insert(record)))
        } else if event_type.eq_ignore_ascii_case("DELETE") {
            let row = object_row(raw.old.as_ref()).ok_or_else(|| {
                MalformedEventError::MissingOldRecord {
                    event_type: event_type.to_string(),
                }
            })?;
            let (id, owner) = require_identity(row, event_type)?;

            let invalid = |reason: String| MalformedEventError::InvalidRecord {
                event_type: event_type.to_string(),
                reason,
            };
            let id: BookmarkId =
                serde_json::from_value(id.clone()).map_err(|e| invalid(e.to_string()))?;
            let owner: OwnerId =
                serde_json::from_value(owner.clone()).map_err(|e| invalid(e.to_string()))?;
            Ok(Some(ChangeEvent::Delete { id, owner }))
        } else {
            Ok(None)
        }
    }
}

fn object_row(value: Option<&Value>) -> Option<&serde_json::Map<String, Value>> {
    value.and_then(Value::as_object).filter(|row| !row.is_empty())
}

fn require_identity<'a>(
    row: &'a serde_json::Map<String, Value>,
    event_type: &str,
) -> Result<(&'a Value, &'a Value), MalformedEventError> {
    let id = row
        .get("id")
        .filter(|v| !v.is_null())
        .ok_or_else(|| MalformedEventError::MissingId {
            event_type: event_type.to_string(),
        })?;
    let owner = row
        .get("user_id")
        .filter(|v| !v.is_null())
        .ok_or_else(|| MalformedEventError::MissingOwner {
            event_type: event_type.to_string(),
        })?;
    Ok((id, owner))
}

/// A message from a change feed subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    /// The subscription changed state.
    Status(SubscriptionStatus),

    /// A row changed somewhere in the watched collection.
    Change(RawChange),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawChange {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn parses_realtime_insert_payload() {
        let change = raw(json!({
            "type": "INSERT",
            "schema": "public",
            "table": "bookmarks",
            "commit_timestamp": "2024-05-01T10:00:00Z",
            "record": {
                "id": 1,
                "user_id": "u1",
                "title": "Google",
                "url": "https://google.com",
                "created_at": "2024-05-01T10:00:00+00:00"
            },
            "old_record": null
        }));

        let event = ChangeEvent::from_raw(&change).unwrap().unwrap();
        assert_eq!(event.id().as_str(), "1");
        assert_eq!(event.owner().as_str(), "u1");
        assert!(matches!(event, ChangeEvent::Insert(_)));
    }

    #[test]
    fn parses_client_style_delete_payload() {
        let change = raw(json!({
            "eventType": "DELETE",
            "new": {},
            "old": { "id": "abc", "user_id": "u1" }
        }));

        let event = ChangeEvent::from_raw(&change).unwrap().unwrap();
        assert_eq!(
            event,
            ChangeEvent::Delete {
                id: BookmarkId::new("abc").unwrap(),
                owner: OwnerId::new("u1").unwrap(),
            }
        );
    }

    #[test]
    fn insert_without_new_row_is_malformed() {
        let change = raw(json!({ "eventType": "INSERT" }));
        assert_eq!(
            ChangeEvent::from_raw(&change),
            Err(MalformedEventError::MissingNewRecord {
                event_type: "INSERT".to_string()
            })
        );
    }

    #[test]
    fn delete_without_owner_is_malformed() {
        let change = raw(json!({ "type": "DELETE", "old_record": { "id": 5 } }));
        assert!(matches!(
            ChangeEvent::from_raw(&change),
            Err(MalformedEventError::MissingOwner { .. })
        ));
    }

    #[test]
    fn missing_event_type_is_malformed() {
        let change = raw(json!({ "record": { "id": 5, "user_id": "u1" } }));
        assert_eq!(
            ChangeEvent::from_raw(&change),
            Err(MalformedEventError::MissingEventType)
        );
    }

    #[test]
    fn insert_with_bad_row_is_malformed() {
        let change = raw(json!({
            "type": "INSERT",
            "record": { "id": 5, "user_id": "u1", "title": "x" }
        }));
        assert!(matches!(
            ChangeEvent::from_raw(&change),
            Err(MalformedEventError::InvalidRecord { .. })
        ));
    }

    #[test]
    fn updates_are_ignored() {
        let change = raw(json!({
            "type": "UPDATE",
            "record": { "id": 5, "user_id": "u1" },
            "old_record": { "id": 5 }
        }));
        assert_eq!(ChangeEvent::from_raw(&change), Ok(None));
    }
}

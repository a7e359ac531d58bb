//! Bookmark records and their identifiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, InvalidInputError, ValidationError};

/// Store-assigned bookmark identifier.
///
/// Opaque and globally unique. Hosted stores often use integer keys, so the
/// wire form may be a JSON number or string; both normalize to the same text.
///
/// # Example
///
/// ```
/// use marksync_core::BookmarkId;
///
/// let a: BookmarkId = serde_json::from_str("42").unwrap();
/// let b: BookmarkId = serde_json::from_str("\"42\"").unwrap();
/// assert_eq!(a, b);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(into = "String")]
pub struct BookmarkId(String);

impl BookmarkId {
    /// Create a bookmark id, rejecting blank values.
    pub fn new(s: impl Into<String>) -> Result<Self, Error> {
        let s = s.into();
        if s.trim().is_empty() {
            return Err(InvalidInputError::BookmarkId {
                value: s,
                reason: "must not be blank".to_string(),
            }
            .into());
        }
        Ok(Self(s))
    }

    /// Returns the id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookmarkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BookmarkId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl From<BookmarkId> for String {
    fn from(id: BookmarkId) -> Self {
        id.0
    }
}

impl<'de> Deserialize<'de> for BookmarkId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum WireId {
            Text(String),
            Signed(i64),
            Unsigned(u64),
        }

        let text = match WireId::deserialize(deserializer)? {
            WireId::Text(s) => s,
            WireId::Signed(n) => n.to_string(),
            WireId::Unsigned(n) => n.to_string(),
        };
        BookmarkId::new(text).map_err(serde::de::Error::custom)
    }
}

/// Identity of the authenticated user owning a bookmark.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnerId(String);

impl OwnerId {
    /// Create an owner id, rejecting blank values.
    pub fn new(s: impl Into<String>) -> Result<Self, Error> {
        let s = s.into();
        if s.trim().is_empty() {
            return Err(InvalidInputError::OwnerId {
                value: s,
                reason: "must not be blank".to_string(),
            }
            .into());
        }
        Ok(Self(s))
    }

    /// Returns the owner id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for OwnerId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<OwnerId> for String {
    fn from(owner: OwnerId) -> Self {
        owner.0
    }
}

/// A stored bookmark row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    /// Store-assigned identifier.
    pub id: BookmarkId,

    /// The owning user.
    #[serde(rename = "user_id")]
    pub owner: OwnerId,

    /// Display title.
    pub title: String,

    /// The bookmarked URL.
    pub url: String,

    /// Store-assigned creation time.
    pub created_at: DateTime<Utc>,
}

/// Validated input for creating a bookmark.
///
/// Title and URL are trimmed; blank values never reach the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBookmark {
    title: String,
    url: String,
}

impl NewBookmark {
    /// Validate and trim a title/URL pair.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::BlankTitle`] or [`ValidationError::BlankUrl`].
    pub fn new(title: impl AsRef<str>, url: impl AsRef<str>) -> Result<Self, Error> {
        let title = title.as_ref().trim();
        let url = url.as_ref().trim();

        if title.is_empty() {
            return Err(ValidationError::BlankTitle.into());
        }
        if url.is_empty() {
            return Err(ValidationError::BlankUrl.into());
        }

        Ok(Self {
            title: title.to_string(),
            url: url.to_string(),
        })
    }

    /// Returns the trimmed title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns the trimmed URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

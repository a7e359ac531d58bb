//! Change feed types.
//!
//! A feed delivers every insert and delete on the bookmark collection, for
//! every owner, at least once. Scoping to the session's owner happens in the
//! [reconciler](crate::reconcile), never in the transport.

mod events;

pub use events::{ChangeEvent, FeedMessage, RawChange};

use std::fmt;

use uuid::Uuid;

use crate::error::SubscriptionError;
use crate::types::OwnerId;

/// Schema holding the bookmark table.
pub const DEFAULT_SCHEMA: &str = "public";

/// Table holding bookmark rows.
pub const DEFAULT_TABLE: &str = "bookmarks";

/// What a subscription watches and under which channel name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedScope {
    channel: String,
    schema: String,
    table: String,
}

impl FeedScope {
    /// A scope with an explicit channel name.
    pub fn new(
        channel: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// A scope on the default bookmark table with a fresh channel name.
    ///
    /// Channel names embed a random UUID so several sessions of the same
    /// owner never share a channel.
    pub fn for_owner(owner: &OwnerId) -> Self {
        Self {
            channel: format!("{}-{}-{}", DEFAULT_TABLE, owner, Uuid::new_v4()),
            schema: DEFAULT_SCHEMA.to_string(),
            table: DEFAULT_TABLE.to_string(),
        }
    }

    /// Returns the channel name.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Returns the watched schema.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Returns the watched table.
    pub fn table(&self) -> &str {
        &self.table
    }
}

/// Lifecycle of a feed subscription.
///
/// `Connecting -> Active -> {Error, TimedOut}`; `Closed` once the stream has
/// ended or the session unsubscribed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionStatus {
    /// Subscribe requested, not yet confirmed.
    Connecting,
    /// Events are flowing.
    Active,
    /// The feed reported a failure.
    Error(String),
    /// The feed never confirmed the subscription.
    TimedOut,
    /// The subscription is gone.
    Closed,
}

impl SubscriptionStatus {
    /// Returns true for the terminal failure states.
    pub fn is_degraded(&self) -> bool {
        matches!(self, SubscriptionStatus::Error(_) | SubscriptionStatus::TimedOut)
    }

    /// The error to surface for a degraded status on `channel`.
    pub fn to_error(&self, channel: &str) -> Option<SubscriptionError> {
        match self {
            SubscriptionStatus::Error(reason) => Some(SubscriptionError::ChannelError {
                channel: channel.to_string(),
                reason: reason.clone(),
            }),
            SubscriptionStatus::TimedOut => Some(SubscriptionError::TimedOut {
                channel: channel.to_string(),
            }),
            _ => None,
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionStatus::Connecting => f.write_str("connecting"),
            SubscriptionStatus::Active => f.write_str("active"),
            SubscriptionStatus::Error(reason) => write!(f, "error: {}", reason),
            SubscriptionStatus::TimedOut => f.write_str("timed out"),
            SubscriptionStatus::Closed => f.write_str("closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_names_are_unique_per_scope() {
        let owner = OwnerId::new("u1").unwrap();
        let a = FeedScope::for_owner(&owner);
        let b = FeedScope::for_owner(&owner);

        assert!(a.channel().starts_with("bookmarks-u1-"));
        assert_ne!(a.channel(), b.channel());
        assert_eq!(a.schema(), "public");
        assert_eq!(a.table(), "bookmarks");
    }

    #[test]
    fn degraded_statuses_map_to_errors() {
        assert_eq!(
            SubscriptionStatus::TimedOut.to_error("c1"),
            Some(SubscriptionError::TimedOut {
                channel: "c1".to_string()
            })
        );
        assert!(SubscriptionStatus::Error("boom".into()).is_degraded());
        assert!(SubscriptionStatus::Active.to_error("c1").is_none());
    }
}

//! Change feed traits.

use async_trait::async_trait;
use futures_core::Stream;

use crate::Result;
use crate::feed::{FeedMessage, FeedScope};

/// Stream of messages from one feed subscription.
///
/// Dropping the stream unsubscribes.
pub trait FeedStream: Stream<Item = Result<FeedMessage>> + Send {}

impl<T> FeedStream for T where T: Stream<Item = Result<FeedMessage>> + Send {}

/// A source of row-level change events.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Stream type produced by [`subscribe`](ChangeFeed::subscribe).
    type Stream: FeedStream + Unpin + 'static;

    /// Open a subscription on `scope`.
    ///
    /// The stream reports [`SubscriptionStatus`](crate::feed::SubscriptionStatus)
    /// transitions alongside changes for every owner.
    async fn subscribe(&self, scope: &FeedScope) -> Result<Self::Stream>;
}

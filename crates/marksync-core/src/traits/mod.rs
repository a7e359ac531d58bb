//! Seams to the external store and change feed.

mod feed;
mod store;

pub use feed::{ChangeFeed, FeedStream};
pub use store::BookmarkStore;

//! marksync-core - Bookmark types, store and feed traits, and the live
//! reconciling session.

pub mod error;
pub mod feed;
pub mod reconcile;
pub mod session;
pub mod tokens;
pub mod traits;
pub mod types;

pub use error::Error;
pub use feed::{ChangeEvent, FeedMessage, FeedScope, RawChange, SubscriptionStatus};
pub use reconcile::{BookmarkList, MergeOutcome};
pub use session::BookmarkSession;
pub use tokens::{AccessToken, ApiKey};
pub use traits::{BookmarkStore, ChangeFeed, FeedStream};
pub use types::{Bookmark, BookmarkId, NewBookmark, OwnerId, StoreUrl};

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

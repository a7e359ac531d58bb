//! Core marksync types.
//!
//! These types enforce their invariants at construction time, so a value
//! that exists has already been validated.

mod bookmark;
mod store_url;

pub use bookmark::{Bookmark, BookmarkId, NewBookmark, OwnerId};
pub use store_url::StoreUrl;

//! Bookmark store trait.

use async_trait::async_trait;

use crate::Result;
use crate::types::{Bookmark, BookmarkId, NewBookmark, OwnerId};

/// A multi-tenant bookmark store.
///
/// Every failure is reported as [`Error::Store`](crate::Error::Store).
#[async_trait]
pub trait BookmarkStore: Send + Sync {
    /// Fetch all bookmarks of `owner`, newest first.
    async fn fetch_all(&self, owner: &OwnerId) -> Result<Vec<Bookmark>>;

    /// Create a bookmark; the store assigns its id and creation time.
    async fn insert(&self, owner: &OwnerId, bookmark: &NewBookmark) -> Result<Bookmark>;

    /// Delete a bookmark by id. Deleting an absent id succeeds.
    async fn delete(&self, id: &BookmarkId) -> Result<()>;
}

//! File-backed store and change feed.

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, instrument};

use marksync_core::error::{InvalidInputError, SubscriptionError};
use marksync_core::feed::DEFAULT_TABLE;
use marksync_core::traits::{BookmarkStore, ChangeFeed};
use marksync_core::{Bookmark, BookmarkId, FeedScope, NewBookmark, OwnerId, Result, StoreUrl};

use crate::feed::FileChangeStream;
use crate::store::FileStore;

/// Bookmark store and change feed over a shared directory.
#[derive(Debug, Clone)]
pub struct FileBackend {
    store: FileStore,
}

impl FileBackend {
    /// Create a backend rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            store: FileStore::new(root),
        }
    }

    /// Create a backend from a `file://` store URL.
    pub fn from_url(url: &StoreUrl) -> Result<Self> {
        let root = url.to_file_path().ok_or_else(|| InvalidInputError::StoreUrl {
            value: url.to_string(),
            reason: "not a file:// URL".to_string(),
        })?;
        Ok(Self::new(root))
    }

    /// Access the underlying file store.
    pub fn store(&self) -> &FileStore {
        &self.store
    }
}

#[async_trait]
impl BookmarkStore for FileBackend {
    async fn fetch_all(&self, owner: &OwnerId) -> Result<Vec<Bookmark>> {
        self.store.fetch_all(owner)
    }

    async fn insert(&self, owner: &OwnerId, bookmark: &NewBookmark) -> Result<Bookmark> {
        self.store.insert(owner, bookmark)
    }

    async fn delete(&self, id: &BookmarkId) -> Result<()> {
        self.store.delete(id)
    }
}

#[async_trait]
impl ChangeFeed for FileBackend {
    type Stream = FileChangeStream;

    #[instrument(skip(self), fields(channel = scope.channel()))]
    async fn subscribe(&self, scope: &FeedScope) -> Result<Self::Stream> {
        if scope.table() != DEFAULT_TABLE {
            return Err(SubscriptionError::Connection {
                message: format!("file store has no table {}.{}", scope.schema(), scope.table()),
            }
            .into());
        }

        debug!(root = %self.store.root().display(), "Tailing change log");
        FileChangeStream::tail(&self.store)
    }
}

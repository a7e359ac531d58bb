//! Backend wrappers for CLI use.

use std::pin::Pin;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;

use marksync_core::traits::{BookmarkStore, ChangeFeed, FeedStream};
use marksync_core::{
    AccessToken, ApiKey, Bookmark, BookmarkId, BookmarkSession, FeedScope, NewBookmark, OwnerId,
    StoreUrl,
};
use marksync_file::FileBackend;
use marksync_rest::{RealtimeFeed, RestStore};

/// Live session over whichever backend the profile points at.
pub type CliSession = BookmarkSession<CliStore, CliFeed>;

/// Store wrapper for CLI use.
#[derive(Debug, Clone)]
pub enum CliStore {
    File(FileBackend),
    Rest(RestStore),
}

#[async_trait]
impl BookmarkStore for CliStore {
    async fn fetch_all(&self, owner: &OwnerId) -> marksync_core::Result<Vec<Bookmark>> {
        match self {
            CliStore::File(store) => store.fetch_all(owner).await,
            CliStore::Rest(store) => store.fetch_all(owner).await,
        }
    }

    async fn insert(
        &self,
        owner: &OwnerId,
        bookmark: &NewBookmark,
    ) -> marksync_core::Result<Bookmark> {
        match self {
            CliStore::File(store) => store.insert(owner, bookmark).await,
            CliStore::Rest(store) => store.insert(owner, bookmark).await,
        }
    }

    async fn delete(&self, id: &BookmarkId) -> marksync_core::Result<()> {
        match self {
            CliStore::File(store) => store.delete(id).await,
            CliStore::Rest(store) => store.delete(id).await,
        }
    }
}

/// Change feed wrapper for CLI use.
#[derive(Debug, Clone)]
pub enum CliFeed {
    File(FileBackend),
    Rest(RealtimeFeed),
}

#[async_trait]
impl ChangeFeed for CliFeed {
    type Stream = Pin<Box<dyn FeedStream>>;

    async fn subscribe(&self, scope: &FeedScope) -> marksync_core::Result<Self::Stream> {
        let stream: Self::Stream = match self {
            CliFeed::File(feed) => Box::pin(feed.subscribe(scope).await?),
            CliFeed::Rest(feed) => Box::pin(feed.subscribe(scope).await?),
        };
        Ok(stream)
    }
}

/// Who is logged in, and where their bookmarks live.
#[derive(Debug, Clone)]
pub struct Profile {
    pub owner: OwnerId,
    pub store: StoreUrl,
    pub api_key: Option<ApiKey>,
    pub access_token: Option<AccessToken>,
}

impl Profile {
    /// Check that the profile can reach its store.
    pub fn validate(&self) -> Result<()> {
        if self.store.is_network() && self.api_key.is_none() {
            bail!("Hosted stores need an API key (--api-key)");
        }
        Ok(())
    }

    /// Human-readable backend kind.
    pub fn backend_kind(&self) -> &'static str {
        if self.store.is_local() { "file" } else { "hosted" }
    }

    /// Build the store client.
    pub fn store(&self) -> Result<CliStore> {
        if self.store.is_local() {
            let backend = FileBackend::from_url(&self.store).context("Invalid file store")?;
            return Ok(CliStore::File(backend));
        }

        let api_key = self.api_key()?;
        let store = RestStore::new(self.store.clone(), api_key, self.access_token.as_ref())
            .context("Failed to create store client")?;
        Ok(CliStore::Rest(store))
    }

    /// Build the change feed.
    pub fn feed(&self) -> Result<CliFeed> {
        if self.store.is_local() {
            let backend = FileBackend::from_url(&self.store).context("Invalid file store")?;
            return Ok(CliFeed::File(backend));
        }

        let api_key = self.api_key()?.clone();
        Ok(CliFeed::Rest(RealtimeFeed::new(
            &self.store,
            api_key,
            self.access_token.clone(),
        )))
    }

    /// Open a live session for the profile owner.
    pub async fn open_session(&self) -> Result<CliSession> {
        BookmarkSession::open(self.store()?, self.feed()?, self.owner.clone())
            .await
            .context("Failed to open session")
    }

    fn api_key(&self) -> Result<&ApiKey> {
        self.api_key
            .as_ref()
            .context("Hosted stores need an API key. Run 'marks login --api-key ...'.")
    }
}

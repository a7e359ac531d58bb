//! Bookmark store over the PostgREST row API.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, instrument};

use marksync_core::error::ProtocolError;
use marksync_core::feed::DEFAULT_TABLE;
use marksync_core::traits::BookmarkStore;
use marksync_core::{AccessToken, ApiKey, Bookmark, BookmarkId, NewBookmark, OwnerId, Result, StoreUrl};

use crate::client::RestClient;

/// Row body for an insert; the store assigns `id` and `created_at`.
#[derive(Debug, Serialize)]
struct InsertRow<'a> {
    user_id: &'a str,
    title: &'a str,
    url: &'a str,
}

/// Hosted bookmark table.
#[derive(Debug, Clone)]
pub struct RestStore {
    client: RestClient,
    table: String,
}

impl RestStore {
    /// Create a store on the default bookmark table.
    pub fn new(store: StoreUrl, api_key: &ApiKey, access_token: Option<&AccessToken>) -> Result<Self> {
        Ok(Self::with_client(RestClient::new(store, api_key, access_token)?))
    }

    /// Create a store from an existing client.
    pub fn with_client(client: RestClient) -> Self {
        Self {
            client,
            table: DEFAULT_TABLE.to_string(),
        }
    }

    /// Returns the store URL.
    pub fn url(&self) -> &StoreUrl {
        self.client.store()
    }
}

#[async_trait]
impl BookmarkStore for RestStore {
    #[instrument(skip(self), fields(%owner))]
    async fn fetch_all(&self, owner: &OwnerId) -> Result<Vec<Bookmark>> {
        let params = [
            ("select", "*".to_string()),
            ("user_id", format!("eq.{}", owner)),
            ("order", "created_at.desc".to_string()),
        ];

        let rows: Vec<Bookmark> = self.client.select(&self.table, &params).await?;
        debug!(count = rows.len(), "Fetched bookmarks");
        Ok(rows)
    }

    #[instrument(skip(self, bookmark), fields(%owner))]
    async fn insert(&self, owner: &OwnerId, bookmark: &NewBookmark) -> Result<Bookmark> {
        let rows = [InsertRow {
            user_id: owner.as_str(),
            title: bookmark.title(),
            url: bookmark.url(),
        }];

        let created: Vec<Bookmark> = self.client.insert(&self.table, &rows).await?;
        let record = created.into_iter().next().ok_or_else(|| {
            ProtocolError::new(
                200,
                None,
                Some("insert returned no representation".to_string()),
            )
        })?;

        debug!(id = %record.id, "Inserted bookmark");
        Ok(record)
    }

    #[instrument(skip(self), fields(%id))]
    async fn delete(&self, id: &BookmarkId) -> Result<()> {
        self.client
            .delete(&self.table, &[("id", format!("eq.{}", id))])
            .await?;
        debug!("Deleted bookmark");
        Ok(())
    }
}

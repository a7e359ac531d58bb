//! Delete command implementation.

use anyhow::{Context, Result};
use clap::Args;

use marksync_core::BookmarkId;
use marksync_core::traits::BookmarkStore;

use crate::output;
use crate::session::storage;

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Bookmark id
    pub id: String,
}

pub async fn run(args: DeleteArgs) -> Result<()> {
    let profile = storage::require()?;
    let id = BookmarkId::new(&args.id).context("Invalid bookmark id")?;

    profile
        .store()?
        .delete(&id)
        .await
        .context("Failed to delete bookmark")?;

    output::success(&format!("Deleted {}", id));
    Ok(())
}

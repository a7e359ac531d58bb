//! List command implementation.

use anyhow::{Context, Result};
use clap::Args;

use marksync_core::traits::BookmarkStore;

use crate::output;
use crate::session::storage;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Output one JSON row per line
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: ListArgs) -> Result<()> {
    let profile = storage::require()?;

    let rows = profile
        .store()?
        .fetch_all(&profile.owner)
        .await
        .context("Failed to list bookmarks")?;

    if rows.is_empty() {
        output::note("No bookmarks.");
        return Ok(());
    }

    for record in &rows {
        if args.json {
            output::json(record)?;
        } else {
            output::bookmark(record);
        }
    }

    Ok(())
}

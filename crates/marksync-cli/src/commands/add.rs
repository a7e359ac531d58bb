//! Add command implementation.

use anyhow::{Context, Result};
use clap::Args;

use marksync_core::NewBookmark;
use marksync_core::traits::BookmarkStore;

use crate::output;
use crate::session::storage;

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Bookmark title
    pub title: String,

    /// Bookmark URL
    pub url: String,

    /// Print the stored row as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: AddArgs) -> Result<()> {
    let profile = storage::require()?;
    let bookmark = NewBookmark::new(&args.title, &args.url).context("Invalid bookmark")?;

    let record = profile
        .store()?
        .insert(&profile.owner, &bookmark)
        .await
        .context("Failed to add bookmark")?;

    if args.json {
        return output::json(&record);
    }

    output::success("Bookmark added");
    output::field("Id", record.id.as_str());
    Ok(())
}

//! Login command implementation.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use marksync_core::traits::BookmarkStore;
use marksync_core::{AccessToken, ApiKey, OwnerId, StoreUrl};

use crate::output;
use crate::session::{Profile, storage};

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Owner id whose bookmarks to manage
    #[arg(long)]
    pub owner: String,

    /// Store URL (https://<project> or file:///path)
    #[arg(long, env = "MARKS_STORE")]
    pub store: String,

    /// Project API key (hosted stores)
    #[arg(long, env = "MARKS_API_KEY")]
    pub api_key: Option<String>,

    /// User access token (hosted stores)
    #[arg(long, env = "MARKS_ACCESS_TOKEN")]
    pub access_token: Option<String>,
}

pub async fn run(args: LoginArgs) -> Result<()> {
    let profile = Profile {
        owner: OwnerId::new(&args.owner).context("Invalid owner id")?,
        store: StoreUrl::new(&args.store).context("Invalid store URL")?,
        api_key: args.api_key.map(ApiKey::new),
        access_token: args.access_token.map(AccessToken::new),
    };
    profile.validate()?;

    eprintln!("{}", "Checking store...".dimmed());

    profile
        .store()?
        .fetch_all(&profile.owner)
        .await
        .context("Failed to reach store")?;

    storage::save(&profile).context("Failed to save session")?;

    output::success("Logged in successfully");
    println!();
    output::field("Owner", profile.owner.as_str());
    output::field("Store", profile.store.as_str());

    Ok(())
}

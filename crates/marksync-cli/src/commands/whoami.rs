//! Whoami command implementation.

use anyhow::Result;
use clap::Args;
use serde_json::json;

use crate::output;
use crate::session::storage;

#[derive(Args, Debug)]
pub struct WhoamiArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: WhoamiArgs) -> Result<()> {
    let profile = storage::require()?;

    if args.json {
        return output::json_pretty(&json!({
            "owner": profile.owner.as_str(),
            "store": profile.store.as_str(),
            "backend": profile.backend_kind(),
        }));
    }

    output::field("Owner", profile.owner.as_str());
    output::field("Store", profile.store.as_str());
    output::field("Backend", profile.backend_kind());

    Ok(())
}

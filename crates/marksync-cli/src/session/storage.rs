//! Profile storage for persisting login state.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use marksync_core::{AccessToken, ApiKey, OwnerId, StoreUrl};

use super::Profile;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Stored profile data.
#[derive(Debug, Serialize, Deserialize)]
struct StoredProfile {
    owner: String,
    store: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
}

fn profile_path() -> Result<PathBuf> {
    let dirs =
        ProjectDirs::from("", "", "marksync").context("Could not determine data directory")?;

    let data_dir = dirs.data_dir();
    fs::create_dir_all(data_dir).context("Failed to create data directory")?;

    Ok(data_dir.join("session.json"))
}

/// Save a profile to disk.
pub fn save(profile: &Profile) -> Result<()> {
    let stored = StoredProfile {
        owner: profile.owner.to_string(),
        store: profile.store.to_string(),
        api_key: profile.api_key.as_ref().map(|k| k.as_str().to_string()),
        access_token: profile
            .access_token
            .as_ref()
            .map(|t| t.as_str().to_string()),
    };

    let path = profile_path()?;
    let json = serde_json::to_string_pretty(&stored)?;

    fs::write(&path, &json).context("Failed to write session file")?;

    // Credentials live in this file.
    #[cfg(unix)]
    {
        let mut perms = fs::metadata(&path)?.permissions();
        perms.set_mode(0o600);
        fs::set_permissions(&path, perms)?;
    }

    debug!(path = %path.display(), "Saved profile");
    Ok(())
}

/// Load the stored profile, if any.
pub fn load() -> Result<Option<Profile>> {
    let path = profile_path()?;

    if !path.exists() {
        debug!(path = %path.display(), "No stored profile");
        return Ok(None);
    }

    let json = fs::read_to_string(&path).context("Failed to read session file")?;
    let stored: StoredProfile = serde_json::from_str(&json).context("Invalid session file")?;

    Ok(Some(Profile {
        owner: OwnerId::new(stored.owner).context("Invalid owner in session")?,
        store: StoreUrl::new(&stored.store).context("Invalid store URL in session")?,
        api_key: stored.api_key.map(ApiKey::new),
        access_token: stored.access_token.map(AccessToken::new),
    }))
}

/// Load the stored profile or fail with a login hint.
pub fn require() -> Result<Profile> {
    load()?.context("Not logged in. Run 'marks login' first.")
}

/// Remove the stored profile. Returns whether one existed.
pub fn clear() -> Result<bool> {
    let path = profile_path()?;

    if !path.exists() {
        return Ok(false);
    }

    fs::remove_file(&path).context("Failed to remove session file")?;
    Ok(true)
}

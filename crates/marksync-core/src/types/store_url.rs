//! Store URL type.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use url::Url;

use crate::error::{Error, InvalidInputError};

/// A validated bookmark store URL.
///
/// Network stores (`https://`, or `http://` for localhost) are reached over
/// the row API and the realtime socket. `file://` stores keep rows and the
/// change log on the local filesystem.
///
/// # Example
///
/// ```
/// use marksync_core::StoreUrl;
///
/// let store = StoreUrl::new("https://abc.supabase.co").unwrap();
/// assert_eq!(store.rest_url("bookmarks"), "https://abc.supabase.co/rest/v1/bookmarks");
/// assert_eq!(
///     store.realtime_url(),
///     "wss://abc.supabase.co/realtime/v1/websocket"
/// );
///
/// let local = StoreUrl::new("file:///tmp/marks").unwrap();
/// assert!(local.is_local());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StoreUrl(Url);

impl StoreUrl {
    /// Create a new store URL from a string, validating the format.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not valid or doesn't meet requirements.
    pub fn new(s: impl AsRef<str>) -> Result<Self, Error> {
        let s = s.as_ref();
        let url = Url::parse(s).map_err(|e| InvalidInputError::StoreUrl {
            value: s.to_string(),
            reason: e.to_string(),
        })?;

        Self::validate(&url, s)?;

        Ok(Self(url))
    }

    /// Base URL without a trailing slash.
    fn base(&self) -> &str {
        self.0.as_str().trim_end_matches('/')
    }

    /// Returns the row API endpoint for a table.
    pub fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base(), table)
    }

    /// Returns the realtime WebSocket endpoint.
    pub fn realtime_url(&self) -> String {
        let base = self.base();
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        };
        format!("{}/realtime/v1/websocket", ws_base)
    }

    /// Returns the URL as a string.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns the inner URL.
    pub fn as_url(&self) -> &Url {
        &self.0
    }

    /// Returns the host string.
    pub fn host(&self) -> Option<&str> {
        self.0.host_str()
    }

    /// Returns true if this is a local filesystem store (file:// URL).
    pub fn is_local(&self) -> bool {
        self.0.scheme() == "file"
    }

    /// Returns true if this is a network store (http:// or https:// URL).
    pub fn is_network(&self) -> bool {
        let scheme = self.0.scheme();
        scheme == "http" || scheme == "https"
    }

    /// Returns the filesystem path for file:// URLs.
    pub fn to_file_path(&self) -> Option<PathBuf> {
        if self.is_local() {
            self.0.to_file_path().ok()
        } else {
            None
        }
    }

    fn validate(url: &Url, original: &str) -> Result<(), Error> {
        if url.cannot_be_a_base() {
            return Err(InvalidInputError::StoreUrl {
                value: original.to_string(),
                reason: "must be an absolute URL".to_string(),
            }
            .into());
        }

        let scheme = url.scheme();

        if scheme == "file" {
            if url.path().is_empty() || url.path() == "/" {
                return Err(InvalidInputError::StoreUrl {
                    value: original.to_string(),
                    reason: "file:// URL must have a path".to_string(),
                }
                .into());
            }
            return Ok(());
        }

        let is_localhost = url
            .host_str()
            .is_some_and(|h| h == "localhost" || h == "127.0.0.1" || h == "[::1]");

        if scheme != "https" && !(scheme == "http" && is_localhost) {
            return Err(InvalidInputError::StoreUrl {
                value: original.to_string(),
                reason: "must use HTTPS (HTTP allowed only for localhost)".to_string(),
            }
            .into());
        }

        if url.host_str().is_none() {
            return Err(InvalidInputError::StoreUrl {
                value: original.to_string(),
                reason: "must have a host".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

impl fmt::Display for StoreUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StoreUrl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for StoreUrl {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.0.as_str())
    }
}

impl<'de> Deserialize<'de> for StoreUrl {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        StoreUrl::new(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_https_url() {
        let store = StoreUrl::new("https://abc.supabase.co").unwrap();
        assert_eq!(store.host(), Some("abc.supabase.co"));
        assert!(store.is_network());
    }

    #[test]
    fn valid_localhost_http() {
        let store = StoreUrl::new("http://localhost:54321").unwrap();
        assert_eq!(
            store.rest_url("bookmarks"),
            "http://localhost:54321/rest/v1/bookmarks"
        );
        assert_eq!(
            store.realtime_url(),
            "ws://localhost:54321/realtime/v1/websocket"
        );
    }

    #[test]
    fn trailing_slash_is_ignored_in_endpoints() {
        let store = StoreUrl::new("https://abc.supabase.co/").unwrap();
        assert_eq!(
            store.rest_url("bookmarks"),
            "https://abc.supabase.co/rest/v1/bookmarks"
        );
    }

    #[test]
    fn invalid_http_non_localhost() {
        assert!(StoreUrl::new("http://abc.supabase.co").is_err());
    }

    #[test]
    fn invalid_relative_url() {
        assert!(StoreUrl::new("/rest/v1/bookmarks").is_err());
    }

    #[test]
    fn file_url_to_path() {
        #[cfg(unix)]
        {
            let store = StoreUrl::new("file:///tmp/marks").unwrap();
            assert!(store.is_local());
            assert!(!store.is_network());
            assert_eq!(
                store.to_file_path().unwrap(),
                std::path::PathBuf::from("/tmp/marks")
            );
        }
    }

    #[test]
    fn network_url_has_no_file_path() {
        let store = StoreUrl::new("https://abc.supabase.co").unwrap();
        assert!(store.to_file_path().is_none());
    }
}

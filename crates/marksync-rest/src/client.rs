//! PostgREST HTTP client.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};

use marksync_core::error::{AuthError, Error, InvalidInputError, ProtocolError, TransportError};
use marksync_core::{AccessToken, ApiKey, Result, StoreUrl};

/// Error body returned by PostgREST and the API gateway.
#[derive(Debug, Deserialize)]
struct RestErrorResponse {
    code: Option<String>,
    message: Option<String>,
}

fn map_reqwest(err: reqwest::Error) -> Error {
    let err = if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connection {
            message: err.to_string(),
        }
    } else {
        TransportError::Http {
            message: err.to_string(),
        }
    };
    err.into()
}

/// HTTP client for a project's row API.
#[derive(Clone)]
pub struct RestClient {
    client: reqwest::Client,
    store: StoreUrl,
    headers: HeaderMap,
}

impl RestClient {
    /// Create a client for `store`.
    ///
    /// Requests carry the project `api_key`, and authorize as the user when
    /// an `access_token` is given (otherwise as the key's role).
    pub fn new(store: StoreUrl, api_key: &ApiKey, access_token: Option<&AccessToken>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("marksync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(map_reqwest)?;

        let bearer = access_token.map_or(api_key.as_str(), AccessToken::as_str);
        let mut headers = HeaderMap::new();
        headers.insert("apikey", header_value(api_key.as_str())?);
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", bearer))?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(Self {
            client,
            store,
            headers,
        })
    }

    /// Returns the store URL this client is configured for.
    pub fn store(&self) -> &StoreUrl {
        &self.store
    }

    /// Select rows (GET).
    #[instrument(skip(self), fields(store = %self.store))]
    pub async fn select<R>(&self, table: &str, params: &[(&str, String)]) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let url = self.store.rest_url(table);
        debug!(table, "REST select");
        trace!(?params, "query parameters");

        let response = self
            .client
            .get(&url)
            .query(params)
            .headers(self.headers.clone())
            .send()
            .await
            .map_err(map_reqwest)?;

        self.handle_response(response).await
    }

    /// Insert rows (POST) and return their stored representation.
    #[instrument(skip(self, rows), fields(store = %self.store))]
    pub async fn insert<B, R>(&self, table: &str, rows: &B) -> Result<R>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        let url = self.store.rest_url(table);
        debug!(table, "REST insert");

        let response = self
            .client
            .post(&url)
            .headers(self.headers.clone())
            .header("Prefer", "return=representation")
            .json(rows)
            .send()
            .await
            .map_err(map_reqwest)?;

        self.handle_response(response).await
    }

    /// Delete the rows matching `params` (DELETE).
    #[instrument(skip(self), fields(store = %self.store))]
    pub async fn delete(&self, table: &str, params: &[(&str, String)]) -> Result<()> {
        let url = self.store.rest_url(table);
        debug!(table, "REST delete");

        let response = self
            .client
            .delete(&url)
            .query(params)
            .headers(self.headers.clone())
            .send()
            .await
            .map_err(map_reqwest)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(self.parse_error_response(response).await)
        }
    }

    async fn handle_response<R: DeserializeOwned>(&self, response: reqwest::Response) -> Result<R> {
        let status = response.status();
        trace!(status = %status, "REST response");

        if status.is_success() {
            response.json::<R>().await.map_err(map_reqwest)
        } else {
            Err(self.parse_error_response(response).await)
        }
    }

    async fn parse_error_response(&self, response: reqwest::Response) -> Error {
        let status = response.status().as_u16();

        let error = match response.json::<RestErrorResponse>().await {
            Ok(body) => ProtocolError::new(status, body.code, body.message),
            Err(_) => ProtocolError::new(status, None, None),
        };

        if error.is_auth_error() {
            AuthError::InvalidCredentials(error.to_string()).into()
        } else {
            error.into()
        }
    }
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|_| {
        InvalidInputError::Other {
            message: "credential contains characters not allowed in a header".to_string(),
        }
        .into()
    })
}

//! Error types for marksync.
//!
//! Validation and store failures are returned synchronously to whoever asked
//! for the mutation. Feed anomalies ([`MalformedEventError`],
//! [`SubscriptionError`]) are reported through logging and status channels
//! and never interrupt a running session.

use std::fmt;
use thiserror::Error;

/// The unified error type for marksync operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A local mutation was rejected before reaching the store.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The store could not complete a fetch, insert or delete.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A change event did not carry the fields needed to apply it.
    #[error("malformed change event: {0}")]
    MalformedEvent(#[from] MalformedEventError),

    /// The change feed subscription failed or degraded.
    #[error("subscription error: {0}")]
    Subscription(#[from] SubscriptionError),

    /// Input that is not a bookmark field (store URL, owner id, config).
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InvalidInputError),

    /// The session was closed before the operation started.
    #[error("session closed")]
    SessionClosed,
}

impl Error {
    /// Returns true if the error came from the store.
    pub fn is_store_error(&self) -> bool {
        matches!(self, Error::Store(_))
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        Error::Store(StoreError::Transport(err))
    }
}

impl From<AuthError> for Error {
    fn from(err: AuthError) -> Self {
        Error::Store(StoreError::Auth(err))
    }
}

impl From<ProtocolError> for Error {
    fn from(err: ProtocolError) -> Self {
        Error::Store(StoreError::Protocol(err))
    }
}

/// Rejected bookmark input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The title was empty or whitespace.
    #[error("title must not be blank")]
    BlankTitle,

    /// The URL was empty or whitespace.
    #[error("url must not be blank")]
    BlankUrl,
}

/// Failures reported by a bookmark store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Network transport failure.
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    /// The store rejected our credentials.
    #[error("auth: {0}")]
    Auth(#[from] AuthError),

    /// The store answered with an error response.
    #[error("backend: {0}")]
    Protocol(#[from] ProtocolError),

    /// Local storage failure.
    #[error("io: {message}")]
    Io { message: String },

    /// A stored row could not be encoded or decoded.
    #[error("encoding: {message}")]
    Encoding { message: String },
}

/// Transport-level errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network connection failed.
    #[error("connection failed: {message}")]
    Connection { message: String },

    /// Request timed out.
    #[error("request timed out")]
    Timeout,

    /// Generic HTTP error.
    #[error("HTTP error: {message}")]
    Http { message: String },
}

/// Authentication-related errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Missing or invalid API key / access token.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Access token expired.
    #[error("session expired")]
    SessionExpired,
}

/// Error response from the store backend.
#[derive(Debug)]
pub struct ProtocolError {
    /// HTTP status code.
    pub status: u16,
    /// Backend error code (if present).
    pub code: Option<String>,
    /// Error message from the backend.
    pub message: Option<String>,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {}", self.status)?;
        if let Some(ref code) = self.code {
            write!(f, " [{}]", code)?;
        }
        if let Some(ref message) = self.message {
            write!(f, ": {}", message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ProtocolError {}

impl ProtocolError {
    /// Create a new protocol error.
    pub fn new(status: u16, code: Option<String>, message: Option<String>) -> Self {
        Self {
            status,
            code,
            message,
        }
    }

    /// Check if this is an authentication error.
    pub fn is_auth_error(&self) -> bool {
        self.status == 401
            || self.status == 403
            || self.code.as_deref() == Some("PGRST301")
            || self.code.as_deref() == Some("PGRST302")
    }
}

/// A change event that cannot be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedEventError {
    /// The envelope had no event type.
    #[error("missing event type")]
    MissingEventType,

    /// An insert without the new row.
    #[error("{event_type} event missing new record")]
    MissingNewRecord { event_type: String },

    /// A delete without the old row.
    #[error("{event_type} event missing old record")]
    MissingOldRecord { event_type: String },

    /// A row without its identifier.
    #[error("{event_type} event record missing id")]
    MissingId { event_type: String },

    /// A row without its owner.
    #[error("{event_type} event record missing user_id")]
    MissingOwner { event_type: String },

    /// The row was present but could not be decoded as a bookmark.
    #[error("{event_type} event record invalid: {reason}")]
    InvalidRecord { event_type: String, reason: String },
}

/// Change feed subscription failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    /// The feed reported an error on the channel.
    #[error("channel {channel} failed: {reason}")]
    ChannelError { channel: String, reason: String },

    /// The feed never confirmed the subscription.
    #[error("channel {channel} timed out")]
    TimedOut { channel: String },

    /// The feed connection could not be established.
    #[error("connection failed: {message}")]
    Connection { message: String },
}

/// Input validation errors for non-bookmark values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidInputError {
    /// Invalid store URL.
    #[error("invalid store URL '{value}': {reason}")]
    StoreUrl { value: String, reason: String },

    /// Invalid owner identifier.
    #[error("invalid owner id '{value}': {reason}")]
    OwnerId { value: String, reason: String },

    /// Invalid bookmark identifier.
    #[error("invalid bookmark id '{value}': {reason}")]
    BookmarkId { value: String, reason: String },

    /// Generic invalid input.
    #[error("{message}")]
    Other { message: String },
}

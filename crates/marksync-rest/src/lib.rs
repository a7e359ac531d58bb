//! marksync-rest - Hosted bookmark store over PostgREST, with the change feed
//! delivered by the realtime WebSocket service.

mod client;
mod realtime;
mod store;

pub use client::RestClient;
pub use realtime::{RealtimeFeed, RealtimeStream};
pub use store::RestStore;

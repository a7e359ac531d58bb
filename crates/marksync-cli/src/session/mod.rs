//! Stored login profile and the backends it opens.

pub mod storage;
mod types;

pub use types::{CliSession, Profile};

//! marksync-file - Filesystem-backed bookmark store and change feed.
//!
//! Rows live one per file under `<root>/bookmarks/rows/`; every mutation is
//! appended to `<root>/bookmarks/changes.jsonl`, which the feed tails. Several
//! processes pointed at the same root see each other's changes.

mod backend;
mod feed;
mod store;

pub use backend::FileBackend;
pub use feed::FileChangeStream;
pub use store::FileStore;

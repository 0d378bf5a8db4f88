//! Core engine: keeps the in-memory feeds in step with the remote store.

pub mod synchronizer;

pub use synchronizer::{FeedSynchronizer, SyncStats};

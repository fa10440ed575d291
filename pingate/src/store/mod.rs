//! Content store abstraction.
//!
//! The gateway talks to the storage network only through the [`ContentStore`] trait, which
//! keeps the upload and pinning logic testable without a running IPFS node.
//!
//! - [`kubo::KuboStore`]: production implementation over the Kubo RPC API
//! - [`mock::MockContentStore`]: scripted in-memory double for tests

pub mod kubo;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::types::Cid;

pub use kubo::KuboStore;

/// Errors raised by content store operations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The identifier (or path under it) does not exist
    #[error("content not found: {0}")]
    NotFound(String),

    /// The call exceeded its deadline
    #[error("store call timed out: {0}")]
    Timeout(String),

    /// The node could not be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The node answered with an error
    #[error("store returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The node answered with something we could not parse
    #[error("failed to decode store response: {0}")]
    Decode(String),
}

/// Kind of node a content identifier resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Other,
}

/// Metadata returned by [`ContentStore::stat`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub kind: EntryKind,
    /// Original file name, when the store tracks one
    pub name: Option<String>,
    pub size: Option<u64>,
}

/// Finite, single-pass stream of content chunks.
pub type ChunkStream = BoxStream<'static, Result<Bytes, StoreError>>;

/// Capability interface over the remote content store.
///
/// Implementations must be safe to share between concurrent uploads.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store `bytes` and return their content identifier.
    async fn add(&self, bytes: Bytes, name: &str) -> Result<Cid, StoreError>;

    /// Report whether `cid` is currently pinned.
    async fn pin_exists(&self, cid: &Cid) -> Result<bool, StoreError>;

    /// Pin `cid` so the node retains it.
    async fn pin_add(&self, cid: &Cid) -> Result<(), StoreError>;

    /// Describe the node `cid` resolves to.
    async fn stat(&self, cid: &Cid) -> Result<Stat, StoreError>;

    /// Stream the content of a file node.
    async fn cat(&self, cid: &Cid) -> Result<ChunkStream, StoreError>;
}

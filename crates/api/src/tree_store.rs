//! Types for the external content-addressed chunk/tree store.

use crate::*;
use std::sync::Arc;

/// Identifies the current state of a tree: a root hash, optionally
/// paired with the key needed to decrypt it.
#[derive(Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct RootPointer {
    /// Content hash of the tree root.
    pub hash: ChunkId,

    /// Decryption key, if the tree is encrypted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<ChunkId>,
}

impl RootPointer {
    /// An unencrypted root pointer.
    pub fn new(hash: impl Into<ChunkId>) -> Self {
        Self {
            hash: hash.into(),
            key: None,
        }
    }

    /// Pair this pointer with a decryption key.
    pub fn with_key(mut self, key: impl Into<ChunkId>) -> Self {
        self.key = Some(key.into());
        self
    }
}

// never print key material
impl std::fmt::Debug for RootPointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootPointer")
            .field("hash", &self.hash)
            .field("encrypted", &self.key.is_some())
            .finish()
    }
}

/// The outcome of pulling a tree into local storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullResult {
    /// Number of chunks reachable from the root.
    pub chunk_count: u64,

    /// Total bytes of chunks reachable from the root.
    pub total_bytes: u64,

    /// Every chunk reachable from the root.
    pub chunks: Vec<ChunkInfo>,
}

/// The local content-addressed store, which knows how to fetch trees
/// from the network and persist their chunks.
///
/// Chunking, hashing, encryption and tree traversal all happen behind
/// this trait.
pub trait TreeStore: 'static + Send + Sync + std::fmt::Debug {
    /// Recursively fetch and persist all chunks reachable from `root`.
    fn pull(&self, root: RootPointer) -> BoxFut<'_, SyncResult<PullResult>>;

    /// Delete the bytes of a stored chunk.
    fn delete_chunk(&self, id: ChunkId) -> BoxFut<'_, SyncResult<()>>;

    /// Total bytes currently held in local storage.
    fn total_stored_bytes(&self) -> BoxFut<'_, SyncResult<u64>>;
}

/// Trait-object [TreeStore].
pub type DynTreeStore = Arc<dyn TreeStore>;

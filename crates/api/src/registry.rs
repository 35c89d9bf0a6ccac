//! Chunk ownership registry types.
//!
//! The registry is pure bookkeeping: which chunks are stored locally, which
//! trees need them, when they were last used, and what each mirrored tree
//! looked like at its last completed pull. It performs no network access
//! and makes no scheduling decisions.

use crate::*;
use std::collections::BTreeSet;
use std::sync::Arc;

/// A chunk reported by a pull, before it is registered.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChunkInfo {
    /// The content hash of the chunk.
    pub id: ChunkId,

    /// The byte length of the chunk.
    pub size: u64,
}

/// The registry's record of a locally stored chunk.
///
/// `owners` is never empty for a chunk that is still referenced. A record
/// whose owner set has been emptied (by [SyncRegistry::remove_tree_sync_state])
/// is orphaned, and is only removed by an explicit cleanup pass.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRecord {
    /// The content hash of the chunk.
    pub id: ChunkId,

    /// The byte length of the chunk.
    pub size: u64,

    /// The trees currently known to reference this chunk.
    pub owners: BTreeSet<TreeKey>,

    /// Refreshed whenever the chunk is registered or read.
    pub last_accessed: Timestamp,
}

impl ChunkRecord {
    /// True if no tree references this chunk anymore.
    pub fn is_orphaned(&self) -> bool {
        self.owners.is_empty()
    }

    /// True if every owning tree belongs to `owner`.
    pub fn is_exclusively_owned_by(&self, owner: &OwnerId) -> bool {
        self.owners.iter().all(|k| k.is_owned_by(owner))
    }
}

/// The state of a mirrored tree as of its last completed pull.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeSyncState {
    /// The tree.
    pub key: TreeKey,

    /// The owning identity, used for quota grouping.
    pub owner_id: OwnerId,

    /// Hash of the last successfully pulled root pointer.
    pub root_hash: ChunkId,

    /// Sum of chunk sizes reachable from that root at last pull.
    pub total_bytes: u64,

    /// When the last pull completed.
    pub last_synced: Timestamp,

    /// True if the owning identity is one of the local user's accounts.
    pub is_own: bool,
}

/// Represents the ability to track chunk ownership and tree sync state.
///
/// Implementations must serialize mutations against each other so that
/// no owner set is ever observed half-updated.
pub trait SyncRegistry: 'static + Send + Sync + std::fmt::Debug {
    /// Register chunks as referenced by `tree_key`.
    ///
    /// Absent chunks are created with `tree_key` as sole owner. Present
    /// chunks get `tree_key` added to their owners (adding an existing
    /// owner is a no-op). Either way `last_accessed` is refreshed.
    fn register_chunks(
        &self,
        tree_key: TreeKey,
        chunks: Vec<ChunkInfo>,
    ) -> BoxFut<'_, SyncResult<()>>;

    /// Refresh `last_accessed` for chunks read outside of a pull.
    /// Unknown ids are ignored, no records are created.
    fn touch_chunks(&self, ids: Vec<ChunkId>) -> BoxFut<'_, SyncResult<()>>;

    /// Get a single chunk record.
    fn get_chunk(
        &self,
        id: ChunkId,
    ) -> BoxFut<'_, SyncResult<Option<ChunkRecord>>>;

    /// Get the sync state of a tree.
    fn get_tree_sync_state(
        &self,
        key: TreeKey,
    ) -> BoxFut<'_, SyncResult<Option<TreeSyncState>>>;

    /// Replace the sync state of a tree.
    fn update_tree_sync_state(
        &self,
        state: TreeSyncState,
    ) -> BoxFut<'_, SyncResult<()>>;

    /// Forget a tree: delete its sync state and remove `key` from the owner
    /// set of every chunk. Chunks are never deleted here, even when their
    /// owner set becomes empty.
    fn remove_tree_sync_state(
        &self,
        key: TreeKey,
    ) -> BoxFut<'_, SyncResult<()>>;

    /// List the sync state of every tree.
    fn list_tree_sync_states(
        &self,
    ) -> BoxFut<'_, SyncResult<Vec<TreeSyncState>>>;

    /// Sum of `total_bytes` over all trees owned by `owner`.
    fn get_storage_by_user(&self, owner: OwnerId)
        -> BoxFut<'_, SyncResult<u64>>;

    /// Distinct owners of trees not flagged as own, excluding any id in
    /// `own_owner_ids`.
    fn get_other_users_with_trees(
        &self,
        own_owner_ids: Vec<OwnerId>,
    ) -> BoxFut<'_, SyncResult<Vec<OwnerId>>>;

    /// Least recently used chunks that may be evicted on behalf of `owner`.
    ///
    /// Only chunks whose entire owner set belongs to `owner` qualify; a
    /// chunk shared with any other owner is never returned. Candidates are
    /// ordered oldest first, and accumulated until their sizes sum to at
    /// least `target_bytes` or the candidates run out.
    fn get_chunks_to_evict(
        &self,
        owner: OwnerId,
        target_bytes: u64,
    ) -> BoxFut<'_, SyncResult<Vec<ChunkRecord>>>;

    /// Chunk records with an empty owner set.
    fn get_orphaned_chunks(&self) -> BoxFut<'_, SyncResult<Vec<ChunkRecord>>>;

    /// Delete chunk records. The caller deletes the underlying bytes.
    fn remove_chunks(&self, ids: Vec<ChunkId>) -> BoxFut<'_, SyncResult<()>>;
}

/// Trait-object [SyncRegistry].
pub type DynSyncRegistry = Arc<dyn SyncRegistry>;

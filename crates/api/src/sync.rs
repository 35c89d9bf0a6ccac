//! Background sync service types.

use crate::*;
use std::sync::Arc;

/// Scheduling tier of a [SyncTask]. Lower tiers drain first.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum SyncPriority {
    /// Trees owned by one of the local user's identities.
    Own = 0,

    /// Trees the user opened ad-hoc, e.g. through a shared link.
    Visited = 1,

    /// Public trees of followed users.
    Followed = 2,
}

/// A request to pull a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTask {
    /// The tree to pull.
    pub key: TreeKey,

    /// The root to pull it at.
    pub root: RootPointer,

    /// True if the tree belongs to one of the local user's identities.
    pub is_own: bool,

    /// Scheduling tier.
    pub priority: SyncPriority,
}

/// Storage held on behalf of one owner, for display.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStorage {
    /// The owner.
    pub owner_id: OwnerId,

    /// Sum of the owner's tree sizes at last pull.
    pub bytes: u64,

    /// True if this is one of the local user's identities.
    pub is_own: bool,
}

/// Eviction performed on behalf of one owner during a quota pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerEviction {
    /// The owner.
    pub owner_id: OwnerId,

    /// Bytes the owner held above its allowance.
    pub target_bytes: u64,

    /// Bytes actually deleted.
    pub freed_bytes: u64,

    /// The deleted chunks.
    pub evicted: Vec<ChunkId>,
}

/// The outcome of a quota pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuotaReport {
    /// Bytes in local storage when the pass started.
    pub total_bytes: u64,

    /// The configured cap when the pass started.
    pub storage_cap: u64,

    /// Allowance of each non-own owner, if the cap was exceeded.
    pub per_user_quota: Option<u64>,

    /// Owners that were over their allowance.
    pub evictions: Vec<OwnerEviction>,
}

impl QuotaReport {
    /// Number of chunks deleted in this pass.
    pub fn evicted_count(&self) -> usize {
        self.evictions.iter().map(|e| e.evicted.len()).sum()
    }
}

/// The background sync service.
///
/// Exactly one instance should run per local identity. Running two would
/// duplicate subscriptions and double-count quota enforcement.
pub trait SyncService: 'static + Send + Sync + std::fmt::Debug {
    /// Begin mirroring. Idempotent.
    fn start(&self) -> BoxFut<'_, SyncResult<()>>;

    /// Stop mirroring: tear down subscriptions, clear the queue and cancel
    /// any pending tick. An in-flight pull is allowed to finish but its
    /// result is discarded. Idempotent.
    fn stop(&self) -> BoxFut<'_, ()>;

    /// Queue a tree for pulling. Re-queueing a key that is already queued
    /// only replaces its root pointer if the hash changed.
    fn queue_tree_sync(
        &self,
        key: TreeKey,
        root: RootPointer,
        is_own: bool,
        priority: SyncPriority,
    );

    /// Queue an ad-hoc visited tree at [SyncPriority::Visited].
    fn queue_visited_tree(&self, key: TreeKey, root: RootPointer);

    /// Enforce the storage cap now.
    fn check_quotas(&self) -> BoxFut<'_, SyncResult<QuotaReport>>;

    /// Delete the bytes and records of chunks no tree references anymore.
    /// Returns the number of chunks removed.
    fn cleanup_orphans(&self) -> BoxFut<'_, SyncResult<usize>>;

    /// Stop tracking a tree. Its chunks are kept, and may become orphaned.
    fn remove_tree(&self, key: TreeKey) -> BoxFut<'_, SyncResult<()>>;

    /// Note that chunks were read outside of a pull.
    fn touch_chunks(&self, ids: Vec<ChunkId>) -> BoxFut<'_, SyncResult<()>>;

    /// Storage held per owner.
    fn storage_breakdown(&self) -> BoxFut<'_, SyncResult<Vec<UserStorage>>>;

    /// Every synced tree.
    fn synced_trees(&self) -> BoxFut<'_, SyncResult<Vec<TreeSyncState>>>;

    /// Snapshot of the pending queue, in drain order.
    fn queued_tasks(&self) -> Vec<SyncTask>;

    /// True between [SyncService::start] and [SyncService::stop].
    fn is_running(&self) -> bool;
}

/// Trait-object [SyncService].
pub type DynSyncService = Arc<dyn SyncService>;

/// A factory for constructing [SyncService] instances.
pub trait SyncServiceFactory: 'static + Send + Sync + std::fmt::Debug {
    /// Help the builder construct a default config from the chosen
    /// module factories.
    fn default_config(&self, config: &Config) -> SyncResult<()>;

    /// Construct a sync service instance.
    fn create(
        &self,
        builder: Arc<Builder>,
    ) -> BoxFut<'static, SyncResult<DynSyncService>>;
}

/// Trait-object [SyncServiceFactory].
pub type DynSyncServiceFactory = Arc<dyn SyncServiceFactory>;

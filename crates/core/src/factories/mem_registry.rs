//! A memory-based chunk ownership registry.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use treesync_api::*;

/// A serializable copy of the registry contents, for persisting the
/// registry between sessions.
#[derive(
    Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize,
)]
pub struct RegistrySnapshot {
    /// All chunk records.
    pub chunks: Vec<ChunkRecord>,

    /// All tree sync states.
    pub trees: Vec<TreeSyncState>,
}

/// A memory-based [SyncRegistry].
///
/// All mutations go through a single lock, so registrations from
/// different tree pulls never lose updates to a shared owner set.
/// Use [MemRegistry::snapshot] and [MemRegistry::restore] to persist it.
pub struct MemRegistry(Mutex<Inner>);

impl std::fmt::Debug for MemRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("MemRegistry")
            .field("chunk_count", &inner.chunks.len())
            .field("tree_count", &inner.trees.len())
            .finish()
    }
}

impl Default for MemRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MemRegistry {
    /// Construct an empty registry.
    pub fn new() -> Self {
        Self(Mutex::new(Inner::default()))
    }

    /// Construct an empty registry as a trait object.
    pub fn create() -> DynSyncRegistry {
        let out: DynSyncRegistry = Arc::new(Self::new());
        out
    }

    /// Copy out the registry contents.
    pub fn snapshot(&self) -> RegistrySnapshot {
        self.lock().snapshot()
    }

    /// Construct a registry from a previously taken snapshot.
    pub fn restore(snapshot: RegistrySnapshot) -> Self {
        Self(Mutex::new(Inner::from_snapshot(snapshot)))
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // every Inner method leaves the maps consistent before it can panic
        self.0.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl SyncRegistry for MemRegistry {
    fn register_chunks(
        &self,
        tree_key: TreeKey,
        chunks: Vec<ChunkInfo>,
    ) -> BoxFut<'_, SyncResult<()>> {
        self.lock().register_chunks(tree_key, chunks);
        Box::pin(async move { Ok(()) })
    }

    fn touch_chunks(&self, ids: Vec<ChunkId>) -> BoxFut<'_, SyncResult<()>> {
        self.lock().touch_chunks(ids);
        Box::pin(async move { Ok(()) })
    }

    fn get_chunk(
        &self,
        id: ChunkId,
    ) -> BoxFut<'_, SyncResult<Option<ChunkRecord>>> {
        let r = self.lock().chunks.get(&id).cloned();
        Box::pin(async move { Ok(r) })
    }

    fn get_tree_sync_state(
        &self,
        key: TreeKey,
    ) -> BoxFut<'_, SyncResult<Option<TreeSyncState>>> {
        let r = self.lock().trees.get(&key).cloned();
        Box::pin(async move { Ok(r) })
    }

    fn update_tree_sync_state(
        &self,
        state: TreeSyncState,
    ) -> BoxFut<'_, SyncResult<()>> {
        self.lock().trees.insert(state.key.clone(), state);
        Box::pin(async move { Ok(()) })
    }

    fn remove_tree_sync_state(
        &self,
        key: TreeKey,
    ) -> BoxFut<'_, SyncResult<()>> {
        self.lock().remove_tree(&key);
        Box::pin(async move { Ok(()) })
    }

    fn list_tree_sync_states(
        &self,
    ) -> BoxFut<'_, SyncResult<Vec<TreeSyncState>>> {
        let r: Vec<TreeSyncState> =
            self.lock().trees.values().cloned().collect();
        Box::pin(async move { Ok(r) })
    }

    fn get_storage_by_user(
        &self,
        owner: OwnerId,
    ) -> BoxFut<'_, SyncResult<u64>> {
        let r: u64 = self
            .lock()
            .trees
            .values()
            .filter(|t| t.owner_id == owner)
            .map(|t| t.total_bytes)
            .sum();
        Box::pin(async move { Ok(r) })
    }

    fn get_other_users_with_trees(
        &self,
        own_owner_ids: Vec<OwnerId>,
    ) -> BoxFut<'_, SyncResult<Vec<OwnerId>>> {
        let r = self.lock().other_users(&own_owner_ids);
        Box::pin(async move { Ok(r) })
    }

    fn get_chunks_to_evict(
        &self,
        owner: OwnerId,
        target_bytes: u64,
    ) -> BoxFut<'_, SyncResult<Vec<ChunkRecord>>> {
        let r = self.lock().chunks_to_evict(&owner, target_bytes);
        Box::pin(async move { Ok(r) })
    }

    fn get_orphaned_chunks(&self) -> BoxFut<'_, SyncResult<Vec<ChunkRecord>>> {
        let r: Vec<ChunkRecord> = self
            .lock()
            .chunks
            .values()
            .filter(|c| c.is_orphaned())
            .cloned()
            .collect();
        Box::pin(async move { Ok(r) })
    }

    fn remove_chunks(&self, ids: Vec<ChunkId>) -> BoxFut<'_, SyncResult<()>> {
        self.lock().remove_chunks(ids);
        Box::pin(async move { Ok(()) })
    }
}

#[derive(Default)]
struct Inner {
    chunks: HashMap<ChunkId, ChunkRecord>,
    trees: HashMap<TreeKey, TreeSyncState>,

    // reverse of ChunkRecord::owners
    tree_chunks: HashMap<TreeKey, HashSet<ChunkId>>,

    // last handed-out access stamp
    clock: Timestamp,
}

impl Inner {
    fn from_snapshot(snapshot: RegistrySnapshot) -> Self {
        let mut out = Self::default();
        for chunk in snapshot.chunks {
            for owner in chunk.owners.iter() {
                out.tree_chunks
                    .entry(owner.clone())
                    .or_default()
                    .insert(chunk.id.clone());
            }
            out.clock = out.clock.max(chunk.last_accessed);
            out.chunks.insert(chunk.id.clone(), chunk);
        }
        out.trees = snapshot
            .trees
            .into_iter()
            .map(|t| (t.key.clone(), t))
            .collect();
        out
    }

    fn snapshot(&self) -> RegistrySnapshot {
        let mut chunks: Vec<ChunkRecord> =
            self.chunks.values().cloned().collect();
        chunks.sort_by(|a, b| a.id.cmp(&b.id));
        let mut trees: Vec<TreeSyncState> =
            self.trees.values().cloned().collect();
        trees.sort_by(|a, b| a.key.cmp(&b.key));
        RegistrySnapshot { chunks, trees }
    }

    /// Strictly increasing access stamps, so that the order in which chunks
    /// are registered or touched is always a total LRU order.
    fn tick(&mut self) -> Timestamp {
        self.clock = self.clock.next_after();
        self.clock
    }

    fn register_chunks(&mut self, tree_key: TreeKey, chunks: Vec<ChunkInfo>) {
        if chunks.is_empty() {
            return;
        }

        let mut ids = Vec::with_capacity(chunks.len());
        for ChunkInfo { id, size } in chunks {
            let now = self.tick();
            let record =
                self.chunks.entry(id.clone()).or_insert_with(|| ChunkRecord {
                    id: id.clone(),
                    size,
                    owners: BTreeSet::new(),
                    last_accessed: now,
                });
            record.owners.insert(tree_key.clone());
            record.last_accessed = now;
            ids.push(id);
        }

        self.tree_chunks.entry(tree_key).or_default().extend(ids);
    }

    fn touch_chunks(&mut self, ids: Vec<ChunkId>) {
        for id in ids {
            if !self.chunks.contains_key(&id) {
                continue;
            }
            let now = self.tick();
            if let Some(record) = self.chunks.get_mut(&id) {
                record.last_accessed = now;
            }
        }
    }

    fn remove_tree(&mut self, key: &TreeKey) {
        self.trees.remove(key);

        let Some(ids) = self.tree_chunks.remove(key) else {
            return;
        };

        for id in ids {
            if let Some(record) = self.chunks.get_mut(&id) {
                record.owners.remove(key);
            }
        }
    }

    fn remove_chunks(&mut self, ids: Vec<ChunkId>) {
        for id in ids {
            let Some(record) = self.chunks.remove(&id) else {
                continue;
            };

            for owner in record.owners {
                if let Some(set) = self.tree_chunks.get_mut(&owner) {
                    set.remove(&id);
                    if set.is_empty() {
                        self.tree_chunks.remove(&owner);
                    }
                }
            }
        }
    }

    fn other_users(&self, own_owner_ids: &[OwnerId]) -> Vec<OwnerId> {
        self.trees
            .values()
            .filter(|t| !t.is_own && !own_owner_ids.contains(&t.owner_id))
            .map(|t| t.owner_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn chunks_to_evict(
        &self,
        owner: &OwnerId,
        target_bytes: u64,
    ) -> Vec<ChunkRecord> {
        if target_bytes == 0 {
            return Vec::new();
        }

        let candidate_ids: HashSet<&ChunkId> = self
            .tree_chunks
            .iter()
            .filter(|(key, _)| key.is_owned_by(owner))
            .flat_map(|(_, ids)| ids.iter())
            .collect();

        let mut candidates: Vec<&ChunkRecord> = candidate_ids
            .into_iter()
            .filter_map(|id| self.chunks.get(id))
            // a chunk any other owner still references is never evictable
            .filter(|c| !c.is_orphaned() && c.is_exclusively_owned_by(owner))
            .collect();

        candidates.sort_by(|a, b| {
            (a.last_accessed, &a.id).cmp(&(b.last_accessed, &b.id))
        });

        let mut out = Vec::new();
        let mut freed = 0_u64;
        for c in candidates {
            if freed >= target_bytes {
                break;
            }
            freed = freed.saturating_add(c.size);
            out.push(c.clone());
        }
        out
    }
}

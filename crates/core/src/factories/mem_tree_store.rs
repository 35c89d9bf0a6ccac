//! A memory-based tree store for testing.
//!
//! "Remote" trees are seeded with [MemTreeStore::add_remote_tree]; pulling
//! one copies the sizes of its chunks into local storage. Chunk payloads are
//! not kept, only their sizes matter to the sync engine.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use treesync_api::*;

#[derive(Debug, Default)]
struct Inner {
    remote: HashMap<ChunkId, Vec<ChunkInfo>>,
    local: HashMap<ChunkId, u64>,
    pulls: Vec<RootPointer>,
    fail_pulls: bool,
    fail_deletes: HashSet<ChunkId>,
}

/// A memory-based [TreeStore].
#[derive(Debug, Default)]
pub struct MemTreeStore {
    inner: Mutex<Inner>,
    pull_gate: Mutex<Option<Arc<tokio::sync::Semaphore>>>,
}

impl MemTreeStore {
    /// Construct a new, empty store.
    pub fn create() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Make a tree available for pulling at `root_hash`.
    pub fn add_remote_tree(
        &self,
        root_hash: impl Into<ChunkId>,
        chunks: Vec<ChunkInfo>,
    ) {
        self.lock().remote.insert(root_hash.into(), chunks);
    }

    /// Place a chunk directly in local storage.
    pub fn store_chunk(&self, id: impl Into<ChunkId>, size: u64) {
        self.lock().local.insert(id.into(), size);
    }

    /// True if the chunk is held locally.
    pub fn has_chunk(&self, id: &ChunkId) -> bool {
        self.lock().local.contains_key(id)
    }

    /// Every root pulled so far, in call order.
    pub fn pulls(&self) -> Vec<RootPointer> {
        self.lock().pulls.clone()
    }

    /// Make every subsequent pull fail.
    pub fn set_fail_pulls(&self, fail: bool) {
        self.lock().fail_pulls = fail;
    }

    /// Make deleting this chunk fail.
    pub fn fail_delete(&self, id: impl Into<ChunkId>) {
        self.lock().fail_deletes.insert(id.into());
    }

    /// Block pulls until a permit is available on the returned semaphore.
    /// Each pull consumes one permit.
    pub fn gate_pulls(&self) -> Arc<tokio::sync::Semaphore> {
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        *self.pull_gate.lock().unwrap_or_else(|p| p.into_inner()) =
            Some(gate.clone());
        gate
    }
}

impl TreeStore for MemTreeStore {
    fn pull(&self, root: RootPointer) -> BoxFut<'_, SyncResult<PullResult>> {
        Box::pin(async move {
            let gate = self
                .pull_gate
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .clone();
            if let Some(gate) = gate {
                gate.acquire()
                    .await
                    .map_err(|e| SyncError::other_src("pull gate closed", e))?
                    .forget();
            }

            let mut lock = self.lock();
            lock.pulls.push(root.clone());

            if lock.fail_pulls {
                return Err(SyncError::other(format!(
                    "pull of {} failed",
                    root.hash
                )));
            }

            let chunks = lock.remote.get(&root.hash).cloned().ok_or_else(|| {
                SyncError::other(format!("root {} not found", root.hash))
            })?;

            for c in chunks.iter() {
                lock.local.insert(c.id.clone(), c.size);
            }

            Ok(PullResult {
                chunk_count: chunks.len() as u64,
                total_bytes: chunks.iter().map(|c| c.size).sum(),
                chunks,
            })
        })
    }

    fn delete_chunk(&self, id: ChunkId) -> BoxFut<'_, SyncResult<()>> {
        let mut lock = self.lock();
        let res = if lock.fail_deletes.contains(&id) {
            Err(SyncError::other(format!("delete of {id} failed")))
        } else {
            lock.local.remove(&id);
            Ok(())
        };
        Box::pin(async move { res })
    }

    fn total_stored_bytes(&self) -> BoxFut<'_, SyncResult<u64>> {
        let r: u64 = self.lock().local.values().sum();
        Box::pin(async move { Ok(r) })
    }
}

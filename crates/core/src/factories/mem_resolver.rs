//! A memory-based reference resolver for testing.

use crate::common::Dispatcher;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use treesync_api::*;

/// A memory-based [ReferenceResolver].
///
/// Publishing a tree notifies every subscriber of its owner with the
/// owner's complete, current tree list.
#[derive(Default)]
pub struct MemResolver {
    trees: Mutex<HashMap<OwnerId, BTreeMap<TreeKey, TreeRef>>>,
    dispatch: Dispatcher<OwnerId, Vec<TreeRef>>,
}

impl std::fmt::Debug for MemResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemResolver").finish()
    }
}

impl MemResolver {
    /// Construct a new resolver with nothing published.
    pub fn create() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(
        &self,
    ) -> MutexGuard<'_, HashMap<OwnerId, BTreeMap<TreeKey, TreeRef>>> {
        self.trees.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn current(&self, owner: &OwnerId) -> Vec<TreeRef> {
        self.lock()
            .get(owner)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Publish (or move) a tree reference.
    pub fn publish(&self, tree: TreeRef) {
        let owner = tree.key.owner_id();
        self.lock()
            .entry(owner.clone())
            .or_default()
            .insert(tree.key.clone(), tree);
        let list = self.current(&owner);
        self.dispatch.emit(&owner, list);
    }

    /// Unpublish a tree.
    pub fn unpublish(&self, key: &TreeKey) {
        let owner = key.owner_id();
        if let Some(t) = self.lock().get_mut(&owner) {
            t.remove(key);
        }
        let list = self.current(&owner);
        self.dispatch.emit(&owner, list);
    }

    /// Number of live subscriptions to `owner`'s tree list.
    pub fn subscriber_count(&self, owner: &OwnerId) -> usize {
        self.dispatch.count(owner)
    }
}

impl ReferenceResolver for MemResolver {
    fn list(
        &self,
        owner: OwnerId,
        cb: DynTreeListCb,
    ) -> SyncResult<Subscription> {
        let sub = self.dispatch.subscribe(owner.clone(), cb.clone());
        let list = self.current(&owner);
        if !list.is_empty() {
            cb(list);
        }
        Ok(sub)
    }
}

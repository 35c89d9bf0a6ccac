//! Sync is the treesync module that mirrors remote trees into local storage
//! and keeps that storage within budget.
//!
//! It consists of multiple parts:
//! - A priority queue of trees to pull, fed by subscriptions
//! - A scheduling tick that drains the queue one tree at a time
//! - Subscription lifecycle for own trees and followed users' trees
//! - A quota enforcer run after every pull
//!
//! ### Sync queue
//!
//! Tree pulls are queued as [SyncTask]s. The queue holds at most one task
//! per tree key; re-queueing a key replaces its root pointer in place when
//! the hash changed and is otherwise ignored. Tasks drain in priority order
//! (own trees, then visited trees, then followed users' public trees), FIFO
//! within a tier.
//!
//! ### Scheduling tick
//!
//! Any change to the queue schedules a tick after a short debounce, so that
//! bursts of notifications are handled in one pass. At most one tick is
//! pending at a time. A tick pops the head task, pulls the tree unless the
//! registry already has it at the same root, registers its chunks, runs the
//! quota enforcer, and schedules the next tick if work remains. There is
//! never more than one pull in flight.
//!
//! Failed pulls are logged and dropped. The next resolver notification for
//! the tree queues it again.
//!
//! ### Subscriptions
//!
//! On start the service subscribes to the tree lists of the local user's own
//! identities (all visibilities, highest priority) and to the follow list of
//! the active identity. Every follow-list update is diffed against the
//! followed owners currently subscribed: new follows get a tree-list
//! subscription (public trees only, lowest priority), unfollowed owners have
//! theirs torn down. Subscriptions are keyed by owner, subscribing twice is
//! a no-op. Settings never change which owners are subscribed, they are
//! read as each tree list arrives and decide whether anything is queued.
//!
//! ### Stop
//!
//! Stopping tears down every subscription, clears the queue and cancels the
//! pending tick. A pull already in flight runs to completion but its result
//! is discarded. Each start/stop cycle is a new generation, callbacks and
//! pulls from an older generation never touch the registry.

use futures::StreamExt;
use queue::{Queued, SyncQueue};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::task::AbortHandle;
use treesync_api::*;

mod queue;
mod quota;

#[cfg(test)]
mod test;

/// CoreSync configuration types.
pub mod config {
    /// Configuration parameters for [CoreSyncFactory](super::CoreSyncFactory).
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    pub struct CoreSyncConfig {
        /// How long to wait after a queue change before processing, so
        /// that near-simultaneous notifications are handled in one pass.
        ///
        /// Default: 100ms.
        pub debounce_ms: u32,

        /// How many chunk deletions may run concurrently within one quota
        /// or orphan cleanup pass.
        ///
        /// Default: 4.
        pub eviction_concurrency: u8,
    }

    impl Default for CoreSyncConfig {
        fn default() -> Self {
            Self {
                debounce_ms: 100,
                eviction_concurrency: 4,
            }
        }
    }

    impl CoreSyncConfig {
        /// Get the debounce as a [std::time::Duration].
        pub fn debounce(&self) -> std::time::Duration {
            std::time::Duration::from_millis(self.debounce_ms as u64)
        }
    }

    /// Module-level configuration for CoreSync.
    #[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    pub struct CoreSyncModConfig {
        /// CoreSync configuration.
        pub core_sync: CoreSyncConfig,
    }
}

use config::*;

/// A production-ready sync module.
#[derive(Debug)]
pub struct CoreSyncFactory {}

impl CoreSyncFactory {
    /// Construct a new CoreSyncFactory.
    pub fn create() -> DynSyncServiceFactory {
        Arc::new(Self {})
    }
}

impl SyncServiceFactory for CoreSyncFactory {
    fn default_config(&self, config: &Config) -> SyncResult<()> {
        config.set_module_config(&CoreSyncModConfig::default())
    }

    fn create(
        &self,
        builder: Arc<Builder>,
    ) -> BoxFut<'static, SyncResult<DynSyncService>> {
        Box::pin(async move {
            let config: CoreSyncModConfig =
                builder.config.get_module_config()?;
            let out: DynSyncService = Arc::new(CoreSync::new(
                config.core_sync,
                Collaborators {
                    registry: builder.registry.clone(),
                    tree_store: builder.tree_store.clone(),
                    resolver: builder.resolver.clone(),
                    follows: builder.follows.clone(),
                    accounts: builder.accounts.clone(),
                    settings: builder.settings.clone(),
                },
            ));
            Ok(out)
        })
    }
}

/// Everything the sync service is injected with.
#[derive(Debug, Clone)]
struct Collaborators {
    registry: DynSyncRegistry,
    tree_store: DynTreeStore,
    resolver: DynReferenceResolver,
    follows: DynFollowListProvider,
    accounts: DynAccountProvider,
    settings: DynSettingsProvider,
}

/// Why we subscribed to an owner's tree list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OwnerKind {
    Own,
    Followed,
}

#[derive(Debug, Default)]
struct State {
    running: bool,

    // bumped by every stop
    generation: u64,

    queue: SyncQueue,
    tick: Option<AbortHandle>,
    processing: bool,

    owner_subs: HashMap<OwnerId, (OwnerKind, Subscription)>,
    follow_list_sub: Option<Subscription>,
}

impl State {
    fn is_current(&self, generation: u64) -> bool {
        self.running && self.generation == generation
    }
}

#[derive(Debug)]
struct Inner {
    config: CoreSyncConfig,
    c: Collaborators,
    runtime: tokio::runtime::Handle,
    state: Mutex<State>,
}

#[derive(Debug)]
struct CoreSync {
    inner: Arc<Inner>,
}

impl CoreSync {
    /// Must be called from within a tokio runtime.
    fn new(config: CoreSyncConfig, c: Collaborators) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                c,
                runtime: tokio::runtime::Handle::current(),
                state: Mutex::new(State::default()),
            }),
        }
    }
}

impl SyncService for CoreSync {
    fn start(&self) -> BoxFut<'_, SyncResult<()>> {
        Box::pin(async move {
            self.inner.start();
            Ok(())
        })
    }

    fn stop(&self) -> BoxFut<'_, ()> {
        Box::pin(async move { self.inner.stop() })
    }

    fn queue_tree_sync(
        &self,
        key: TreeKey,
        root: RootPointer,
        is_own: bool,
        priority: SyncPriority,
    ) {
        self.inner.queue_tree_sync(SyncTask {
            key,
            root,
            is_own,
            priority,
        });
    }

    fn queue_visited_tree(&self, key: TreeKey, root: RootPointer) {
        if !self.inner.c.settings.get().sync_visited_unlisted {
            tracing::debug!("visited tree sync disabled, ignoring {key}");
            return;
        }

        let owner = key.owner_id();
        let is_own = self.inner.c.accounts.own_identities().contains(&owner);
        self.inner.queue_tree_sync(SyncTask {
            key,
            root,
            is_own,
            priority: SyncPriority::Visited,
        });
    }

    fn check_quotas(&self) -> BoxFut<'_, SyncResult<QuotaReport>> {
        Box::pin(self.inner.check_quotas())
    }

    fn cleanup_orphans(&self) -> BoxFut<'_, SyncResult<usize>> {
        Box::pin(self.inner.cleanup_orphans())
    }

    fn remove_tree(&self, key: TreeKey) -> BoxFut<'_, SyncResult<()>> {
        Box::pin(async move {
            self.inner.lock().queue.remove(&key);
            self.inner.c.registry.remove_tree_sync_state(key).await
        })
    }

    fn touch_chunks(&self, ids: Vec<ChunkId>) -> BoxFut<'_, SyncResult<()>> {
        self.inner.c.registry.touch_chunks(ids)
    }

    fn storage_breakdown(&self) -> BoxFut<'_, SyncResult<Vec<UserStorage>>> {
        Box::pin(async move {
            let own: HashSet<OwnerId> =
                self.inner.c.accounts.own_identities().into_iter().collect();
            let mut by_owner: BTreeMap<OwnerId, UserStorage> =
                BTreeMap::new();
            for t in self.inner.c.registry.list_tree_sync_states().await? {
                let entry =
                    by_owner.entry(t.owner_id.clone()).or_insert_with(|| {
                        UserStorage {
                            is_own: own.contains(&t.owner_id),
                            owner_id: t.owner_id.clone(),
                            bytes: 0,
                        }
                    });
                entry.bytes += t.total_bytes;
                entry.is_own |= t.is_own;
            }
            Ok(by_owner.into_values().collect())
        })
    }

    fn synced_trees(&self) -> BoxFut<'_, SyncResult<Vec<TreeSyncState>>> {
        Box::pin(async move {
            let mut out = self.inner.c.registry.list_tree_sync_states().await?;
            out.sort_by(|a, b| a.key.cmp(&b.key));
            Ok(out)
        })
    }

    fn queued_tasks(&self) -> Vec<SyncTask> {
        self.inner.lock().queue.tasks()
    }

    fn is_running(&self) -> bool {
        self.inner.lock().running
    }
}

impl Drop for CoreSync {
    fn drop(&mut self) {
        self.inner.stop();
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        // state transitions never panic halfway
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn start(self: &Arc<Self>) {
        let generation = {
            let mut state = self.lock();
            if state.running {
                return;
            }
            state.running = true;
            state.generation
        };

        let own = self.c.accounts.own_identities();
        tracing::info!("starting tree sync for own identities {own:?}");

        for owner in own {
            self.subscribe_owner(generation, owner, OwnerKind::Own);
        }

        let Some(current) = self.c.accounts.current() else {
            tracing::info!("no active identity, not following anyone");
            return;
        };

        let weak = Arc::downgrade(self);
        let cb: DynFollowListCb = Arc::new(move |follows| {
            if let Some(inner) = weak.upgrade() {
                inner.on_follow_list(generation, follows);
            }
        });

        match self.c.follows.subscribe(current.clone(), cb) {
            Ok(sub) => {
                let mut state = self.lock();
                if state.is_current(generation) {
                    state.follow_list_sub = Some(sub);
                    return;
                }
                drop(state);
                drop(sub);
            }
            Err(err) => {
                tracing::warn!(
                    "could not subscribe to follow list of {current}: {err}"
                );
            }
        }
    }

    fn stop(&self) {
        let (tick, subs, follow_list_sub) = {
            let mut state = self.lock();
            if !state.running {
                return;
            }
            state.running = false;
            state.generation += 1;
            state.queue.clear();
            (
                state.tick.take(),
                std::mem::take(&mut state.owner_subs),
                state.follow_list_sub.take(),
            )
        };

        if let Some(tick) = tick {
            tick.abort();
        }

        // unsubscribe with our lock released
        drop(follow_list_sub);
        let count = subs.len();
        drop(subs);

        tracing::info!("stopped tree sync, dropped {count} subscriptions");
    }

    /// Subscribe to an owner's tree list, unless already subscribed.
    fn subscribe_owner(
        self: &Arc<Self>,
        generation: u64,
        owner: OwnerId,
        kind: OwnerKind,
    ) {
        {
            let mut state = self.lock();
            if !state.is_current(generation)
                || state.owner_subs.contains_key(&owner)
            {
                return;
            }

            // reserve the slot, the resolver may call back synchronously
            state
                .owner_subs
                .insert(owner.clone(), (kind, Subscription::noop()));
        }

        let weak: Weak<Inner> = Arc::downgrade(self);
        let cb_owner = owner.clone();
        let cb: DynTreeListCb = Arc::new(move |trees| {
            if let Some(inner) = weak.upgrade() {
                inner.on_tree_list(generation, &cb_owner, kind, trees);
            }
        });

        let sub = match self.c.resolver.list(owner.clone(), cb) {
            Ok(sub) => sub,
            Err(err) => {
                tracing::warn!(
                    "could not subscribe to trees of {owner}: {err}"
                );
                let mut state = self.lock();
                if state.is_current(generation) {
                    state.owner_subs.remove(&owner);
                }
                return;
            }
        };

        let mut state = self.lock();
        let current = state.is_current(generation);
        match state.owner_subs.get_mut(&owner) {
            Some(slot) if current => {
                tracing::debug!("subscribed to {kind:?} trees of {owner}");
                slot.1 = sub;
            }
            // stopped or unfollowed while we were subscribing
            _ => {
                drop(state);
                drop(sub);
            }
        }
    }

    fn on_tree_list(
        self: &Arc<Self>,
        generation: u64,
        owner: &OwnerId,
        kind: OwnerKind,
        trees: Vec<TreeRef>,
    ) {
        if !self.lock().is_current(generation) {
            return;
        }

        let (is_own, priority) = match kind {
            OwnerKind::Own => (true, SyncPriority::Own),
            OwnerKind::Followed => {
                if !self.c.settings.get().sync_followed_public {
                    return;
                }
                (false, SyncPriority::Followed)
            }
        };

        for tree in trees {
            if !tree.key.is_owned_by(owner) {
                tracing::warn!(
                    "ignoring tree {} listed under owner {owner}",
                    tree.key
                );
                continue;
            }

            // other people's private and unlisted trees are never
            // discovered through their tree list
            if kind == OwnerKind::Followed
                && tree.visibility != Visibility::Public
            {
                continue;
            }

            self.queue_tree_sync(SyncTask {
                key: tree.key,
                root: tree.root,
                is_own,
                priority,
            });
        }
    }

    fn on_follow_list(
        self: &Arc<Self>,
        generation: u64,
        follows: Vec<OwnerId>,
    ) {
        // subscriptions track the follow set alone, settings are applied
        // as notifications arrive
        let own: HashSet<OwnerId> =
            self.c.accounts.own_identities().into_iter().collect();
        let wanted: HashSet<OwnerId> =
            follows.into_iter().filter(|f| !own.contains(f)).collect();

        let (added, removed) = {
            let mut state = self.lock();
            if !state.is_current(generation) {
                return;
            }

            let unfollowed: Vec<OwnerId> = state
                .owner_subs
                .iter()
                .filter(|(owner, (kind, _))| {
                    *kind == OwnerKind::Followed && !wanted.contains(*owner)
                })
                .map(|(owner, _)| owner.clone())
                .collect();

            let mut removed = Vec::with_capacity(unfollowed.len());
            for owner in unfollowed {
                if let Some((_, sub)) = state.owner_subs.remove(&owner) {
                    removed.push((owner, sub));
                }
            }

            let added: Vec<OwnerId> = wanted
                .into_iter()
                .filter(|owner| !state.owner_subs.contains_key(owner))
                .collect();

            (added, removed)
        };

        if !added.is_empty() || !removed.is_empty() {
            tracing::info!(
                "follow list changed: {} new, {} dropped",
                added.len(),
                removed.len()
            );
        }

        for (owner, sub) in removed {
            tracing::debug!("unsubscribing from trees of {owner}");
            drop(sub);
        }

        for owner in added {
            self.subscribe_owner(generation, owner, OwnerKind::Followed);
        }
    }

    fn queue_tree_sync(self: &Arc<Self>, task: SyncTask) {
        if !self.c.settings.get().enabled {
            tracing::debug!("sync disabled, ignoring {}", task.key);
            return;
        }

        let mut state = self.lock();
        if !state.running {
            tracing::debug!("sync not running, ignoring {}", task.key);
            return;
        }

        let key = task.key.clone();
        match state.queue.push(task) {
            Queued::Unchanged => {
                tracing::trace!("{key} already queued at this root");
            }
            outcome => {
                tracing::debug!(
                    "{outcome:?} {key}, {} tasks queued",
                    state.queue.len()
                );
                self.schedule_tick(&mut state);
            }
        }
    }

    /// Schedule a processing tick after the debounce, unless one is
    /// already pending.
    fn schedule_tick(self: &Arc<Self>, state: &mut State) {
        if state.tick.is_some() || !state.running {
            return;
        }

        let generation = state.generation;
        let debounce = self.config.debounce();
        let this = self.clone();
        let handle = self.runtime.spawn(async move {
            tokio::time::sleep(debounce).await;
            this.tick(generation).await;
        });
        state.tick = Some(handle.abort_handle());
    }

    async fn tick(self: Arc<Self>, generation: u64) {
        let task = {
            let mut state = self.lock();
            if !state.is_current(generation) {
                return;
            }

            // from here on this tick can no longer be cancelled
            state.tick = None;

            if state.processing {
                return;
            }
            let Some(task) = state.queue.pop() else {
                return;
            };
            state.processing = true;
            task
        };

        self.sync_tree(generation, task).await;

        let current = self.lock().is_current(generation);
        if current {
            if let Err(err) = self.check_quotas().await {
                tracing::warn!("quota check failed: {err}");
            }
        }

        let mut state = self.lock();
        state.processing = false;
        if !state.queue.is_empty() {
            // possibly on behalf of a newer generation
            self.schedule_tick(&mut state);
        }
    }

    async fn sync_tree(&self, generation: u64, task: SyncTask) {
        let SyncTask {
            key, root, is_own, ..
        } = task;

        match self.c.registry.get_tree_sync_state(key.clone()).await {
            Ok(Some(state)) if state.root_hash == root.hash => {
                tracing::debug!("{key} already synced at {}", root.hash);
                return;
            }
            Ok(_) => (),
            Err(err) => {
                tracing::warn!("could not read sync state of {key}: {err}");
                return;
            }
        }

        let pulled = match self.c.tree_store.pull(root.clone()).await {
            Ok(pulled) => pulled,
            Err(err) => {
                let err = SyncError::pull(key, root.hash, err);
                tracing::warn!("{err}");
                return;
            }
        };

        let current = self.lock().is_current(generation);
        if !current {
            tracing::debug!("sync stopped during pull of {key}, discarding");
            return;
        }

        let PullResult {
            chunk_count,
            total_bytes,
            chunks,
        } = pulled;

        if let Err(err) =
            self.c.registry.register_chunks(key.clone(), chunks).await
        {
            tracing::warn!("could not register chunks of {key}: {err}");
            return;
        }

        let state = TreeSyncState {
            owner_id: key.owner_id(),
            key: key.clone(),
            root_hash: root.hash,
            total_bytes,
            last_synced: Timestamp::now(),
            is_own,
        };
        if let Err(err) = self.c.registry.update_tree_sync_state(state).await {
            tracing::warn!("could not record sync state of {key}: {err}");
            return;
        }

        tracing::info!(
            "synced {key}: {chunk_count} chunks, {total_bytes} bytes"
        );
    }

    /// Delete chunk bytes then their records, with bounded concurrency.
    /// Failed deletions are logged and skipped. Returns what was deleted.
    async fn delete_chunks(
        &self,
        chunks: Vec<ChunkRecord>,
    ) -> Vec<ChunkRecord> {
        let concurrency = self.config.eviction_concurrency.max(1) as usize;
        futures::stream::iter(chunks)
            .map(|chunk| async move {
                if let Err(err) =
                    self.c.tree_store.delete_chunk(chunk.id.clone()).await
                {
                    tracing::warn!(
                        "could not delete chunk {}: {err}",
                        chunk.id
                    );
                    return None;
                }
                if let Err(err) =
                    self.c.registry.remove_chunks(vec![chunk.id.clone()]).await
                {
                    tracing::warn!(
                        "could not remove record of chunk {}: {err}",
                        chunk.id
                    );
                }
                Some(chunk)
            })
            .buffer_unordered(concurrency)
            .filter_map(futures::future::ready)
            .collect::<Vec<_>>()
            .await
    }

    async fn cleanup_orphans(&self) -> SyncResult<usize> {
        let orphans = self.c.registry.get_orphaned_chunks().await?;
        if orphans.is_empty() {
            return Ok(0);
        }

        let found = orphans.len();
        let removed = self.delete_chunks(orphans).await.len();
        tracing::info!("removed {removed} of {found} orphaned chunks");
        Ok(removed)
    }
}

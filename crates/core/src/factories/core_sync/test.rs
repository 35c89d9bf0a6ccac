use super::*;
use crate::factories::*;
use treesync_test_utils::{enable_tracing, iter_check, tree_key};

const ME: &str = "me";

struct Harness {
    registry: Arc<MemRegistry>,
    store: Arc<MemTreeStore>,
    resolver: Arc<MemResolver>,
    follows: Arc<MemFollowList>,
    accounts: Arc<MemAccounts>,
    settings: Arc<WatchSettings>,
    sync: CoreSync,
}

impl Harness {
    fn new() -> Self {
        Self::with_settings(SyncSettings::default())
    }

    fn with_settings(settings: SyncSettings) -> Self {
        enable_tracing();

        let registry = Arc::new(MemRegistry::new());
        let store = MemTreeStore::create();
        let resolver = MemResolver::create();
        let follows = MemFollowList::create();
        let accounts = MemAccounts::create(ME);
        let settings = WatchSettings::create(settings);

        let sync = CoreSync::new(
            CoreSyncConfig::default(),
            Collaborators {
                registry: registry.clone(),
                tree_store: store.clone(),
                resolver: resolver.clone(),
                follows: follows.clone(),
                accounts: accounts.clone(),
                settings: settings.clone(),
            },
        );

        Self {
            registry,
            store,
            resolver,
            follows,
            accounts,
            settings,
            sync,
        }
    }

    fn idle(&self) -> bool {
        let state = self.sync.inner.lock();
        state.queue.is_empty() && !state.processing && state.tick.is_none()
    }

    /// Make a tree pullable at a root derived from `n`, returning the root.
    fn remote_tree(&self, n: u8, chunks: &[(u8, u64)]) -> RootPointer {
        let root = RootPointer::new(vec![n; 32]);
        self.store.add_remote_tree(
            root.hash.clone(),
            chunks
                .iter()
                .map(|(id, size)| ChunkInfo {
                    id: chunk_id(*id),
                    size: *size,
                })
                .collect(),
        );
        root
    }

    /// Place a synced tree directly in the store and registry.
    async fn seed(&self, key: &str, chunks: &[(u8, u64)], is_own: bool) {
        let key = tree_key(key);
        let infos: Vec<ChunkInfo> = chunks
            .iter()
            .map(|(id, size)| ChunkInfo {
                id: chunk_id(*id),
                size: *size,
            })
            .collect();
        for c in infos.iter() {
            self.store.store_chunk(c.id.clone(), c.size);
        }
        let total_bytes = infos.iter().map(|c| c.size).sum();
        self.registry
            .register_chunks(key.clone(), infos)
            .await
            .unwrap();
        self.registry
            .update_tree_sync_state(TreeSyncState {
                owner_id: key.owner_id(),
                key,
                root_hash: chunk_id(0xee),
                total_bytes,
                last_synced: Timestamp::now(),
                is_own,
            })
            .await
            .unwrap();
    }

    async fn state_of(&self, key: &str) -> Option<TreeSyncState> {
        self.registry
            .get_tree_sync_state(tree_key(key))
            .await
            .unwrap()
    }
}

fn chunk_id(n: u8) -> ChunkId {
    ChunkId::from(vec![n; 32])
}

fn tree_ref(key: &str, root: &RootPointer, visibility: Visibility) -> TreeRef {
    TreeRef {
        key: tree_key(key),
        root: root.clone(),
        visibility,
    }
}

#[tokio::test(start_paused = true)]
async fn dedup_queueing() {
    let h = Harness::new();
    h.sync.start().await.unwrap();

    let ptr1 = RootPointer::new(vec![1; 32]);
    let ptr2 = RootPointer::new(vec![2; 32]);

    h.sync.queue_tree_sync(
        tree_key("a/t"),
        ptr1.clone(),
        false,
        SyncPriority::Followed,
    );
    h.sync.queue_tree_sync(
        tree_key("a/t"),
        ptr1.clone(),
        false,
        SyncPriority::Followed,
    );
    assert_eq!(1, h.sync.queued_tasks().len());

    h.sync.queue_tree_sync(
        tree_key("a/t"),
        ptr2.clone(),
        false,
        SyncPriority::Followed,
    );
    let tasks = h.sync.queued_tasks();
    assert_eq!(1, tasks.len());
    assert_eq!(ptr2, tasks[0].root);
}

#[tokio::test(start_paused = true)]
async fn drains_in_priority_order() {
    let h = Harness::new();
    h.sync.start().await.unwrap();

    let followed = h.remote_tree(1, &[(1, 10)]);
    let own = h.remote_tree(2, &[(2, 10)]);
    let visited = h.remote_tree(3, &[(3, 10)]);

    h.sync.queue_tree_sync(
        tree_key("f/t"),
        followed.clone(),
        false,
        SyncPriority::Followed,
    );
    h.sync.queue_tree_sync(
        tree_key("me/t"),
        own.clone(),
        true,
        SyncPriority::Own,
    );
    h.sync.queue_tree_sync(
        tree_key("v/t"),
        visited.clone(),
        false,
        SyncPriority::Visited,
    );

    iter_check!({
        if h.store.pulls().len() == 3 {
            break;
        }
    });

    assert_eq!(vec![own, visited, followed], h.store.pulls());
}

#[tokio::test(start_paused = true)]
async fn pull_registers_chunks_and_state() {
    let h = Harness::new();
    let root = h.remote_tree(1, &[(1, 100), (2, 50)]);
    h.resolver
        .publish(tree_ref("me/docs", &root, Visibility::Private));

    h.sync.start().await.unwrap();

    let state = iter_check!({
        if let Some(state) = h.state_of("me/docs").await {
            break state;
        }
    });

    assert_eq!(OwnerId::from(ME), state.owner_id);
    assert_eq!(root.hash, state.root_hash);
    assert_eq!(150, state.total_bytes);
    assert!(state.is_own);

    let rec = h.registry.get_chunk(chunk_id(2)).await.unwrap().unwrap();
    assert_eq!(50, rec.size);
    assert!(rec.owners.contains(&tree_key("me/docs")));
}

#[tokio::test(start_paused = true)]
async fn skips_pull_when_already_synced() {
    let h = Harness::new();
    let root = h.remote_tree(1, &[(1, 100)]);
    h.registry
        .update_tree_sync_state(TreeSyncState {
            key: tree_key("x/t"),
            owner_id: "x".into(),
            root_hash: root.hash.clone(),
            total_bytes: 100,
            last_synced: Timestamp::now(),
            is_own: false,
        })
        .await
        .unwrap();

    h.sync.start().await.unwrap();
    h.sync
        .queue_tree_sync(tree_key("x/t"), root, false, SyncPriority::Visited);
    assert!(!h.idle());

    iter_check!({
        if h.idle() {
            break;
        }
    });

    assert!(h.store.pulls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_pull_is_dropped_until_renotified() {
    let h = Harness::new();
    let root = h.remote_tree(1, &[(1, 100)]);
    h.store.set_fail_pulls(true);

    h.sync.start().await.unwrap();
    h.resolver
        .publish(tree_ref("me/t", &root, Visibility::Public));

    iter_check!({
        if h.idle() && h.store.pulls().len() == 1 {
            break;
        }
    });
    assert!(h.state_of("me/t").await.is_none());
    assert!(h.sync.queued_tasks().is_empty());

    h.store.set_fail_pulls(false);
    h.resolver
        .publish(tree_ref("me/t", &root, Visibility::Public));

    iter_check!({
        if h.state_of("me/t").await.is_some() {
            break;
        }
    });
    assert_eq!(2, h.store.pulls().len());
}

#[tokio::test(start_paused = true)]
async fn start_is_idempotent() {
    let h = Harness::new();
    h.sync.start().await.unwrap();
    h.sync.start().await.unwrap();

    assert!(h.sync.is_running());
    assert_eq!(1, h.resolver.subscriber_count(&ME.into()));
    assert_eq!(1, h.follows.subscriber_count(&ME.into()));
}

#[tokio::test(start_paused = true)]
async fn stop_clears_state_and_restart_resubscribes_once() {
    let h = Harness::new();
    let gate = h.store.gate_pulls();
    h.follows.set_follows(&ME.into(), vec!["x".into()]);

    h.sync.start().await.unwrap();
    assert_eq!(1, h.resolver.subscriber_count(&"x".into()));

    h.sync.queue_tree_sync(
        tree_key("x/a"),
        RootPointer::new(vec![1; 32]),
        false,
        SyncPriority::Followed,
    );
    h.sync.queue_tree_sync(
        tree_key("x/b"),
        RootPointer::new(vec![2; 32]),
        false,
        SyncPriority::Followed,
    );

    h.sync.stop().await;
    h.sync.stop().await;

    assert!(!h.sync.is_running());
    assert!(h.sync.queued_tasks().is_empty());
    assert!(h.sync.inner.lock().tick.is_none());
    assert_eq!(0, h.resolver.subscriber_count(&ME.into()));
    assert_eq!(0, h.resolver.subscriber_count(&"x".into()));
    assert_eq!(0, h.follows.subscriber_count(&ME.into()));

    // queueing while stopped is ignored
    h.sync.queue_tree_sync(
        tree_key("x/a"),
        RootPointer::new(vec![1; 32]),
        false,
        SyncPriority::Followed,
    );
    assert!(h.sync.queued_tasks().is_empty());

    h.sync.start().await.unwrap();
    assert_eq!(1, h.resolver.subscriber_count(&ME.into()));
    assert_eq!(1, h.resolver.subscriber_count(&"x".into()));
    assert_eq!(1, h.follows.subscriber_count(&ME.into()));

    // one notification, one queued task
    let root = h.remote_tree(3, &[(3, 1)]);
    h.resolver.publish(tree_ref("x/c", &root, Visibility::Public));
    assert_eq!(1, h.sync.queued_tasks().len());

    gate.add_permits(1);
    iter_check!({
        if h.state_of("x/c").await.is_some() {
            break;
        }
    });
    assert_eq!(vec![root], h.store.pulls());
}

#[tokio::test(start_paused = true)]
async fn stop_discards_in_flight_pull() {
    let h = Harness::new();
    let gate = h.store.gate_pulls();
    let root = h.remote_tree(1, &[(1, 100)]);

    h.sync.start().await.unwrap();
    h.sync.queue_tree_sync(
        tree_key("me/t"),
        root.clone(),
        true,
        SyncPriority::Own,
    );

    iter_check!({
        if h.sync.inner.lock().processing {
            break;
        }
    });

    h.sync.stop().await;
    gate.add_permits(1);

    iter_check!({
        if !h.sync.inner.lock().processing {
            break;
        }
    });

    assert_eq!(1, h.store.pulls().len());
    assert!(h.state_of("me/t").await.is_none());
    assert!(h.registry.get_chunk(chunk_id(1)).await.unwrap().is_none());

    // a fresh start pulls it again from persisted state
    h.sync.start().await.unwrap();
    h.sync.queue_tree_sync(
        tree_key("me/t"),
        root.clone(),
        true,
        SyncPriority::Own,
    );
    gate.add_permits(1);
    iter_check!({
        if h.state_of("me/t").await.is_some() {
            break;
        }
    });
}

#[tokio::test(start_paused = true)]
async fn restart_during_in_flight_pull_keeps_draining() {
    let h = Harness::new();
    let gate = h.store.gate_pulls();
    let first = h.remote_tree(1, &[(1, 1)]);
    let second = h.remote_tree(2, &[(2, 1)]);

    h.sync.start().await.unwrap();
    h.sync
        .queue_tree_sync(tree_key("me/a"), first, true, SyncPriority::Own);
    iter_check!({
        if h.sync.inner.lock().processing {
            break;
        }
    });

    h.sync.stop().await;
    h.sync.start().await.unwrap();
    h.sync
        .queue_tree_sync(tree_key("me/b"), second, true, SyncPriority::Own);

    gate.add_permits(2);
    iter_check!({
        if h.state_of("me/b").await.is_some() {
            break;
        }
    });
    assert!(h.state_of("me/a").await.is_none());
}

#[tokio::test(start_paused = true)]
async fn follow_list_diff() {
    let h = Harness::new();
    h.sync.start().await.unwrap();

    h.follows
        .set_follows(&ME.into(), vec!["x".into(), "y".into(), ME.into()]);
    assert_eq!(1, h.resolver.subscriber_count(&"x".into()));
    assert_eq!(1, h.resolver.subscriber_count(&"y".into()));
    // own identity stays subscribed once, as own
    assert_eq!(1, h.resolver.subscriber_count(&ME.into()));

    let public = h.remote_tree(1, &[(1, 1)]);
    let unlisted = h.remote_tree(2, &[(2, 1)]);
    h.resolver
        .publish(tree_ref("x/pub", &public, Visibility::Public));
    h.resolver
        .publish(tree_ref("x/link", &unlisted, Visibility::Unlisted));

    let tasks = h.sync.queued_tasks();
    assert_eq!(1, tasks.len());
    assert_eq!(tree_key("x/pub"), tasks[0].key);
    assert_eq!(SyncPriority::Followed, tasks[0].priority);
    assert!(!tasks[0].is_own);

    h.follows.set_follows(&ME.into(), vec!["x".into()]);
    assert_eq!(1, h.resolver.subscriber_count(&"x".into()));
    assert_eq!(0, h.resolver.subscriber_count(&"y".into()));

    // unfollowed owners are no longer heard
    let y_root = h.remote_tree(3, &[(3, 1)]);
    h.resolver.publish(tree_ref("y/t", &y_root, Visibility::Public));
    assert!(h
        .sync
        .queued_tasks()
        .iter()
        .all(|t| t.key != tree_key("y/t")));
}

#[tokio::test(start_paused = true)]
async fn own_trees_all_visibilities_at_top_priority() {
    let h = Harness::new();
    h.accounts.add_identity("alt");
    h.sync.start().await.unwrap();

    let a = h.remote_tree(1, &[(1, 1)]);
    let b = h.remote_tree(2, &[(2, 1)]);
    h.resolver.publish(tree_ref("alt/secret", &a, Visibility::Private));
    h.resolver.publish(tree_ref("me/link", &b, Visibility::Unlisted));

    let tasks = h.sync.queued_tasks();
    assert_eq!(2, tasks.len());
    assert!(tasks
        .iter()
        .all(|t| t.is_own && t.priority == SyncPriority::Own));
}

#[tokio::test(start_paused = true)]
async fn followed_sync_toggled_off_and_on() {
    let h = Harness::new();
    h.settings.update(|s| s.sync_followed_public = false);
    h.sync.start().await.unwrap();

    // still subscribed, notifications are what the setting gates
    h.follows.set_follows(&ME.into(), vec!["x".into()]);
    assert_eq!(1, h.resolver.subscriber_count(&"x".into()));

    let root = h.remote_tree(1, &[(1, 10)]);
    h.resolver.publish(tree_ref("x/pub", &root, Visibility::Public));
    assert!(h.sync.queued_tasks().is_empty());

    h.settings.update(|s| s.sync_followed_public = true);
    h.resolver.publish(tree_ref("x/pub", &root, Visibility::Public));
    assert_eq!(1, h.sync.queued_tasks().len());

    iter_check!({
        if h.state_of("x/pub").await.is_some() {
            break;
        }
    });
    assert_eq!(1, h.resolver.subscriber_count(&"x".into()));
}

#[tokio::test(start_paused = true)]
async fn follows_survive_disabled_sync() {
    let h = Harness::new();
    h.sync.start().await.unwrap();

    h.settings.update(|s| s.enabled = false);
    h.follows.set_follows(&ME.into(), vec!["x".into()]);
    assert_eq!(1, h.resolver.subscriber_count(&"x".into()));

    let root = h.remote_tree(1, &[(1, 10)]);
    h.resolver.publish(tree_ref("x/pub", &root, Visibility::Public));
    assert!(h.sync.queued_tasks().is_empty());

    h.settings.update(|s| s.enabled = true);
    h.resolver.publish(tree_ref("x/pub", &root, Visibility::Public));

    iter_check!({
        if h.state_of("x/pub").await.is_some() {
            break;
        }
    });
    assert_eq!(vec![root], h.store.pulls());
}

#[tokio::test(start_paused = true)]
async fn disabled_sync_queues_nothing() {
    let h = Harness::with_settings(SyncSettings {
        enabled: false,
        ..Default::default()
    });
    h.sync.start().await.unwrap();

    h.sync.queue_tree_sync(
        tree_key("me/t"),
        RootPointer::new(vec![1; 32]),
        true,
        SyncPriority::Own,
    );
    h.sync
        .queue_visited_tree(tree_key("x/t"), RootPointer::new(vec![2; 32]));
    assert!(h.sync.queued_tasks().is_empty());
}

#[tokio::test(start_paused = true)]
async fn visited_trees() {
    let h = Harness::new();
    h.sync.start().await.unwrap();

    h.sync
        .queue_visited_tree(tree_key("x/t"), RootPointer::new(vec![1; 32]));
    h.sync
        .queue_visited_tree(tree_key("me/t"), RootPointer::new(vec![2; 32]));

    let tasks = h.sync.queued_tasks();
    assert_eq!(2, tasks.len());
    assert!(tasks.iter().all(|t| t.priority == SyncPriority::Visited));
    assert!(!tasks[0].is_own);
    assert!(tasks[1].is_own);

    h.settings.update(|s| s.sync_visited_unlisted = false);
    h.sync
        .queue_visited_tree(tree_key("y/t"), RootPointer::new(vec![3; 32]));
    assert_eq!(2, h.sync.queued_tasks().len());
}

#[tokio::test(start_paused = true)]
async fn quota_fair_split() {
    let h = Harness::with_settings(SyncSettings {
        storage_cap: 1000,
        own_quota_percent: 50,
        ..Default::default()
    });

    // X holds 400 bytes, Y 300, and our own data 400
    let x: Vec<(u8, u64)> = (10..18).map(|n| (n, 50)).collect();
    let y: Vec<(u8, u64)> = (20..26).map(|n| (n, 50)).collect();
    let me: Vec<(u8, u64)> = (30..38).map(|n| (n, 50)).collect();
    h.seed("x/t", &x, false).await;
    h.seed("y/t", &y, false).await;
    h.seed("me/t", &me, true).await;

    let report = h.sync.check_quotas().await.unwrap();
    assert_eq!(1100, report.total_bytes);
    assert_eq!(Some(250), report.per_user_quota);
    assert_eq!(2, report.evictions.len());

    let ex = &report.evictions[0];
    assert_eq!(OwnerId::from("x"), ex.owner_id);
    assert_eq!(150, ex.target_bytes);
    assert_eq!(150, ex.freed_bytes);
    let mut evicted = ex.evicted.clone();
    evicted.sort();
    assert_eq!(vec![chunk_id(10), chunk_id(11), chunk_id(12)], evicted);

    let ey = &report.evictions[1];
    assert_eq!(OwnerId::from("y"), ey.owner_id);
    assert_eq!(50, ey.target_bytes);
    assert_eq!(vec![chunk_id(20)], ey.evicted);

    for n in [10, 11, 12, 20] {
        assert!(!h.store.has_chunk(&chunk_id(n)));
        assert!(h.registry.get_chunk(chunk_id(n)).await.unwrap().is_none());
    }
    for n in 30..38 {
        assert!(h.store.has_chunk(&chunk_id(n)));
    }
    assert_eq!(4, report.evicted_count());
}

#[tokio::test(start_paused = true)]
async fn quota_noop_below_cap() {
    let h = Harness::with_settings(SyncSettings {
        storage_cap: 1000,
        own_quota_percent: 90,
        ..Default::default()
    });
    h.seed("x/t", &[(1, 600)], false).await;
    h.seed("y/t", &[(2, 10)], false).await;

    let report = h.sync.check_quotas().await.unwrap();
    assert_eq!(0, report.evicted_count());
    assert_eq!(None, report.per_user_quota);
    assert!(h.store.has_chunk(&chunk_id(1)));
}

#[tokio::test(start_paused = true)]
async fn quota_only_own_data() {
    let h = Harness::with_settings(SyncSettings {
        storage_cap: 10,
        ..Default::default()
    });
    h.seed("me/t", &[(1, 600)], true).await;

    let report = h.sync.check_quotas().await.unwrap();
    assert_eq!(0, report.evicted_count());
    assert!(h.store.has_chunk(&chunk_id(1)));
}

#[tokio::test(start_paused = true)]
async fn quota_never_evicts_shared_chunks() {
    let h = Harness::with_settings(SyncSettings {
        storage_cap: 100,
        own_quota_percent: 0,
        ..Default::default()
    });

    // chunk 1 is x's oldest, but y needs it too
    h.seed("x/a", &[(1, 100), (2, 100)], false).await;
    h.registry
        .register_chunks(
            tree_key("y/b"),
            vec![ChunkInfo {
                id: chunk_id(1),
                size: 100,
            }],
        )
        .await
        .unwrap();
    // make chunk 1 the oldest again
    h.registry.touch_chunks(vec![chunk_id(2)]).await.unwrap();

    let report = h.sync.check_quotas().await.unwrap();
    assert_eq!(Some(100), report.per_user_quota);
    assert_eq!(1, report.evictions.len());
    assert_eq!(vec![chunk_id(2)], report.evictions[0].evicted);
    assert!(h.store.has_chunk(&chunk_id(1)));
}

#[tokio::test(start_paused = true)]
async fn quota_skips_failed_deletions() {
    let h = Harness::with_settings(SyncSettings {
        storage_cap: 100,
        own_quota_percent: 0,
        ..Default::default()
    });
    h.seed("x/t", &[(1, 100), (2, 100), (3, 100)], false).await;
    h.store.fail_delete(chunk_id(1));

    let report = h.sync.check_quotas().await.unwrap();
    assert_eq!(vec![chunk_id(2)], report.evictions[0].evicted);
    assert_eq!(100, report.evictions[0].freed_bytes);
    assert!(h.registry.get_chunk(chunk_id(1)).await.unwrap().is_some());
    assert!(h.store.has_chunk(&chunk_id(1)));
}

#[tokio::test(start_paused = true)]
async fn disabled_sync_never_evicts() {
    let h = Harness::with_settings(SyncSettings {
        enabled: false,
        storage_cap: 1,
        ..Default::default()
    });
    h.seed("x/t", &[(1, 100)], false).await;

    let report = h.sync.check_quotas().await.unwrap();
    assert_eq!(0, report.evicted_count());
}

#[tokio::test(start_paused = true)]
async fn quota_runs_after_each_pull() {
    let h = Harness::with_settings(SyncSettings {
        storage_cap: 100,
        own_quota_percent: 50,
        ..Default::default()
    });
    h.follows.set_follows(&ME.into(), vec!["x".into()]);
    h.sync.start().await.unwrap();

    let root = h.remote_tree(1, &[(1, 60), (2, 60)]);
    h.resolver.publish(tree_ref("x/t", &root, Visibility::Public));

    iter_check!({
        if h.state_of("x/t").await.is_some() && h.idle() {
            break;
        }
    });

    // 120 bytes over a 50 byte allowance
    assert!(!h.store.has_chunk(&chunk_id(1)));
    assert!(!h.store.has_chunk(&chunk_id(2)));
}

#[tokio::test(start_paused = true)]
async fn remove_tree_then_cleanup_orphans() {
    let h = Harness::new();
    h.seed("x/a", &[(1, 10), (2, 10)], false).await;
    h.seed("x/b", &[(2, 10)], false).await;

    h.sync.remove_tree(tree_key("x/a")).await.unwrap();
    assert!(h.state_of("x/a").await.is_none());
    assert!(h.store.has_chunk(&chunk_id(1)));

    assert_eq!(1, h.sync.cleanup_orphans().await.unwrap());
    assert!(!h.store.has_chunk(&chunk_id(1)));
    assert!(h.store.has_chunk(&chunk_id(2)));
    assert!(h.registry.get_chunk(chunk_id(1)).await.unwrap().is_none());

    assert_eq!(0, h.sync.cleanup_orphans().await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn storage_breakdown_and_synced_trees() {
    let h = Harness::new();
    h.accounts.add_identity("alt");
    h.seed("x/b", &[(1, 10)], false).await;
    h.seed("x/a", &[(2, 20)], false).await;
    h.seed("me/a", &[(3, 5)], true).await;
    // synced while the other account was not yet known as own
    h.seed("alt/a", &[(4, 1)], false).await;

    let breakdown = h.sync.storage_breakdown().await.unwrap();
    assert_eq!(
        vec![
            UserStorage {
                owner_id: "alt".into(),
                bytes: 1,
                is_own: true,
            },
            UserStorage {
                owner_id: ME.into(),
                bytes: 5,
                is_own: true,
            },
            UserStorage {
                owner_id: "x".into(),
                bytes: 30,
                is_own: false,
            },
        ],
        breakdown
    );

    let keys: Vec<TreeKey> = h
        .sync
        .synced_trees()
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.key)
        .collect();
    assert_eq!(
        vec![
            tree_key("alt/a"),
            tree_key("me/a"),
            tree_key("x/a"),
            tree_key("x/b")
        ],
        keys
    );
}

#[tokio::test(start_paused = true)]
async fn one_pending_tick_per_burst() {
    let h = Harness::new();
    let gate = h.store.gate_pulls();
    let metrics = tokio::runtime::Handle::current().metrics();
    let debounce = CoreSyncConfig::default().debounce();
    h.sync.start().await.unwrap();

    let mut roots = Vec::new();
    for n in 1..=3 {
        let root = h.remote_tree(n, &[(n, 10)]);
        h.sync.queue_tree_sync(
            tree_key(&format!("me/{n}")),
            root.clone(),
            true,
            SyncPriority::Own,
        );
        roots.push(root);

        assert!(h.sync.inner.lock().tick.is_some());
        assert_eq!(1, metrics.num_alive_tasks());
        tokio::time::advance(debounce / 4).await;
    }

    // the window runs from the first push, and has not closed yet
    assert!(!h.sync.inner.lock().processing);
    assert_eq!(3, h.sync.queued_tasks().len());

    tokio::time::advance(debounce / 2).await;
    iter_check!({
        if h.sync.inner.lock().processing {
            break;
        }
    });

    // one pass, one task taken, the rest wait for the next tick
    assert_eq!(2, h.sync.queued_tasks().len());
    assert!(h.sync.inner.lock().tick.is_none());
    assert_eq!(1, metrics.num_alive_tasks());

    gate.add_permits(3);
    iter_check!({
        if h.store.pulls().len() == 3 && h.idle() {
            break;
        }
    });
    assert_eq!(roots, h.store.pulls());
}

#[tokio::test(start_paused = true)]
async fn quota_repeats_against_last_pulled_size() {
    let h = Harness::with_settings(SyncSettings {
        storage_cap: 500,
        own_quota_percent: 50,
        ..Default::default()
    });
    let x: Vec<(u8, u64)> = (10..16).map(|n| (n, 100)).collect();
    let me: Vec<(u8, u64)> = (30..34).map(|n| (n, 100)).collect();
    h.seed("x/t", &x, false).await;
    h.seed("me/t", &me, true).await;

    // 600 bytes against a 250 byte allowance
    let first = h.sync.check_quotas().await.unwrap();
    assert_eq!(Some(250), first.per_user_quota);
    assert_eq!(350, first.evictions[0].target_bytes);
    assert_eq!(400, first.evictions[0].freed_bytes);

    // still over the cap, and x is still charged for the full tree
    let second = h.sync.check_quotas().await.unwrap();
    assert_eq!(600, second.total_bytes);
    assert_eq!(350, second.evictions[0].target_bytes);
    assert_eq!(200, second.evictions[0].freed_bytes);
    assert_eq!(600, h.state_of("x/t").await.unwrap().total_bytes);

    for n in 10..16 {
        assert!(!h.store.has_chunk(&chunk_id(n)));
    }

    let third = h.sync.check_quotas().await.unwrap();
    assert_eq!(400, third.total_bytes);
    assert_eq!(0, third.evicted_count());
}

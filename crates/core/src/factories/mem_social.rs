//! Memory-based follow-list and account providers for testing.

use crate::common::Dispatcher;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use treesync_api::*;

/// A memory-based [FollowListProvider].
#[derive(Default)]
pub struct MemFollowList {
    follows: Mutex<HashMap<OwnerId, Vec<OwnerId>>>,
    dispatch: Dispatcher<OwnerId, Vec<OwnerId>>,
}

impl std::fmt::Debug for MemFollowList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemFollowList").finish()
    }
}

impl MemFollowList {
    /// Construct a follow-list provider where nobody follows anyone.
    pub fn create() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<OwnerId, Vec<OwnerId>>> {
        self.follows.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Replace the follow list of `user` and notify subscribers.
    pub fn set_follows(&self, user: &OwnerId, follows: Vec<OwnerId>) {
        self.lock().insert(user.clone(), follows.clone());
        self.dispatch.emit(user, follows);
    }

    /// Number of live subscriptions to `user`'s follow list.
    pub fn subscriber_count(&self, user: &OwnerId) -> usize {
        self.dispatch.count(user)
    }
}

impl FollowListProvider for MemFollowList {
    fn subscribe(
        &self,
        user: OwnerId,
        cb: DynFollowListCb,
    ) -> SyncResult<Subscription> {
        let sub = self.dispatch.subscribe(user.clone(), cb.clone());
        let current = self.lock().get(&user).cloned();
        if let Some(current) = current {
            cb(current);
        }
        Ok(sub)
    }
}

#[derive(Debug, Default)]
struct Accounts {
    current: Option<OwnerId>,
    all: Vec<OwnerId>,
}

/// A memory-based [AccountProvider].
#[derive(Debug, Default)]
pub struct MemAccounts(Mutex<Accounts>);

impl MemAccounts {
    /// Construct a provider logged in as `current`.
    pub fn create(current: impl Into<OwnerId>) -> Arc<Self> {
        let current = current.into();
        Arc::new(Self(Mutex::new(Accounts {
            current: Some(current.clone()),
            all: vec![current],
        })))
    }

    fn lock(&self) -> MutexGuard<'_, Accounts> {
        self.0.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Add another identity held by the local user.
    pub fn add_identity(&self, id: impl Into<OwnerId>) {
        let id = id.into();
        let mut lock = self.lock();
        if !lock.all.contains(&id) {
            lock.all.push(id);
        }
    }

    /// Switch the active identity, adding it if new.
    pub fn switch_to(&self, id: impl Into<OwnerId>) {
        let id = id.into();
        self.add_identity(id.clone());
        self.lock().current = Some(id);
    }

    /// Log out of the active identity.
    pub fn log_out(&self) {
        self.lock().current = None;
    }
}

impl AccountProvider for MemAccounts {
    fn current(&self) -> Option<OwnerId> {
        self.lock().current.clone()
    }

    fn own_identities(&self) -> Vec<OwnerId> {
        self.lock().all.clone()
    }
}

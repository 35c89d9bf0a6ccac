//! Identity and social-graph collaborator types.

use crate::*;
use std::sync::Arc;

/// Receives the current, and every subsequently updated, follow list.
pub type DynFollowListCb = Arc<dyn Fn(Vec<OwnerId>) + 'static + Send + Sync>;

/// Provides the list of identities followed by a local user.
pub trait FollowListProvider: 'static + Send + Sync + std::fmt::Debug {
    /// Subscribe to the follow list of `user`.
    ///
    /// The callback may be invoked synchronously from within this call
    /// with the currently known list.
    fn subscribe(
        &self,
        user: OwnerId,
        cb: DynFollowListCb,
    ) -> SyncResult<Subscription>;
}

/// Trait-object [FollowListProvider].
pub type DynFollowListProvider = Arc<dyn FollowListProvider>;

/// Provides the local user's own identities.
///
/// A user may hold several accounts at once. Data owned by any of them
/// is "own" data and is never evicted by quota enforcement.
pub trait AccountProvider: 'static + Send + Sync + std::fmt::Debug {
    /// The currently active identity, if logged in.
    fn current(&self) -> Option<OwnerId>;

    /// Every identity held by the local user, including the current one.
    fn own_identities(&self) -> Vec<OwnerId>;
}

/// Trait-object [AccountProvider].
pub type DynAccountProvider = Arc<dyn AccountProvider>;

//! Reference resolver types.
//!
//! Owners publish the current root pointer of each of their named trees
//! through the resolver; subscribers are notified when those pointers move.

use crate::*;
use std::sync::Arc;

/// Who may read a published tree.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum Visibility {
    /// Readable by anyone.
    Public,

    /// Readable by anyone holding the link (and its key).
    Unlisted,

    /// Readable only by the owner.
    Private,
}

/// A published tree reference.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TreeRef {
    /// The tree.
    pub key: TreeKey,

    /// Its current root pointer.
    pub root: RootPointer,

    /// Who may read it.
    pub visibility: Visibility,
}

/// A live subscription. Dropping it (or calling [Subscription::unsubscribe])
/// cancels the subscription exactly once.
#[must_use = "dropping a Subscription cancels it"]
pub struct Subscription(Option<Box<dyn FnOnce() + 'static + Send>>);

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Subscription")
            .field(&self.0.is_some())
            .finish()
    }
}

impl Subscription {
    /// Wrap an unsubscribe function.
    pub fn new<F: FnOnce() + 'static + Send>(unsubscribe: F) -> Self {
        Self(Some(Box::new(unsubscribe)))
    }

    /// A subscription with nothing to cancel.
    pub fn noop() -> Self {
        Self(None)
    }

    /// Cancel the subscription.
    pub fn unsubscribe(mut self) {
        self.cancel();
    }

    fn cancel(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Receives the current, and every subsequently updated, list of an
/// owner's published trees.
pub type DynTreeListCb = Arc<dyn Fn(Vec<TreeRef>) + 'static + Send + Sync>;

/// The external pub/sub mechanism by which owners publish, and subscribers
/// discover, current root pointers for named trees.
pub trait ReferenceResolver: 'static + Send + Sync + std::fmt::Debug {
    /// Subscribe to the tree list of `owner`.
    ///
    /// The callback may be invoked synchronously from within this call
    /// with the currently known list.
    fn list(
        &self,
        owner: OwnerId,
        cb: DynTreeListCb,
    ) -> SyncResult<Subscription>;
}

/// Trait-object [ReferenceResolver].
pub type DynReferenceResolver = Arc<dyn ReferenceResolver>;

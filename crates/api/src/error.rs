//! Treesync error types.

use crate::{ChunkId, TreeKey};
use std::sync::Arc;

/// A clonable trait-object inner error.
#[derive(Clone, Default)]
pub struct DynInnerError(
    pub Option<Arc<dyn std::error::Error + 'static + Send + Sync>>,
);

impl std::fmt::Debug for DynInnerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Display for DynInnerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.as_ref() {
            None => f.write_str("None"),
            Some(s) => s.fmt(f),
        }
    }
}

impl std::error::Error for DynInnerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.as_ref().map(|s| {
            let out: &(dyn std::error::Error + 'static) = &**s;
            out
        })
    }
}

impl DynInnerError {
    /// Construct a new DynInnerError from a source error.
    pub fn new<E: std::error::Error + 'static + Send + Sync>(e: E) -> Self {
        Self(Some(Arc::new(e)))
    }
}

/// The treesync error type, returned by every registry, store and
/// collaborator api.
///
/// The sync service itself never hands these to its callers for background
/// work. Pull, delete and registry failures are logged and skipped.
///
/// Must stay `Clone` so results can be shared between tasks.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
    /// Generic treesync error.
    #[error("{ctx} (src: {src})")]
    Other {
        /// Any context associated with this error.
        ctx: Arc<str>,

        /// The inner error (if any).
        #[source]
        src: DynInnerError,
    },

    /// A tree key without the `"<ownerId>/<treeName>"` shape.
    #[error("invalid tree key {key:?}, expected \"<ownerId>/<treeName>\"")]
    InvalidTreeKey {
        /// The rejected input.
        key: Arc<str>,
    },

    /// The tree store could not pull a tree.
    #[error("pull of {key} at {root} failed (src: {src})")]
    Pull {
        /// The tree being pulled.
        key: TreeKey,

        /// The root hash it was pulled at.
        root: ChunkId,

        /// The store error.
        #[source]
        src: DynInnerError,
    },
}

impl SyncError {
    /// Construct an "other" error with an inner source error.
    pub fn other_src<
        C: std::fmt::Display,
        S: std::error::Error + 'static + Send + Sync,
    >(
        ctx: C,
        src: S,
    ) -> Self {
        Self::Other {
            ctx: ctx.to_string().into_boxed_str().into(),
            src: DynInnerError::new(src),
        }
    }

    /// Construct an [SyncError::InvalidTreeKey] error.
    pub fn invalid_tree_key(key: &str) -> Self {
        Self::InvalidTreeKey { key: key.into() }
    }

    /// Wrap a tree store failure with the tree and root it concerned.
    pub fn pull(key: TreeKey, root: ChunkId, src: SyncError) -> Self {
        Self::Pull {
            key,
            root,
            src: DynInnerError::new(src),
        }
    }

    /// Construct an "other" error.
    pub fn other<C: std::fmt::Display>(ctx: C) -> Self {
        Self::Other {
            ctx: ctx.to_string().into_boxed_str().into(),
            src: DynInnerError::default(),
        }
    }
}

/// The treesync result type.
pub type SyncResult<T> = Result<T, SyncError>;

#![deny(missing_docs)]
//! Treesync local replica sync and storage quota engine.

use std::sync::Arc;
use treesync_api::*;

/// Construct a default builder around the given collaborators.
///
/// - `registry` - The default registry is [factories::MemRegistry].
/// - `sync` - The default sync service is [factories::CoreSyncFactory].
pub fn default_builder(
    tree_store: DynTreeStore,
    resolver: DynReferenceResolver,
    follows: DynFollowListProvider,
    accounts: DynAccountProvider,
    settings: DynSettingsProvider,
) -> Builder {
    Builder {
        config: Config::default(),
        registry: Arc::new(factories::MemRegistry::new()),
        tree_store,
        resolver,
        follows,
        accounts,
        settings,
        sync: factories::CoreSyncFactory::create(),
    }
}

pub mod factories;

mod common;

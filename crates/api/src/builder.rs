//! Builder-related types.

use crate::*;
use std::sync::Arc;

/// The general treesync builder.
///
/// This holds the static configuration, the external collaborators the
/// engine is injected with, and the factory for the sync service itself.
#[derive(Debug)]
pub struct Builder {
    /// The module configuration to be used when building modules.
    /// This can be loaded from disk or modified before building.
    pub config: Config,

    /// The chunk ownership registry.
    pub registry: DynSyncRegistry,

    /// The local content-addressed store.
    pub tree_store: DynTreeStore,

    /// The reference resolver network.
    pub resolver: DynReferenceResolver,

    /// The social graph.
    pub follows: DynFollowListProvider,

    /// The local user's identities.
    pub accounts: DynAccountProvider,

    /// Runtime sync settings.
    pub settings: DynSettingsProvider,

    /// The [SyncServiceFactory] to be used for creating
    /// [SyncService] instances.
    pub sync: DynSyncServiceFactory,
}

impl Builder {
    /// Construct a default config given the configured module factories.
    pub fn with_default_config(self) -> SyncResult<Self> {
        self.sync.default_config(&self.config)?;
        Ok(self)
    }

    /// Freeze the builder and construct the sync service.
    pub async fn build(self) -> SyncResult<DynSyncService> {
        let builder = Arc::new(self);
        builder.sync.create(builder.clone()).await
    }
}

//! Factories for generating instances of treesync modules.

pub mod mem_registry;
pub use mem_registry::*;

pub mod core_sync;
pub use core_sync::CoreSyncFactory;

mod mem_tree_store;
pub use mem_tree_store::*;

mod mem_resolver;
pub use mem_resolver::*;

mod mem_social;
pub use mem_social::*;

mod watch_settings;
pub use watch_settings::*;

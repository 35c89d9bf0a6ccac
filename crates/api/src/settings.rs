//! Runtime sync settings.

use std::sync::Arc;

/// User-tunable sync settings.
///
/// These are read at each decision point. Changes take effect on the next
/// scheduling or quota pass, never retroactively.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncSettings {
    /// Master switch. When off nothing is queued and nothing is evicted.
    pub enabled: bool,

    /// Local storage budget in bytes.
    pub storage_cap: u64,

    /// Percentage (0-100) of the budget reserved for own data.
    /// Values above 100 are treated as 100.
    pub own_quota_percent: u8,

    /// Mirror the public trees of followed users.
    pub sync_followed_public: bool,

    /// Mirror unlisted trees the user has visited.
    pub sync_visited_unlisted: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            storage_cap: 1024 * 1024 * 1024,
            own_quota_percent: 50,
            sync_followed_public: true,
            sync_visited_unlisted: true,
        }
    }
}

impl SyncSettings {
    /// The share of the budget available to everyone else's data.
    pub fn others_quota(&self) -> u64 {
        let others_percent = 100 - self.own_quota_percent.min(100) as u128;
        (self.storage_cap as u128 * others_percent / 100) as u64
    }
}

/// Provides the current [SyncSettings].
pub trait SettingsProvider: 'static + Send + Sync + std::fmt::Debug {
    /// Read the current settings.
    fn get(&self) -> SyncSettings;
}

/// Trait-object [SettingsProvider].
pub type DynSettingsProvider = Arc<dyn SettingsProvider>;

//! A [SettingsProvider] backed by a tokio watch channel.

use std::sync::Arc;
use tokio::sync::watch;
use treesync_api::*;

/// Holds the current [SyncSettings] and lets any number of observers
/// follow changes.
#[derive(Debug)]
pub struct WatchSettings(watch::Sender<SyncSettings>);

impl WatchSettings {
    /// Construct a provider holding `initial`.
    pub fn create(initial: SyncSettings) -> Arc<Self> {
        Arc::new(Self(watch::Sender::new(initial)))
    }

    /// Replace the settings.
    pub fn set(&self, settings: SyncSettings) {
        self.0.send_replace(settings);
    }

    /// Modify the settings in place.
    pub fn update(&self, f: impl FnOnce(&mut SyncSettings)) {
        self.0.send_modify(f);
    }

    /// Observe changes.
    pub fn subscribe(&self) -> watch::Receiver<SyncSettings> {
        self.0.subscribe()
    }
}

impl SettingsProvider for WatchSettings {
    fn get(&self) -> SyncSettings {
        self.0.borrow().clone()
    }
}

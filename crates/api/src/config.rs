//! Types for use when configuring treesync modules.

use crate::*;

/// helper transcode function
fn tc<S: serde::Serialize, D: serde::de::DeserializeOwned>(
    s: &S,
) -> SyncResult<D> {
    serde_json::from_value(
        serde_json::to_value(s)
            .map_err(|e| SyncError::other_src("encode", e))?,
    )
    .map_err(|e| SyncError::other_src("decode", e))
}

/// Denotes a type used to configure a specific treesync module.
///
/// A module config is a struct whose single top-level field is named
/// after the module (e.g. `coreSync`), so that many module configs can
/// share one flat json object without colliding.
///
/// These are configs that cannot be changed at runtime, the likes of
/// which might be found in a configuration file. Runtime-tunable
/// behavior lives in [SyncSettings] instead.
pub trait ModConfig:
    'static
    + Sized
    + Default
    + std::fmt::Debug
    + serde::Serialize
    + serde::de::DeserializeOwned
    + Send
    + Sync
{
}

impl<M> ModConfig for M where
    M: 'static
        + Sized
        + Default
        + std::fmt::Debug
        + serde::Serialize
        + serde::de::DeserializeOwned
        + Send
        + Sync
{
}

/// Treesync configuration.
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Config(
    std::sync::Mutex<serde_json::Map<String, serde_json::Value>>,
);

impl Config {
    fn lock(
        &self,
    ) -> std::sync::MutexGuard<'_, serde_json::Map<String, serde_json::Value>>
    {
        // the map is never left half-written, so a poisoned lock is usable
        self.0.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Merge the top-level properties of a module config into this config,
    /// overwriting any properties of the same name.
    ///
    /// Module factories call this with their default config when the
    /// builder is generating a default config. Tests and embedders call
    /// it to override a module's settings.
    pub fn set_module_config<M: ModConfig>(&self, m: &M) -> SyncResult<()> {
        match serde_json::to_value(m)
            .map_err(|e| SyncError::other_src("encode module config", e))?
        {
            serde_json::Value::Object(props) => {
                self.lock().extend(props);
                Ok(())
            }
            oth => Err(SyncError::other(format!(
                "module config must serialize to an object, got: {oth}"
            ))),
        }
    }

    /// Extract a module config. Note that this config may have been loaded
    /// from disk and edited by humans, so module configs should be tolerant
    /// of missing properties, setting sane defaults.
    pub fn get_module_config<M: ModConfig>(&self) -> SyncResult<M> {
        tc(&*self.lock())
    }
}

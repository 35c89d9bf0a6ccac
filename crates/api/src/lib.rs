#![deny(missing_docs)]
//! Treesync API contains the module traits and the basic types required
//! to define the api of the local replica sync engine.
//!
//! The engine mirrors remote content-addressed trees into local storage,
//! tracks which local chunks are needed by which trees, and keeps the local
//! store under a configured byte budget.
//!
//! If you want a working engine, please see the treesync_core crate.

/// Boxed future type.
pub type BoxFut<'a, T> =
    std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

pub(crate) mod serde_bytes_base64 {
    pub fn serialize<S>(
        b: &bytes::Bytes,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use base64::prelude::*;
        serializer.serialize_str(&BASE64_URL_SAFE_NO_PAD.encode(b))
    }

    pub fn deserialize<'de, D, T: From<bytes::Bytes>>(
        deserializer: D,
    ) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use base64::prelude::*;
        let s: String = serde::Deserialize::deserialize(deserializer)?;
        BASE64_URL_SAFE_NO_PAD
            .decode(s)
            .map(|v| bytes::Bytes::from(v).into())
            .map_err(serde::de::Error::custom)
    }
}

pub mod builder;
pub use builder::*;

pub mod config;
pub use config::*;

mod error;
pub use error::*;

pub mod id;
pub use id::{ChunkId, OwnerId, TreeKey};

mod timestamp;
pub use timestamp::*;

pub mod registry;
pub use registry::*;

pub mod tree_store;
pub use tree_store::*;

pub mod resolver;
pub use resolver::*;

pub mod social;
pub use social::*;

pub mod settings;
pub use settings::*;

pub mod sync;
pub use sync::*;

//! Types dealing with data identity or hashing.

use crate::*;

macro_rules! imp_deref {
    ($i:ty, $t:ty) => {
        impl std::ops::Deref for $i {
            type Target = $t;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }
    };
}

macro_rules! imp_from {
    ($a:ty, $b:ty, $i:ident => $e:expr) => {
        impl From<$b> for $a {
            fn from($i: $b) -> Self {
                $e
            }
        }
    };
}

/// Identifies a stored chunk by its content hash.
///
/// These bytes should ONLY be the actual hash bytes, without
/// prefix or suffix. Displayed as url-safe base64.
#[derive(
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct ChunkId(
    #[serde(with = "crate::serde_bytes_base64")] pub bytes::Bytes,
);

imp_deref!(ChunkId, bytes::Bytes);
imp_from!(ChunkId, bytes::Bytes, b => ChunkId(b));
imp_from!(ChunkId, Vec<u8>, b => ChunkId(b.into()));

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use base64::prelude::*;
        f.write_str(&BASE64_URL_SAFE_NO_PAD.encode(&self.0))
    }
}

impl std::fmt::Debug for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ChunkId(")?;
        std::fmt::Display::fmt(self, f)?;
        f.write_str(")")
    }
}

/// Identifies an owning identity (a user account) whose trees are mirrored.
///
/// Storage allowances are computed per owner.
#[derive(
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct OwnerId(pub std::sync::Arc<str>);

imp_deref!(OwnerId, str);
imp_from!(OwnerId, &str, s => OwnerId(s.into()));
imp_from!(OwnerId, String, s => OwnerId(s.into()));

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Debug for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OwnerId({})", self.0)
    }
}

/// Identifies a specific tree as `"<ownerId>/<treeName>"`.
///
/// The owner is everything before the first `/`, the tree name is the
/// (non-empty) remainder, which may itself contain `/`.
#[derive(
    Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize,
)]
#[serde(transparent)]
pub struct TreeKey(std::sync::Arc<str>);

imp_deref!(TreeKey, str);

impl TreeKey {
    /// Parse a tree key, validating the `"<ownerId>/<treeName>"` shape.
    pub fn parse(key: impl AsRef<str>) -> SyncResult<Self> {
        let key = key.as_ref();
        match key.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() => {
                Ok(Self(key.into()))
            }
            _ => Err(SyncError::invalid_tree_key(key)),
        }
    }

    /// Build a tree key from its parts.
    pub fn new(owner: &OwnerId, tree_name: &str) -> SyncResult<Self> {
        Self::parse(format!("{owner}/{tree_name}"))
    }

    /// The owning identity of this tree.
    pub fn owner_id(&self) -> OwnerId {
        OwnerId::from(self.owner_str())
    }

    /// The tree name part of this key.
    pub fn tree_name(&self) -> &str {
        self.0.split_once('/').map(|(_, n)| n).unwrap_or_default()
    }

    /// True if this tree belongs to `owner`.
    pub fn is_owned_by(&self, owner: &OwnerId) -> bool {
        self.owner_str() == &**owner
    }

    fn owner_str(&self) -> &str {
        self.0.split_once('/').map(|(o, _)| o).unwrap_or_default()
    }
}

impl<'de> serde::Deserialize<'de> for TreeKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s: String = serde::Deserialize::deserialize(deserializer)?;
        TreeKey::parse(s).map_err(serde::de::Error::custom)
    }
}

impl std::str::FromStr for TreeKey {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for TreeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Debug for TreeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TreeKey({})", self.0)
    }
}

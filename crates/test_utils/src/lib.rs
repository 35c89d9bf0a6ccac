#![deny(missing_docs)]
//! Utilities for testing treesync modules.

use treesync_api::{ChunkId, ChunkInfo, RootPointer, TreeKey};

#[doc(hidden)]
pub use tokio;

/// Enable tracing with the RUST_LOG environment variable.
///
/// This is intended to be used in tests, so it defaults to DEBUG level.
pub fn enable_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::Level::DEBUG.into())
                .from_env_lossy(),
        )
        .try_init();
}

/// Repeat a code block every `$sleep_ms` until it issues a `break`,
/// panicking if that takes longer than `$timeout_ms`. Evaluates to the
/// value passed to `break`.
///
/// ```ignore
/// let state = iter_check!(1000, {
///     if let Some(state) = lookup().await {
///         break state;
///     }
/// });
/// ```
#[macro_export]
macro_rules! iter_check {
    ($timeout_ms:literal, $sleep_ms:literal, $code:block) => {
        $crate::tokio::time::timeout(
            std::time::Duration::from_millis($timeout_ms),
            async {
                loop {
                    $code
                    $crate::tokio::time::sleep(
                        std::time::Duration::from_millis($sleep_ms),
                    )
                    .await;
                }
            },
        )
        .await
        .unwrap()
    };

    ($timeout_ms:literal, $code:block) => {
        $crate::iter_check!($timeout_ms, 10, $code)
    };

    ($code:block) => {
        $crate::iter_check!(1000, $code)
    };
}

/// Random bytes of length `len`.
pub fn random_bytes(len: usize) -> Vec<u8> {
    use rand::RngCore;
    let mut out = vec![0; len];
    rand::thread_rng().fill_bytes(&mut out);
    out
}

/// A random 32 byte chunk id.
pub fn random_chunk_id() -> ChunkId {
    ChunkId::from(random_bytes(32))
}

/// A random, unencrypted root pointer.
pub fn random_root() -> RootPointer {
    RootPointer::new(random_chunk_id())
}

/// `count` random chunks of `size` bytes each.
pub fn random_chunks(count: usize, size: u64) -> Vec<ChunkInfo> {
    (0..count)
        .map(|_| ChunkInfo {
            id: random_chunk_id(),
            size,
        })
        .collect()
}

/// Parse a tree key, panicking on malformed input.
pub fn tree_key(key: &str) -> TreeKey {
    TreeKey::parse(key).unwrap()
}

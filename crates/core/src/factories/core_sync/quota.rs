//! Storage quota enforcement.
//!
//! When local storage exceeds the cap, the share of the cap not reserved
//! for own data is split equally between every other owner with synced
//! trees. Each owner above its share loses its least recently used chunks
//! until it is back under, skipping any chunk another owner still needs.
//! Own data is never evicted here.

use super::Inner;
use treesync_api::*;

/// The equal per-owner share of `settings`' others-quota, if there is
/// anyone to share it between.
pub(super) fn per_user_quota(
    settings: &SyncSettings,
    other_user_count: usize,
) -> Option<u64> {
    if other_user_count == 0 {
        return None;
    }
    Some(settings.others_quota() / other_user_count as u64)
}

impl Inner {
    pub(super) async fn check_quotas(&self) -> SyncResult<QuotaReport> {
        let settings = self.c.settings.get();
        let total_bytes = self.c.tree_store.total_stored_bytes().await?;

        let mut report = QuotaReport {
            total_bytes,
            storage_cap: settings.storage_cap,
            ..Default::default()
        };

        if !settings.enabled || total_bytes <= settings.storage_cap {
            return Ok(report);
        }

        let own = self.c.accounts.own_identities();
        let others = self.c.registry.get_other_users_with_trees(own).await?;

        let Some(per_user) = per_user_quota(&settings, others.len()) else {
            tracing::debug!(
                "over storage cap ({total_bytes} > {}) with only own data",
                settings.storage_cap
            );
            return Ok(report);
        };
        report.per_user_quota = Some(per_user);

        tracing::info!(
            "over storage cap ({total_bytes} > {}), \
            {} other users at {per_user} bytes each",
            settings.storage_cap,
            others.len()
        );

        for owner in others {
            let used = match self
                .c
                .registry
                .get_storage_by_user(owner.clone())
                .await
            {
                Ok(used) => used,
                Err(err) => {
                    tracing::warn!("could not read storage of {owner}: {err}");
                    continue;
                }
            };

            if used <= per_user {
                continue;
            }
            let target_bytes = used - per_user;

            let candidates = match self
                .c
                .registry
                .get_chunks_to_evict(owner.clone(), target_bytes)
                .await
            {
                Ok(candidates) => candidates,
                Err(err) => {
                    tracing::warn!(
                        "could not select chunks to evict for {owner}: {err}"
                    );
                    continue;
                }
            };

            let evicted = self.delete_chunks(candidates).await;
            let freed_bytes = evicted.iter().map(|c| c.size).sum();

            tracing::info!(
                "evicted {} chunks ({freed_bytes} of {target_bytes} bytes) \
                from {owner}",
                evicted.len()
            );

            report.evictions.push(OwnerEviction {
                owner_id: owner,
                target_bytes,
                freed_bytes,
                evicted: evicted.into_iter().map(|c| c.id).collect(),
            });
        }

        Ok(report)
    }
}

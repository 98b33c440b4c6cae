use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::domain::repository::SecretRepository;
use crate::usecase::secret::SecretStore;

/// One purge pass. Deletes only rows already past `expires_at`, which can no
/// longer validate, so it is safe alongside live traffic.
pub async fn purge_once<R: SecretRepository>(secrets: &SecretStore<R>) -> u64 {
    match secrets.purge_expired().await {
        Ok(purged) => {
            if purged > 0 {
                tracing::info!(purged, "purged expired login secrets");
            }
            purged
        }
        Err(e) => {
            tracing::warn!(error = %e, "purge of expired login secrets failed");
            0
        }
    }
}

/// Spawn the periodic purge. The first pass runs immediately.
pub fn spawn_purge_task<R>(secrets: SecretStore<R>, every: Duration) -> JoinHandle<()>
where
    R: SecretRepository + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            purge_once(&secrets).await;
        }
    })
}

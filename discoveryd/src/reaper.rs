use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use crate::config::RegistryConfig;
use crate::registry_manager::RegistryHandle;

/// Evict everything not seen within `ttl` of `now`
pub async fn reap_expired(
    store: &RegistryHandle,
    ttl: chrono::Duration,
    now: DateTime<Utc>,
) -> Result<Vec<String>> {
    let cutoff = now
        .checked_sub_signed(ttl)
        .with_context(|| format!("TTL of {}s puts the cutoff out of range", ttl.num_seconds()))?;
    let evicted = store.reap(cutoff).await?;
    for id in &evicted {
        tracing::info!("Removing stale service: {}", id);
    }
    Ok(evicted)
}

/// TTL reaper loop
pub async fn run(
    store: RegistryHandle,
    config: RegistryConfig,
    cancel: CancellationToken,
) -> Result<()> {
    let mut reap_interval = tokio::time::interval(config.reap_interval());
    reap_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = reap_interval.tick() => {
                if let Err(e) = reap_expired(&store, config.ttl(), Utc::now()).await {
                    tracing::error!("Failed to reap expired services: {}", e);
                }
            }
            _ = cancel.cancelled() => {
                tracing::info!("TTL reaper shutting down");
                break;
            }
        }
    }

    Ok(())
}

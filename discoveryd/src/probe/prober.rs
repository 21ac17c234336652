use std::future::Future;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use anyhow::Result;
use chrono::Utc;
use shared::types::ServiceRecord;
use crate::config::ProbeConfig;
use crate::registry_manager::RegistryHandle;
use super::{HealthChecker, ProbeOutcome};

/// Counts from one probe cycle
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleSummary {
    pub probed: usize,
    pub alive: usize,
    pub ready: usize,
    /// Records reaped or replaced while their probe was in flight
    pub vanished: usize,
}

/// Probe every registered service once with the HTTP checker
pub async fn probe_cycle(store: &RegistryHandle, checker: &HealthChecker) -> Result<CycleSummary> {
    let checker = checker.clone();
    probe_cycle_with(store, move |record| {
        let checker = checker.clone();
        async move { checker.probe(&record).await }
    })
    .await
}

/// Run `probe` against every registered service once and write the results back.
///
/// The store is only touched for the snapshot and the per-record write-backs;
/// the network phase runs against the copy. Each probe is its own task, so a
/// panic in one is recorded as a failed probe without disturbing the rest.
pub async fn probe_cycle_with<F, Fut>(store: &RegistryHandle, probe: F) -> Result<CycleSummary>
where
    F: Fn(ServiceRecord) -> Fut,
    Fut: Future<Output = ProbeOutcome> + Send + 'static,
{
    let snapshot = store.snapshot_all().await?;
    let mut summary = CycleSummary::default();

    let mut probes: FuturesUnordered<_> = snapshot
        .into_iter()
        .map(|record| {
            let id = record.id.clone();
            let task = tokio::spawn(probe(record));
            async move { (id, task.await) }
        })
        .collect();

    while let Some((id, result)) = probes.next().await {
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Health probe task for {} failed: {}", id, e);
                ProbeOutcome::Unreachable
            }
        };

        summary.probed += 1;
        if outcome.alive() {
            summary.alive += 1;
        }
        if outcome.ready() {
            summary.ready += 1;
        }

        match store.record_probe(id.clone(), outcome, Utc::now()).await? {
            Some(true) => {
                tracing::info!(
                    "Service {} is now alive={} ready={}",
                    id,
                    outcome.alive(),
                    outcome.ready()
                );
            }
            Some(false) => {}
            None => {
                tracing::debug!("Service {} disappeared before its probe result landed", id);
                summary.vanished += 1;
            }
        }
    }

    Ok(summary)
}

/// Prober loop. Cycles never overlap; a slow cycle delays the next tick.
pub async fn run(
    store: RegistryHandle,
    checker: HealthChecker,
    config: ProbeConfig,
    cancel: CancellationToken,
) -> Result<()> {
    let mut probe_interval = tokio::time::interval(config.interval());
    probe_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = probe_interval.tick() => {
                match probe_cycle(&store, &checker).await {
                    Ok(summary) if summary.probed > 0 => {
                        tracing::debug!(
                            "Probe cycle: {} probed, {} alive, {} ready, {} vanished",
                            summary.probed,
                            summary.alive,
                            summary.ready,
                            summary.vanished
                        );
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!("Failed to run probe cycle: {}", e);
                    }
                }
            }
            _ = cancel.cancelled() => {
                tracing::info!("Health prober shutting down");
                break;
            }
        }
    }

    Ok(())
}

use std::thread;
use tokio::sync::{mpsc, oneshot};
use anyhow::Result;
use chrono::{DateTime, Utc};
use shared::types::ServiceRecord;
use crate::probe::ProbeOutcome;
use crate::registry::table::ServiceTable;

/// Commands sent to the registry thread
pub enum RegistryCommand {
    Upsert(ServiceRecord, oneshot::Sender<bool>),
    Remove(String, oneshot::Sender<Option<ServiceRecord>>),
    Get(String, oneshot::Sender<Option<ServiceRecord>>),
    SnapshotAll(oneshot::Sender<Vec<ServiceRecord>>),
    RecordProbe {
        id: String,
        outcome: ProbeOutcome,
        at: DateTime<Utc>,
        reply: oneshot::Sender<Option<bool>>,
    },
    Reap {
        cutoff: DateTime<Utc>,
        reply: oneshot::Sender<Vec<String>>,
    },
    Shutdown,
}

/// Handle to the registry store.
///
/// A single thread owns the [`ServiceTable`]; every operation is one command,
/// applied in arrival order, so each is atomic with respect to all others.
/// Callers only ever receive copies.
#[derive(Clone)]
pub struct RegistryHandle {
    tx: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    /// Spawn the registry thread over an empty table
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::channel::<RegistryCommand>(256);

        thread::spawn(move || {
            let mut table = ServiceTable::new();

            while let Some(cmd) = rx.blocking_recv() {
                match cmd {
                    RegistryCommand::Upsert(record, reply) => {
                        let _ = reply.send(table.upsert(record));
                    }
                    RegistryCommand::Remove(id, reply) => {
                        let _ = reply.send(table.remove(&id));
                    }
                    RegistryCommand::Get(id, reply) => {
                        let _ = reply.send(table.get(&id));
                    }
                    RegistryCommand::SnapshotAll(reply) => {
                        let _ = reply.send(table.snapshot());
                    }
                    RegistryCommand::RecordProbe { id, outcome, at, reply } => {
                        let _ = reply.send(table.apply_probe(&id, outcome, at));
                    }
                    RegistryCommand::Reap { cutoff, reply } => {
                        let _ = reply.send(table.reap(cutoff));
                    }
                    RegistryCommand::Shutdown => {
                        tracing::info!("Registry thread shutting down");
                        break;
                    }
                }
            }
        });

        Self { tx }
    }

    /// Insert or fully replace a record. Returns true if listed data changed.
    pub async fn upsert(&self, record: ServiceRecord) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RegistryCommand::Upsert(record, reply)).await?;
        Ok(rx.await?)
    }

    /// Delete a record if present
    pub async fn remove(&self, id: String) -> Result<Option<ServiceRecord>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RegistryCommand::Remove(id, reply)).await?;
        Ok(rx.await?)
    }

    /// Get a single record by id
    pub async fn get(&self, id: String) -> Result<Option<ServiceRecord>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RegistryCommand::Get(id, reply)).await?;
        Ok(rx.await?)
    }

    /// Point-in-time copy of every record, ordered by id
    pub async fn snapshot_all(&self) -> Result<Vec<ServiceRecord>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RegistryCommand::SnapshotAll(reply)).await?;
        Ok(rx.await?)
    }

    /// Write back a probe result. `None` if the record has gone away since,
    /// otherwise whether alive/ready changed.
    pub async fn record_probe(
        &self,
        id: String,
        outcome: ProbeOutcome,
        at: DateTime<Utc>,
    ) -> Result<Option<bool>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RegistryCommand::RecordProbe { id, outcome, at, reply })
            .await?;
        Ok(rx.await?)
    }

    /// Evict every record last seen before `cutoff`
    pub async fn reap(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RegistryCommand::Reap { cutoff, reply }).await?;
        Ok(rx.await?)
    }

    /// Shutdown the registry thread
    pub async fn shutdown(&self) -> Result<()> {
        self.tx.send(RegistryCommand::Shutdown).await?;
        Ok(())
    }
}

use std::collections::BTreeMap;
use chrono::{DateTime, Utc};
use shared::types::ServiceRecord;
use crate::probe::ProbeOutcome;

/// In-memory service table. Keyed by id, so iteration is already in snapshot order.
///
/// The table itself is not synchronised; the registry actor owns it exclusively.
#[derive(Debug, Default)]
pub struct ServiceTable {
    services: BTreeMap<String, ServiceRecord>,
}

impl ServiceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace any record with the same id. Returns true if listed data changed.
    ///
    /// `last_seen` never moves backwards, even if the incoming record carries an older timestamp.
    pub fn upsert(&mut self, mut record: ServiceRecord) -> bool {
        let changed = match self.services.get(&record.id) {
            Some(old) => {
                record.last_seen = record.last_seen.max(old.last_seen);
                service_data_changed(old, &record)
            }
            None => true,
        };

        self.services.insert(record.id.clone(), record);
        changed
    }

    pub fn remove(&mut self, id: &str) -> Option<ServiceRecord> {
        self.services.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<ServiceRecord> {
        self.services.get(id).cloned()
    }

    /// Deep copy of every record, ordered by id
    pub fn snapshot(&self) -> Vec<ServiceRecord> {
        self.services.values().cloned().collect()
    }

    /// Write a probe result back. `None` if the id is no longer present,
    /// otherwise whether alive/ready changed.
    pub fn apply_probe(
        &mut self,
        id: &str,
        outcome: ProbeOutcome,
        at: DateTime<Utc>,
    ) -> Option<bool> {
        let record = self.services.get_mut(id)?;
        let changed = record.alive != outcome.alive() || record.ready != outcome.ready();

        record.alive = outcome.alive();
        record.ready = outcome.ready();
        record.last_health_check = Some(at);
        if outcome.alive() {
            record.last_seen = record.last_seen.max(at);
        }

        Some(changed)
    }

    /// Evict every record last seen before `cutoff`. Returns the evicted ids.
    pub fn reap(&mut self, cutoff: DateTime<Utc>) -> Vec<String> {
        let expired: Vec<String> = self
            .services
            .values()
            .filter(|record| record.last_seen < cutoff)
            .map(|record| record.id.clone())
            .collect();

        for id in &expired {
            self.services.remove(id);
        }

        expired
    }
}

fn service_data_changed(old: &ServiceRecord, new: &ServiceRecord) -> bool {
    old.ip != new.ip
        || old.port != new.port
        || old.description != new.description
        || old.health_path != new.health_path
        || old.alive != new.alive
        || old.ready != new.ready
}

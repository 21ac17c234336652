use serde::Serialize;
use sha2::{Digest, Sha256};
use shared::types::ServiceRecord;

/// Only the fields a poller acts on. Timestamps are excluded: they move on
/// every heartbeat and probe.
#[derive(Serialize)]
struct HashView<'a> {
    id: &'a str,
    ip: &'a str,
    port: u16,
    description: &'a str,
    health_path: &'a str,
    alive: bool,
    ready: bool,
}

/// SHA-256 over the listing, hex encoded.
/// Records are sorted by id so the result does not depend on input order.
pub fn compute_hash(services: &[ServiceRecord]) -> String {
    let mut indices: Vec<usize> = (0..services.len()).collect();
    indices.sort_by(|&a, &b| services[a].id.cmp(&services[b].id));

    let mut hasher = Sha256::new();
    for &i in &indices {
        let s = &services[i];
        let view = HashView {
            id: &s.id,
            ip: &s.ip,
            port: s.port,
            description: &s.description,
            health_path: &s.health_path,
            alive: s.alive,
            ready: s.ready,
        };
        // Serializing plain strings, integers and bools into a Vec cannot fail
        if let Ok(bytes) = serde_json::to_vec(&view) {
            hasher.update(&bytes);
            hasher.update(b"\n");
        }
    }

    hex::encode(hasher.finalize())
}

use std::net::Ipv6Addr;
use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use shared::protocol::READY_FIELD;
use shared::types::ServiceRecord;
use crate::config::ProbeConfig;

/// Result of one health probe. Unreachable services are never ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Unreachable,
    Reachable { ready: bool },
}

impl ProbeOutcome {
    pub fn alive(&self) -> bool {
        matches!(self, ProbeOutcome::Reachable { .. })
    }

    pub fn ready(&self) -> bool {
        matches!(self, ProbeOutcome::Reachable { ready: true })
    }
}

/// What a 200 response body says about readiness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Body is a JSON object with a boolean `ready` field
    Reported(bool),
    /// No usable signal: non-JSON body, no field, or a non-boolean field
    Assumed,
}

impl Readiness {
    pub fn from_body(body: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(fields)) => match fields.get(READY_FIELD) {
                Some(Value::Bool(ready)) => Readiness::Reported(*ready),
                _ => Readiness::Assumed,
            },
            _ => Readiness::Assumed,
        }
    }

    pub fn is_ready(self) -> bool {
        match self {
            Readiness::Reported(ready) => ready,
            Readiness::Assumed => true,
        }
    }
}

/// Issues health probes against registered services
#[derive(Clone)]
pub struct HealthChecker {
    http_client: Client,
}

impl HealthChecker {
    pub fn new(config: &ProbeConfig) -> Result<Self> {
        let http_client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.read_timeout())
            .timeout(config.request_timeout())
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { http_client })
    }

    /// Probe one service. Never fails: every error is an unreachable outcome.
    pub async fn probe(&self, record: &ServiceRecord) -> ProbeOutcome {
        let url = health_url(record);

        let response = match self.http_client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Health check error for {} at {}: {}", record.id, url, e);
                return ProbeOutcome::Unreachable;
            }
        };

        if response.status() != StatusCode::OK {
            tracing::warn!(
                "Health check failed for {} at {}: status {}",
                record.id,
                url,
                response.status()
            );
            return ProbeOutcome::Unreachable;
        }

        match response.bytes().await {
            Ok(body) => {
                let readiness = Readiness::from_body(&body);
                tracing::debug!("Health check passed for {}: {:?}", record.id, readiness);
                ProbeOutcome::Reachable { ready: readiness.is_ready() }
            }
            Err(e) => {
                tracing::warn!("Health check body read failed for {} at {}: {}", record.id, url, e);
                ProbeOutcome::Unreachable
            }
        }
    }
}

/// `http://host:port/path`, bracketing IPv6 literals
pub fn health_url(record: &ServiceRecord) -> String {
    let host = match record.ip.parse::<Ipv6Addr>() {
        Ok(_) => format!("[{}]", record.ip),
        Err(_) => record.ip.clone(),
    };

    if record.health_path.starts_with('/') {
        format!("http://{}:{}{}", host, record.port, record.health_path)
    } else {
        format!("http://{}:{}/{}", host, record.port, record.health_path)
    }
}

use std::net::{IpAddr, SocketAddr};
use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::{Map, Value};
use shared::types::{RegisterRequest, ServiceRecord};
use crate::api::routes::AppState;
use crate::config::RegistryConfig;

/// Why a registration was refused
#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error("bad json: {0}")]
    MalformedBody(#[from] serde_json::Error),
    #[error("field 'id' is required")]
    MissingId,
    #[error("field 'port' must be an integer between 1 and 65535")]
    InvalidPort,
    #[error("registry unavailable")]
    Registry(anyhow::Error),
}

impl IntoResponse for RegisterError {
    fn into_response(self) -> Response {
        let status = match &self {
            RegisterError::Registry(e) => {
                tracing::error!("Failed to store registration: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_REQUEST,
        };
        (status, self.to_string()).into_response()
    }
}

/// Parse a registration body.
///
/// `id` must be a non-blank string and `port`, when given, a valid port.
/// The other optional fields are taken only when they are strings.
pub fn parse_register(body: &[u8]) -> Result<RegisterRequest, RegisterError> {
    let value: Value = serde_json::from_slice(body)?;
    let empty = Map::new();
    let fields = value.as_object().unwrap_or(&empty);

    let id = match fields.get("id") {
        Some(Value::String(id)) if !id.trim().is_empty() => id.trim().to_string(),
        _ => return Err(RegisterError::MissingId),
    };

    let port = match fields.get("port") {
        None | Some(Value::Null) => None,
        Some(value) => match value.as_u64() {
            Some(port @ 1..=65535) => Some(port as u16),
            _ => return Err(RegisterError::InvalidPort),
        },
    };

    let string_field = |key: &str| match fields.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    };

    Ok(RegisterRequest {
        id,
        ip: string_field("ip"),
        port,
        description: fields
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string),
        health_path: string_field("health_path"),
    })
}

/// Address a registration came from. Forwarding headers are only honoured when trusted.
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr, trust_forwarded_headers: bool) -> String {
    if trust_forwarded_headers {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }

        let real_ip = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = real_ip {
            return ip.to_string();
        }
    }

    canonical_ip(peer.ip()).to_string()
}

fn canonical_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map(IpAddr::V4)
            .unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    }
}

/// Build the fresh record a registration stores. Health is unknown until the next probe.
pub fn build_record(request: RegisterRequest, peer_ip: String, config: &RegistryConfig) -> ServiceRecord {
    let health_path = request
        .health_path
        .unwrap_or_else(|| config.default_health_path.clone());
    let health_path = if health_path.starts_with('/') {
        health_path
    } else {
        format!("/{}", health_path)
    };

    ServiceRecord {
        id: request.id,
        ip: request.ip.unwrap_or(peer_ip),
        port: request.port.unwrap_or(config.default_port),
        description: request.description.unwrap_or_default(),
        health_path,
        alive: false,
        ready: false,
        last_seen: Utc::now(),
        last_health_check: None,
    }
}

/// `POST /register`
pub async fn register(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, RegisterError> {
    let request = parse_register(&body)?;
    let peer_ip = client_ip(&headers, peer, state.trust_forwarded_headers);
    let record = build_record(request, peer_ip, &state.registry);

    let summary = format!(
        "id={} ip={} port={} desc=\"{}\"",
        record.id, record.ip, record.port, record.description
    );

    state.store.upsert(record).await.map_err(RegisterError::Registry)?;
    tracing::info!("Registered {}", summary);
    Ok(StatusCode::NO_CONTENT)
}

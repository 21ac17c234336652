use std::sync::Arc;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use shared::protocol::{HEALTH_PATH, REGISTER_PATH, SERVICES_HASH_PATH, SERVICES_PATH};
use shared::types::{HealthReport, ServiceRecord};
use crate::api::register::register;
use crate::config::RegistryConfig;
use crate::registry::hash;
use crate::registry_manager::RegistryHandle;

#[derive(Clone)]
pub struct AppState {
    pub store: RegistryHandle,
    pub registry: Arc<RegistryConfig>,
    pub trust_forwarded_headers: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health))
        .route(REGISTER_PATH, post(register))
        .route(SERVICES_PATH, get(get_services))
        .route(SERVICES_HASH_PATH, get(get_hash))
        .route("/services/:id", get(get_service))
        .with_state(state)
}

/// Registry's own liveness
async fn health() -> Json<HealthReport> {
    Json(HealthReport { ready: true })
}

async fn get_services(State(state): State<AppState>) -> Result<Json<Vec<ServiceRecord>>, StatusCode> {
    state
        .store
        .snapshot_all()
        .await
        .map(Json)
        .map_err(|e| {
            tracing::error!("Failed to snapshot services: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

/// Digest of the current listing; computed here, off the registry thread
async fn get_hash(State(state): State<AppState>) -> Result<String, StatusCode> {
    state
        .store
        .snapshot_all()
        .await
        .map(|services| hash::compute_hash(&services))
        .map_err(|e| {
            tracing::error!("Failed to snapshot services: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

async fn get_service(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ServiceRecord>, StatusCode> {
    state
        .store
        .get(id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to query service: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use axum::body::Body;
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::{header, Request};
    use serde_json::Value;
    use shared::types::RegisterRequest;
    use tower::ServiceExt;
    use crate::probe::ProbeOutcome;

    fn test_app() -> (Router, RegistryHandle) {
        let store = RegistryHandle::spawn();
        let state = AppState {
            store: store.clone(),
            registry: Arc::new(RegistryConfig::default()),
            trust_forwarded_headers: false,
        };
        let app = router(state).layer(MockConnectInfo(SocketAddr::from(([10, 0, 0, 5], 51000))));
        (app, store)
    }

    async fn post_register(app: &Router, body: impl Into<Body>) -> (StatusCode, String) {
        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/register")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(body.into())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
        let resp = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn register_body(request: &RegisterRequest) -> String {
        serde_json::to_string(request).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _store) = test_app();
        let (status, body) = get_json(&app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({"ready": true}));
    }

    #[tokio::test]
    async fn test_register_without_id_is_rejected() {
        let (app, store) = test_app();
        let (status, body) = post_register(&app, "{}").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("id"));
        assert!(store.snapshot_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_register_malformed_body() {
        let (app, _store) = test_app();
        let (status, body) = post_register(&app, "{\"id\": ").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.starts_with("bad json: "));
    }

    #[tokio::test]
    async fn test_register_fails_when_registry_stopped() {
        let (app, store) = test_app();
        store.shutdown().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let (status, body) = post_register(&app, r#"{"id": "svc"}"#).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "registry unavailable");
    }

    #[tokio::test]
    async fn test_register_uses_peer_address() {
        let (app, _store) = test_app();
        let request = RegisterRequest {
            id: "svc-b".to_string(),
            ..Default::default()
        };
        let (status, body) = post_register(&app, register_body(&request)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_empty());

        let (status, services) = get_json(&app, "/services").await;
        assert_eq!(status, StatusCode::OK);
        let services = services.as_array().unwrap();
        assert_eq!(services.len(), 1);

        let svc = &services[0];
        assert_eq!(svc["id"], "svc-b");
        assert_eq!(svc["ip"], "10.0.0.5");
        assert_eq!(svc["port"], 80);
        assert_eq!(svc["description"], "");
        assert_eq!(svc["health_path"], "/health");
        assert_eq!(svc["alive"], false);
        assert_eq!(svc["ready"], false);
        assert!(svc["last_seen"].is_string());
        assert!(svc["last_health_check"].is_null());
    }

    #[tokio::test]
    async fn test_reregistration_replaces_and_resets_health() {
        let (app, store) = test_app();
        let first = RegisterRequest {
            id: "svc".to_string(),
            ip: Some("192.168.1.10".to_string()),
            port: Some(8081),
            description: Some("first".to_string()),
            health_path: None,
        };
        post_register(&app, register_body(&first)).await;
        store
            .record_probe("svc".to_string(), ProbeOutcome::Reachable { ready: true }, chrono::Utc::now())
            .await
            .unwrap();

        let second = RegisterRequest {
            id: "svc".to_string(),
            ip: Some("192.168.1.11".to_string()),
            port: Some(9090),
            description: Some("second".to_string()),
            health_path: Some("/ready".to_string()),
        };
        let (status, _) = post_register(&app, register_body(&second)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, services) = get_json(&app, "/services").await;
        let services = services.as_array().unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0]["ip"], "192.168.1.11");
        assert_eq!(services[0]["port"], 9090);
        assert_eq!(services[0]["description"], "second");
        assert_eq!(services[0]["health_path"], "/ready");
        assert_eq!(services[0]["alive"], false);
        assert_eq!(services[0]["ready"], false);
        assert!(services[0]["last_health_check"].is_null());
    }

    #[tokio::test]
    async fn test_services_listed_in_id_order() {
        let (app, _store) = test_app();
        for id in ["zulu", "alpha", "mike"] {
            post_register(&app, format!(r#"{{"id": "{}"}}"#, id)).await;
        }

        let (_, services) = get_json(&app, "/services").await;
        let ids: Vec<&str> = services
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["alpha", "mike", "zulu"]);
    }

    #[tokio::test]
    async fn test_get_single_service() {
        let (app, _store) = test_app();
        post_register(&app, r#"{"id": "svc", "port": 7000}"#).await;

        let (status, svc) = get_json(&app, "/services/svc").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(svc["port"], 7000);

        let (status, _) = get_json(&app, "/services/ghost").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_hash_tracks_registrations() {
        let (app, store) = test_app();
        let fetch_hash = |app: Router| async move {
            let resp = app
                .oneshot(Request::builder().uri("/services/hash").body(Body::empty()).unwrap())
                .await
                .unwrap();
            let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
            String::from_utf8(bytes.to_vec()).unwrap()
        };

        let empty = fetch_hash(app.clone()).await;
        assert_eq!(empty, hash::compute_hash(&[]));

        post_register(&app, r#"{"id": "svc"}"#).await;
        let registered = fetch_hash(app.clone()).await;
        assert_ne!(registered, empty);
        assert_eq!(registered, hash::compute_hash(&store.snapshot_all().await.unwrap()));

        store
            .record_probe("svc".to_string(), ProbeOutcome::Reachable { ready: true }, chrono::Utc::now())
            .await
            .unwrap();
        assert_ne!(fetch_hash(app.clone()).await, registered);
    }
}

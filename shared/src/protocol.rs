/// Route paths served by the registry
pub const REGISTER_PATH: &str = "/register";
pub const SERVICES_PATH: &str = "/services";
pub const SERVICES_HASH_PATH: &str = "/services/hash";
pub const HEALTH_PATH: &str = "/health";

/// Port assumed for a service that registers without one
pub const DEFAULT_SERVICE_PORT: u16 = 80;

/// Health path probed when a service registers without one
pub const DEFAULT_HEALTH_PATH: &str = "/health";

/// Optional boolean field in a health response body carrying self-reported readiness
pub const READY_FIELD: &str = "ready";

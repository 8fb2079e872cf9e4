//! Shared helpers for API integration tests: a stub provider, the test
//! router (same middleware stack as production), seeders, and request
//! utilities.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;

use vdesk_api::auth::jwt::{issue_token, JwtConfig};
use vdesk_api::auth::password::hash_password;
use vdesk_api::config::ServerConfig;
use vdesk_api::router::build_app_router;
use vdesk_api::state::AppState;
use vdesk_broker::mfa::TotpGate;
use vdesk_broker::transport::GatewayTokenTransport;
use vdesk_broker::{BrokerConfig, HeartbeatMonitor, SessionBroker, StateReconciler};
use vdesk_core::clock::SystemClock;
use vdesk_core::seal::Sealer;
use vdesk_core::state::DesktopState;
use vdesk_core::types::DbId;
use vdesk_db::models::desktop::{CreateDesktop, Desktop};
use vdesk_db::models::tenant::{CreateTenant, Tenant};
use vdesk_db::models::user::{CreateUser, User};
use vdesk_db::repositories::{DesktopRepo, TenantRepo, UserRepo};
use vdesk_provider::{ImageInfo, NetworkInfo, PowerAction, ProviderError, VmProvider, VmSpec};

/// Provider stub: an in-memory state map, `"on"` by default.
pub struct StubProvider {
    states: Mutex<HashMap<String, String>>,
}

impl StubProvider {
    pub fn new() -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
        }
    }

    #[allow(dead_code)]
    pub fn set_state(&self, server_id: &str, state: &str) {
        self.states
            .lock()
            .unwrap()
            .insert(server_id.to_string(), state.to_string());
    }
}

#[async_trait]
impl VmProvider for StubProvider {
    async fn create_vm(&self, _spec: &VmSpec) -> Result<String, ProviderError> {
        Ok("srv-test".into())
    }

    async fn delete_vm(&self, _server_id: &str) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn power(&self, server_id: &str, action: PowerAction) -> Result<(), ProviderError> {
        let state = match action {
            PowerAction::On | PowerAction::Resume | PowerAction::Restart => "on",
            PowerAction::Off => "off",
            PowerAction::Suspend => "suspended",
        };
        self.states
            .lock()
            .unwrap()
            .insert(server_id.to_string(), state.to_string());
        Ok(())
    }

    async fn get_state(&self, server_id: &str) -> Result<String, ProviderError> {
        Ok(self
            .states
            .lock()
            .unwrap()
            .get(server_id)
            .cloned()
            .unwrap_or_else(|| "on".to_string()))
    }

    async fn list_images(&self) -> Result<Vec<ImageInfo>, ProviderError> {
        Ok(Vec::new())
    }

    async fn list_networks(&self) -> Result<Vec<NetworkInfo>, ProviderError> {
        Ok(Vec::new())
    }
}

fn sealing_key() -> String {
    STANDARD.encode([7u8; 32])
}

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        jwt: JwtConfig {
            secret: "test-secret".into(),
            expire_minutes: 60,
        },
        sealing_key: sealing_key(),
        gateway_url: "https://portal.test/gateway".into(),
        native_gateway_host: "portal.test".into(),
        native_gateway_port: 9443,
        provider_api_url: "http://provider.test".into(),
        provider_client_id: "test".into(),
        provider_secret: "test".into(),
        reconcile_interval_secs: 45,
        idle_sweep_interval_secs: 60,
        start_timeout_secs: 1,
    }
}

fn fast_broker_config() -> BrokerConfig {
    BrokerConfig {
        start_timeout: Duration::from_millis(300),
        start_poll_interval: Duration::from_millis(10),
        preconnect_refresh_timeout: Duration::from_millis(100),
        ..BrokerConfig::default()
    }
}

/// Build the full application router with all middleware layers, using
/// the given database pool and a stub provider.
///
/// This mirrors the service construction in `main.rs` so integration
/// tests exercise the same stack that production uses.
pub fn build_test_app(pool: PgPool) -> (Router, Arc<StubProvider>) {
    let config = test_config();
    let clock = Arc::new(SystemClock);
    let provider = Arc::new(StubProvider::new());
    let broker_config = fast_broker_config();

    let sealer = Arc::new(Sealer::from_base64_key(&config.sealing_key).unwrap());
    let transport = Arc::new(GatewayTokenTransport::new(
        Sealer::from_base64_key(&config.sealing_key).unwrap(),
        config.gateway_url.clone(),
        config.native_gateway_host.clone(),
        config.native_gateway_port,
        clock.clone(),
    ));

    let reconciler = Arc::new(StateReconciler::new(
        pool.clone(),
        provider.clone(),
        clock.clone(),
        broker_config.clone(),
    ));
    let broker = Arc::new(SessionBroker::new(
        pool.clone(),
        provider.clone(),
        transport,
        Arc::new(TotpGate),
        reconciler.clone(),
        clock.clone(),
        broker_config,
    ));
    let heartbeat = Arc::new(HeartbeatMonitor::new(pool.clone(), clock.clone()));

    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        broker,
        reconciler,
        heartbeat,
        provider: provider.clone(),
        mfa: Arc::new(TotpGate),
        sealer,
        clock,
    };

    (build_app_router(state, &config), provider)
}

// ---------------------------------------------------------------------------
// Seeders
// ---------------------------------------------------------------------------

pub async fn seed_tenant(pool: &PgPool) -> Tenant {
    TenantRepo::create(
        pool,
        &CreateTenant {
            name: "Acme".into(),
            slug: "acme".into(),
        },
    )
    .await
    .unwrap()
}

/// Create a user with password `password123` and return the row plus a
/// valid bearer token.
pub async fn seed_user(pool: &PgPool, tenant: &Tenant, username: &str, role: &str) -> (User, String) {
    let user = UserRepo::create(
        pool,
        &CreateUser {
            tenant_id: tenant.id,
            username: username.into(),
            email: None,
            password_hash: hash_password("password123").unwrap(),
            role: role.into(),
        },
    )
    .await
    .unwrap();
    let token = issue_token(&user, &test_config().jwt).unwrap();
    (user, token)
}

#[allow(dead_code)]
pub async fn seed_desktop(
    pool: &PgPool,
    tenant: &Tenant,
    owner: Option<DbId>,
    server_id: &str,
    state: DesktopState,
) -> Desktop {
    DesktopRepo::create(
        pool,
        &CreateDesktop {
            tenant_id: tenant.id,
            user_id: owner,
            provider_server_id: server_id.into(),
            display_name: format!("Desk {server_id}"),
            vm_private_ip: Some("10.0.0.10".into()),
            vm_rdp_username: Some("Administrator".into()),
            vm_rdp_password_sealed: None,
            vm_cpu: Some("2B".into()),
            vm_ram_mb: Some(4096),
            vm_disk_gb: Some(50),
            initial_state: state,
        },
    )
    .await
    .unwrap()
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &Router, path: &str) -> Response {
    let request = Request::builder()
        .method(Method::GET)
        .uri(path)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

#[allow(dead_code)]
pub async fn get_auth(app: &Router, path: &str, token: &str) -> Response {
    let request = Request::builder()
        .method(Method::GET)
        .uri(path)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

#[allow(dead_code)]
pub async fn request_json(
    app: &Router,
    method: Method,
    path: &str,
    body: serde_json::Value,
    token: Option<&str>,
) -> Response {
    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = builder.body(Body::from(body.to_string())).unwrap();
    send(app, request).await
}

#[allow(dead_code)]
pub async fn post_json(
    app: &Router,
    path: &str,
    body: serde_json::Value,
    token: Option<&str>,
) -> Response {
    request_json(app, Method::POST, path, body, token).await
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

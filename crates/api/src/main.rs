use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vdesk_api::auth::password::hash_password;
use vdesk_api::background;
use vdesk_api::config::ServerConfig;
use vdesk_api::router::build_app_router;
use vdesk_api::state::AppState;
use vdesk_broker::mfa::TotpGate;
use vdesk_broker::transport::GatewayTokenTransport;
use vdesk_broker::{HeartbeatMonitor, IdlePolicy, SessionBroker, StateReconciler};
use vdesk_core::clock::SystemClock;
use vdesk_core::seal::Sealer;
use vdesk_db::models::tenant::CreateTenant;
use vdesk_db::models::user::CreateUser;
use vdesk_db::repositories::{TenantRepo, UserRepo};
use vdesk_provider::http::{HttpVmProvider, HttpVmProviderConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vdesk_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = vdesk_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    vdesk_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    vdesk_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    bootstrap_tenant(&pool).await;

    // --- Services ---
    let clock = Arc::new(SystemClock);
    let cancel = CancellationToken::new();
    let broker_config = config.broker_config();

    let provider = Arc::new(
        HttpVmProvider::new(
            HttpVmProviderConfig::new(
                config.provider_api_url.clone(),
                config.provider_client_id.clone(),
                config.provider_secret.clone(),
            ),
            cancel.clone(),
        )
        .expect("Failed to build provider client"),
    );

    let sealer = Arc::new(
        Sealer::from_base64_key(&config.sealing_key).expect("SEALING_KEY must be a base64 32-byte key"),
    );
    let transport = Arc::new(GatewayTokenTransport::new(
        Sealer::from_base64_key(&config.sealing_key).expect("SEALING_KEY must be a base64 32-byte key"),
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
        transport.clone(),
        Arc::new(TotpGate),
        reconciler.clone(),
        clock.clone(),
        broker_config,
    ));
    let heartbeat = Arc::new(HeartbeatMonitor::new(pool.clone(), clock.clone()));
    let idle = Arc::new(IdlePolicy::new(
        pool.clone(),
        provider.clone(),
        broker.clone(),
        clock.clone(),
    ));

    // --- Background loops ---
    let reconcile_handle = tokio::spawn(background::reconcile::run(
        reconciler.clone(),
        Duration::from_secs(config.reconcile_interval_secs),
        cancel.clone(),
    ));
    let idle_handle = tokio::spawn(background::idle_sweep::run(
        idle.clone(),
        Duration::from_secs(config.idle_sweep_interval_secs),
        cancel.clone(),
    ));
    tracing::info!("Background loops started (reconcile, idle sweep)");

    // --- App state / router ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        broker,
        reconciler,
        heartbeat,
        provider,
        mfa: Arc::new(TotpGate),
        sealer,
        clock,
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), reconcile_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), idle_handle).await;

    tracing::info!("Graceful shutdown complete");
}

/// Seed a default tenant and admin account on first start so the portal
/// is reachable before any configuration has happened.
async fn bootstrap_tenant(pool: &vdesk_db::DbPool) {
    let tenants = TenantRepo::list_active(pool)
        .await
        .expect("Failed to query tenants");
    if !tenants.is_empty() {
        return;
    }

    let tenant = TenantRepo::create(
        pool,
        &CreateTenant {
            name: std::env::var("DEFAULT_TENANT_NAME").unwrap_or_else(|_| "Default".into()),
            slug: std::env::var("DEFAULT_TENANT_SLUG").unwrap_or_else(|_| "default".into()),
        },
    )
    .await
    .expect("Failed to create default tenant");

    let username = std::env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin".into());
    let password = std::env::var("ADMIN_PASSWORD").unwrap_or_else(|_| {
        tracing::warn!("ADMIN_PASSWORD not set; using the insecure default");
        "changeme".into()
    });
    let password_hash = hash_password(&password).expect("Failed to hash admin password");

    UserRepo::create(
        pool,
        &CreateUser {
            tenant_id: tenant.id,
            username,
            email: None,
            password_hash,
            role: "admin".into(),
        },
    )
    .await
    .expect("Failed to create admin user");

    tracing::info!(tenant = %tenant.slug, "Bootstrapped default tenant and admin account");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

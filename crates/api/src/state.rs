use std::sync::Arc;

use vdesk_broker::mfa::MfaGate;
use vdesk_broker::{HeartbeatMonitor, SessionBroker, StateReconciler};
use vdesk_core::clock::Clock;
use vdesk_core::seal::Sealer;
use vdesk_provider::VmProvider;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via
/// `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: vdesk_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Session broker (connect/disconnect orchestration).
    pub broker: Arc<SessionBroker>,
    /// State reconciler (pre-connect refresh, admin re-sync).
    pub reconciler: Arc<StateReconciler>,
    /// Heartbeat monitor.
    pub heartbeat: Arc<HeartbeatMonitor>,
    /// Cloud provider adapter (admin power/terminate/list calls).
    pub provider: Arc<dyn VmProvider>,
    /// MFA gate (login and destructive admin actions).
    pub mfa: Arc<dyn MfaGate>,
    /// Seals RDP credentials at rest.
    pub sealer: Arc<Sealer>,
    /// Injected time source.
    pub clock: Arc<dyn Clock>,
}

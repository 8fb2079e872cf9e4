//! User-facing desktop endpoints: list, connect, disconnect, heartbeat.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use vdesk_broker::broker::ConnectRequest;
use vdesk_broker::BrokerError;
use vdesk_core::error::CoreError;
use vdesk_core::state::ConnectionType;
use vdesk_core::types::{DbId, Timestamp};
use vdesk_db::repositories::{DesktopRepo, SessionRepo};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct DesktopSummary {
    pub id: DbId,
    pub display_name: String,
    pub current_state: String,
    pub last_state_check: Option<Timestamp>,
}

#[derive(Debug, Deserialize)]
pub struct ConnectBody {
    pub connection_type: ConnectionType,
    pub mfa_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatBody {
    pub session_id: DbId,
}

/// Best-effort client address for the session record.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// GET /desktops
// ---------------------------------------------------------------------------

/// List the caller's desktops, refreshing any whose state check is
/// stale. Refresh failures fall back to the stored state.
pub async fn list_desktops(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let desktops = DesktopRepo::list_for_user(&state.pool, user.user_id).await?;

    let stale_after = chrono::Duration::from_std(
        state.config.broker_config().state_check_stale_after,
    )
    .unwrap_or_else(|_| chrono::Duration::seconds(30));
    let now = state.clock.now();

    let mut summaries = Vec::with_capacity(desktops.len());
    for desktop in &desktops {
        let is_stale = desktop
            .last_state_check
            .map(|checked| now - checked > stale_after)
            .unwrap_or(true);

        let current_state = if is_stale {
            state.reconciler.refresh_with_timeout(desktop).await
        } else {
            desktop.state()
        };

        // Re-read for the timestamp the refresh may have written.
        let last_state_check = DesktopRepo::find_by_id(&state.pool, desktop.id)
            .await?
            .and_then(|d| d.last_state_check);

        summaries.push(DesktopSummary {
            id: desktop.id,
            display_name: desktop.display_name.clone(),
            current_state: current_state.as_str().to_string(),
            last_state_check,
        });
    }

    Ok(Json(DataResponse { data: summaries }))
}

// ---------------------------------------------------------------------------
// POST /desktops/{id}/connect
// ---------------------------------------------------------------------------

/// Authorize, power on if needed, and return a connection descriptor.
///
/// Ownership failures surface as 404 rather than 403 so the endpoint
/// does not reveal which desktop ids exist.
pub async fn connect(
    user: AuthUser,
    State(state): State<AppState>,
    Path(desktop_id): Path<DbId>,
    headers: HeaderMap,
    Json(body): Json<ConnectBody>,
) -> AppResult<impl IntoResponse> {
    let request = ConnectRequest {
        desktop_id,
        user_id: user.user_id,
        connection_type: body.connection_type,
        mfa_proof: body.mfa_code,
        client_ip: client_ip(&headers),
        as_admin: user.is_admin(),
    };

    let descriptor = state
        .broker
        .connect(&request, &CancellationToken::new())
        .await
        .map_err(|e| match e {
            BrokerError::Core(CoreError::Forbidden(_)) => AppError::Core(CoreError::NotFound {
                entity: "Desktop",
                id: desktop_id,
            }),
            other => AppError::Broker(other),
        })?;

    Ok(Json(DataResponse { data: descriptor }))
}

// ---------------------------------------------------------------------------
// POST /desktops/{id}/disconnect
// ---------------------------------------------------------------------------

/// End the caller's open sessions on a desktop. Idempotent: no open
/// session is still a 204.
pub async fn disconnect(
    user: AuthUser,
    State(state): State<AppState>,
    Path(desktop_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    state
        .broker
        .disconnect_desktop(desktop_id, user.user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// POST /desktops/heartbeat
// ---------------------------------------------------------------------------

/// Record a liveness ping for one of the caller's sessions.
pub async fn heartbeat(
    user: AuthUser,
    State(state): State<AppState>,
    Json(body): Json<HeartbeatBody>,
) -> AppResult<impl IntoResponse> {
    // Scope the lookup to the caller so session ids cannot be probed.
    let owns = SessionRepo::find_by_id(&state.pool, body.session_id)
        .await?
        .map(|s| s.user_id == user.user_id)
        .unwrap_or(false);
    if !owns {
        return Err(AppError::Core(CoreError::NotFound {
            entity: "Session",
            id: body.session_id,
        }));
    }

    state.heartbeat.beat(body.session_id).await?;
    Ok(Json(DataResponse { data: "ok" }))
}

//! Admin endpoints: desktop fleet management, power control, session
//! oversight, and tenant policy.
//!
//! All handlers require the `admin` role via [`RequireAdmin`] and are
//! scoped to the admin's tenant.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use vdesk_broker::mfa::TotpGate;
use vdesk_broker::BrokerError;
use vdesk_core::error::CoreError;
use vdesk_core::state::{DesktopState, SessionEndReason};
use vdesk_core::types::DbId;
use vdesk_db::models::desktop::{CreateDesktop, Desktop};
use vdesk_db::models::tenant::UpdateTenantPolicy;
use vdesk_db::repositories::{DesktopRepo, SessionRepo, TenantRepo, UserRepo};
use vdesk_provider::{PowerAction, VmSpec};

use crate::error::{AppError, AppResult};
use crate::middleware::rbac::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Load a desktop and verify it belongs to the admin's tenant.
async fn ensure_desktop_in_tenant(
    state: &AppState,
    id: DbId,
    tenant_id: DbId,
) -> AppResult<Desktop> {
    DesktopRepo::find_by_id(&state.pool, id)
        .await?
        .filter(|d| d.tenant_id == tenant_id)
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Desktop",
            id,
        }))
}

/// Re-verify the admin's MFA before a destructive action.
async fn verify_admin_mfa(state: &AppState, admin_id: DbId, code: &str) -> AppResult<()> {
    let admin = UserRepo::find_by_id(&state.pool, admin_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "User",
            id: admin_id,
        }))?;
    state
        .mfa
        .verify(&admin, Some(code))
        .await
        .map_err(AppError::Core)
}

// ---------------------------------------------------------------------------
// GET /admin/desktops
// ---------------------------------------------------------------------------

/// List every desktop in the tenant, active or not.
pub async fn list_desktops(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let desktops = DesktopRepo::list_for_tenant(&state.pool, admin.tenant_id).await?;
    Ok(Json(DataResponse { data: desktops }))
}

// ---------------------------------------------------------------------------
// POST /admin/desktops  (provision)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ProvisionBody {
    pub display_name: String,
    pub user_id: Option<DbId>,
    pub image_id: String,
    pub datacenter: String,
    pub network_name: String,
    pub cpu: String,
    pub ram_mb: i32,
    pub disk_gb: i32,
}

/// Provision a new desktop VM.
///
/// The row is created immediately in `provisioning`; the provider-side
/// creation runs in a background task because it can take minutes. The
/// reconciler moves the desktop to `on` once the VM reports ready, or
/// to `error` if provisioning outlives its deadline.
pub async fn provision(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Json(body): Json<ProvisionBody>,
) -> AppResult<impl IntoResponse> {
    if body.display_name.trim().is_empty() {
        return Err(AppError::BadRequest("display_name must not be empty".into()));
    }
    if body.ram_mb < 1024 || body.disk_gb < 10 {
        return Err(AppError::BadRequest(
            "VM spec below minimum (1024 MB RAM, 10 GB disk)".into(),
        ));
    }
    if let Some(user_id) = body.user_id {
        let valid = UserRepo::find_by_id(&state.pool, user_id)
            .await?
            .map(|u| u.tenant_id == admin.tenant_id && u.is_active)
            .unwrap_or(false);
        if !valid {
            return Err(AppError::BadRequest(
                "Assignee must be an active user in this tenant".into(),
            ));
        }
    }

    // The VM name doubles as the provider identifier until the create
    // command reports the real server id.
    let vm_name = format!("vdesk-{}", DbId::new_v4().simple());
    let admin_password = DbId::new_v4().simple().to_string();
    let sealed_password = state
        .sealer
        .seal(admin_password.as_bytes())
        .map_err(AppError::Core)?;

    let desktop = DesktopRepo::create(
        &state.pool,
        &CreateDesktop {
            tenant_id: admin.tenant_id,
            user_id: body.user_id,
            provider_server_id: vm_name.clone(),
            display_name: body.display_name.clone(),
            vm_private_ip: None,
            vm_rdp_username: Some("Administrator".into()),
            vm_rdp_password_sealed: Some(sealed_password),
            vm_cpu: Some(body.cpu.clone()),
            vm_ram_mb: Some(body.ram_mb),
            vm_disk_gb: Some(body.disk_gb),
            initial_state: DesktopState::Provisioning,
        },
    )
    .await?;

    let spec = VmSpec {
        name: vm_name,
        datacenter: body.datacenter,
        image_id: body.image_id,
        cpu: body.cpu,
        ram_mb: body.ram_mb,
        disk_gb: body.disk_gb,
        network_name: body.network_name,
        admin_password,
    };

    let pool = state.pool.clone();
    let provider = state.provider.clone();
    let clock = state.clock.clone();
    let desktop_id = desktop.id;
    tokio::spawn(async move {
        match provider.create_vm(&spec).await {
            Ok(server_id) => {
                if let Err(e) =
                    DesktopRepo::set_provider_server_id(&pool, desktop_id, &server_id, clock.now())
                        .await
                {
                    tracing::error!(desktop_id = %desktop_id, error = %e, "Could not store server id");
                    return;
                }
                tracing::info!(desktop_id = %desktop_id, server_id = %server_id, "VM created");
            }
            Err(e) => {
                tracing::error!(desktop_id = %desktop_id, error = %e, "VM provisioning failed");
                let _ = DesktopRepo::force_state(
                    &pool,
                    desktop_id,
                    DesktopState::Error,
                    clock.now(),
                )
                .await;
            }
        }
    });

    tracing::info!(
        desktop_id = %desktop.id,
        admin_id = %admin.user_id,
        "Desktop provisioning started",
    );
    Ok((StatusCode::CREATED, Json(DataResponse { data: desktop })))
}

// ---------------------------------------------------------------------------
// POST /admin/desktops/{id}/power
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct PowerBody {
    pub action: String,
}

/// Manual power control for a desktop VM.
///
/// Refreshes the actual provider state first, rejects actions that are
/// illegal from the observed state, and treats an action whose target
/// state already holds as a no-op.
pub async fn power(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(body): Json<PowerBody>,
) -> AppResult<impl IntoResponse> {
    let action = PowerAction::parse(&body.action).ok_or_else(|| {
        AppError::BadRequest(format!(
            "Invalid action '{}'. Must be one of: suspend, resume, power_on, power_off, restart",
            body.action
        ))
    })?;

    let desktop = ensure_desktop_in_tenant(&state, id, admin.tenant_id).await?;
    let actual = state.reconciler.refresh_with_timeout(&desktop).await;

    // Redundant command: the VM is already where this action leads.
    let target = match action {
        PowerAction::Suspend => Some(DesktopState::Suspended),
        PowerAction::Resume | PowerAction::On | PowerAction::Restart => Some(DesktopState::On),
        PowerAction::Off => Some(DesktopState::Off),
    };
    if action != PowerAction::Restart && target == Some(actual) {
        return Ok(Json(DataResponse {
            data: json!({
                "message": format!("VM is already {actual}"),
                "state": actual.as_str(),
            }),
        }));
    }

    // Command legality from the observed state, matching the desktop
    // state machine's edges.
    let transition = match (action, actual) {
        (PowerAction::Suspend, DesktopState::On) => Some(DesktopState::Suspending),
        (PowerAction::Resume, DesktopState::Suspended) => Some(DesktopState::Starting),
        (PowerAction::On, DesktopState::Off | DesktopState::Unknown) => {
            Some(DesktopState::Starting)
        }
        (PowerAction::Off, DesktopState::On) => Some(DesktopState::Off),
        // Restart leaves local state alone; the next refresh owns it.
        (PowerAction::Restart, DesktopState::On) => None,
        _ => {
            return Err(AppError::BadRequest(format!(
                "Cannot {} a desktop that is {actual}",
                body.action
            )))
        }
    };

    state
        .provider
        .power(&desktop.provider_server_id, action)
        .await
        .map_err(BrokerError::Provider)?;

    let mut resulting = actual;
    if let Some(next) = transition {
        let applied = DesktopRepo::transition_state(
            &state.pool,
            desktop.id,
            actual,
            next,
            state.clock.now(),
        )
        .await?;
        if applied {
            resulting = next;
        }
    }

    tracing::info!(
        desktop_id = %desktop.id,
        admin_id = %admin.user_id,
        action = %body.action,
        state = resulting.as_str(),
        "Power action executed",
    );

    Ok(Json(DataResponse {
        data: json!({
            "message": format!("Power action '{}' executed", body.action),
            "state": resulting.as_str(),
        }),
    }))
}

// ---------------------------------------------------------------------------
// POST /admin/desktops/{id}/terminate
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct TerminateBody {
    pub mfa_code: String,
}

/// Destroy the VM and deactivate the desktop. Destructive, so the
/// admin's MFA is re-verified. Session rows are kept (closed) for
/// history; the desktop is soft-deleted, never removed.
pub async fn terminate(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(body): Json<TerminateBody>,
) -> AppResult<impl IntoResponse> {
    verify_admin_mfa(&state, admin.user_id, &body.mfa_code).await?;

    let desktop = ensure_desktop_in_tenant(&state, id, admin.tenant_id).await?;

    state
        .provider
        .delete_vm(&desktop.provider_server_id)
        .await
        .map_err(BrokerError::Provider)?;

    let sessions = SessionRepo::list_open_for_desktop(&state.pool, desktop.id).await?;
    for session in sessions {
        state
            .broker
            .end_session(session.id, SessionEndReason::AdminTerminate)
            .await?;
    }

    DesktopRepo::set_active(&state.pool, desktop.id, false, state.clock.now()).await?;

    tracing::info!(
        desktop_id = %desktop.id,
        admin_id = %admin.user_id,
        "Desktop terminated and deactivated",
    );

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// DELETE /admin/desktops/{id}  (unregister, keeps the VM)
// ---------------------------------------------------------------------------

/// Remove a desktop from management without touching the VM.
pub async fn unregister(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let desktop = ensure_desktop_in_tenant(&state, id, admin.tenant_id).await?;

    let sessions = SessionRepo::list_open_for_desktop(&state.pool, desktop.id).await?;
    for session in sessions {
        state
            .broker
            .end_session(session.id, SessionEndReason::AdminTerminate)
            .await?;
    }

    DesktopRepo::set_active(&state.pool, desktop.id, false, state.clock.now()).await?;

    tracing::info!(desktop_id = %desktop.id, admin_id = %admin.user_id, "Desktop unregistered");
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// POST /admin/desktops/{id}/activate
// ---------------------------------------------------------------------------

/// Reactivate a previously unregistered desktop.
pub async fn activate(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    ensure_desktop_in_tenant(&state, id, admin.tenant_id).await?;
    DesktopRepo::set_active(&state.pool, id, true, state.clock.now()).await?;
    Ok(Json(DataResponse {
        data: json!({ "message": "Desktop activated" }),
    }))
}

// ---------------------------------------------------------------------------
// POST /admin/desktops/{id}/assign
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AssignBody {
    /// `null` unassigns the desktop.
    pub user_id: Option<DbId>,
}

/// Assign a desktop to a user, or unassign it.
pub async fn assign(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(body): Json<AssignBody>,
) -> AppResult<impl IntoResponse> {
    ensure_desktop_in_tenant(&state, id, admin.tenant_id).await?;

    if let Some(user_id) = body.user_id {
        let valid = UserRepo::find_by_id(&state.pool, user_id)
            .await?
            .map(|u| u.tenant_id == admin.tenant_id && u.is_active)
            .unwrap_or(false);
        if !valid {
            return Err(AppError::BadRequest(
                "Assignee must be an active user in this tenant".into(),
            ));
        }
    }

    let desktop = DesktopRepo::assign_user(&state.pool, id, body.user_id, state.clock.now())
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Desktop",
            id,
        }))?;

    tracing::info!(
        desktop_id = %id,
        admin_id = %admin.user_id,
        assignee = ?body.user_id,
        "Desktop assignment changed",
    );
    Ok(Json(DataResponse { data: desktop }))
}

// ---------------------------------------------------------------------------
// POST /admin/desktops/{id}/resync
// ---------------------------------------------------------------------------

/// Overwrite local state from a fresh provider read. The way out of
/// `error`.
pub async fn resync(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let desktop = ensure_desktop_in_tenant(&state, id, admin.tenant_id).await?;
    let resynced = state.reconciler.force_resync(&desktop).await?;
    Ok(Json(DataResponse {
        data: json!({ "state": resynced.as_str() }),
    }))
}

// ---------------------------------------------------------------------------
// GET /admin/sessions
// ---------------------------------------------------------------------------

/// List open sessions across the tenant, newest first.
pub async fn list_sessions(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let sessions = SessionRepo::list_open_for_tenant(&state.pool, admin.tenant_id).await?;
    Ok(Json(DataResponse { data: sessions }))
}

// ---------------------------------------------------------------------------
// DELETE /admin/sessions/{id}
// ---------------------------------------------------------------------------

/// Force-terminate a session. Idempotent.
pub async fn terminate_session(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let session = SessionRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Session",
            id,
        }))?;
    ensure_desktop_in_tenant(&state, session.desktop_id, admin.tenant_id).await?;

    state
        .broker
        .end_session(session.id, SessionEndReason::AdminTerminate)
        .await?;

    tracing::info!(session_id = %id, admin_id = %admin.user_id, "Session force-terminated");
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// PUT /admin/policy
// ---------------------------------------------------------------------------

/// Edit the tenant's idle policy.
pub async fn update_policy(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Json(body): Json<UpdateTenantPolicy>,
) -> AppResult<impl IntoResponse> {
    if body.suspend_threshold_minutes.is_some_and(|v| v < 1)
        || body.max_session_hours.is_some_and(|v| v < 1)
    {
        return Err(AppError::BadRequest(
            "Policy values must be positive".into(),
        ));
    }

    let tenant = TenantRepo::update_policy(&state.pool, admin.tenant_id, &body)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Tenant",
            id: admin.tenant_id,
        }))?;

    tracing::info!(
        tenant = %tenant.slug,
        admin_id = %admin.user_id,
        suspend_threshold_minutes = tenant.suspend_threshold_minutes,
        max_session_hours = tenant.max_session_hours,
        "Idle policy updated",
    );
    Ok(Json(DataResponse { data: tenant }))
}

// ---------------------------------------------------------------------------
// POST /admin/users/{id}/mfa
// ---------------------------------------------------------------------------

/// Generate and enroll a TOTP secret for a user. Returns the secret for
/// out-of-band delivery to the user's authenticator app.
pub async fn enable_user_mfa(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let user = UserRepo::find_by_id(&state.pool, id)
        .await?
        .filter(|u| u.tenant_id == admin.tenant_id)
        .ok_or(AppError::Core(CoreError::NotFound { entity: "User", id }))?;

    let secret = TotpGate::generate_secret();
    UserRepo::enable_mfa(&state.pool, user.id, &secret).await?;

    tracing::info!(user_id = %user.id, admin_id = %admin.user_id, "MFA enrolled");
    Ok(Json(DataResponse {
        data: json!({ "secret": secret }),
    }))
}

// ---------------------------------------------------------------------------
// GET /admin/images, GET /admin/networks
// ---------------------------------------------------------------------------

/// List OS images available for provisioning.
pub async fn list_images(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let images = state
        .provider
        .list_images()
        .await
        .map_err(BrokerError::Provider)?;
    Ok(Json(DataResponse { data: images }))
}

/// List private networks available for placement.
pub async fn list_networks(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let networks = state
        .provider
        .list_networks()
        .await
        .map_err(BrokerError::Provider)?;
    Ok(Json(DataResponse { data: networks }))
}

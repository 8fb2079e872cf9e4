//! Login handler.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use vdesk_core::error::CoreError;
use vdesk_db::repositories::{TenantRepo, UserRepo};

use crate::auth::jwt::issue_token;
use crate::auth::password::verify_password;
use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub tenant: String,
    pub username: String,
    pub password: String,
    pub mfa_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub role: String,
    pub mfa_enabled: bool,
}

/// `POST /auth/login` — verify credentials (and MFA where enrolled) and
/// issue an access token.
///
/// Unknown tenant, unknown user, and wrong password all collapse into
/// the same 401 so the endpoint cannot be used to probe for accounts.
pub async fn login(
    State(state): State<AppState>,
    Json(input): Json<LoginRequest>,
) -> AppResult<Json<DataResponse<LoginResponse>>> {
    let invalid =
        || AppError::Core(CoreError::Unauthorized("Invalid credentials".into()));

    let tenant = TenantRepo::find_by_slug(&state.pool, &input.tenant)
        .await?
        .ok_or_else(invalid)?;

    let user = UserRepo::find_by_username(&state.pool, tenant.id, &input.username)
        .await?
        .ok_or_else(invalid)?;

    if !verify_password(&input.password, &user.password_hash) {
        return Err(invalid());
    }

    state
        .mfa
        .verify(&user, input.mfa_code.as_deref())
        .await
        .map_err(AppError::Core)?;

    let token = issue_token(&user, &state.config.jwt)
        .map_err(|e| AppError::InternalError(format!("Token issuance failed: {e}")))?;

    tracing::info!(user_id = %user.id, tenant = %tenant.slug, "User logged in");

    Ok(Json(DataResponse {
        data: LoginResponse {
            token,
            role: user.role,
            mfa_enabled: user.mfa_enabled,
        },
    }))
}

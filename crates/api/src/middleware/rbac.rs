//! Role gate for admin-only handlers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use vdesk_core::error::CoreError;

use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::state::AppState;

/// Extractor that requires the `admin` role.
///
/// Wraps [`AuthUser`]; rejection is a plain 403 since admin routes do
/// not need existence hiding.
pub struct RequireAdmin(pub AuthUser);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(AppError::Core(CoreError::Forbidden(
                "Administrator role required".into(),
            )));
        }
        Ok(RequireAdmin(user))
    }
}

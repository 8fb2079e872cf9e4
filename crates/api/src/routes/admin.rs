use axum::routing::{delete, get, post, put};
use axum::Router;

use crate::handlers::admin;
use crate::state::AppState;

/// Admin routes mounted at `/admin`.
///
/// All routes require the `admin` role (enforced by handler extractors).
///
/// ```text
/// GET    /desktops                 -> list_desktops
/// POST   /desktops                 -> provision
/// POST   /desktops/{id}/power      -> power
/// POST   /desktops/{id}/terminate  -> terminate
/// POST   /desktops/{id}/activate   -> activate
/// POST   /desktops/{id}/assign     -> assign
/// POST   /desktops/{id}/resync     -> resync
/// DELETE /desktops/{id}            -> unregister
/// GET    /sessions                 -> list_sessions
/// DELETE /sessions/{id}            -> terminate_session
/// PUT    /policy                   -> update_policy
/// POST   /users/{id}/mfa           -> enable_user_mfa
/// GET    /images                   -> list_images
/// GET    /networks                 -> list_networks
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/desktops",
            get(admin::list_desktops).post(admin::provision),
        )
        .route("/desktops/{id}", delete(admin::unregister))
        .route("/desktops/{id}/power", post(admin::power))
        .route("/desktops/{id}/terminate", post(admin::terminate))
        .route("/desktops/{id}/activate", post(admin::activate))
        .route("/desktops/{id}/assign", post(admin::assign))
        .route("/desktops/{id}/resync", post(admin::resync))
        .route("/sessions", get(admin::list_sessions))
        .route("/sessions/{id}", delete(admin::terminate_session))
        .route("/policy", put(admin::update_policy))
        .route("/users/{id}/mfa", post(admin::enable_user_mfa))
        .route("/images", get(admin::list_images))
        .route("/networks", get(admin::list_networks))
}

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::desktops;
use crate::state::AppState;

/// User routes mounted at `/desktops`.
///
/// ```text
/// GET  /                 -> list_desktops
/// POST /heartbeat        -> heartbeat
/// POST /{id}/connect     -> connect
/// POST /{id}/disconnect  -> disconnect
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(desktops::list_desktops))
        .route("/heartbeat", post(desktops::heartbeat))
        .route("/{id}/connect", post(desktops::connect))
        .route("/{id}/disconnect", post(desktops::disconnect))
}

//! Route definitions, one module per surface.

pub mod admin;
pub mod auth;
pub mod desktops;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// All routes mounted under `/api/v1`.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/desktops", desktops::router())
        .nest("/admin", admin::router())
}

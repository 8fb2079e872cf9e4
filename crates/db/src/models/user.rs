//! User entity model and DTOs.

use serde::Serialize;
use sqlx::FromRow;
use vdesk_core::types::{DbId, Timestamp};

/// A user row from the `users` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: DbId,
    pub tenant_id: DbId,
    pub username: String,
    pub email: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub totp_secret: Option<String>,
    pub mfa_enabled: bool,
    pub role: String,
    pub is_active: bool,
    pub created_at: Timestamp,
}

/// DTO for creating a user (bootstrap and tests).
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub tenant_id: DbId,
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub role: String,
}

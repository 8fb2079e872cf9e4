//! Repository for the `users` table.

use sqlx::PgPool;
use vdesk_core::types::DbId;

use crate::models::user::{CreateUser, User};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "\
    id, tenant_id, username, email, password_hash, totp_secret, \
    mfa_enabled, role, is_active, created_at";

/// Provides CRUD operations for users.
pub struct UserRepo;

impl UserRepo {
    /// Insert a new user, returning the created row.
    pub async fn create(pool: &PgPool, input: &CreateUser) -> Result<User, sqlx::Error> {
        let query = format!(
            "INSERT INTO users (tenant_id, username, email, password_hash, role)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(input.tenant_id)
            .bind(&input.username)
            .bind(&input.email)
            .bind(&input.password_hash)
            .bind(&input.role)
            .fetch_one(pool)
            .await
    }

    /// Find a user by its internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find an active user by username within a tenant (login path).
    pub async fn find_by_username(
        pool: &PgPool,
        tenant_id: DbId,
        username: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM users \
             WHERE tenant_id = $1 AND username = $2 AND is_active = true"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(tenant_id)
            .bind(username)
            .fetch_optional(pool)
            .await
    }

    /// Store a TOTP secret and enable MFA for a user.
    pub async fn enable_mfa(
        pool: &PgPool,
        id: DbId,
        totp_secret: &str,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE users SET totp_secret = $2, mfa_enabled = true WHERE id = $1")
                .bind(id)
                .bind(totp_secret)
                .execute(pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}

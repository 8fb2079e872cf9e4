//! Repository for the `sessions` table.

use sqlx::PgPool;
use vdesk_core::state::{ConnectionType, SessionEndReason};
use vdesk_core::types::{DbId, Timestamp};

use crate::models::session::{CreateSession, Session};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "\
    id, desktop_id, user_id, connection_type, started_at, last_heartbeat, \
    client_ip, local_port, grant_ref, ended_at, end_reason";

/// Same columns qualified for joins against `desktops`.
const JOINED_COLUMNS: &str = "\
    s.id, s.desktop_id, s.user_id, s.connection_type, s.started_at, \
    s.last_heartbeat, s.client_ip, s.local_port, s.grant_ref, \
    s.ended_at, s.end_reason";

/// Provides session lifecycle operations.
pub struct SessionRepo;

impl SessionRepo {
    /// Open a session, racing on the partial unique index over
    /// `(desktop_id, user_id, connection_type) WHERE ended_at IS NULL`.
    ///
    /// Returns `None` when an open session for the same key already exists
    /// (the caller then fetches the winner via
    /// [`find_open_by_key`](Self::find_open_by_key)).
    pub async fn create_open(
        pool: &PgPool,
        input: &CreateSession,
        started_at: Timestamp,
    ) -> Result<Option<Session>, sqlx::Error> {
        let query = format!(
            "INSERT INTO sessions (desktop_id, user_id, connection_type, started_at, \
                client_ip, local_port, grant_ref)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (desktop_id, user_id, connection_type) WHERE ended_at IS NULL
                DO NOTHING
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Session>(&query)
            .bind(input.desktop_id)
            .bind(input.user_id)
            .bind(input.connection_type.as_str())
            .bind(started_at)
            .bind(&input.client_ip)
            .bind(input.local_port)
            .bind(&input.grant_ref)
            .fetch_optional(pool)
            .await
    }

    /// Find the open session for an idempotency key, if any.
    pub async fn find_open_by_key(
        pool: &PgPool,
        desktop_id: DbId,
        user_id: DbId,
        connection_type: ConnectionType,
    ) -> Result<Option<Session>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM sessions \
             WHERE desktop_id = $1 AND user_id = $2 AND connection_type = $3 \
               AND ended_at IS NULL"
        );
        sqlx::query_as::<_, Session>(&query)
            .bind(desktop_id)
            .bind(user_id)
            .bind(connection_type.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Find a session by ID, open or closed.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Session>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM sessions WHERE id = $1");
        sqlx::query_as::<_, Session>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Update `last_heartbeat` on an open session. Returns `true` if a row
    /// was touched; `false` means the session is missing or already closed.
    pub async fn touch_heartbeat(
        pool: &PgPool,
        id: DbId,
        now: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE sessions SET last_heartbeat = $2 WHERE id = $1 AND ended_at IS NULL")
                .bind(id)
                .bind(now)
                .execute(pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Close a session. Idempotent: a second call affects zero rows and
    /// returns `false` without error.
    pub async fn end(
        pool: &PgPool,
        id: DbId,
        reason: SessionEndReason,
        now: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE sessions SET ended_at = $2, end_reason = $3 \
             WHERE id = $1 AND ended_at IS NULL",
        )
        .bind(id)
        .bind(now)
        .bind(reason.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// List open sessions on one desktop.
    pub async fn list_open_for_desktop(
        pool: &PgPool,
        desktop_id: DbId,
    ) -> Result<Vec<Session>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM sessions \
             WHERE desktop_id = $1 AND ended_at IS NULL \
             ORDER BY started_at DESC"
        );
        sqlx::query_as::<_, Session>(&query)
            .bind(desktop_id)
            .fetch_all(pool)
            .await
    }

    /// List the caller's open sessions on a desktop (disconnect path).
    pub async fn list_open_for_desktop_user(
        pool: &PgPool,
        desktop_id: DbId,
        user_id: DbId,
    ) -> Result<Vec<Session>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM sessions \
             WHERE desktop_id = $1 AND user_id = $2 AND ended_at IS NULL"
        );
        sqlx::query_as::<_, Session>(&query)
            .bind(desktop_id)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// List open sessions across a tenant, newest first (admin view and
    /// the idle sweep's max-duration pass).
    pub async fn list_open_for_tenant(
        pool: &PgPool,
        tenant_id: DbId,
    ) -> Result<Vec<Session>, sqlx::Error> {
        let query = format!(
            "SELECT {JOINED_COLUMNS} FROM sessions s \
             JOIN desktops d ON d.id = s.desktop_id \
             WHERE d.tenant_id = $1 AND s.ended_at IS NULL \
             ORDER BY s.started_at DESC"
        );
        sqlx::query_as::<_, Session>(&query)
            .bind(tenant_id)
            .fetch_all(pool)
            .await
    }
}

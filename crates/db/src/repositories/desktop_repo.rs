//! Repository for the `desktops` table.

use sqlx::PgPool;
use vdesk_core::state::DesktopState;
use vdesk_core::types::{DbId, Timestamp};

use crate::models::desktop::{CreateDesktop, Desktop};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "\
    id, tenant_id, user_id, provider_server_id, display_name, \
    vm_private_ip, vm_rdp_username, vm_rdp_password_sealed, \
    vm_cpu, vm_ram_mb, vm_disk_gb, \
    current_state, last_state_check, is_active, created_at, updated_at";

/// Provides CRUD and state-transition operations for desktops.
pub struct DesktopRepo;

impl DesktopRepo {
    /// Register a desktop, returning the created row.
    pub async fn create(pool: &PgPool, input: &CreateDesktop) -> Result<Desktop, sqlx::Error> {
        let query = format!(
            "INSERT INTO desktops (tenant_id, user_id, provider_server_id, display_name, \
                vm_private_ip, vm_rdp_username, vm_rdp_password_sealed, \
                vm_cpu, vm_ram_mb, vm_disk_gb, current_state)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Desktop>(&query)
            .bind(input.tenant_id)
            .bind(input.user_id)
            .bind(&input.provider_server_id)
            .bind(&input.display_name)
            .bind(&input.vm_private_ip)
            .bind(&input.vm_rdp_username)
            .bind(&input.vm_rdp_password_sealed)
            .bind(&input.vm_cpu)
            .bind(input.vm_ram_mb)
            .bind(input.vm_disk_gb)
            .bind(input.initial_state.as_str())
            .fetch_one(pool)
            .await
    }

    /// Find a desktop by its internal ID, active or not.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Desktop>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM desktops WHERE id = $1");
        sqlx::query_as::<_, Desktop>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List active desktops assigned to a user.
    pub async fn list_for_user(pool: &PgPool, user_id: DbId) -> Result<Vec<Desktop>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM desktops \
             WHERE user_id = $1 AND is_active = true \
             ORDER BY display_name ASC"
        );
        sqlx::query_as::<_, Desktop>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// List all desktops in a tenant (admin view, includes inactive).
    pub async fn list_for_tenant(
        pool: &PgPool,
        tenant_id: DbId,
    ) -> Result<Vec<Desktop>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM desktops WHERE tenant_id = $1 ORDER BY display_name ASC"
        );
        sqlx::query_as::<_, Desktop>(&query)
            .bind(tenant_id)
            .fetch_all(pool)
            .await
    }

    /// List every active desktop across tenants (reconciler sweep).
    pub async fn list_active(pool: &PgPool) -> Result<Vec<Desktop>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM desktops WHERE is_active = true ORDER BY created_at ASC"
        );
        sqlx::query_as::<_, Desktop>(&query).fetch_all(pool).await
    }

    /// List active desktops in a tenant currently in `state` (idle sweep).
    pub async fn list_in_state_for_tenant(
        pool: &PgPool,
        tenant_id: DbId,
        state: DesktopState,
    ) -> Result<Vec<Desktop>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM desktops \
             WHERE tenant_id = $1 AND current_state = $2 AND is_active = true"
        );
        sqlx::query_as::<_, Desktop>(&query)
            .bind(tenant_id)
            .bind(state.as_str())
            .fetch_all(pool)
            .await
    }

    /// Compare-and-set state transition.
    ///
    /// The `WHERE current_state = $from` clause is the optimistic check:
    /// concurrent writers race on the row, and the loser's update simply
    /// affects zero rows. Returns `true` if the transition was applied.
    pub async fn transition_state(
        pool: &PgPool,
        id: DbId,
        from: DesktopState,
        to: DesktopState,
        now: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE desktops \
             SET current_state = $3, last_state_check = $4, updated_at = $4 \
             WHERE id = $1 AND current_state = $2",
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(now)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record a successful state check that observed no change.
    pub async fn touch_state_check(
        pool: &PgPool,
        id: DbId,
        now: Timestamp,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE desktops SET last_state_check = $2 WHERE id = $1")
            .bind(id)
            .bind(now)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Unconditionally set the state. Admin re-sync escape hatch for
    /// desktops stuck in `error`; everything else goes through
    /// [`transition_state`](Self::transition_state).
    pub async fn force_state(
        pool: &PgPool,
        id: DbId,
        to: DesktopState,
        now: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE desktops \
             SET current_state = $2, last_state_check = $3, updated_at = $3 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(to.as_str())
        .bind(now)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Replace the provider-side identifier once asynchronous
    /// provisioning reports the real one.
    pub async fn set_provider_server_id(
        pool: &PgPool,
        id: DbId,
        provider_server_id: &str,
        now: Timestamp,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE desktops SET provider_server_id = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(provider_server_id)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Assign or unassign the owning user.
    pub async fn assign_user(
        pool: &PgPool,
        id: DbId,
        user_id: Option<DbId>,
        now: Timestamp,
    ) -> Result<Option<Desktop>, sqlx::Error> {
        let query = format!(
            "UPDATE desktops SET user_id = $2, updated_at = $3 \
             WHERE id = $1 RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Desktop>(&query)
            .bind(id)
            .bind(user_id)
            .bind(now)
            .fetch_optional(pool)
            .await
    }

    /// Flip the soft-delete flag. Returns `true` if the row was updated.
    pub async fn set_active(
        pool: &PgPool,
        id: DbId,
        active: bool,
        now: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE desktops SET is_active = $2, updated_at = $3 WHERE id = $1")
                .bind(id)
                .bind(active)
                .bind(now)
                .execute(pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}

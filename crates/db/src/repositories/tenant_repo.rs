//! Repository for the `tenants` table.

use sqlx::PgPool;
use vdesk_core::types::DbId;

use crate::models::tenant::{CreateTenant, Tenant, UpdateTenantPolicy};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "\
    id, name, slug, suspend_threshold_minutes, max_session_hours, \
    is_active, created_at";

/// Provides CRUD operations for tenants.
pub struct TenantRepo;

impl TenantRepo {
    /// Insert a new tenant, returning the created row.
    pub async fn create(pool: &PgPool, input: &CreateTenant) -> Result<Tenant, sqlx::Error> {
        let query = format!(
            "INSERT INTO tenants (name, slug)
             VALUES ($1, $2)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Tenant>(&query)
            .bind(&input.name)
            .bind(&input.slug)
            .fetch_one(pool)
            .await
    }

    /// Find an active tenant by its slug (login path).
    pub async fn find_by_slug(pool: &PgPool, slug: &str) -> Result<Option<Tenant>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tenants WHERE slug = $1 AND is_active = true");
        sqlx::query_as::<_, Tenant>(&query)
            .bind(slug)
            .fetch_optional(pool)
            .await
    }

    /// List active tenants (idle sweep iterates these).
    pub async fn list_active(pool: &PgPool) -> Result<Vec<Tenant>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tenants WHERE is_active = true ORDER BY slug");
        sqlx::query_as::<_, Tenant>(&query).fetch_all(pool).await
    }

    /// Update the idle policy. Only non-`None` fields are applied.
    pub async fn update_policy(
        pool: &PgPool,
        id: DbId,
        input: &UpdateTenantPolicy,
    ) -> Result<Option<Tenant>, sqlx::Error> {
        let query = format!(
            "UPDATE tenants SET
                suspend_threshold_minutes = COALESCE($2, suspend_threshold_minutes),
                max_session_hours = COALESCE($3, max_session_hours)
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Tenant>(&query)
            .bind(id)
            .bind(input.suspend_threshold_minutes)
            .bind(input.max_session_hours)
            .fetch_optional(pool)
            .await
    }
}

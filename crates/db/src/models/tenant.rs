//! Tenant entity model and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use vdesk_core::types::{DbId, Timestamp};

/// A tenant row from the `tenants` table.
///
/// Carries the idle-policy knobs consumed by the sweep.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Tenant {
    pub id: DbId,
    pub name: String,
    pub slug: String,
    pub suspend_threshold_minutes: i32,
    pub max_session_hours: i32,
    pub is_active: bool,
    pub created_at: Timestamp,
}

/// DTO for creating a tenant (bootstrap and tests).
#[derive(Debug, Clone)]
pub struct CreateTenant {
    pub name: String,
    pub slug: String,
}

/// DTO for editing the idle policy. Both fields optional; only non-`None`
/// values are applied.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateTenantPolicy {
    pub suspend_threshold_minutes: Option<i32>,
    pub max_session_hours: Option<i32>,
}

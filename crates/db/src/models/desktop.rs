//! Desktop entity model and DTOs.

use serde::Serialize;
use sqlx::FromRow;
use vdesk_core::state::DesktopState;
use vdesk_core::types::{DbId, Timestamp};

/// A desktop row from the `desktops` table.
///
/// `current_state` is stored as text; use [`Desktop::state`] to get the
/// typed enum. The sealed RDP password never leaves the server.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Desktop {
    pub id: DbId,
    pub tenant_id: DbId,
    pub user_id: Option<DbId>,
    pub provider_server_id: String,
    pub display_name: String,
    pub vm_private_ip: Option<String>,
    pub vm_rdp_username: Option<String>,
    #[serde(skip_serializing)]
    pub vm_rdp_password_sealed: Option<String>,
    pub vm_cpu: Option<String>,
    pub vm_ram_mb: Option<i32>,
    pub vm_disk_gb: Option<i32>,
    pub current_state: String,
    pub last_state_check: Option<Timestamp>,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Desktop {
    /// Typed view of `current_state`.
    pub fn state(&self) -> DesktopState {
        DesktopState::parse(&self.current_state)
    }
}

/// DTO for registering a desktop (admin import or provisioning).
#[derive(Debug, Clone)]
pub struct CreateDesktop {
    pub tenant_id: DbId,
    pub user_id: Option<DbId>,
    pub provider_server_id: String,
    pub display_name: String,
    pub vm_private_ip: Option<String>,
    pub vm_rdp_username: Option<String>,
    pub vm_rdp_password_sealed: Option<String>,
    pub vm_cpu: Option<String>,
    pub vm_ram_mb: Option<i32>,
    pub vm_disk_gb: Option<i32>,
    pub initial_state: DesktopState,
}

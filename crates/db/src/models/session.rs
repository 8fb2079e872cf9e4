//! Session entity model and DTOs.

use serde::Serialize;
use sqlx::FromRow;
use vdesk_core::state::ConnectionType;
use vdesk_core::types::{DbId, Timestamp};

/// A session row from the `sessions` table.
///
/// Exactly one mutation is allowed while open (heartbeat); closing is the
/// only terminal mutation and is idempotent at the repository level.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Session {
    pub id: DbId,
    pub desktop_id: DbId,
    pub user_id: DbId,
    pub connection_type: String,
    pub started_at: Timestamp,
    pub last_heartbeat: Option<Timestamp>,
    pub client_ip: Option<String>,
    pub local_port: Option<i32>,
    pub grant_ref: Option<String>,
    pub ended_at: Option<Timestamp>,
    pub end_reason: Option<String>,
}

impl Session {
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }

    /// The moment this session last showed signs of life.
    pub fn last_seen(&self) -> Timestamp {
        self.last_heartbeat.unwrap_or(self.started_at)
    }
}

/// DTO for opening a session. `started_at` comes from the broker's clock.
#[derive(Debug, Clone)]
pub struct CreateSession {
    pub desktop_id: DbId,
    pub user_id: DbId,
    pub connection_type: ConnectionType,
    pub client_ip: Option<String>,
    pub local_port: Option<i32>,
    pub grant_ref: Option<String>,
}

//! Session liveness tracking.
//!
//! Clients ping periodically; the monitor stamps `last_heartbeat` on the
//! open session. Staleness is a read-side computation — the idle sweep
//! and any UI consumer call [`is_stale`] instead of relying on a
//! dedicated background job.

use std::sync::Arc;

use vdesk_core::clock::Clock;
use vdesk_core::error::CoreError;
use vdesk_core::types::{DbId, Timestamp};
use vdesk_db::models::session::Session;
use vdesk_db::repositories::SessionRepo;
use vdesk_db::DbPool;

use crate::error::BrokerResult;

/// Records heartbeats from connected clients.
pub struct HeartbeatMonitor {
    pool: DbPool,
    clock: Arc<dyn Clock>,
}

impl HeartbeatMonitor {
    pub fn new(pool: DbPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Stamp `last_heartbeat = now` on an open session.
    ///
    /// Fails with `NotFound` when the session does not exist or is
    /// already closed — the signal for the client to stop pinging. A
    /// closed session is never resurrected.
    pub async fn beat(&self, session_id: DbId) -> BrokerResult<()> {
        let touched =
            SessionRepo::touch_heartbeat(&self.pool, session_id, self.clock.now()).await?;
        if touched {
            Ok(())
        } else {
            Err(CoreError::NotFound {
                entity: "Session",
                id: session_id,
            }
            .into())
        }
    }
}

/// Whether a session has gone quiet for longer than `threshold`.
///
/// A session that never sent a heartbeat is measured from `started_at`.
pub fn is_stale(session: &Session, threshold: chrono::Duration, now: Timestamp) -> bool {
    now - session.last_seen() > threshold
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use vdesk_core::types::DbId;

    use super::*;

    fn session(started_ago: Duration, heartbeat_ago: Option<Duration>) -> Session {
        let now = Utc::now();
        Session {
            id: DbId::new_v4(),
            desktop_id: DbId::new_v4(),
            user_id: DbId::new_v4(),
            connection_type: "browser".into(),
            started_at: now - started_ago,
            last_heartbeat: heartbeat_ago.map(|ago| now - ago),
            client_ip: None,
            local_port: None,
            grant_ref: None,
            ended_at: None,
            end_reason: None,
        }
    }

    #[test]
    fn fresh_heartbeat_is_not_stale() {
        let s = session(Duration::hours(2), Some(Duration::minutes(1)));
        assert!(!is_stale(&s, Duration::minutes(30), Utc::now()));
    }

    #[test]
    fn old_heartbeat_is_stale() {
        let s = session(Duration::hours(2), Some(Duration::minutes(45)));
        assert!(is_stale(&s, Duration::minutes(30), Utc::now()));
    }

    #[test]
    fn no_heartbeat_measures_from_start() {
        let s = session(Duration::minutes(10), None);
        assert!(!is_stale(&s, Duration::minutes(30), Utc::now()));

        let s = session(Duration::minutes(40), None);
        assert!(is_stale(&s, Duration::minutes(30), Utc::now()));
    }
}

//! The idle policy sweep.
//!
//! Runs per tenant: sessions past the tenant's maximum duration are
//! force-ended regardless of heartbeats, and powered-on desktops with no
//! signs of life past the suspend threshold are suspended. Every item is
//! independent — a provider hiccup on one desktop is logged and skipped,
//! never aborting the sweep.
//!
//! Idle rule: a stale heartbeat counts as idle. A desktop whose open
//! sessions have all gone quiet is suspended and those sessions are
//! closed with `idle_timeout`; only a fresh heartbeat keeps it awake.

use std::sync::Arc;

use vdesk_core::clock::Clock;
use vdesk_core::state::{DesktopState, SessionEndReason};
use vdesk_core::types::Timestamp;
use vdesk_db::models::desktop::Desktop;
use vdesk_db::models::tenant::Tenant;
use vdesk_db::repositories::{DesktopRepo, SessionRepo, TenantRepo};
use vdesk_db::DbPool;
use vdesk_provider::{PowerAction, VmProvider};

use crate::broker::SessionBroker;
use crate::error::BrokerResult;
use crate::heartbeat::is_stale;

/// Counters from one sweep, for logging and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepOutcome {
    pub sessions_force_ended: usize,
    pub sessions_idle_ended: usize,
    pub desktops_suspended: usize,
    pub failures: usize,
}

/// Suspends idle desktops and terminates overlong sessions.
///
/// The only component that autonomously mutates state without a direct
/// user action; all its writes go through the same CAS transition as
/// everyone else, so it is safe alongside concurrent admin commands.
pub struct IdlePolicy {
    pool: DbPool,
    provider: Arc<dyn VmProvider>,
    broker: Arc<SessionBroker>,
    clock: Arc<dyn Clock>,
}

impl IdlePolicy {
    pub fn new(
        pool: DbPool,
        provider: Arc<dyn VmProvider>,
        broker: Arc<SessionBroker>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            pool,
            provider,
            broker,
            clock,
        }
    }

    /// Run one full sweep over every active tenant.
    pub async fn sweep(&self) -> SweepOutcome {
        let mut outcome = SweepOutcome::default();

        let tenants = match TenantRepo::list_active(&self.pool).await {
            Ok(tenants) => tenants,
            Err(e) => {
                tracing::error!(error = %e, "Idle sweep could not list tenants");
                outcome.failures += 1;
                return outcome;
            }
        };

        for tenant in &tenants {
            self.sweep_tenant(tenant, &mut outcome).await;
        }

        if outcome != SweepOutcome::default() {
            tracing::info!(
                force_ended = outcome.sessions_force_ended,
                idle_ended = outcome.sessions_idle_ended,
                suspended = outcome.desktops_suspended,
                failures = outcome.failures,
                "Idle sweep finished",
            );
        }
        outcome
    }

    async fn sweep_tenant(&self, tenant: &Tenant, outcome: &mut SweepOutcome) {
        let now = self.clock.now();
        let max_duration = chrono::Duration::hours(tenant.max_session_hours as i64);
        let threshold = chrono::Duration::minutes(tenant.suspend_threshold_minutes as i64);

        // Pass 1: force-end sessions past the maximum duration,
        // regardless of how recently they heartbeat.
        match SessionRepo::list_open_for_tenant(&self.pool, tenant.id).await {
            Ok(sessions) => {
                for session in sessions {
                    if now - session.started_at <= max_duration {
                        continue;
                    }
                    match self
                        .broker
                        .end_session(session.id, SessionEndReason::MaxDuration)
                        .await
                    {
                        Ok(()) => {
                            tracing::info!(
                                session_id = %session.id,
                                tenant = %tenant.slug,
                                "Session exceeded max duration",
                            );
                            outcome.sessions_force_ended += 1;
                        }
                        Err(e) => {
                            tracing::warn!(session_id = %session.id, error = %e, "Force-end failed");
                            outcome.failures += 1;
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(tenant = %tenant.slug, error = %e, "Could not list open sessions");
                outcome.failures += 1;
            }
        }

        // Pass 2: suspend powered-on desktops with no live session.
        let desktops = match DesktopRepo::list_in_state_for_tenant(
            &self.pool,
            tenant.id,
            DesktopState::On,
        )
        .await
        {
            Ok(desktops) => desktops,
            Err(e) => {
                tracing::warn!(tenant = %tenant.slug, error = %e, "Could not list desktops");
                outcome.failures += 1;
                return;
            }
        };

        for desktop in &desktops {
            if let Err(e) = self.check_desktop(desktop, threshold, now, outcome).await {
                tracing::warn!(
                    desktop_id = %desktop.id,
                    error = %e,
                    "Idle check failed, skipping desktop",
                );
                outcome.failures += 1;
            }
        }
    }

    async fn check_desktop(
        &self,
        desktop: &Desktop,
        threshold: chrono::Duration,
        now: Timestamp,
        outcome: &mut SweepOutcome,
    ) -> BrokerResult<()> {
        let sessions = SessionRepo::list_open_for_desktop(&self.pool, desktop.id).await?;

        if sessions.iter().any(|s| !is_stale(s, threshold, now)) {
            return Ok(());
        }
        // No sessions at all: wait out the threshold from the last state
        // change, so a desktop an admin just powered on is not yanked
        // back down before anyone connects.
        if sessions.is_empty() && now - desktop.updated_at <= threshold {
            return Ok(());
        }

        // Suspend first, then record it. A concurrent sweep may double
        // up on the provider call; suspending an already-suspending VM
        // is a provider-side no-op, and the CAS below makes the local
        // write last-writer-wins.
        self.provider
            .power(&desktop.provider_server_id, PowerAction::Suspend)
            .await?;

        let applied = DesktopRepo::transition_state(
            &self.pool,
            desktop.id,
            DesktopState::On,
            DesktopState::Suspending,
            now,
        )
        .await?;
        if applied {
            outcome.desktops_suspended += 1;
            tracing::info!(desktop_id = %desktop.id, "Idle desktop suspending");
        }

        for session in &sessions {
            self.broker
                .end_session(session.id, SessionEndReason::IdleTimeout)
                .await?;
            outcome.sessions_idle_ended += 1;
        }

        Ok(())
    }
}

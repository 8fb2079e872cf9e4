//! State reconciliation: folding provider-reported truth into the local
//! desktop state machine.
//!
//! The provider only ever reports steady states (`on`, `off`,
//! `suspended`); the transitional states are set by command paths and
//! confirmed here. When local and provider truth diverge on steady
//! states, convergence happens through the legal intermediate edge (for
//! example local `off` + observed `on` becomes `starting`, then `on` on
//! the next pass) so no write ever takes an undefined transition.

use std::sync::Arc;

use vdesk_core::clock::Clock;
use vdesk_core::state::DesktopState;
use vdesk_db::models::desktop::Desktop;
use vdesk_db::repositories::DesktopRepo;
use vdesk_db::DbPool;
use vdesk_provider::VmProvider;

use crate::config::BrokerConfig;
use crate::error::BrokerResult;

/// Map a provider power string onto the local enum.
///
/// The recognized set is closed; anything else is `Unknown`, never an
/// error, so a vendor adding a new string cannot break refresh.
pub fn map_provider_state(raw: &str) -> DesktopState {
    match raw {
        "on" => DesktopState::On,
        "off" => DesktopState::Off,
        "suspended" | "paused" => DesktopState::Suspended,
        _ => DesktopState::Unknown,
    }
}

/// Decide the state write (if any) for one observation.
///
/// Returns `None` when nothing should change: the observation matches,
/// the observation is `Unknown`, the desktop is in terminal `error`, or
/// a transitional state is still within its deadline. Every `Some` is a
/// legal edge of the state machine.
pub fn fold_observation(
    current: DesktopState,
    observed: DesktopState,
    transition_expired: bool,
) -> Option<DesktopState> {
    use DesktopState::*;

    if current == Error {
        return None;
    }
    if observed == Unknown {
        // A transitional state that outlived its deadline becomes an
        // error even when the provider has nothing useful to say.
        if transition_expired && current.is_transitional() {
            return Some(Error);
        }
        return None;
    }
    if current == observed {
        return None;
    }

    match (current, observed) {
        (Unknown, _) => Some(observed),
        (Provisioning, On) => Some(On),
        (Starting, On) => Some(On),
        (Suspending, Suspended) => Some(Suspended),
        // Steady-state divergence converges through the intermediate edge.
        (On, Off) => Some(Off),
        (On, Suspended) => Some(Suspending),
        (Off, On) => Some(Starting),
        (Suspended, On) => Some(Starting),
        _ if transition_expired && current.is_transitional() => Some(Error),
        _ => None,
    }
}

/// Keeps `Desktop.current_state` consistent with provider reality
/// without assuming the provider is reachable.
pub struct StateReconciler {
    pool: DbPool,
    provider: Arc<dyn VmProvider>,
    clock: Arc<dyn Clock>,
    config: BrokerConfig,
}

impl StateReconciler {
    pub fn new(
        pool: DbPool,
        provider: Arc<dyn VmProvider>,
        clock: Arc<dyn Clock>,
        config: BrokerConfig,
    ) -> Self {
        Self {
            pool,
            provider,
            clock,
            config,
        }
    }

    /// Refresh one desktop from the provider and persist any transition.
    ///
    /// On provider failure the stored state is left untouched
    /// (stale-but-present beats absent) and the error propagates to the
    /// caller, which decides whether that is fatal — `refresh_all` and
    /// the pre-connect path both treat it as non-fatal.
    ///
    /// Returns the (possibly updated) state.
    pub async fn refresh_one(&self, desktop: &Desktop) -> BrokerResult<DesktopState> {
        let raw = self.provider.get_state(&desktop.provider_server_id).await?;
        let observed = map_provider_state(&raw);

        let now = self.clock.now();
        let current = desktop.state();
        let transition_deadline = chrono::Duration::from_std(self.config.transition_deadline)
            .unwrap_or_else(|_| chrono::Duration::seconds(900));
        let transition_expired =
            current.is_transitional() && now - desktop.updated_at > transition_deadline;

        match fold_observation(current, observed, transition_expired) {
            Some(next) => {
                let applied =
                    DesktopRepo::transition_state(&self.pool, desktop.id, current, next, now)
                        .await?;
                if applied {
                    tracing::info!(
                        desktop_id = %desktop.id,
                        from = current.as_str(),
                        to = next.as_str(),
                        observed = observed.as_str(),
                        "Desktop state reconciled",
                    );
                    Ok(next)
                } else {
                    // Another writer changed the row first; it will be
                    // picked up on the next pass.
                    tracing::debug!(desktop_id = %desktop.id, "Reconcile lost a state race");
                    Ok(current)
                }
            }
            None => {
                if observed != current && observed != DesktopState::Unknown {
                    tracing::debug!(
                        desktop_id = %desktop.id,
                        current = current.as_str(),
                        observed = observed.as_str(),
                        "Observation not foldable yet",
                    );
                }
                DesktopRepo::touch_state_check(&self.pool, desktop.id, now).await?;
                Ok(current)
            }
        }
    }

    /// Refresh every active desktop. Each item is independent: one
    /// failure is logged and never aborts the batch.
    ///
    /// Returns the number of desktops successfully refreshed.
    pub async fn refresh_all(&self) -> usize {
        let desktops = match DesktopRepo::list_active(&self.pool).await {
            Ok(desktops) => desktops,
            Err(e) => {
                tracing::error!(error = %e, "Reconcile sweep could not list desktops");
                return 0;
            }
        };

        let mut refreshed = 0;
        for desktop in &desktops {
            match self.refresh_one(desktop).await {
                Ok(_) => refreshed += 1,
                Err(e) => {
                    tracing::warn!(
                        desktop_id = %desktop.id,
                        error = %e,
                        "Desktop refresh failed, keeping last known state",
                    );
                }
            }
        }
        refreshed
    }

    /// Synchronous refresh bounded by a short timeout, for callers that
    /// want fresh state before acting. Falls back to the last known
    /// state on failure or timeout so a slow provider never blocks the
    /// user indefinitely.
    pub async fn refresh_with_timeout(&self, desktop: &Desktop) -> DesktopState {
        match tokio::time::timeout(
            self.config.preconnect_refresh_timeout,
            self.refresh_one(desktop),
        )
        .await
        {
            Ok(Ok(state)) => state,
            Ok(Err(e)) => {
                tracing::warn!(desktop_id = %desktop.id, error = %e, "Pre-connect refresh failed");
                desktop.state()
            }
            Err(_) => {
                tracing::warn!(desktop_id = %desktop.id, "Pre-connect refresh timed out");
                desktop.state()
            }
        }
    }

    /// Admin escape hatch: overwrite the stored state with a fresh
    /// provider read, bypassing the edge rules. This is how a desktop
    /// leaves `error`.
    pub async fn force_resync(&self, desktop: &Desktop) -> BrokerResult<DesktopState> {
        let raw = self.provider.get_state(&desktop.provider_server_id).await?;
        let observed = map_provider_state(&raw);
        DesktopRepo::force_state(&self.pool, desktop.id, observed, self.clock.now()).await?;
        tracing::info!(
            desktop_id = %desktop.id,
            state = observed.as_str(),
            "Desktop force-resynced",
        );
        Ok(observed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DesktopState::*;

    #[test]
    fn provider_strings_map_through_the_closed_table() {
        assert_eq!(map_provider_state("on"), On);
        assert_eq!(map_provider_state("off"), Off);
        assert_eq!(map_provider_state("suspended"), Suspended);
        assert_eq!(map_provider_state("paused"), Suspended);
        assert_eq!(map_provider_state("rebooting"), Unknown);
        assert_eq!(map_provider_state(""), Unknown);
    }

    #[test]
    fn matching_observation_changes_nothing() {
        assert_eq!(fold_observation(On, On, false), None);
        assert_eq!(fold_observation(Off, Off, false), None);
    }

    #[test]
    fn unknown_observation_never_overwrites() {
        assert_eq!(fold_observation(On, Unknown, false), None);
        assert_eq!(fold_observation(Off, Unknown, false), None);
    }

    #[test]
    fn first_check_adopts_the_observed_state() {
        assert_eq!(fold_observation(Unknown, On, false), Some(On));
        assert_eq!(fold_observation(Unknown, Suspended, false), Some(Suspended));
    }

    #[test]
    fn transitional_states_confirm_their_target() {
        assert_eq!(fold_observation(Starting, On, false), Some(On));
        assert_eq!(fold_observation(Suspending, Suspended, false), Some(Suspended));
        assert_eq!(fold_observation(Provisioning, On, false), Some(On));
    }

    #[test]
    fn transitional_states_hold_until_deadline() {
        assert_eq!(fold_observation(Starting, Off, false), None);
        assert_eq!(fold_observation(Provisioning, Off, false), None);
        assert_eq!(fold_observation(Starting, Off, true), Some(Error));
        assert_eq!(fold_observation(Provisioning, Unknown, true), Some(Error));
        assert_eq!(fold_observation(Suspending, Off, true), Some(Error));
    }

    #[test]
    fn steady_divergence_routes_through_legal_edges() {
        assert_eq!(fold_observation(Off, On, false), Some(Starting));
        assert_eq!(fold_observation(On, Suspended, false), Some(Suspending));
        assert_eq!(fold_observation(Suspended, On, false), Some(Starting));
        assert_eq!(fold_observation(On, Off, false), Some(Off));
    }

    #[test]
    fn unreachable_observations_are_ignored() {
        // off -> suspended has no legal path; leave it to the admin.
        assert_eq!(fold_observation(Off, Suspended, false), None);
        assert_eq!(fold_observation(Suspended, Off, false), None);
    }

    #[test]
    fn error_is_terminal_for_reconciliation() {
        assert_eq!(fold_observation(Error, On, false), None);
        assert_eq!(fold_observation(Error, Off, true), None);
    }

    #[test]
    fn every_fold_result_is_a_legal_edge() {
        let states = [Unknown, Provisioning, On, Starting, Suspending, Suspended, Off, Error];
        for current in states {
            for observed in states {
                for expired in [false, true] {
                    if let Some(next) = fold_observation(current, observed, expired) {
                        assert!(
                            current.can_transition_to(next),
                            "fold produced illegal edge {current:?} -> {next:?}"
                        );
                    }
                }
            }
        }
    }
}

//! The session broker: the only component that creates sessions.
//!
//! `Connect` runs strictly in order — authorize, MFA gate, ensure the VM
//! is running, obtain a transport grant, and only then insert the
//! session row — so a failure at any step leaves no orphaned session.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use vdesk_core::clock::Clock;
use vdesk_core::error::CoreError;
use vdesk_core::state::{ConnectionType, DesktopState, SessionEndReason};
use vdesk_core::types::DbId;
use vdesk_db::models::desktop::Desktop;
use vdesk_db::models::session::{CreateSession, Session};
use vdesk_db::repositories::{DesktopRepo, SessionRepo, UserRepo};
use vdesk_db::DbPool;
use vdesk_provider::{PowerAction, ProviderError, VmProvider};

use crate::config::BrokerConfig;
use crate::error::{BrokerError, BrokerResult};
use crate::mfa::MfaGate;
use crate::reconcile::StateReconciler;
use crate::transport::{Grant, GrantRequest, SessionTransport};

/// An authorization-checked connect request.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub desktop_id: DbId,
    pub user_id: DbId,
    pub connection_type: ConnectionType,
    pub mfa_proof: Option<String>,
    pub client_ip: Option<String>,
    /// Admins may connect to desktops they do not own.
    pub as_admin: bool,
}

/// What the client receives back from a successful connect.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionDescriptor {
    pub session_id: DbId,
    pub desktop_name: String,
    pub connection_type: ConnectionType,
    pub grant: Grant,
}

/// Orchestrates connects and disconnects. Constructed once at startup
/// with explicit dependencies; cheap to share behind an `Arc`.
pub struct SessionBroker {
    pool: DbPool,
    provider: Arc<dyn VmProvider>,
    transport: Arc<dyn SessionTransport>,
    mfa: Arc<dyn MfaGate>,
    reconciler: Arc<StateReconciler>,
    clock: Arc<dyn Clock>,
    config: BrokerConfig,
}

impl SessionBroker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: DbPool,
        provider: Arc<dyn VmProvider>,
        transport: Arc<dyn SessionTransport>,
        mfa: Arc<dyn MfaGate>,
        reconciler: Arc<StateReconciler>,
        clock: Arc<dyn Clock>,
        config: BrokerConfig,
    ) -> Self {
        Self {
            pool,
            provider,
            transport,
            mfa,
            reconciler,
            clock,
            config,
        }
    }

    /// Authorize a connect, power the desktop on if needed, obtain a
    /// grant, and open the session.
    ///
    /// `cancel` aborts the power-on wait when the caller goes away.
    pub async fn connect(
        &self,
        request: &ConnectRequest,
        cancel: &CancellationToken,
    ) -> BrokerResult<ConnectionDescriptor> {
        // 1. Load and authorize. Ownership failures are reported as
        //    Forbidden here; the API edge collapses them into 404.
        let desktop = DesktopRepo::find_by_id(&self.pool, request.desktop_id)
            .await?
            .filter(|d| d.is_active)
            .ok_or(CoreError::NotFound {
                entity: "Desktop",
                id: request.desktop_id,
            })?;

        if !request.as_admin && desktop.user_id != Some(request.user_id) {
            return Err(CoreError::Forbidden("Desktop belongs to another user".into()).into());
        }

        // 2. MFA gate. Nothing below runs until this passes.
        let user = UserRepo::find_by_id(&self.pool, request.user_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "User",
                id: request.user_id,
            })?;
        self.mfa.verify(&user, request.mfa_proof.as_deref()).await?;

        let host = desktop
            .vm_private_ip
            .clone()
            .ok_or_else(|| CoreError::Validation("Desktop has no IP address configured".into()))?;

        // 3. Power on and wait for `on`, bounded by the start deadline.
        self.ensure_running(&desktop, cancel).await?;

        // 4. Transport grant, scoped to this desktop+user+type.
        let grant = self
            .transport
            .issue_grant(&GrantRequest {
                desktop_id: desktop.id,
                user_id: user.id,
                connection_type: request.connection_type,
                desktop_name: desktop.display_name.clone(),
                username: user.username.clone(),
                host,
                rdp_username: desktop.vm_rdp_username.clone(),
                rdp_password_sealed: desktop.vm_rdp_password_sealed.clone(),
                valid_for: self.config.grant_validity,
            })
            .await
            .map_err(|e| BrokerError::TransportFailure(e.to_string()))?;

        // 5. Session row last, after the grant is confirmed. Concurrent
        //    identical requests race on the open-session unique index;
        //    the loser reuses the winner's row. (Grant capacity per
        //    desktop+type is the transport's concern, not ours.)
        let session = self
            .open_session(request, &grant)
            .await?;

        tracing::info!(
            session_id = %session.id,
            desktop_id = %desktop.id,
            user_id = %user.id,
            connection_type = request.connection_type.as_str(),
            "Session established",
        );

        Ok(ConnectionDescriptor {
            session_id: session.id,
            desktop_name: desktop.display_name,
            connection_type: request.connection_type,
            grant,
        })
    }

    async fn open_session(
        &self,
        request: &ConnectRequest,
        grant: &Grant,
    ) -> BrokerResult<Session> {
        let input = CreateSession {
            desktop_id: request.desktop_id,
            user_id: request.user_id,
            connection_type: request.connection_type,
            client_ip: request.client_ip.clone(),
            local_port: grant.port.map(i32::from),
            grant_ref: Some(grant.reference.clone()),
        };

        if let Some(session) = SessionRepo::create_open(&self.pool, &input, self.clock.now()).await? {
            return Ok(session);
        }

        // Lost the insert race: return the concurrent winner.
        if let Some(session) = SessionRepo::find_open_by_key(
            &self.pool,
            request.desktop_id,
            request.user_id,
            request.connection_type,
        )
        .await?
        {
            tracing::debug!(session_id = %session.id, "Reusing concurrently created session");
            return Ok(session);
        }

        // The winner closed in the meantime; one more attempt settles it.
        SessionRepo::create_open(&self.pool, &input, self.clock.now())
            .await?
            .ok_or_else(|| CoreError::Internal("Session creation raced twice".into()).into())
    }

    /// Drive the desktop to `on`, issuing at most one power command and
    /// polling through the reconciler until the deadline.
    ///
    /// Tolerates finding the desktop already `starting` (a concurrent
    /// admin action or another connect): it simply polls. Observed
    /// states are folded by the reconciler, so every write stays on a
    /// legal edge.
    async fn ensure_running(
        &self,
        desktop: &Desktop,
        cancel: &CancellationToken,
    ) -> BrokerResult<()> {
        // Fresh state before acting, bounded so a slow provider cannot
        // stall the user; on failure the stored state stands in.
        let mut state = self.reconciler.refresh_with_timeout(desktop).await;
        if state == DesktopState::On {
            return Ok(());
        }

        let poll_ms = self.config.start_poll_interval.as_millis().max(1);
        let steps = (self.config.start_timeout.as_millis() / poll_ms).max(1);
        let deadline = self.clock.now()
            + chrono::Duration::from_std(self.config.start_timeout)
                .unwrap_or_else(|_| chrono::Duration::seconds(180));
        let mut power_issued = false;

        for _ in 0..steps {
            match state {
                DesktopState::On => return Ok(()),
                DesktopState::Error => {
                    return Err(CoreError::Conflict(
                        "Desktop is in an error state; an administrator must re-sync it".into(),
                    )
                    .into())
                }
                DesktopState::Suspended | DesktopState::Off | DesktopState::Unknown
                    if !power_issued =>
                {
                    let action = if state == DesktopState::Suspended {
                        PowerAction::Resume
                    } else {
                        PowerAction::On
                    };
                    self.provider
                        .power(&desktop.provider_server_id, action)
                        .await?;
                    power_issued = true;

                    let applied = DesktopRepo::transition_state(
                        &self.pool,
                        desktop.id,
                        state,
                        DesktopState::Starting,
                        self.clock.now(),
                    )
                    .await?;
                    if applied {
                        state = DesktopState::Starting;
                    } else {
                        tracing::debug!(
                            desktop_id = %desktop.id,
                            "Concurrent actor already moved the desktop; polling",
                        );
                    }
                }
                // Transitional, or the command is already in flight: wait.
                _ => {}
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(ProviderError::Cancelled.into()),
                _ = tokio::time::sleep(self.config.start_poll_interval) => {}
            }

            let row = DesktopRepo::find_by_id(&self.pool, desktop.id)
                .await?
                .ok_or(CoreError::NotFound {
                    entity: "Desktop",
                    id: desktop.id,
                })?;
            state = self.reconciler.refresh_with_timeout(&row).await;

            if self.clock.now() >= deadline {
                break;
            }
        }

        if state == DesktopState::On {
            return Ok(());
        }
        tracing::warn!(
            desktop_id = %desktop.id,
            last_observed = state.as_str(),
            "Desktop did not become ready in time",
        );
        Err(BrokerError::StartTimeout(self.config.start_timeout))
    }

    /// End a session and release its grant. Idempotent: a missing or
    /// already-ended session is a no-op, not an error.
    pub async fn end_session(
        &self,
        session_id: DbId,
        reason: SessionEndReason,
    ) -> BrokerResult<()> {
        let Some(session) = SessionRepo::find_by_id(&self.pool, session_id).await? else {
            return Ok(());
        };
        if !session.is_open() {
            return Ok(());
        }

        let ended =
            SessionRepo::end(&self.pool, session.id, reason, self.clock.now()).await?;
        if !ended {
            return Ok(());
        }

        if let Some(reference) = session.grant_ref.as_deref() {
            if let Err(e) = self.transport.revoke_grant(reference).await {
                tracing::warn!(
                    session_id = %session.id,
                    error = %e,
                    "Grant revocation failed; token will expire on its own",
                );
            }
        }

        tracing::info!(
            session_id = %session.id,
            reason = reason.as_str(),
            "Session ended",
        );
        Ok(())
    }

    /// User-initiated disconnect of one session.
    pub async fn disconnect(&self, session_id: DbId) -> BrokerResult<()> {
        self.end_session(session_id, SessionEndReason::UserDisconnect)
            .await
    }

    /// End all of a user's open sessions on a desktop (the
    /// disconnect-by-desktop API path).
    pub async fn disconnect_desktop(&self, desktop_id: DbId, user_id: DbId) -> BrokerResult<()> {
        let sessions =
            SessionRepo::list_open_for_desktop_user(&self.pool, desktop_id, user_id).await?;
        for session in sessions {
            self.end_session(session.id, SessionEndReason::UserDisconnect)
                .await?;
        }
        Ok(())
    }
}

//! The session transport seam.
//!
//! A transport turns an authorized connect into something a client can
//! actually reach: a sealed token for the browser gateway, or a
//! host/port pair for a native RDP client. The broker only ever sees
//! [`SessionTransport`]; [`GatewayTokenTransport`] is the stock
//! implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use vdesk_core::clock::Clock;
use vdesk_core::seal::Sealer;
use vdesk_core::state::ConnectionType;
use vdesk_core::types::DbId;

/// Transport-layer failure. The broker wraps this into
/// `BrokerError::TransportFailure`.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Everything the transport needs to mint a grant for one session.
#[derive(Debug, Clone)]
pub struct GrantRequest {
    pub desktop_id: DbId,
    pub user_id: DbId,
    pub connection_type: ConnectionType,
    pub desktop_name: String,
    /// Gateway-facing identity, shown in the remote session UI.
    pub username: String,
    /// Private address of the VM.
    pub host: String,
    pub rdp_username: Option<String>,
    /// Sealed RDP password; the transport unseals it so plaintext never
    /// passes through the broker.
    pub rdp_password_sealed: Option<String>,
    pub valid_for: Duration,
}

/// A minted grant: whatever the client needs to open the data plane.
#[derive(Debug, Clone, Serialize)]
pub struct Grant {
    /// Opaque handle used for revocation and stored on the session row.
    pub reference: String,
    /// Bearer credential for the gateway.
    pub token: String,
    /// Browser entry point, when the connection type uses one.
    pub gateway_url: Option<String>,
    /// Direct endpoint for native clients.
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Issues and revokes session grants.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    async fn issue_grant(&self, request: &GrantRequest) -> Result<Grant, TransportError>;

    /// Revoke a previously issued grant. Revoking an expired or unknown
    /// grant is not an error.
    async fn revoke_grant(&self, reference: &str) -> Result<(), TransportError>;
}

/// Stock transport: sealed JSON connection tokens for the web gateway.
///
/// The token embeds the RDP connection parameters and an expiry, sealed
/// under the process key, so the gateway needs no callback to authorize
/// the tunnel. Tokens are self-expiring; revocation is therefore a no-op
/// rather than a remote call.
pub struct GatewayTokenTransport {
    sealer: Sealer,
    /// Browser entry point, e.g. `https://portal.example.com/gateway`.
    gateway_url: String,
    /// Endpoint native clients tunnel through.
    native_host: String,
    native_port: u16,
    clock: Arc<dyn Clock>,
}

impl GatewayTokenTransport {
    pub fn new(
        sealer: Sealer,
        gateway_url: String,
        native_host: String,
        native_port: u16,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sealer,
            gateway_url,
            native_host,
            native_port,
            clock,
        }
    }
}

#[async_trait]
impl SessionTransport for GatewayTokenTransport {
    async fn issue_grant(&self, request: &GrantRequest) -> Result<Grant, TransportError> {
        let expires = self.clock.now()
            + chrono::Duration::from_std(request.valid_for)
                .map_err(|e| TransportError(format!("Bad grant validity: {e}")))?;

        let rdp_password = match &request.rdp_password_sealed {
            Some(sealed) => self
                .sealer
                .open_string(sealed)
                .map_err(|e| TransportError(format!("Cannot unseal RDP credentials: {e}")))?,
            None => String::new(),
        };

        let payload = json!({
            "username": request.username,
            "expires": expires.timestamp_millis(),
            "connection": {
                "name": request.desktop_name,
                "protocol": "rdp",
                "parameters": {
                    "hostname": request.host,
                    "port": "3389",
                    "username": request.rdp_username.as_deref().unwrap_or("Administrator"),
                    "password": rdp_password,
                    "security": "any",
                    "ignore-cert": "true",
                    "resize-method": "display-update",
                },
            },
        });

        let token = self
            .sealer
            .seal(payload.to_string().as_bytes())
            .map_err(|e| TransportError(format!("Failed to seal grant token: {e}")))?;

        let reference = uuid::Uuid::new_v4().to_string();
        tracing::debug!(
            desktop_id = %request.desktop_id,
            user_id = %request.user_id,
            connection_type = request.connection_type.as_str(),
            grant_ref = %reference,
            "Issued session grant",
        );

        let grant = match request.connection_type {
            ConnectionType::Browser => Grant {
                reference,
                token,
                gateway_url: Some(self.gateway_url.clone()),
                host: None,
                port: None,
            },
            ConnectionType::Native => Grant {
                reference,
                token,
                gateway_url: None,
                host: Some(self.native_host.clone()),
                port: Some(self.native_port),
            },
        };
        Ok(grant)
    }

    async fn revoke_grant(&self, reference: &str) -> Result<(), TransportError> {
        // Sealed tokens carry their own expiry; there is nothing to tear
        // down on the gateway side.
        tracing::debug!(grant_ref = %reference, "Grant revocation requested (self-expiring)");
        Ok(())
    }
}

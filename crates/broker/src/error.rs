use std::time::Duration;

use vdesk_core::error::CoreError;
use vdesk_provider::ProviderError;

/// Errors surfaced by the brokering layer.
///
/// Domain and provider errors pass through transparently so the API edge
/// can distinguish "try again" (transient provider trouble, timeouts)
/// from "fix something" (authorization, MFA, bad configuration).
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The desktop did not reach `on` within the configured bound.
    #[error("Desktop did not become ready within {0:?}")]
    StartTimeout(Duration),

    /// The transport collaborator failed to issue or revoke a grant.
    #[error("Transport failure: {0}")]
    TransportFailure(String),
}

pub type BrokerResult<T> = Result<T, BrokerError>;

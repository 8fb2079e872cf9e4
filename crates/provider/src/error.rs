use std::time::Duration;

/// Errors surfaced by provider operations.
///
/// `Unavailable` and `Timeout` are transient: retries have already been
/// exhausted by the time a caller sees them, but the user may try again.
/// `Rejected` and `Auth` are permanent for the request as issued.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Transient network failure or provider-side 5xx, retries exhausted.
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// The provider rejected the request (quota, bad spec, 4xx).
    #[error("Provider rejected the request: {0}")]
    Rejected(String),

    /// Authentication with the provider failed.
    #[error("Provider authentication failed: {0}")]
    Auth(String),

    /// A single call exceeded its request timeout.
    #[error("Provider call timed out after {0:?}")]
    Timeout(Duration),

    /// The operation was cancelled before completion.
    #[error("Provider call cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Whether a retry could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Unavailable(_) | ProviderError::Timeout(_))
    }
}

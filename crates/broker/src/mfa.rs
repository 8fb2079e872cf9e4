//! The MFA collaborator seam.
//!
//! The broker only enforces a pass/fail gate; how a proof is verified is
//! the gate's business. [`TotpGate`] verifies TOTP codes against the
//! user's enrolled secret.

use async_trait::async_trait;
use totp_rs::{Algorithm, Secret, TOTP};
use vdesk_core::error::CoreError;
use vdesk_db::models::user::User;

/// Pass/fail MFA gate consulted before any side effect of a connect.
#[async_trait]
pub trait MfaGate: Send + Sync {
    /// Verify `proof` against the policy for `user`.
    ///
    /// Returns `Ok(())` when the user's policy does not require MFA.
    /// Fails with `MfaRequired` when a proof is needed but missing, and
    /// `MfaInvalid` when a supplied proof does not verify.
    async fn verify(&self, user: &User, proof: Option<&str>) -> Result<(), CoreError>;
}

/// TOTP verification against the secret stored on the user row.
///
/// Accepts one time-step of clock drift, matching what authenticator
/// apps tolerate.
pub struct TotpGate;

impl TotpGate {
    /// Generate a fresh base32 TOTP secret for enrollment.
    pub fn generate_secret() -> String {
        Secret::generate_secret().to_encoded().to_string()
    }

    fn totp_for(secret_b32: &str) -> Result<TOTP, CoreError> {
        let secret = Secret::Encoded(secret_b32.to_string())
            .to_bytes()
            .map_err(|e| CoreError::Internal(format!("Stored TOTP secret is invalid: {e:?}")))?;
        TOTP::new(Algorithm::SHA1, 6, 1, 30, secret)
            .map_err(|e| CoreError::Internal(format!("Stored TOTP secret is invalid: {e}")))
    }
}

#[async_trait]
impl MfaGate for TotpGate {
    async fn verify(&self, user: &User, proof: Option<&str>) -> Result<(), CoreError> {
        if !user.mfa_enabled {
            return Ok(());
        }

        let secret = user
            .totp_secret
            .as_deref()
            .ok_or_else(|| CoreError::Internal("MFA enabled but no secret enrolled".into()))?;

        let code = match proof {
            Some(code) if !code.trim().is_empty() => code.trim(),
            _ => return Err(CoreError::MfaRequired),
        };

        let totp = Self::totp_for(secret)?;
        let valid = totp
            .check_current(code)
            .map_err(|e| CoreError::Internal(format!("System clock error: {e}")))?;
        if valid {
            Ok(())
        } else {
            Err(CoreError::MfaInvalid)
        }
    }
}

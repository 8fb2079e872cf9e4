//! JWT issuance and validation (HS256).

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use vdesk_core::types::DbId;
use vdesk_db::models::user::User;

/// Token signing configuration.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    /// Token lifetime in minutes (default: `480`).
    pub expire_minutes: i64,
}

impl JwtConfig {
    /// Load from `JWT_SECRET` / `JWT_EXPIRE_MINUTES`.
    pub fn from_env() -> Self {
        Self {
            secret: std::env::var("JWT_SECRET").expect("JWT_SECRET must be set"),
            expire_minutes: std::env::var("JWT_EXPIRE_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(480),
        }
    }
}

/// Claims carried in every access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: DbId,
    /// Tenant id.
    pub tenant: DbId,
    /// Role name (`user` or `admin`).
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issue an access token for a user.
pub fn issue_token(user: &User, config: &JwtConfig) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now();
    let claims = Claims {
        sub: user.id,
        tenant: user.tenant_id,
        role: user.role.clone(),
        iat: now.timestamp(),
        exp: (now + chrono::Duration::minutes(config.expire_minutes)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
}

/// Validate a token and return its claims.
pub fn validate_token(token: &str, config: &JwtConfig) -> Result<Claims, jsonwebtoken::errors::Error> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn test_user() -> User {
        User {
            id: DbId::new_v4(),
            tenant_id: DbId::new_v4(),
            username: "alice".into(),
            email: None,
            password_hash: "x".into(),
            totp_secret: None,
            mfa_enabled: false,
            role: "admin".into(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn config() -> JwtConfig {
        JwtConfig {
            secret: "test-secret".into(),
            expire_minutes: 60,
        }
    }

    #[test]
    fn issue_and_validate_round_trip() {
        let user = test_user();
        let token = issue_token(&user, &config()).unwrap();
        let claims = validate_token(&token, &config()).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.tenant, user.tenant_id);
        assert_eq!(claims.role, "admin");
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue_token(&test_user(), &config()).unwrap();
        let other = JwtConfig {
            secret: "different".into(),
            expire_minutes: 60,
        };
        assert!(validate_token(&token, &other).is_err());
    }
}

// Token service - issues and verifies HS256 JWTs

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};

use super::models::Claims;
use crate::common::ApiError;
use crate::users::UserRole;

pub const DEFAULT_TOKEN_EXPIRY_HOURS: i64 = 24;

/// Stateless access-token service. Tokens are HS256-signed and
/// self-contained; nothing is persisted, so a token stays valid until its
/// expiry regardless of later account changes.
pub struct TokenService {
    secret: String,
    expiry_hours: i64,
}

impl TokenService {
    pub fn new(secret: String, expiry_hours: i64) -> Self {
        Self {
            secret,
            expiry_hours,
        }
    }

    /// Issues a fresh access token for the user.
    pub fn issue(&self, user_id: &str, role: UserRole) -> Result<String, ApiError> {
        let expires_at = Utc::now() + Duration::hours(self.expiry_hours);
        let claims = Claims {
            sub: user_id.to_string(),
            role,
            exp: expires_at.timestamp() as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| ApiError::Technical(format!("Failed to sign access token: {}", e)))
    }

    /// Verifies signature and expiry. An expired token is reported
    /// distinctly so clients can prompt for a fresh login.
    pub fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => ApiError::ExpiredToken,
            _ => ApiError::InvalidToken,
        })
    }
}

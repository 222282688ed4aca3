//! JWT authentication middleware and helpers.
//!
//! Provides JWT encoding/decoding plus an `AuthUser` Axum extractor
//! that validates the Authorization header on operator routes.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use herald_common::error::AppError;

use crate::state::AppState;

/// JWT claims stored in the token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject — the operator's user id
    pub sub: String,
    /// Display name stamped on acknowledgments and resolutions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Expiration time (UNIX timestamp)
    pub exp: i64,
    /// Issued at (UNIX timestamp)
    pub iat: i64,
}

/// Authenticated operator extracted from a JWT.
///
/// Use as an Axum extractor on protected routes:
/// ```ignore
/// async fn handler(auth: AuthUser) -> impl IntoResponse {
///     // auth.actor() is the name to record against operator actions
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub claims: Claims,
}

impl AuthUser {
    /// `name` claim when present, else the subject.
    pub fn actor(&self) -> &str {
        self.claims
            .name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.user_id)
    }
}

/// Encode a JWT token for an operator.
pub fn encode_jwt(
    user_id: &str,
    name: Option<&str>,
    secret: &str,
    expiry_hours: u64,
) -> Result<String, AppError> {
    let now = Utc::now();
    let exp = now + Duration::hours(expiry_hours as i64);

    let claims = Claims {
        sub: user_id.to_string(),
        name: name.map(str::to_string),
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Auth(format!("Failed to encode JWT: {}", e)))
}

/// Decode and validate a JWT token.
pub fn decode_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| AppError::Auth(format!("Invalid token: {}", e)))?;

    Ok(token_data.claims)
}

/// Extracts and validates the JWT from the `Authorization: Bearer <token>` header.
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|auth| auth.strip_prefix("Bearer "))
            .ok_or_else(|| {
                AppError::Auth("Missing or invalid Authorization header. Use 'Bearer <JWT>'".to_string())
            })?;

        let claims = decode_jwt(token, &state.config.jwt_secret)?;
        if claims.sub.trim().is_empty() {
            return Err(AppError::Auth("Token has an empty subject".to_string()));
        }
        Ok(AuthUser {
            user_id: claims.sub.clone(),
            claims,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SECRET: &str = "test-secret-key-for-unit-tests";

    #[test]
    fn test_encode_decode_jwt() {
        let token = encode_jwt("op-7", Some("Alice"), TEST_SECRET, 24).unwrap();
        let claims = decode_jwt(&token, TEST_SECRET).unwrap();
        assert_eq!(claims.sub, "op-7");
        assert_eq!(claims.name.as_deref(), Some("Alice"));
        assert!(claims.exp > Utc::now().timestamp());
    }

    #[test]
    fn test_invalid_secret_rejected() {
        let token = encode_jwt("op-7", None, TEST_SECRET, 24).unwrap();
        assert!(decode_jwt(&token, "wrong-secret").is_err());
    }

    #[test]
    fn test_expired_jwt_rejected() {
        let now = Utc::now();
        let claims = Claims {
            sub: "op-7".to_string(),
            name: None,
            exp: (now - Duration::hours(1)).timestamp(),
            iat: (now - Duration::hours(2)).timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
        )
        .unwrap();

        assert!(decode_jwt(&token, TEST_SECRET).is_err());
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(decode_jwt("not.a.valid.jwt", TEST_SECRET).is_err());
    }

    #[test]
    fn test_actor_prefers_name() {
        let mut user = AuthUser {
            user_id: "op-7".to_string(),
            claims: Claims {
                sub: "op-7".to_string(),
                name: Some("Alice".to_string()),
                exp: 0,
                iat: 0,
            },
        };
        assert_eq!(user.actor(), "Alice");
        user.claims.name = Some("  ".to_string());
        assert_eq!(user.actor(), "op-7");
    }
}

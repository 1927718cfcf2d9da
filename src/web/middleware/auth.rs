//! JWT identity and authentication middleware.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, Request},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::chat::Identity;
use crate::web::error::ApiError;
use crate::{HuddleError, Result};

/// JWT claims structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user ID).
    pub sub: i64,
    /// Display name at issue time.
    pub username: String,
    /// Issued at timestamp.
    pub iat: u64,
    /// Expiration timestamp.
    pub exp: u64,
}

impl JwtClaims {
    /// Identity carried by these claims.
    pub fn identity(&self) -> Identity {
        Identity::new(self.sub, self.username.clone())
    }
}

/// Identity collaborator: verifies HS256 bearer tokens.
///
/// Tokens are issued by the account service; [`JwtIdentity::issue`] exists
/// for tooling and tests that share the secret.
#[derive(Clone)]
pub struct JwtIdentity {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtIdentity {
    /// Create a JWT identity from a secret key.
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Issue a token for a user valid for `ttl`.
    pub fn issue(&self, user_id: i64, username: &str, ttl: Duration) -> Result<String> {
        let now = Utc::now().timestamp().max(0) as u64;
        self.encode(&JwtClaims {
            sub: user_id,
            username: username.to_string(),
            iat: now,
            exp: now + ttl.as_secs(),
        })
    }

    /// Sign arbitrary claims.
    pub fn encode(&self, claims: &JwtClaims) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| HuddleError::Auth(format!("failed to sign token: {e}")))
    }

    /// Verify a token and return its claims.
    pub fn verify(&self, token: &str) -> Result<JwtClaims> {
        decode::<JwtClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| HuddleError::Auth(e.to_string()))
    }
}

impl std::fmt::Debug for JwtIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtIdentity").finish_non_exhaustive()
    }
}

/// Extractor for authenticated users.
///
/// Reads `Authorization: Bearer <token>` and rejects the request with 401
/// unless the token verifies.
#[derive(Debug, Clone)]
pub struct AuthUser(pub JwtClaims);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| ApiError::unauthorized("Missing authorization"))?;

        // Set by the jwt_auth middleware
        let jwt = parts
            .extensions
            .get::<Arc<JwtIdentity>>()
            .ok_or_else(|| ApiError::internal("JWT identity not configured"))?;

        let claims = jwt.verify(token.trim()).map_err(|e| {
            tracing::debug!("JWT validation failed: {}", e);
            ApiError::unauthorized("Invalid or expired token")
        })?;

        Ok(AuthUser(claims))
    }
}

/// Middleware function to inject the JWT identity into request extensions.
pub async fn jwt_auth(jwt: Arc<JwtIdentity>, mut request: Request<Body>, next: Next) -> Response {
    request.extensions_mut().insert(jwt);
    next.run(request).await
}

//! Admin tokens: a shared password exchanged for an HS256 JWT.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::security::secrets_match;

pub const DEFAULT_ADMIN_USERNAME: &str = "admin";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminClaims {
    pub is_admin: bool,
    pub username: String,
    /// Milliseconds since the epoch.
    pub login_time: i64,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Access denied. No token provided.")]
    MissingToken,
    #[error("Invalid token.")]
    InvalidToken,
    #[error("Token expired.")]
    Expired,
    #[error("Invalid admin token.")]
    NotAdmin,
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::unauthorized(err.to_string())
    }
}

struct AuthInner {
    password: String,
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

/// Issues and verifies admin tokens. Cheap to clone.
#[derive(Clone)]
pub struct AdminAuth {
    inner: Arc<AuthInner>,
}

impl AdminAuth {
    pub fn new(password: &str, secret: &str, ttl_hours: i64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Self {
            inner: Arc::new(AuthInner {
                password: password.to_string(),
                encoding: EncodingKey::from_secret(secret.as_bytes()),
                decoding: DecodingKey::from_secret(secret.as_bytes()),
                validation,
                ttl: Duration::hours(ttl_hours.max(1)),
            }),
        }
    }

    /// Exchanges the admin password for a token. `None` on a wrong password.
    pub fn login(
        &self,
        password: &str,
        username: Option<&str>,
    ) -> anyhow::Result<Option<(String, AdminClaims)>> {
        if !secrets_match(&self.inner.password, password) {
            return Ok(None);
        }
        let username = username
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_ADMIN_USERNAME);
        let now = Utc::now();
        let claims = AdminClaims {
            is_admin: true,
            username: username.to_string(),
            login_time: now.timestamp_millis(),
            iat: now.timestamp(),
            exp: (now + self.inner.ttl).timestamp(),
        };
        let token = self.sign(&claims)?;
        Ok(Some((token, claims)))
    }

    pub(crate) fn sign(&self, claims: &AdminClaims) -> anyhow::Result<String> {
        Ok(encode(&Header::new(Algorithm::HS256), claims, &self.inner.encoding)?)
    }

    pub fn verify(&self, token: &str) -> Result<AdminClaims, AuthError> {
        let data = decode::<AdminClaims>(token, &self.inner.decoding, &self.inner.validation)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken,
            })?;
        if !data.claims.is_admin {
            return Err(AuthError::NotAdmin);
        }
        Ok(data.claims)
    }

    /// Validates an `Authorization: Bearer <token>` header value.
    pub fn verify_header(&self, value: Option<&str>) -> Result<AdminClaims, AuthError> {
        let token = value
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(AuthError::MissingToken)?;
        self.verify(token.trim())
    }
}

impl<S> FromRequestParts<S> for AdminClaims
where
    S: Send + Sync,
    AdminAuth: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = AdminAuth::from_ref(state);
        let value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        auth.verify_header(value).map_err(|err| {
            tracing::debug!(error = %err, "rejected admin request");
            ApiError::from(err)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth() -> AdminAuth {
        AdminAuth::new("hunter2", "test-secret", 24)
    }

    #[test]
    fn login_issues_verifiable_token() {
        let auth = auth();
        assert!(auth.login("wrong", None).unwrap().is_none());

        let (token, claims) = auth.login("hunter2", Some("  ")).unwrap().unwrap();
        assert_eq!(claims.username, DEFAULT_ADMIN_USERNAME);
        assert!(claims.is_admin);
        assert_eq!(claims.exp - claims.iat, 24 * 3600);

        let header = format!("Bearer {token}");
        assert_eq!(auth.verify_header(Some(&header)).unwrap(), claims);
    }

    #[test]
    fn header_problems_map_to_distinct_errors() {
        let auth = auth();
        assert_eq!(auth.verify_header(None), Err(AuthError::MissingToken));
        assert_eq!(auth.verify_header(Some("Token abc")), Err(AuthError::MissingToken));
        assert_eq!(auth.verify_header(Some("Bearer nope")), Err(AuthError::InvalidToken));

        let (token, _) = AdminAuth::new("hunter2", "other-secret", 24)
            .login("hunter2", None)
            .unwrap()
            .unwrap();
        assert_eq!(auth.verify(&token), Err(AuthError::InvalidToken));
    }

    #[test]
    fn expired_and_non_admin_tokens_are_rejected() {
        let auth = auth();
        let now = Utc::now().timestamp();
        let expired = AdminClaims {
            is_admin: true,
            username: "admin".into(),
            login_time: 0,
            iat: now - 7200,
            exp: now - 3600,
        };
        assert_eq!(auth.verify(&auth.sign(&expired).unwrap()), Err(AuthError::Expired));

        let viewer = AdminClaims {
            is_admin: false,
            exp: now + 3600,
            ..expired
        };
        assert_eq!(auth.verify(&auth.sign(&viewer).unwrap()), Err(AuthError::NotAdmin));
        assert_eq!(AuthError::NotAdmin.to_string(), "Invalid admin token.");
    }
}

//! Bearer-token verification and the extractors that apply it to requests.

use crate::config::ServerConfig;
use axum::{
    Json, async_trait,
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::error;

pub const DEFAULT_ROLE: &str = "user";

/// The caller identified by a verified token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserContext {
    pub user_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub role: String,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: Option<String>,
    user_id: Option<String>,
    #[serde(rename = "userId")]
    user_id_camel: Option<String>,
    email: Option<String>,
    name: Option<String>,
    role: Option<String>,
}

#[derive(Debug, Serialize)]
struct IssuedClaims<'a> {
    sub: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    role: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingHeader,

    #[error("Invalid Authorization header format. Expected: 'Bearer <token>'")]
    InvalidFormat,

    #[error("Token has expired")]
    Expired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Invalid token: missing user identifier")]
    MissingUserId,

    #[error("JWT_SECRET not configured")]
    NotConfigured,

    #[error("Admin access required")]
    Forbidden,

    #[error("Authentication failed")]
    Failed,
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::NotConfigured => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(serde_json::json!({ "error": self.message() })),
        )
            .into_response()
    }
}

/// Verifies an HS256 token and extracts the caller.
pub fn verify_token(token: &str, secret: Option<&str>) -> Result<UserContext, AuthError> {
    let secret = secret.ok_or(AuthError::NotConfigured)?;

    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();

    let data = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
            error!("Error verifying JWT token: {}", e);
            AuthError::Failed
        }
        _ => AuthError::InvalidToken(e.to_string()),
    })?;

    let claims = data.claims;
    let user_id = claims
        .sub
        .or(claims.user_id)
        .or(claims.user_id_camel)
        .filter(|id| !id.is_empty())
        .ok_or(AuthError::MissingUserId)?;

    Ok(UserContext {
        user_id,
        email: claims.email,
        name: claims.name,
        role: claims.role.unwrap_or_else(|| DEFAULT_ROLE.to_string()),
    })
}

/// Verifies the value of an `Authorization: Bearer <token>` header.
pub fn user_from_header(
    authorization: Option<&str>,
    secret: Option<&str>,
) -> Result<UserContext, AuthError> {
    let authorization = authorization.ok_or(AuthError::MissingHeader)?;
    let parts: Vec<&str> = authorization.split_whitespace().collect();
    match parts.as_slice() {
        [scheme, token] if scheme.eq_ignore_ascii_case("bearer") => verify_token(token, secret),
        _ => Err(AuthError::InvalidFormat),
    }
}

pub fn require_admin(user: &UserContext) -> Result<(), AuthError> {
    if user.role.eq_ignore_ascii_case("admin") {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}

/// Signs a token for `user` valid for `ttl`.
pub fn issue_token(
    user: &UserContext,
    secret: &str,
    ttl: Duration,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now().timestamp();
    let claims = IssuedClaims {
        sub: &user.user_id,
        email: user.email.as_deref(),
        name: user.name.as_deref(),
        role: &user.role,
        iat: now,
        exp: now + ttl.as_secs() as i64,
    };
    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

fn authorization_header(parts: &Parts) -> Result<Option<&str>, AuthError> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .map(|value| value.to_str().map_err(|_| AuthError::InvalidFormat))
        .transpose()
}

/// Extractor for handlers that require a verified caller.
pub struct AuthUser(pub UserContext);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Arc<ServerConfig>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = Arc::<ServerConfig>::from_ref(state);
        let header = authorization_header(parts)?;
        user_from_header(header, config.jwt_secret.as_deref()).map(AuthUser)
    }
}

/// Extractor for handlers that serve guests too; any auth failure means `None`.
pub struct MaybeUser(pub Option<UserContext>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
    Arc<ServerConfig>: FromRef<S>,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = Arc::<ServerConfig>::from_ref(state);
        let user = match authorization_header(parts) {
            Ok(Some(header)) => user_from_header(Some(header), config.jwt_secret.as_deref()).ok(),
            _ => None,
        };
        Ok(MaybeUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    fn alice() -> UserContext {
        UserContext {
            user_id: "user-1".to_string(),
            email: Some("alice@example.com".to_string()),
            name: Some("Alice".to_string()),
            role: "admin".to_string(),
        }
    }

    fn sign(claims: serde_json::Value) -> String {
        jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn issued_token_round_trips() {
        let token = issue_token(&alice(), SECRET, Duration::from_secs(60)).unwrap();
        let user = verify_token(&token, Some(SECRET)).unwrap();
        assert_eq!(user, alice());
        assert!(require_admin(&user).is_ok());
    }

    #[test]
    fn user_id_claim_fallbacks_and_default_role() {
        let user = verify_token(&sign(serde_json::json!({"userId": "u-3"})), Some(SECRET)).unwrap();
        assert_eq!(user.user_id, "u-3");
        assert_eq!(user.role, "user");
        assert!(matches!(require_admin(&user), Err(AuthError::Forbidden)));

        let user = verify_token(
            &sign(serde_json::json!({"user_id": "u-2", "userId": "u-3"})),
            Some(SECRET),
        )
        .unwrap();
        assert_eq!(user.user_id, "u-2");
    }

    #[test]
    fn token_without_user_id_is_rejected() {
        let err = verify_token(&sign(serde_json::json!({"email": "x@y.z"})), Some(SECRET)).unwrap_err();
        assert!(matches!(err, AuthError::MissingUserId));
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn expired_and_forged_tokens_fail() {
        let expired = sign(serde_json::json!({"sub": "u-1", "exp": 1_000}));
        assert!(matches!(verify_token(&expired, Some(SECRET)), Err(AuthError::Expired)));

        let token = issue_token(&alice(), "other-secret", Duration::from_secs(60)).unwrap();
        assert!(matches!(
            verify_token(&token, Some(SECRET)),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn missing_secret_is_a_server_error() {
        let err = verify_token("anything", None).unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "JWT_SECRET not configured");
    }

    #[tokio::test]
    async fn rejection_renders_json_error() {
        let response = AuthError::InvalidToken("bad signature".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"], "Invalid token: bad signature");
    }

    #[test]
    fn header_format_is_checked() {
        assert!(matches!(user_from_header(None, Some(SECRET)), Err(AuthError::MissingHeader)));
        assert!(matches!(
            user_from_header(Some("Token abc"), Some(SECRET)),
            Err(AuthError::InvalidFormat)
        ));
        assert!(matches!(
            user_from_header(Some("Bearer"), Some(SECRET)),
            Err(AuthError::InvalidFormat)
        ));

        let token = issue_token(&alice(), SECRET, Duration::from_secs(60)).unwrap();
        let user = user_from_header(Some(&format!("bearer {}", token)), Some(SECRET)).unwrap();
        assert_eq!(user.user_id, "user-1");
    }
}

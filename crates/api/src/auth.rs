//! Bearer-token authentication and the admin guard.
//!
//! Tokens are minted by the authentication service: HS256 JWTs whose
//! `userId` claim names the caller. [`require_auth`] verifies them and puts an
//! [`AuthUser`] into the request extensions; [`AdminUser`] additionally loads
//! the caller's role from the store.

use std::sync::Arc;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use common::UserId;
use domain::User;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use store::Store;

use crate::error::ApiError;
use crate::state::AppState;

/// Verifies access tokens.
#[derive(Clone)]
pub struct AuthKeys {
    decoding: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for AuthKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthKeys").finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(rename = "userId")]
    user_id: Option<String>,
}

/// The authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub id: UserId,
}

impl AuthKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn verify(&self, token: &str) -> Result<AuthUser, ApiError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => ApiError::Unauthorized("Token expired"),
                _ => ApiError::Forbidden("Invalid token"),
            })?;

        let id = data
            .claims
            .user_id
            .and_then(|id| id.parse().ok())
            .ok_or(ApiError::Forbidden("Invalid token"))?;
        Ok(AuthUser { id })
    }
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")?
        .trim();
    (!token.is_empty()).then_some(token)
}

/// Rejects requests without a valid bearer token.
pub async fn require_auth(
    State(keys): State<AuthKeys>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer(req.headers()).ok_or(ApiError::Unauthorized("Unauthorized"))?;
    let user = keys.verify(token)?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// An authenticated caller with an admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

impl<S> FromRequestParts<Arc<AppState<S>>> for AdminUser
where
    S: Store + Clone + 'static,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<S>>,
    ) -> Result<Self, Self::Rejection> {
        let auth = parts
            .extensions
            .get::<AuthUser>()
            .copied()
            .ok_or(ApiError::Unauthorized("Unauthorized"))?;

        let user = state
            .store
            .get_user(auth.id)
            .await?
            .ok_or(ApiError::Forbidden("Invalid user"))?;
        if !user.role.is_admin() {
            return Err(ApiError::Forbidden("You don't have permission to do this"));
        }
        Ok(AdminUser(user))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use jsonwebtoken::{EncodingKey, Header};
    use serde_json::json;

    use super::*;

    const SECRET: &str = "test-secret";

    fn token(claims: serde_json::Value) -> String {
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn exp(offset_secs: i64) -> i64 {
        chrono::Utc::now().timestamp() + offset_secs
    }

    #[test]
    fn test_valid_token() {
        let id = UserId::new();
        let user = AuthKeys::new(SECRET)
            .verify(&token(json!({ "userId": id.to_string(), "exp": exp(600) })))
            .unwrap();
        assert_eq!(user.id, id);
    }

    #[test]
    fn test_expired_token() {
        let err = AuthKeys::new(SECRET)
            .verify(&token(json!({ "userId": UserId::new().to_string(), "exp": exp(-600) })))
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized("Token expired")));
    }

    #[test]
    fn test_wrong_secret_or_missing_claim() {
        let keys = AuthKeys::new("another-secret");
        let err = keys
            .verify(&token(json!({ "userId": UserId::new().to_string(), "exp": exp(600) })))
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden("Invalid token")));

        let err = AuthKeys::new(SECRET)
            .verify(&token(json!({ "exp": exp(600) })))
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden("Invalid token")));
    }

    #[test]
    fn test_extract_bearer() {
        let mut headers = HeaderMap::new();
        assert!(extract_bearer(&headers).is_none());

        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert!(extract_bearer(&headers).is_none());

        headers.insert("authorization", HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_bearer(&headers), Some("abc.def"));
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header::AUTHORIZATION, request::Parts, HeaderMap};

use crate::claims::Claims;
use crate::error::{AuthError, AuthResult};
use crate::roles::Role;
use crate::verifier::JwtVerifier;

/// Verified identity attached to a request.
///
/// When a route sits behind [`crate::guards::require_roles`] the guard has
/// already verified the token and stored the context in the request
/// extensions; the extractor reuses it instead of verifying twice.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub claims: Claims,
    pub token: String,
}

impl AuthContext {
    pub fn has_role(&self, role: Role) -> bool {
        self.claims.has_role(role)
    }

    pub fn into_claims(self) -> Claims {
        self.claims
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    Arc<JwtVerifier>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(existing) = parts.extensions.get::<AuthContext>() {
            return Ok(existing.clone());
        }

        let verifier = Arc::<JwtVerifier>::from_ref(state);
        let context = authenticate(&parts.headers, &verifier)?;
        parts.extensions.insert(context.clone());
        Ok(context)
    }
}

/// Reads the bearer token and verifies it with `verifier`.
pub fn authenticate(headers: &HeaderMap, verifier: &JwtVerifier) -> AuthResult<AuthContext> {
    let token = bearer_token(headers)?;
    let claims = verifier.verify(&token)?;
    Ok(AuthContext { claims, token })
}

/// Extracts the raw token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> AuthResult<String> {
    let header_value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingAuthorization)?;
    parse_bearer(header_value)
}

fn parse_bearer(value: &axum::http::HeaderValue) -> AuthResult<String> {
    let raw = value
        .to_str()
        .map_err(|_| AuthError::InvalidAuthorization)?
        .trim();

    let token = raw
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidAuthorization)?
        .trim();

    if token.is_empty() {
        return Err(AuthError::InvalidAuthorization);
    }

    Ok(token.to_owned())
}

use axum::response::{IntoResponse, Response};
use common_http_errors::ApiError;
use jsonwebtoken::errors::ErrorKind;
use thiserror::Error;

use crate::claims::TokenUse;
use crate::roles::Role;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token missing kid header")]
    MissingKeyId,
    #[error("no decoding key registered for kid '{0}'")]
    UnknownKeyId(String),
    #[error("failed to decode token header: {0}")]
    InvalidHeader(String),
    #[error("token has expired")]
    Expired,
    #[error("token verification failed: {0}")]
    Verification(String),
    #[error("expected a {expected} token but received a {found} token")]
    WrongTokenUse { expected: &'static str, found: &'static str },
    #[error("invalid claim '{0}' with value '{1}'")]
    InvalidClaim(&'static str, String),
    #[error("malformed claim payload: {0}")]
    InvalidJson(String),
    #[error("failed to parse key for kid '{0}': {1}")]
    KeyParse(String, String),
    #[error("failed to sign token: {0}")]
    Signing(String),
    #[error("authorization header missing")]
    MissingAuthorization,
    #[error("authorization header malformed")]
    InvalidAuthorization,
    #[error("insufficient role; required one of: {}", format_roles(.required))]
    Forbidden { required: Vec<Role> },
}

impl AuthError {
    pub(crate) fn wrong_use(expected: TokenUse, found: TokenUse) -> Self {
        Self::WrongTokenUse {
            expected: expected.as_str(),
            found: found.as_str(),
        }
    }

    /// True for every failure that should surface as 401 to the caller.
    pub fn is_unauthenticated(&self) -> bool {
        !matches!(
            self,
            AuthError::Forbidden { .. } | AuthError::KeyParse(_, _) | AuthError::Signing(_)
        )
    }
}

fn format_roles(roles: &[Role]) -> String {
    roles
        .iter()
        .map(Role::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        match value.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            _ => Self::Verification(value.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::MissingAuthorization | AuthError::InvalidAuthorization => {
                ApiError::unauthenticated("auth_header", value.to_string())
            }
            AuthError::Expired => ApiError::unauthenticated("token_expired", value.to_string()),
            AuthError::MissingKeyId
            | AuthError::UnknownKeyId(_)
            | AuthError::InvalidHeader(_)
            | AuthError::Verification(_)
            | AuthError::WrongTokenUse { .. }
            | AuthError::InvalidClaim(_, _)
            | AuthError::InvalidJson(_) => ApiError::unauthenticated("invalid_token", value.to_string()),
            AuthError::Forbidden { required } => match required.as_slice() {
                [single] => ApiError::ForbiddenMissingRole {
                    role: single.as_str().to_string(),
                },
                _ => ApiError::Forbidden {
                    message: Some(format!(
                        "Insufficient role. Required one of: {}",
                        format_roles(&required)
                    )),
                },
            },
            AuthError::KeyParse(_, _) | AuthError::Signing(_) => ApiError::internal(value),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn token_failures_map_to_unauthorized() {
        for err in [
            AuthError::MissingAuthorization,
            AuthError::InvalidAuthorization,
            AuthError::Expired,
            AuthError::MissingKeyId,
            AuthError::Verification("InvalidSignature".into()),
            AuthError::wrong_use(TokenUse::Access, TokenUse::Refresh),
        ] {
            assert!(err.is_unauthenticated());
            assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn forbidden_maps_to_403_with_missing_role() {
        let resp = AuthError::Forbidden {
            required: vec![Role::Admin],
        }
        .into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "missing_role");
    }

    #[test]
    fn key_parse_is_internal() {
        let err = AuthError::KeyParse("kid".into(), "bad pem".into());
        assert!(!err.is_unauthenticated());
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}

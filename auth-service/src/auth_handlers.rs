use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use common_auth::{bearer_token, AuthContext, Role};
use common_http_errors::{ApiError, ApiResult};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::service::ServiceError;
use crate::store::PublicCredential;
use crate::validation::{validate_login, LoginInput, RegistrationInput};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub refresh_expires_in: i64,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub sub: Uuid,
    pub identifier: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// Turns axum's body rejection into the shared 400 shape.
pub(crate) fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ApiError::bad_request("invalid_body", rejection.body_text()))
}

pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginInput>, JsonRejection>,
) -> ApiResult<Json<LoginResponse>> {
    let input = json_body(body)?;
    let valid = match validate_login(input) {
        Ok(valid) => valid,
        Err(errors) => {
            state.metrics.login_attempt("invalid_input");
            return Err(ServiceError::from(errors).into());
        }
    };

    match state.service.login(&valid.identifier, &valid.secret).await {
        Ok((credential, tokens)) => {
            state.metrics.login_attempt("success");
            info!(user_id = %credential.id, role = %credential.role, "login succeeded");
            Ok(Json(LoginResponse {
                access_token: tokens.access_token,
                refresh_token: tokens.refresh_token,
                token_type: tokens.token_type,
                expires_in: tokens.access_expires_in,
                refresh_expires_in: tokens.refresh_expires_in,
            }))
        }
        Err(ServiceError::InvalidCredentials) => {
            state.metrics.login_attempt("invalid_credentials");
            warn!(identifier = %valid.identifier, "login rejected");
            Err(ServiceError::InvalidCredentials.into())
        }
        Err(err) => {
            state.metrics.login_attempt("error");
            Err(err.into())
        }
    }
}

pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegistrationInput>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<PublicCredential>)> {
    let input = json_body(body)?;
    match state.service.self_register(input).await {
        Ok(credential) => {
            state.metrics.registration("created");
            Ok((StatusCode::CREATED, Json(credential)))
        }
        Err(err) => {
            let outcome = match &err {
                ServiceError::InvalidInput(_) => "invalid_input",
                ServiceError::Conflict(_) => "conflict",
                _ => "error",
            };
            state.metrics.registration(outcome);
            Err(err.into())
        }
    }
}

/// Exchanges the refresh token in the `Authorization` header for a new
/// access token.
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<RefreshResponse>> {
    let token = bearer_token(&headers).map_err(|err| {
        state.metrics.token_refresh("missing_token");
        ApiError::from(err)
    })?;

    match state.service.refresh_session(&token).await {
        Ok(issued) => {
            state.metrics.token_refresh("success");
            Ok(Json(RefreshResponse {
                access_token: issued.access_token,
                token_type: issued.token_type,
                expires_in: issued.access_expires_in,
            }))
        }
        Err(err) => {
            let outcome = match &err {
                ServiceError::InvalidToken(_) => "invalid_token",
                ServiceError::UnknownSubject(_) => "unknown_subject",
                _ => "error",
            };
            state.metrics.token_refresh(outcome);
            Err(err.into())
        }
    }
}

pub async fn profile(auth: AuthContext) -> Json<ProfileResponse> {
    let claims = auth.into_claims();
    Json(ProfileResponse {
        sub: claims.subject,
        identifier: claims.identifier,
        role: claims.role,
    })
}

// Tokens are stateless; the client discards them.
pub async fn logout(auth: AuthContext) -> Json<MessageResponse> {
    info!(user_id = %auth.claims.subject, "logout acknowledged");
    Json(MessageResponse {
        message: "Logged out",
    })
}

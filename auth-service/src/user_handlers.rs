use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use common_auth::AuthContext;
use common_http_errors::{ApiError, ApiResult};
use tracing::info;
use uuid::Uuid;

use crate::auth_handlers::json_body;
use crate::store::PublicCredential;
use crate::validation::{CredentialPatch, RegistrationInput};
use crate::AppState;

// Every route here sits behind the admin guard, which already placed the
// caller's AuthContext in the request extensions.

fn user_id(path: Result<Path<Uuid>, PathRejection>) -> ApiResult<Uuid> {
    path.map(|Path(id)| id)
        .map_err(|rejection| ApiError::bad_request("invalid_user_id", rejection.body_text()))
}

pub async fn list_users(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<PublicCredential>>> {
    let users = state.service.list_credentials().await?;
    Ok(Json(users))
}

pub async fn create_user(
    State(state): State<AppState>,
    auth: AuthContext,
    body: Result<Json<RegistrationInput>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<PublicCredential>)> {
    let input = json_body(body)?;
    let created = state.service.register(input).await?;
    info!(
        actor = %auth.claims.subject,
        user_id = %created.id,
        role = %created.role,
        "admin created credential"
    );
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_user(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<PublicCredential>> {
    let id = user_id(path)?;
    let user = state.service.get_credential(id).await?;
    Ok(Json(user))
}

pub async fn update_user(
    State(state): State<AppState>,
    auth: AuthContext,
    path: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<CredentialPatch>, JsonRejection>,
) -> ApiResult<Json<PublicCredential>> {
    let id = user_id(path)?;
    let patch = json_body(body)?;
    let updated = state.service.update_credential(id, patch).await?;
    info!(actor = %auth.claims.subject, user_id = %id, "admin updated credential");
    Ok(Json(updated))
}

pub async fn delete_user(
    State(state): State<AppState>,
    auth: AuthContext,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<StatusCode> {
    let id = user_id(path)?;
    state.service.delete_credential(id).await?;
    info!(actor = %auth.claims.subject, user_id = %id, "admin deleted credential");
    Ok(StatusCode::NO_CONTENT)
}

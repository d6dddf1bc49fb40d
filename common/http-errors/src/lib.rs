use axum::{http::{StatusCode, HeaderValue}, response::{IntoResponse, Response}, Json};
use serde::Serialize;

/// A single rejected request field.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self { field, message: message.into() }
    }
}

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")] pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")] pub missing_role: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")] pub fields: Vec<FieldError>,
}

#[derive(Debug)]
pub enum ApiError {
    InvalidInput { code: &'static str, message: Option<String>, fields: Vec<FieldError> },
    Unauthenticated { code: &'static str, message: Option<String> },
    ForbiddenMissingRole { role: String },
    Forbidden { message: Option<String> },
    Conflict { code: &'static str, message: Option<String> },
    NotFound { code: &'static str, message: Option<String> },
    Internal { message: String },
}

impl ApiError {
    /// Unexpected infrastructure failure. The detail is logged, never returned.
    pub fn internal<E: std::fmt::Display>(e: E) -> Self { Self::Internal { message: e.to_string() } }
    pub fn invalid_input(code: &'static str, fields: Vec<FieldError>) -> Self { Self::InvalidInput { code, message: None, fields } }
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self { Self::InvalidInput { code, message: Some(message.into()), fields: Vec::new() } }
    pub fn unauthenticated(code: &'static str, message: impl Into<String>) -> Self { Self::Unauthenticated { code, message: Some(message.into()) } }
    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self { Self::Conflict { code, message: Some(message.into()) } }
    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self { Self::NotFound { code, message: Some(message.into()) } }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            ApiError::ForbiddenMissingRole { .. } | ApiError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (body, error_code) = match self {
            ApiError::InvalidInput { code, message, fields } => (
                ErrorBody { code: code.into(), message, missing_role: None, fields },
                code
            ),
            ApiError::Unauthenticated { code, message } => (
                ErrorBody { code: code.into(), message, missing_role: None, fields: Vec::new() },
                code
            ),
            ApiError::ForbiddenMissingRole { role } => (
                ErrorBody { code: "missing_role".into(), message: None, missing_role: Some(role), fields: Vec::new() },
                "missing_role"
            ),
            ApiError::Forbidden { message } => (
                ErrorBody { code: "forbidden".into(), message, missing_role: None, fields: Vec::new() },
                "forbidden"
            ),
            ApiError::Conflict { code, message } => (
                ErrorBody { code: code.into(), message, missing_role: None, fields: Vec::new() },
                code
            ),
            ApiError::NotFound { code, message } => (
                ErrorBody { code: code.into(), message, missing_role: None, fields: Vec::new() },
                code
            ),
            ApiError::Internal { message } => {
                tracing::error!(error = %message, "request failed with internal error");
                (
                    ErrorBody { code: "internal_error".into(), message: Some("Internal server error".into()), missing_role: None, fields: Vec::new() },
                    "internal_error"
                )
            }
        };
        let mut resp = (status, Json(body)).into_response();
        if let Ok(val) = HeaderValue::from_str(error_code) {
            resp.headers_mut().insert("X-Error-Code", val);
        }
        resp
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

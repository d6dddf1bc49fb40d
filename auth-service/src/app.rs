use std::sync::Arc;

use axum::extract::{FromRef, State};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use common_auth::{require_roles, JwtVerifier, Role, RoleGuard};
use common_http_errors::ApiError;

use crate::auth_handlers::{login, logout, profile, refresh, register};
use crate::metrics::AuthMetrics;
use crate::service::AuthService;
use crate::user_handlers::{create_user, delete_user, get_user, list_users, update_user};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AuthService>,
    pub jwt_verifier: Arc<JwtVerifier>,
    pub metrics: Arc<AuthMetrics>,
}

impl AppState {
    /// Shares the service's access verifier with the guard layer.
    pub fn new(service: Arc<AuthService>, metrics: Arc<AuthMetrics>) -> Self {
        let jwt_verifier = Arc::new(service.access_verifier());
        Self {
            service,
            jwt_verifier,
            metrics,
        }
    }
}

impl FromRef<AppState> for Arc<JwtVerifier> {
    fn from_ref(state: &AppState) -> Self {
        state.jwt_verifier.clone()
    }
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(state: &AppState) -> Self {
        state.service.clone()
    }
}

impl FromRef<AppState> for Arc<AuthMetrics> {
    fn from_ref(state: &AppState) -> Self {
        state.metrics.clone()
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn render_metrics(State(metrics): State<Arc<AuthMetrics>>) -> Response {
    match metrics.render() {
        Ok(response) => response,
        Err(err) => ApiError::internal(err).into_response(),
    }
}

/// The full route table. Admin routes share one guard layer; the remaining
/// authenticated routes rely on the `AuthContext` extractor.
pub fn router(state: AppState) -> Router {
    let admin_guard = RoleGuard::new(state.jwt_verifier.clone(), &[Role::Admin]);

    let admin = Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/:id",
            get(get_user).patch(update_user).delete(delete_user),
        )
        .route_layer(middleware::from_fn_with_state(admin_guard, require_roles));

    Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(render_metrics))
        .route("/auth/login", post(login))
        .route("/auth/register", post(register))
        .route("/auth/refresh", post(refresh))
        .route("/auth/profile", get(profile))
        .route("/auth/logout", post(logout))
        .merge(admin)
        .with_state(state)
}

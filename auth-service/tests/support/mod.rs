// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use std::env;
use std::sync::Arc;

use anyhow::Result;
use auth_service::metrics::AuthMetrics;
use auth_service::passwords::{HashCost, SecretHasher};
use auth_service::service::AuthService;
use auth_service::store::{CredentialStore, InMemoryCredentialStore};
use auth_service::tokens::{SigningPolicy, TokenConfig, TokenSigner};
use auth_service::{router, AppState};
use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use common_auth::KeyMaterial;
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tower::util::ServiceExt;
use tracing::Span;

pub const ACCESS_SECRET: &str = "integration-access-secret";
pub const REFRESH_SECRET: &str = "integration-refresh-secret";

pub fn token_config() -> TokenConfig {
    TokenConfig {
        issuer: "auth-service".to_string(),
        audience: "auth-service-clients".to_string(),
        leeway_seconds: 0,
        access_ttl_seconds: 900,
        refresh_ttl_seconds: 3600,
    }
}

pub fn signer() -> TokenSigner {
    TokenSigner::new(
        token_config(),
        &SigningPolicy::new("access-v1", KeyMaterial::secret(ACCESS_SECRET)),
        &SigningPolicy::new("refresh-v1", KeyMaterial::secret(REFRESH_SECRET)),
    )
    .expect("token signer")
}

pub fn cheap_hasher() -> SecretHasher {
    SecretHasher::new(HashCost {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    })
    .expect("hasher")
}

pub struct TestApp {
    pub router: Router,
    pub service: Arc<AuthService>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_store(Arc::new(InMemoryCredentialStore::new()))
    }

    pub fn with_store(store: Arc<dyn CredentialStore>) -> Self {
        let service = Arc::new(AuthService::new(
            store,
            cheap_hasher(),
            Arc::new(signer()),
            8,
            Span::none(),
        ));
        let metrics = Arc::new(AuthMetrics::new().expect("metrics"));
        let router = router(AppState::new(service.clone(), metrics));
        Self { router, service }
    }

    pub async fn send(
        &self,
        method: Method,
        path: &str,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router response");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// Creates a credential directly through the service (any role), then
    /// logs in over HTTP. Returns `(access_token, refresh_token)`.
    pub async fn seed_and_login(
        &self,
        identifier: &str,
        secret: &str,
        role: &str,
    ) -> (String, String) {
        self.service
            .create_credential(identifier, secret, Some(role))
            .await
            .expect("create credential");

        let login = self
            .send(
                Method::POST,
                "/auth/login",
                None,
                Some(serde_json::json!({ "identifier": identifier, "secret": secret })),
            )
            .await;
        assert_eq!(login.status, StatusCode::OK, "{:?}", login.body);
        let access = login.body["access_token"]
            .as_str()
            .expect("access token")
            .to_string();
        let refresh = login.body["refresh_token"]
            .as_str()
            .expect("refresh token")
            .to_string();
        (access, refresh)
    }
}

/// Postgres pool for the `integration` suites. Returns `None` (and the
/// caller skips) unless `AUTH_TEST_DATABASE_URL` is set.
pub async fn test_pool() -> Result<Option<PgPool>> {
    let Ok(url) = env::var("AUTH_TEST_DATABASE_URL") else {
        eprintln!("Skipping Postgres tests: set AUTH_TEST_DATABASE_URL to run them.");
        return Ok(None);
    };
    let pool = PgPoolOptions::new().max_connections(5).connect(&url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(Some(pool))
}

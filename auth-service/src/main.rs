use std::sync::Arc;

use anyhow::{Context, Result};
use auth_service::config::{load_service_config, StoreBackend};
use auth_service::metrics::AuthMetrics;
use auth_service::passwords::SecretHasher;
use auth_service::service::{AuthService, SeedOutcome};
use auth_service::store::{CredentialStore, InMemoryCredentialStore, PgCredentialStore};
use auth_service::tokens::TokenSigner;
use auth_service::{router, AppState};
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, info_span, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = load_service_config()?;
    let span = info_span!("auth_service");

    let store: Arc<dyn CredentialStore> = match config.store {
        StoreBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set")?;
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(database_url)
                .await
                .context("Failed to connect to Postgres")?;
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to run database migrations")?;
            Arc::new(PgCredentialStore::new(pool))
        }
        StoreBackend::Memory => {
            warn!("AUTH_STORE=memory: credentials are lost on restart");
            Arc::new(InMemoryCredentialStore::new())
        }
    };

    let hasher = SecretHasher::new(config.hash_cost)?;
    let signer = TokenSigner::new(config.tokens.clone(), &config.access_key, &config.refresh_key)
        .context("Failed to load JWT signing keys")?;
    let service = Arc::new(AuthService::new(
        store,
        hasher,
        Arc::new(signer),
        config.min_secret_len,
        span,
    ));

    if let Some(seed) = &config.seed_admin {
        match service.seed_admin(&seed.identifier, &seed.secret).await? {
            SeedOutcome::Created => info!(identifier = %seed.identifier, "seeded admin credential"),
            SeedOutcome::AlreadyPresent => {
                info!(identifier = %seed.identifier, "admin credential already present")
            }
        }
    }

    let metrics = Arc::new(AuthMetrics::new()?);
    let app = router(AppState::new(service, metrics))
        .layer(cors_layer(&config.cors_allowed_origins)?)
        .layer(TraceLayer::new_for_http());

    let addr = config.socket_addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "starting auth-service");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("auth-service stopped");

    Ok(())
}

fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([ACCEPT, CONTENT_TYPE, AUTHORIZATION]);

    if origins.is_empty() {
        return Ok(layer.allow_origin(Any));
    }
    let values = origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin)
                .with_context(|| format!("Invalid CORS origin '{origin}'"))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(layer.allow_origin(AllowOrigin::list(values)))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(?err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(?err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

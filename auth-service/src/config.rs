use anyhow::{anyhow, bail, Context, Result};
use common_auth::KeyMaterial;
use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use crate::passwords::HashCost;
use crate::tokens::{SigningPolicy, TokenConfig, MAX_TTL_SECONDS};
use crate::validation::DEFAULT_MIN_SECRET_LENGTH;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(StoreBackend::Postgres),
            "memory" | "in-memory" => Ok(StoreBackend::Memory),
            other => Err(anyhow!(
                "Unsupported AUTH_STORE '{other}'. Use postgres or memory."
            )),
        }
    }
}

#[derive(Clone)]
pub struct SeedAdmin {
    pub identifier: String,
    pub secret: String,
}

impl fmt::Debug for SeedAdmin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeedAdmin")
            .field("identifier", &self.identifier)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: IpAddr,
    pub port: u16,
    pub store: StoreBackend,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub tokens: TokenConfig,
    pub access_key: SigningPolicy,
    pub refresh_key: SigningPolicy,
    pub min_secret_len: usize,
    pub hash_cost: HashCost,
    pub seed_admin: Option<SeedAdmin>,
    pub cors_allowed_origins: Vec<String>,
}

impl ServiceConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }
}

/// Reads the process environment, after loading `.env` when present.
pub fn load_service_config() -> Result<ServiceConfig> {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "loaded .env");
    }
    load_from(|key| env::var(key).ok())
}

/// Builds the configuration from any key lookup; tests pass a map.
pub fn load_from<F>(lookup: F) -> Result<ServiceConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| lookup(key).and_then(|value| normalize_optional(&value));

    let host = var("HOST")
        .unwrap_or_else(|| "0.0.0.0".to_string())
        .parse::<IpAddr>()
        .context("Failed to parse HOST")?;
    let port = parse_or(&var, "PORT", 3100u16)?;

    let store = var("AUTH_STORE")
        .map(|value| value.parse::<StoreBackend>())
        .transpose()?
        .unwrap_or(StoreBackend::Postgres);
    let database_url = var("DATABASE_URL");
    if store == StoreBackend::Postgres && database_url.is_none() {
        bail!("DATABASE_URL must be set when AUTH_STORE=postgres");
    }
    let database_max_connections = parse_or(&var, "DATABASE_MAX_CONNECTIONS", 5u32)?;

    let tokens = TokenConfig {
        issuer: var("JWT_ISSUER").unwrap_or_else(|| "auth-service".to_string()),
        audience: var("JWT_AUDIENCE").unwrap_or_else(|| "auth-service-clients".to_string()),
        leeway_seconds: parse_or(&var, "JWT_LEEWAY_SECONDS", 30u32)?,
        access_ttl_seconds: parse_or(&var, "JWT_ACCESS_TTL_SECONDS", 3600i64)?,
        refresh_ttl_seconds: parse_or(&var, "JWT_REFRESH_TTL_SECONDS", 604_800i64)?,
    };
    for (key, ttl) in [
        ("JWT_ACCESS_TTL_SECONDS", tokens.access_ttl_seconds),
        ("JWT_REFRESH_TTL_SECONDS", tokens.refresh_ttl_seconds),
    ] {
        if !(1..=MAX_TTL_SECONDS).contains(&ttl) {
            bail!("{key} must be between 1 and {MAX_TTL_SECONDS} seconds, got {ttl}");
        }
    }

    let access_key = SigningPolicy::new(
        var("JWT_ACCESS_KID").unwrap_or_else(|| "access-v1".to_string()),
        key_material(&var, "ACCESS")?,
    );
    let refresh_key = SigningPolicy::new(
        var("JWT_REFRESH_KID").unwrap_or_else(|| "refresh-v1".to_string()),
        key_material(&var, "REFRESH")?,
    );
    if access_key.material.same_as(&refresh_key.material) {
        bail!("Access and refresh tokens must be signed with different keys");
    }
    if access_key.kid == refresh_key.kid {
        bail!("JWT_ACCESS_KID and JWT_REFRESH_KID must differ");
    }

    let min_secret_len = parse_or(&var, "AUTH_PASSWORD_MIN_LENGTH", DEFAULT_MIN_SECRET_LENGTH)?;
    if min_secret_len == 0 {
        bail!("AUTH_PASSWORD_MIN_LENGTH must be at least 1");
    }

    let defaults = HashCost::default();
    let hash_cost = HashCost {
        memory_kib: parse_or(&var, "AUTH_HASH_MEMORY_KIB", defaults.memory_kib)?,
        iterations: parse_or(&var, "AUTH_HASH_ITERATIONS", defaults.iterations)?,
        parallelism: parse_or(&var, "AUTH_HASH_PARALLELISM", defaults.parallelism)?,
    };

    let seed_admin = match (
        var("AUTH_SEED_ADMIN_IDENTIFIER"),
        var("AUTH_SEED_ADMIN_SECRET"),
    ) {
        (Some(identifier), Some(secret)) => Some(SeedAdmin { identifier, secret }),
        (None, None) => None,
        _ => bail!("AUTH_SEED_ADMIN_IDENTIFIER and AUTH_SEED_ADMIN_SECRET must be set together"),
    };

    let cors_allowed_origins = var("CORS_ALLOWED_ORIGINS")
        .map(|value| parse_list(&value))
        .unwrap_or_default();

    Ok(ServiceConfig {
        host,
        port,
        store,
        database_url,
        database_max_connections,
        tokens,
        access_key,
        refresh_key,
        min_secret_len,
        hash_cost,
        seed_admin,
        cors_allowed_origins,
    })
}

fn key_material<F>(var: &F, kind: &str) -> Result<KeyMaterial>
where
    F: Fn(&str) -> Option<String>,
{
    let secret_key = format!("JWT_{kind}_SECRET");
    let private_key = format!("JWT_{kind}_PRIVATE_KEY_PEM");
    let public_key = format!("JWT_{kind}_PUBLIC_KEY_PEM");

    if let Some(secret) = var(&secret_key) {
        return Ok(KeyMaterial::secret(secret));
    }
    match (var(&private_key), var(&public_key)) {
        (Some(private_pem), Some(public_pem)) => Ok(KeyMaterial::rsa_pem(
            unescape_pem(&private_pem),
            unescape_pem(&public_pem),
        )),
        (Some(_), None) | (None, Some(_)) => Err(anyhow!(
            "{private_key} and {public_key} must be set together"
        )),
        (None, None) => Err(anyhow!(
            "No {} signing key configured. Set {secret_key} or {private_key}/{public_key}",
            kind.to_ascii_lowercase()
        )),
    }
}

fn parse_or<F, T>(var: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(value) => value
            .parse::<T>()
            .with_context(|| format!("Failed to parse {key}")),
        None => Ok(default),
    }
}

// Single-line env values carry PEM newlines as literal "\n".
fn unescape_pem(value: &str) -> String {
    value.replace("\\n", "\n")
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(|c| c == ',' || c == ';' || c == ' ')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn normalize_optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

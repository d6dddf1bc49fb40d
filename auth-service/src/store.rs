use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common_auth::Role;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("identifier '{0}' is already registered")]
    Conflict(String),
    #[error("credential {0} not found")]
    NotFound(Uuid),
    #[error("credential store failure: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(value: sqlx::Error) -> Self {
        StoreError::Backend(value.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A persisted credential including its secret hash. Only the store and the
/// auth service see this type; it is deliberately not `Serialize`.
#[derive(Debug, Clone)]
pub struct Credential {
    pub id: Uuid,
    pub identifier: String,
    pub secret_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    pub fn public_view(&self) -> PublicCredential {
        PublicCredential {
            id: self.id,
            identifier: self.identifier.clone(),
            role: self.role,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Outward-facing projection of a credential. It has no hash field, so
/// nothing built from it can leak one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicCredential {
    pub id: Uuid,
    pub identifier: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCredential {
    pub identifier: String,
    pub secret_hash: String,
    pub role: Role,
}

/// Mutable fields; the identifier is an immutable business key.
#[derive(Debug, Clone, Default)]
pub struct CredentialChanges {
    pub secret_hash: Option<String>,
    pub role: Option<Role>,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_identifier(&self, identifier: &str) -> StoreResult<Option<Credential>>;
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Credential>>;
    /// Fails with [`StoreError::Conflict`] when the identifier is taken.
    async fn insert(&self, new: NewCredential) -> StoreResult<Credential>;
    async fn list(&self) -> StoreResult<Vec<Credential>>;
    async fn update(&self, id: Uuid, changes: CredentialChanges) -> StoreResult<Credential>;
    async fn delete(&self, id: Uuid) -> StoreResult<()>;
}

#[derive(FromRow)]
struct CredentialRow {
    id: Uuid,
    identifier: String,
    secret_hash: String,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CredentialRow> for Credential {
    type Error = StoreError;

    fn try_from(row: CredentialRow) -> StoreResult<Self> {
        let role = row
            .role
            .parse::<Role>()
            .map_err(|err| StoreError::Backend(format!("credential {}: {err}", row.id)))?;
        Ok(Credential {
            id: row.id,
            identifier: row.identifier,
            secret_hash: row.secret_hash,
            role,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const CREDENTIAL_COLUMNS: &str = "id, identifier, secret_hash, role, created_at, updated_at";

#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_identifier(&self, identifier: &str) -> StoreResult<Option<Credential>> {
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM credentials WHERE identifier = $1"
        ))
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Credential::try_from).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Credential>> {
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM credentials WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Credential::try_from).transpose()
    }

    async fn insert(&self, new: NewCredential) -> StoreResult<Credential> {
        let result = sqlx::query_as::<_, CredentialRow>(&format!(
            "INSERT INTO credentials (id, identifier, secret_hash, role)
             VALUES ($1, $2, $3, $4)
             RETURNING {CREDENTIAL_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&new.identifier)
        .bind(&new.secret_hash)
        .bind(new.role.as_str())
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Credential::try_from(row),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::Conflict(new.identifier))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn list(&self) -> StoreResult<Vec<Credential>> {
        let rows = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM credentials ORDER BY created_at, identifier"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Credential::try_from).collect()
    }

    async fn update(&self, id: Uuid, changes: CredentialChanges) -> StoreResult<Credential> {
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            "UPDATE credentials
             SET secret_hash = COALESCE($2, secret_hash),
                 role = COALESCE($3, role),
                 updated_at = NOW()
             WHERE id = $1
             RETURNING {CREDENTIAL_COLUMNS}"
        ))
        .bind(id)
        .bind(changes.secret_hash)
        .bind(changes.role.map(|role| role.as_str()))
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Credential::try_from(row),
            None => Err(StoreError::NotFound(id)),
        }
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM credentials WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            Err(StoreError::NotFound(id))
        } else {
            Ok(())
        }
    }
}

/// Map-backed store for tests and `AUTH_STORE=memory` development runs.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    inner: RwLock<HashMap<Uuid, Credential>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_by_identifier(&self, identifier: &str) -> StoreResult<Option<Credential>> {
        let guard = self.inner.read().await;
        Ok(guard
            .values()
            .find(|credential| credential.identifier == identifier)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Credential>> {
        Ok(self.inner.read().await.get(&id).cloned())
    }

    async fn insert(&self, new: NewCredential) -> StoreResult<Credential> {
        let mut guard = self.inner.write().await;
        if guard
            .values()
            .any(|credential| credential.identifier == new.identifier)
        {
            return Err(StoreError::Conflict(new.identifier));
        }

        let now = Utc::now();
        let credential = Credential {
            id: Uuid::new_v4(),
            identifier: new.identifier,
            secret_hash: new.secret_hash,
            role: new.role,
            created_at: now,
            updated_at: now,
        };
        guard.insert(credential.id, credential.clone());
        Ok(credential)
    }

    async fn list(&self) -> StoreResult<Vec<Credential>> {
        let mut all = self
            .inner
            .read()
            .await
            .values()
            .cloned()
            .collect::<Vec<_>>();
        all.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.identifier.cmp(&b.identifier))
        });
        Ok(all)
    }

    async fn update(&self, id: Uuid, changes: CredentialChanges) -> StoreResult<Credential> {
        let mut guard = self.inner.write().await;
        let credential = guard.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if let Some(hash) = changes.secret_hash {
            credential.secret_hash = hash;
        }
        if let Some(role) = changes.role {
            credential.role = role;
        }
        credential.updated_at = Utc::now();
        Ok(credential.clone())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        match self.inner.write().await.remove(&id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(id)),
        }
    }
}

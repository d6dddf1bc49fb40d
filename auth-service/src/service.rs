use std::sync::Arc;

use common_auth::{AuthError, JwtVerifier, Role};
use common_http_errors::ApiError;
use thiserror::Error;
use tracing::{debug, info, instrument, warn, Span};
use uuid::Uuid;

use crate::passwords::{PasswordError, SecretHasher};
use crate::store::{
    CredentialChanges, CredentialStore, NewCredential, PublicCredential, StoreError,
};
use crate::tokens::{IssuedAccessToken, IssuedTokens, TokenSigner, TokenSubject};
use crate::validation::{
    validate_patch, validate_registration, CredentialPatch, RegistrationInput, ValidRegistration,
    ValidationErrors,
};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    InvalidInput(#[from] ValidationErrors),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid token: {0}")]
    InvalidToken(AuthError),
    #[error("token subject {0} no longer exists")]
    UnknownSubject(Uuid),
    #[error("identifier '{0}' is already registered")]
    Conflict(String),
    #[error("credential {0} not found")]
    NotFound(Uuid),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(identifier) => ServiceError::Conflict(identifier),
            StoreError::NotFound(id) => ServiceError::NotFound(id),
            StoreError::Backend(message) => ServiceError::Internal(message),
        }
    }
}

impl From<PasswordError> for ServiceError {
    fn from(value: PasswordError) -> Self {
        ServiceError::Internal(value.to_string())
    }
}

impl From<ServiceError> for ApiError {
    fn from(value: ServiceError) -> Self {
        match value {
            ServiceError::InvalidInput(errors) => {
                ApiError::invalid_input("invalid_input", errors.into_fields())
            }
            ServiceError::InvalidCredentials => {
                ApiError::unauthenticated("invalid_credentials", "Invalid identifier or secret")
            }
            ServiceError::InvalidToken(err) => ApiError::from(err),
            ServiceError::UnknownSubject(_) => {
                ApiError::unauthenticated("unknown_subject", "Token subject no longer exists")
            }
            ServiceError::Conflict(identifier) => ApiError::conflict(
                "identifier_taken",
                format!("Identifier '{identifier}' is already registered"),
            ),
            ServiceError::NotFound(id) => {
                ApiError::not_found("credential_not_found", format!("Credential {id} not found"))
            }
            ServiceError::Internal(message) => ApiError::internal(message),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    Created,
    AlreadyPresent,
}

/// Credential checks and session issuance over a [`CredentialStore`].
///
/// Every operation is a single read or write against the store; concurrent
/// registrations of one identifier are settled by the store.
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    hasher: SecretHasher,
    signer: Arc<TokenSigner>,
    min_secret_len: usize,
    span: Span,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        hasher: SecretHasher,
        signer: Arc<TokenSigner>,
        min_secret_len: usize,
        span: Span,
    ) -> Self {
        Self {
            store,
            hasher,
            signer,
            min_secret_len,
            span,
        }
    }

    pub fn access_verifier(&self) -> JwtVerifier {
        self.signer.access_verifier()
    }

    /// Returns the hash-free credential when `secret` matches, `None` for an
    /// unknown identifier, an empty secret, or a mismatch.
    #[instrument(parent = &self.span, skip_all, fields(identifier = %identifier))]
    pub async fn validate_credentials(
        &self,
        identifier: &str,
        secret: &str,
    ) -> ServiceResult<Option<PublicCredential>> {
        if secret.is_empty() {
            return Ok(None);
        }
        let Some(credential) = self.store.find_by_identifier(identifier).await? else {
            debug!("identifier not found");
            // Unknown identifiers pay the same argon2 cost as a mismatch.
            self.hasher
                .verify_blocking(secret.to_string(), self.hasher.decoy_hash().to_string())
                .await?;
            return Ok(None);
        };

        let matches = self
            .hasher
            .verify_blocking(secret.to_string(), credential.secret_hash.clone())
            .await?;
        if matches {
            Ok(Some(credential.public_view()))
        } else {
            debug!(user_id = %credential.id, "secret mismatch");
            Ok(None)
        }
    }

    pub fn issue_session(&self, credential: &PublicCredential) -> ServiceResult<IssuedTokens> {
        let subject = TokenSubject {
            id: credential.id,
            identifier: credential.identifier.clone(),
            role: credential.role,
        };
        self.signer
            .issue_tokens(&subject)
            .map_err(|err| ServiceError::Internal(err.to_string()))
    }

    /// Validate then issue, failing with [`ServiceError::InvalidCredentials`].
    pub async fn login(
        &self,
        identifier: &str,
        secret: &str,
    ) -> ServiceResult<(PublicCredential, IssuedTokens)> {
        let credential = self
            .validate_credentials(identifier, secret)
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;
        let tokens = self.issue_session(&credential)?;
        info!(parent: &self.span, user_id = %credential.id, "session issued");
        Ok((credential, tokens))
    }

    /// New access token from a refresh token. The credential must still
    /// exist; the role comes from the refresh token, not the store.
    #[instrument(parent = &self.span, skip_all)]
    pub async fn refresh_session(&self, refresh_token: &str) -> ServiceResult<IssuedAccessToken> {
        let claims = self
            .signer
            .verify_refresh(refresh_token)
            .map_err(ServiceError::InvalidToken)?;

        if self.store.find_by_id(claims.subject).await?.is_none() {
            warn!(user_id = %claims.subject, "refresh for deleted credential");
            return Err(ServiceError::UnknownSubject(claims.subject));
        }

        self.signer
            .issue_access_token(&TokenSubject::from(&claims))
            .map_err(|err| ServiceError::Internal(err.to_string()))
    }

    pub async fn create_credential(
        &self,
        identifier: &str,
        raw_secret: &str,
        role: Option<&str>,
    ) -> ServiceResult<PublicCredential> {
        self.register(RegistrationInput {
            identifier: Some(identifier.to_string()),
            secret: Some(raw_secret.to_string()),
            role: role.map(str::to_string),
        })
        .await
    }

    /// Creates a credential with any role. Only the admin routes and the
    /// startup seed reach this.
    #[instrument(parent = &self.span, skip_all)]
    pub async fn register(&self, input: RegistrationInput) -> ServiceResult<PublicCredential> {
        let valid = validate_registration(input, self.min_secret_len)?;
        self.store_new(valid).await
    }

    /// Public sign-up: like [`Self::register`] but only the `user` role may
    /// be requested.
    #[instrument(parent = &self.span, skip_all)]
    pub async fn self_register(&self, input: RegistrationInput) -> ServiceResult<PublicCredential> {
        let valid = validate_registration(input, self.min_secret_len)?;
        if valid.role != Role::User {
            return Err(ValidationErrors::single(
                "role",
                "self-registration may only request the user role",
            )
            .into());
        }
        self.store_new(valid).await
    }

    async fn store_new(&self, valid: ValidRegistration) -> ServiceResult<PublicCredential> {
        let secret_hash = self.hasher.hash_blocking(valid.secret).await?;
        let credential = self
            .store
            .insert(NewCredential {
                identifier: valid.identifier,
                secret_hash,
                role: valid.role,
            })
            .await?;
        info!(user_id = %credential.id, role = %credential.role, "credential created");
        Ok(credential.public_view())
    }

    pub async fn list_credentials(&self) -> ServiceResult<Vec<PublicCredential>> {
        let all = self.store.list().await?;
        Ok(all.iter().map(|credential| credential.public_view()).collect())
    }

    pub async fn get_credential(&self, id: Uuid) -> ServiceResult<PublicCredential> {
        self.store
            .find_by_id(id)
            .await?
            .map(|credential| credential.public_view())
            .ok_or(ServiceError::NotFound(id))
    }

    #[instrument(parent = &self.span, skip(self, patch), fields(user_id = %id))]
    pub async fn update_credential(
        &self,
        id: Uuid,
        patch: CredentialPatch,
    ) -> ServiceResult<PublicCredential> {
        let valid = validate_patch(patch, self.min_secret_len)?;
        let secret_hash = match valid.secret {
            Some(secret) => Some(self.hasher.hash_blocking(secret).await?),
            None => None,
        };
        let changes = CredentialChanges {
            secret_hash,
            role: valid.role,
        };
        let updated = self.store.update(id, changes).await?;
        info!(role = %updated.role, "credential updated");
        Ok(updated.public_view())
    }

    #[instrument(parent = &self.span, skip(self), fields(user_id = %id))]
    pub async fn delete_credential(&self, id: Uuid) -> ServiceResult<()> {
        self.store.delete(id).await?;
        info!("credential deleted");
        Ok(())
    }

    /// Creates the bootstrap admin unless the identifier already exists.
    #[instrument(parent = &self.span, skip(self, secret))]
    pub async fn seed_admin(&self, identifier: &str, secret: &str) -> ServiceResult<SeedOutcome> {
        if self.store.find_by_identifier(identifier).await?.is_some() {
            debug!("seed admin already present");
            return Ok(SeedOutcome::AlreadyPresent);
        }
        match self
            .create_credential(identifier, secret, Some(Role::Admin.as_str()))
            .await
        {
            Ok(_) => Ok(SeedOutcome::Created),
            Err(ServiceError::Conflict(_)) => Ok(SeedOutcome::AlreadyPresent),
            Err(err) => Err(err),
        }
    }
}

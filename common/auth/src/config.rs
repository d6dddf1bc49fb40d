use std::fmt;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};

use crate::error::{AuthError, AuthResult};

/// Issuer/audience expectations shared by every token the service mints.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Expected issuer claim (iss).
    pub issuer: String,
    /// Expected audience claim (aud).
    pub audience: String,
    /// Allowable clock skew in seconds when validating exp/nbf.
    pub leeway_seconds: u32,
}

impl JwtConfig {
    /// Defaults to a 30 second leeway.
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            leeway_seconds: 30,
        }
    }

    pub fn with_leeway(mut self, seconds: u32) -> Self {
        self.leeway_seconds = seconds;
        self
    }
}

/// Key material for one signing policy (access or refresh).
///
/// A shared secret selects HS256; a PEM pair selects RS256.
#[derive(Clone)]
pub enum KeyMaterial {
    Secret(Vec<u8>),
    RsaPem { private_pem: String, public_pem: String },
}

impl KeyMaterial {
    pub fn secret(value: impl AsRef<[u8]>) -> Self {
        Self::Secret(value.as_ref().to_vec())
    }

    pub fn rsa_pem(private_pem: impl Into<String>, public_pem: impl Into<String>) -> Self {
        Self::RsaPem {
            private_pem: private_pem.into(),
            public_pem: public_pem.into(),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        match self {
            KeyMaterial::Secret(_) => Algorithm::HS256,
            KeyMaterial::RsaPem { .. } => Algorithm::RS256,
        }
    }

    pub fn encoding_key(&self, kid: &str) -> AuthResult<EncodingKey> {
        match self {
            KeyMaterial::Secret(secret) => Ok(EncodingKey::from_secret(secret)),
            KeyMaterial::RsaPem { private_pem, .. } => EncodingKey::from_rsa_pem(private_pem.as_bytes())
                .map_err(|err| AuthError::KeyParse(kid.to_string(), err.to_string())),
        }
    }

    pub fn decoding_key(&self, kid: &str) -> AuthResult<DecodingKey> {
        match self {
            KeyMaterial::Secret(secret) => Ok(DecodingKey::from_secret(secret)),
            KeyMaterial::RsaPem { public_pem, .. } => DecodingKey::from_rsa_pem(public_pem.as_bytes())
                .map_err(|err| AuthError::KeyParse(kid.to_string(), err.to_string())),
        }
    }

    /// Whether two policies would accept each other's signatures.
    pub fn same_as(&self, other: &KeyMaterial) -> bool {
        match (self, other) {
            (KeyMaterial::Secret(a), KeyMaterial::Secret(b)) => a == b,
            (
                KeyMaterial::RsaPem { private_pem: a, .. },
                KeyMaterial::RsaPem { private_pem: b, .. },
            ) => a.trim() == b.trim(),
            _ => false,
        }
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyMaterial::Secret(secret) => f
                .debug_struct("Secret")
                .field("len", &secret.len())
                .finish(),
            KeyMaterial::RsaPem { .. } => f.write_str("RsaPem(..)"),
        }
    }
}

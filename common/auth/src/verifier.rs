use std::collections::HashMap;
use std::sync::Arc;

use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde_json::Value;
use tracing::debug;

use crate::claims::{Claims, TokenUse};
use crate::config::{JwtConfig, KeyMaterial};
use crate::error::{AuthError, AuthResult};

#[derive(Clone)]
struct RegisteredKey {
    algorithm: Algorithm,
    key: DecodingKey,
}

/// Decoding keys indexed by `kid`, so rotated keys can verify side by side.
///
/// Immutable once built; clones share the same map.
#[derive(Clone, Default)]
pub struct KeyRing {
    inner: Arc<HashMap<String, RegisteredKey>>,
}

impl KeyRing {
    pub fn contains(&self, kid: &str) -> bool {
        self.inner.contains_key(kid)
    }

    fn get(&self, kid: &str) -> Option<&RegisteredKey> {
        self.inner.get(kid)
    }
}

/// Verifies tokens minted under one signing policy.
///
/// Access and refresh tokens are signed with distinct keys, so each policy
/// gets its own verifier; a verifier also rejects tokens whose `token_use`
/// claim names the other policy.
#[derive(Clone)]
pub struct JwtVerifier {
    config: JwtConfig,
    keys: KeyRing,
    expected_use: TokenUse,
}

impl JwtVerifier {
    pub fn builder(config: JwtConfig, expected_use: TokenUse) -> JwtVerifierBuilder {
        JwtVerifierBuilder::new(config, expected_use)
    }

    pub fn keys(&self) -> &KeyRing {
        &self.keys
    }

    pub fn verify(&self, token: &str) -> AuthResult<Claims> {
        let header =
            decode_header(token).map_err(|err| AuthError::InvalidHeader(err.to_string()))?;
        let kid = header.kid.ok_or(AuthError::MissingKeyId)?;
        let registered = self
            .keys
            .get(&kid)
            .ok_or_else(|| AuthError::UnknownKeyId(kid.clone()))?;

        let mut validation = Validation::new(registered.algorithm);
        validation.set_issuer(&[self.config.issuer.clone()]);
        validation.set_audience(&[self.config.audience.clone()]);
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);
        validation.leeway = self.config.leeway_seconds.into();

        let token_data = decode::<Value>(token, &registered.key, &validation)?;
        let claims = Claims::try_from(token_data.claims)?;
        if claims.token_use != self.expected_use {
            return Err(AuthError::wrong_use(self.expected_use, claims.token_use));
        }
        debug!(kid, subject = %claims.subject, "verified JWT successfully");
        Ok(claims)
    }
}

pub struct JwtVerifierBuilder {
    config: JwtConfig,
    expected_use: TokenUse,
    keys: HashMap<String, RegisteredKey>,
}

impl JwtVerifierBuilder {
    fn new(config: JwtConfig, expected_use: TokenUse) -> Self {
        Self {
            config,
            expected_use,
            keys: HashMap::new(),
        }
    }

    pub fn with_decoding_key(
        mut self,
        kid: impl Into<String>,
        algorithm: Algorithm,
        key: DecodingKey,
    ) -> Self {
        self.keys.insert(kid.into(), RegisteredKey { algorithm, key });
        self
    }

    pub fn with_key_material(self, kid: impl Into<String>, material: &KeyMaterial) -> AuthResult<Self> {
        let kid = kid.into();
        let key = material.decoding_key(&kid)?;
        Ok(self.with_decoding_key(kid, material.algorithm(), key))
    }

    pub fn build(self) -> JwtVerifier {
        JwtVerifier {
            config: self.config,
            keys: KeyRing {
                inner: Arc::new(self.keys),
            },
            expected_use: self.expected_use,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::ClaimsRepr;
    use crate::claims::AudienceRepr;
    use crate::roles::Role;
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use rsa::pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding};
    use rsa::rand_core::OsRng;
    use rsa::RsaPrivateKey;
    use uuid::Uuid;

    const SECRET: &[u8] = b"access-secret-for-verifier-tests";

    fn claims_for(subject: Uuid, token_use: TokenUse, exp_offset: i64, aud: &str) -> ClaimsRepr {
        let now = Utc::now().timestamp();
        ClaimsRepr {
            sub: subject.to_string(),
            identifier: "u1".to_string(),
            role: "user".to_string(),
            token_use,
            exp: now + exp_offset,
            iat: Some(now),
            iss: "test-issuer".to_string(),
            aud: Some(AudienceRepr::Single(aud.to_string())),
        }
    }

    fn sign(claims: &ClaimsRepr, kid: &str, algorithm: Algorithm, key: &EncodingKey) -> String {
        let mut header = Header::new(algorithm);
        header.kid = Some(kid.to_string());
        encode(&header, claims, key).expect("sign token")
    }

    fn hs_verifier(expected_use: TokenUse) -> JwtVerifier {
        JwtVerifier::builder(JwtConfig::new("test-issuer", "test-audience"), expected_use)
            .with_key_material("access-v1", &KeyMaterial::secret(SECRET))
            .expect("secret key")
            .build()
    }

    #[test]
    fn verifier_accepts_valid_hs256_token() {
        let verifier = hs_verifier(TokenUse::Access);
        let subject = Uuid::new_v4();
        let token = sign(
            &claims_for(subject, TokenUse::Access, 600, "test-audience"),
            "access-v1",
            Algorithm::HS256,
            &EncodingKey::from_secret(SECRET),
        );

        let claims = verifier.verify(&token).expect("verification succeeds");
        assert_eq!(claims.subject, subject);
        assert_eq!(claims.identifier, "u1");
        assert_eq!(claims.role, Role::User);
        assert_eq!(claims.issuer, "test-issuer");
        assert_eq!(claims.audience, vec!["test-audience".to_string()]);
    }

    #[test]
    fn verifier_rejects_expired_token() {
        let verifier = hs_verifier(TokenUse::Access);
        let token = sign(
            &claims_for(Uuid::new_v4(), TokenUse::Access, -3600, "test-audience"),
            "access-v1",
            Algorithm::HS256,
            &EncodingKey::from_secret(SECRET),
        );
        let err = verifier.verify(&token).expect_err("expired");
        assert!(matches!(err, AuthError::Expired));
    }

    #[test]
    fn verifier_rejects_wrong_secret() {
        let verifier = hs_verifier(TokenUse::Access);
        let token = sign(
            &claims_for(Uuid::new_v4(), TokenUse::Access, 600, "test-audience"),
            "access-v1",
            Algorithm::HS256,
            &EncodingKey::from_secret(b"some-other-secret"),
        );
        let err = verifier.verify(&token).expect_err("bad signature");
        assert!(matches!(err, AuthError::Verification(_)));
    }

    #[test]
    fn verifier_rejects_wrong_audience() {
        let verifier = hs_verifier(TokenUse::Access);
        let token = sign(
            &claims_for(Uuid::new_v4(), TokenUse::Access, 600, "someone-else"),
            "access-v1",
            Algorithm::HS256,
            &EncodingKey::from_secret(SECRET),
        );
        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn verifier_rejects_refresh_token_where_access_expected() {
        let verifier = hs_verifier(TokenUse::Access);
        let token = sign(
            &claims_for(Uuid::new_v4(), TokenUse::Refresh, 600, "test-audience"),
            "access-v1",
            Algorithm::HS256,
            &EncodingKey::from_secret(SECRET),
        );
        let err = verifier.verify(&token).expect_err("wrong use");
        assert!(matches!(err, AuthError::WrongTokenUse { .. }));
    }

    #[test]
    fn verifier_rejects_unknown_kid() {
        let verifier = hs_verifier(TokenUse::Access);
        let token = sign(
            &claims_for(Uuid::new_v4(), TokenUse::Access, 600, "test-audience"),
            "missing",
            Algorithm::HS256,
            &EncodingKey::from_secret(SECRET),
        );
        match verifier.verify(&token).expect_err("verification should fail") {
            AuthError::UnknownKeyId(actual) => assert_eq!(actual, "missing"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn verifier_rejects_garbage() {
        let verifier = hs_verifier(TokenUse::Access);
        let err = verifier.verify("not.a.jwt").expect_err("garbage");
        assert!(err.is_unauthenticated());
    }

    #[test]
    fn verifier_accepts_rs256_key_pair() {
        let mut rng = OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, 2048).expect("key generation");
        let private_pem = private_key.to_pkcs1_pem(LineEnding::LF).expect("private pem");
        let public_pem = private_key
            .to_public_key()
            .to_pkcs1_pem(LineEnding::LF)
            .expect("public pem");
        let material = KeyMaterial::rsa_pem(private_pem.as_str(), public_pem);

        let verifier = JwtVerifier::builder(
            JwtConfig::new("test-issuer", "test-audience"),
            TokenUse::Refresh,
        )
        .with_key_material("refresh-v1", &material)
        .expect("rsa key")
        .build();
        assert!(verifier.keys().contains("refresh-v1"));

        let subject = Uuid::new_v4();
        let encoding = material.encoding_key("refresh-v1").expect("encoding key");
        let token = sign(
            &claims_for(subject, TokenUse::Refresh, 600, "test-audience"),
            "refresh-v1",
            Algorithm::RS256,
            &encoding,
        );
        let claims = verifier.verify(&token).expect("rs256 verifies");
        assert_eq!(claims.subject, subject);
        assert_eq!(claims.token_use, TokenUse::Refresh);
    }
}

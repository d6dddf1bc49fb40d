use chrono::{DateTime, Duration, Utc};
use common_auth::{
    AudienceRepr, AuthError, AuthResult, Claims, ClaimsRepr, JwtConfig, JwtVerifier,
    KeyMaterial, Role, TokenUse,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use uuid::Uuid;

pub const TOKEN_TYPE: &str = "Bearer";

/// Upper bound for either TTL: ten years.
pub const MAX_TTL_SECONDS: i64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub issuer: String,
    pub audience: String,
    pub leeway_seconds: u32,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
}

impl TokenConfig {
    pub fn jwt_config(&self) -> JwtConfig {
        JwtConfig::new(&self.issuer, &self.audience).with_leeway(self.leeway_seconds)
    }
}

/// Key id plus key material for one token kind.
#[derive(Debug, Clone)]
pub struct SigningPolicy {
    pub kid: String,
    pub material: KeyMaterial,
}

impl SigningPolicy {
    pub fn new(kid: impl Into<String>, material: KeyMaterial) -> Self {
        Self {
            kid: kid.into(),
            material,
        }
    }
}

struct ActiveKey {
    kid: String,
    header: Header,
    encoding_key: EncodingKey,
    verifier: JwtVerifier,
}

impl ActiveKey {
    fn load(config: &TokenConfig, policy: &SigningPolicy, token_use: TokenUse) -> AuthResult<Self> {
        let encoding_key = policy.material.encoding_key(&policy.kid)?;
        let mut header = Header::new(policy.material.algorithm());
        header.kid = Some(policy.kid.clone());
        let verifier = JwtVerifier::builder(config.jwt_config(), token_use)
            .with_key_material(policy.kid.clone(), &policy.material)?
            .build();
        Ok(Self {
            kid: policy.kid.clone(),
            header,
            encoding_key,
            verifier,
        })
    }
}

/// The claims a token is minted from.
#[derive(Debug, Clone)]
pub struct TokenSubject {
    pub id: Uuid,
    pub identifier: String,
    pub role: Role,
}

impl From<&Claims> for TokenSubject {
    fn from(claims: &Claims) -> Self {
        Self {
            id: claims.subject,
            identifier: claims.identifier.clone(),
            role: claims.role,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_in: i64,
    pub refresh_expires_in: i64,
    pub token_type: &'static str,
}

#[derive(Debug, Clone)]
pub struct IssuedAccessToken {
    pub access_token: String,
    pub access_expires_in: i64,
    pub token_type: &'static str,
}

/// Mints access and refresh JWTs, each under its own key and TTL.
///
/// Output depends only on the subject and the clock: there is no random
/// token id, so two calls in the same second yield identical, equally valid
/// tokens.
pub struct TokenSigner {
    config: TokenConfig,
    access: ActiveKey,
    refresh: ActiveKey,
}

impl TokenSigner {
    pub fn new(
        config: TokenConfig,
        access: &SigningPolicy,
        refresh: &SigningPolicy,
    ) -> AuthResult<Self> {
        let access_key = ActiveKey::load(&config, access, TokenUse::Access)?;
        let refresh_key = ActiveKey::load(&config, refresh, TokenUse::Refresh)?;
        Ok(Self {
            config,
            access: access_key,
            refresh: refresh_key,
        })
    }

    pub fn access_kid(&self) -> &str {
        &self.access.kid
    }

    pub fn refresh_kid(&self) -> &str {
        &self.refresh.kid
    }

    /// Verifier for access tokens, shared with the guard layer.
    pub fn access_verifier(&self) -> JwtVerifier {
        self.access.verifier.clone()
    }

    pub fn issue_tokens(&self, subject: &TokenSubject) -> AuthResult<IssuedTokens> {
        self.issue_tokens_at(subject, Utc::now())
    }

    pub fn issue_tokens_at(
        &self,
        subject: &TokenSubject,
        now: DateTime<Utc>,
    ) -> AuthResult<IssuedTokens> {
        let access = self.issue_access_token_at(subject, now)?;
        let refresh_exp = expiry(now, self.config.refresh_ttl_seconds)?;
        let refresh_token = self.sign(&self.refresh, subject, TokenUse::Refresh, now, refresh_exp)?;

        Ok(IssuedTokens {
            access_token: access.access_token,
            refresh_token,
            access_expires_in: access.access_expires_in,
            refresh_expires_in: self.config.refresh_ttl_seconds,
            token_type: TOKEN_TYPE,
        })
    }

    pub fn issue_access_token(&self, subject: &TokenSubject) -> AuthResult<IssuedAccessToken> {
        self.issue_access_token_at(subject, Utc::now())
    }

    pub fn issue_access_token_at(
        &self,
        subject: &TokenSubject,
        now: DateTime<Utc>,
    ) -> AuthResult<IssuedAccessToken> {
        let exp = expiry(now, self.config.access_ttl_seconds)?;
        let access_token = self.sign(&self.access, subject, TokenUse::Access, now, exp)?;
        Ok(IssuedAccessToken {
            access_token,
            access_expires_in: self.config.access_ttl_seconds,
            token_type: TOKEN_TYPE,
        })
    }

    /// Checks a refresh token against the refresh key only. Access tokens
    /// fail here even when both kinds share an algorithm.
    pub fn verify_refresh(&self, token: &str) -> AuthResult<Claims> {
        self.refresh.verifier.verify(token)
    }

    fn sign(
        &self,
        key: &ActiveKey,
        subject: &TokenSubject,
        token_use: TokenUse,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<String> {
        let claims = ClaimsRepr {
            sub: subject.id.to_string(),
            identifier: subject.identifier.clone(),
            role: subject.role.as_str().to_string(),
            token_use,
            exp: expires_at.timestamp(),
            iat: Some(issued_at.timestamp()),
            iss: self.config.issuer.clone(),
            aud: Some(AudienceRepr::Single(self.config.audience.clone())),
        };
        encode(&key.header, &claims, &key.encoding_key)
            .map_err(|err| AuthError::Signing(err.to_string()))
    }
}

fn expiry(issued_at: DateTime<Utc>, ttl_seconds: i64) -> AuthResult<DateTime<Utc>> {
    Duration::try_seconds(ttl_seconds)
        .and_then(|ttl| issued_at.checked_add_signed(ttl))
        .ok_or_else(|| AuthError::Signing(format!("token ttl of {ttl_seconds}s is out of range")))
}

use std::fmt;

use common_auth::Role;
use common_http_errors::FieldError;
use serde::Deserialize;

pub const DEFAULT_MIN_SECRET_LENGTH: usize = 8;
const MAX_IDENTIFIER_LENGTH: usize = 254;
const MAX_SECRET_LENGTH: usize = 1024;

/// Field-level rejections gathered from one request body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push(FieldError::new(field, message));
    }

    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        Self(vec![FieldError::new(field, message)])
    }

    pub fn fields(&self) -> &[FieldError] {
        &self.0
    }

    pub fn into_fields(self) -> Vec<FieldError> {
        self.0
    }

    fn finish<T>(self, value: T) -> Result<T, ValidationErrors> {
        if self.0.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .0
            .iter()
            .map(|err| format!("{}: {}", err.field, err.message))
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "invalid input ({rendered})")
    }
}

impl std::error::Error for ValidationErrors {}

#[derive(Debug, Deserialize)]
pub struct LoginInput {
    #[serde(default, alias = "username", alias = "email")]
    pub identifier: Option<String>,
    #[serde(default, alias = "password")]
    pub secret: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegistrationInput {
    #[serde(default, alias = "username", alias = "email")]
    pub identifier: Option<String>,
    #[serde(default, alias = "password")]
    pub secret: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CredentialPatch {
    #[serde(default, alias = "password")]
    pub secret: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Login only checks presence: a short or odd secret is just a wrong one.
#[derive(Debug)]
pub struct ValidLogin {
    pub identifier: String,
    pub secret: String,
}

#[derive(Debug)]
pub struct ValidRegistration {
    pub identifier: String,
    pub secret: String,
    pub role: Role,
}

#[derive(Debug, Default)]
pub struct ValidPatch {
    pub secret: Option<String>,
    pub role: Option<Role>,
}

pub fn validate_login(input: LoginInput) -> Result<ValidLogin, ValidationErrors> {
    let mut errors = ValidationErrors::default();
    let identifier = input.identifier.unwrap_or_default().trim().to_string();
    if identifier.is_empty() {
        errors.push("identifier", "identifier is required");
    }
    let secret = input.secret.unwrap_or_default();
    if secret.is_empty() {
        errors.push("secret", "secret is required");
    }
    errors.finish(ValidLogin { identifier, secret })
}

pub fn validate_registration(
    input: RegistrationInput,
    min_secret_len: usize,
) -> Result<ValidRegistration, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let identifier = input.identifier.unwrap_or_default().trim().to_string();
    check_identifier(&identifier, &mut errors);

    let secret = input.secret.unwrap_or_default();
    check_secret(&secret, min_secret_len, &mut errors);

    let role = match input.role.as_deref() {
        None => Role::default(),
        Some(raw) => parse_role(raw, &mut errors).unwrap_or_default(),
    };

    errors.finish(ValidRegistration {
        identifier,
        secret,
        role,
    })
}

pub fn validate_patch(
    input: CredentialPatch,
    min_secret_len: usize,
) -> Result<ValidPatch, ValidationErrors> {
    let mut errors = ValidationErrors::default();
    if input.secret.is_none() && input.role.is_none() {
        errors.push("body", "at least one of secret or role is required");
    }
    if let Some(secret) = input.secret.as_deref() {
        check_secret(secret, min_secret_len, &mut errors);
    }
    let role = input
        .role
        .as_deref()
        .and_then(|raw| parse_role(raw, &mut errors));

    errors.finish(ValidPatch {
        secret: input.secret,
        role,
    })
}

fn check_identifier(identifier: &str, errors: &mut ValidationErrors) {
    if identifier.is_empty() {
        errors.push("identifier", "identifier is required");
    } else if identifier.chars().count() > MAX_IDENTIFIER_LENGTH {
        errors.push(
            "identifier",
            format!("identifier must be at most {MAX_IDENTIFIER_LENGTH} characters"),
        );
    } else if identifier
        .chars()
        .any(|c| c.is_whitespace() || c.is_control())
    {
        errors.push("identifier", "identifier must not contain whitespace");
    }
}

fn check_secret(secret: &str, min_len: usize, errors: &mut ValidationErrors) {
    let length = secret.chars().count();
    if length == 0 {
        errors.push("secret", "secret is required");
    } else if length < min_len {
        errors.push(
            "secret",
            format!("secret must be at least {min_len} characters"),
        );
    } else if length > MAX_SECRET_LENGTH {
        errors.push(
            "secret",
            format!("secret must be at most {MAX_SECRET_LENGTH} characters"),
        );
    }
}

fn parse_role(raw: &str, errors: &mut ValidationErrors) -> Option<Role> {
    match raw.parse::<Role>() {
        Ok(role) => Some(role),
        Err(err) => {
            errors.push("role", err.to_string());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registration(value: serde_json::Value) -> RegistrationInput {
        serde_json::from_value(value).expect("registration body")
    }

    #[test]
    fn registration_defaults_to_user_role() {
        let valid = validate_registration(
            registration(json!({"identifier": " u1 ", "secret": "password123"})),
            DEFAULT_MIN_SECRET_LENGTH,
        )
        .expect("valid");
        assert_eq!(valid.identifier, "u1");
        assert_eq!(valid.role, Role::User);
    }

    #[test]
    fn registration_accepts_legacy_field_names() {
        let valid = validate_registration(
            registration(json!({"email": "a@example.com", "password": "password123", "role": "admin"})),
            DEFAULT_MIN_SECRET_LENGTH,
        )
        .expect("valid");
        assert_eq!(valid.identifier, "a@example.com");
        assert_eq!(valid.role, Role::Admin);
    }

    #[test]
    fn registration_collects_every_field_error() {
        let err = validate_registration(
            registration(json!({"identifier": "", "secret": "short", "role": "root"})),
            DEFAULT_MIN_SECRET_LENGTH,
        )
        .expect_err("invalid");
        let fields = err.fields().iter().map(|e| e.field).collect::<Vec<_>>();
        assert_eq!(fields, vec!["identifier", "secret", "role"]);
    }

    #[test]
    fn identifier_with_whitespace_is_rejected() {
        let err = validate_registration(
            registration(json!({"identifier": "two words", "secret": "password123"})),
            DEFAULT_MIN_SECRET_LENGTH,
        )
        .expect_err("invalid");
        assert_eq!(err.fields()[0].field, "identifier");
    }

    #[test]
    fn login_requires_both_fields_but_not_length() {
        let err = validate_login(LoginInput {
            identifier: None,
            secret: Some(String::new()),
        })
        .expect_err("missing");
        assert_eq!(err.fields().len(), 2);

        let ok = validate_login(LoginInput {
            identifier: Some("u1".into()),
            secret: Some("x".into()),
        });
        assert!(ok.is_ok());
    }

    #[test]
    fn patch_needs_a_change() {
        assert!(validate_patch(CredentialPatch::default(), 8).is_err());
        let valid = validate_patch(
            CredentialPatch {
                secret: None,
                role: Some("ADMIN".into()),
            },
            8,
        )
        .expect("valid");
        assert_eq!(valid.role, Some(Role::Admin));
    }
}

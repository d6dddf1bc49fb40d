pub mod claims;
pub mod config;
pub mod error;
pub mod extractors;
pub mod guards;
pub mod roles;
pub mod verifier;

pub use claims::{AudienceRepr, Claims, ClaimsRepr, TokenUse};
pub use config::{JwtConfig, KeyMaterial};
pub use error::{AuthError, AuthResult};
pub use extractors::{authenticate, bearer_token, AuthContext};
pub use guards::{ensure_role, require_roles, RoleGuard};
pub use roles::{Role, UnknownRole, ROLE_ADMIN, ROLE_USER};
pub use verifier::{JwtVerifier, JwtVerifierBuilder, KeyRing};

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, warn};

use crate::error::{AuthError, AuthResult};
use crate::extractors::{authenticate, AuthContext};
use crate::roles::Role;
use crate::verifier::JwtVerifier;

/// Route-level guard state: the access-token verifier plus the roles the
/// route admits. An empty role list only requires a valid token.
#[derive(Clone)]
pub struct RoleGuard {
    verifier: Arc<JwtVerifier>,
    allowed: Arc<[Role]>,
}

impl RoleGuard {
    pub fn new(verifier: Arc<JwtVerifier>, allowed: &[Role]) -> Self {
        Self {
            verifier,
            allowed: Arc::from(allowed),
        }
    }

    /// Runs the per-request decision: no token or an invalid one rejects with
    /// 401, a valid token lacking the role rejects with 403, anything else
    /// forwards with the resolved identity.
    pub fn evaluate(&self, headers: &HeaderMap) -> AuthResult<AuthContext> {
        let context = authenticate(headers, &self.verifier)?;
        ensure_role(&context, &self.allowed)?;
        Ok(context)
    }
}

/// Exact-match role check against the claim's role.
pub fn ensure_role(auth: &AuthContext, allowed: &[Role]) -> AuthResult<()> {
    if allowed.is_empty() || allowed.iter().any(|role| auth.has_role(*role)) {
        return Ok(());
    }

    Err(AuthError::Forbidden {
        required: allowed.to_vec(),
    })
}

/// `axum::middleware::from_fn_with_state` adapter around [`RoleGuard`].
pub async fn require_roles(
    State(guard): State<RoleGuard>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    match guard.evaluate(request.headers()) {
        Ok(context) => {
            debug!(
                subject = %context.claims.subject,
                role = %context.claims.role,
                path = %request.uri().path(),
                "guard passed"
            );
            request.extensions_mut().insert(context);
            Ok(next.run(request).await)
        }
        Err(err) => {
            warn!(
                path = %request.uri().path(),
                error = %err,
                "guard rejected request"
            );
            Err(err)
        }
    }
}

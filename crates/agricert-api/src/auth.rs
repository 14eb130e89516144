//! # Authentication & Authorization Middleware
//!
//! Bearer token middleware with role-based access control.
//!
//! ## Token Format
//!
//! ```text
//! Bearer {role}:{actor_id}:{secret}   -> role-scoped caller
//! Bearer {secret}                     -> operator token (treated as admin)
//! ```
//!
//! `role` is `exporter`, `qa_agency` or `admin`. `actor_id` binds the
//! caller to an actor profile and may be empty only for admins. Ownership
//! checks (an exporter's own batches, a QA agency's assigned batches) are
//! made by the lifecycle engine against this binding.
//!
//! ## CallerIdentity
//!
//! Every authenticated request gets a [`CallerIdentity`] injected into the
//! request extensions. Handlers extract it via the `FromRequestParts` impl.

use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use subtle::ConstantTimeEq;

use agricert_core::{ActorId, AgriError};
use agricert_state::Role;

use crate::error::{AppError, ErrorBody};

// ── CallerIdentity ──────────────────────────────────────────────────────────

/// Identity of the authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerIdentity {
    pub role: Role,
    /// The actor profile the caller acts as. `None` only for admins.
    pub actor_id: Option<ActorId>,
}

impl CallerIdentity {
    pub fn admin() -> Self {
        Self {
            role: Role::Admin,
            actor_id: None,
        }
    }

    pub fn actor(role: Role, actor_id: ActorId) -> Self {
        Self {
            role,
            actor_id: Some(actor_id),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// The bound actor id, or `AccessDenied` for an unbound caller.
    pub fn actor_id(&self) -> Result<ActorId, AgriError> {
        self.actor_id
            .ok_or_else(|| AgriError::AccessDenied("caller is not bound to an actor".into()))
    }
}

/// Extracts the identity that the auth middleware injected into extensions.
/// Returns 401 if no identity is present.
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .copied()
            .ok_or_else(|| AppError::Unauthorized("no caller identity in request context".into()))
    }
}

/// Check that the caller holds one of `allowed`. Returns `AccessDenied`
/// (403) otherwise.
pub fn require_role(caller: &CallerIdentity, allowed: &[Role]) -> Result<(), AgriError> {
    if allowed.contains(&caller.role) {
        Ok(())
    } else {
        let names: Vec<&str> = allowed.iter().map(Role::as_str).collect();
        Err(AgriError::AccessDenied(format!(
            "role '{}' required, caller has '{}'",
            names.join("' or '"),
            caller.role.as_str()
        )))
    }
}

// ── Auth Configuration ──────────────────────────────────────────────────────

/// Auth configuration injected into request extensions.
///
/// Custom `Debug` redacts the token value.
#[derive(Clone)]
pub struct AuthConfig {
    pub token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// ── Token Validation ────────────────────────────────────────────────────────

/// Constant-time comparison of bearer secrets. Differing lengths still
/// perform a comparison so timing does not reveal the length.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// Parse `{role}:{actor_id}:{secret}` or a bare `{secret}`.
pub fn parse_bearer_token(provided: &str, expected_secret: &str) -> Result<CallerIdentity, String> {
    let parts: Vec<&str> = provided.splitn(3, ':').collect();

    match parts.as_slice() {
        [secret] => {
            if constant_time_token_eq(secret, expected_secret) {
                Ok(CallerIdentity::admin())
            } else {
                Err("invalid bearer token".into())
            }
        }
        [role_str, actor_str, secret] => {
            if !constant_time_token_eq(secret, expected_secret) {
                return Err("invalid bearer token".into());
            }

            let role: Role = role_str.parse().map_err(|_| format!("unknown role: {role_str}"))?;

            let actor_id = if actor_str.is_empty() {
                None
            } else {
                let raw = actor_str
                    .parse::<i64>()
                    .map_err(|e| format!("invalid actor_id: {e}"))?;
                Some(ActorId(raw))
            };

            if actor_id.is_none() && role != Role::Admin {
                return Err(format!("role {role} requires an actor_id"));
            }

            Ok(CallerIdentity { role, actor_id })
        }
        _ => Err("invalid token format, expected {role}:{actor_id}:{secret} or {secret}".into()),
    }
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Validate the Bearer token and inject the caller's identity.
///
/// When `AuthConfig.token` is `None`, every request runs as admin
/// (auth disabled, development mode).
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let expected_token = request.extensions().get::<AuthConfig>().cloned();

    match expected_token {
        Some(AuthConfig {
            token: Some(ref expected),
        }) => {
            let auth_header = request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok());

            match auth_header.map(|h| h.strip_prefix("Bearer ")) {
                Some(Some(provided)) => match parse_bearer_token(provided, expected) {
                    Ok(identity) => {
                        request.extensions_mut().insert(identity);
                        next.run(request).await
                    }
                    Err(msg) => {
                        tracing::warn!(reason = %msg, "authentication failed: invalid bearer token");
                        unauthorized_response(&msg)
                    }
                },
                Some(None) => {
                    tracing::warn!("authentication failed: non-Bearer authorization scheme");
                    unauthorized_response("authorization header must use Bearer scheme")
                }
                None => {
                    tracing::warn!("authentication failed: missing authorization header");
                    unauthorized_response("missing authorization header")
                }
            }
        }
        _ => {
            request.extensions_mut().insert(CallerIdentity::admin());
            next.run(request).await
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorBody {
        status: "error".to_string(),
        message: message.to_string(),
        code: "UNAUTHORIZED".to_string(),
        errors: None,
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

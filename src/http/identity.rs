//! Identity-verification capability for the transport layer.
//!
//! Two interchangeable variants produce the same [`VerifiedIdentity`]:
//! the subject of a client certificate forwarded by the TLS-terminating
//! proxy, or a simulation header for environments without mTLS. The variant
//! is selected by configuration; the core never sees either header.

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::config::{IdentityMode, SecurityConfig};

use super::AppState;

/// Header carrying the client-certificate subject set by the TLS proxy.
pub const FORWARDED_CERT_SUBJECT_HEADER: &str = "x-forwarded-client-cert-subject";

/// Header carrying a simulated subject when mTLS is not terminated upstream.
pub const SIMULATED_SUBJECT_HEADER: &str = "x-mtls-subject";

/// The verified caller identity produced by either variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    /// Certificate or simulated subject of the caller.
    pub subject: String,
}

/// Checks request headers for a verified caller identity.
#[derive(Debug, Clone)]
pub struct IdentityVerifier {
    mode: IdentityMode,
    required: bool,
}

impl IdentityVerifier {
    /// Build a verifier from the security configuration.
    #[must_use]
    pub fn from_config(security: &SecurityConfig) -> Self {
        Self {
            mode: security.identity_mode,
            required: security.mtls_required,
        }
    }

    /// Whether requests without a verified identity must be rejected.
    #[must_use]
    pub fn required(&self) -> bool {
        self.required
    }

    /// Extract the caller identity from the variant's header, if present.
    #[must_use]
    pub fn verify(&self, headers: &HeaderMap) -> Option<VerifiedIdentity> {
        let header = match self.mode {
            IdentityMode::ForwardedCertificate => FORWARDED_CERT_SUBJECT_HEADER,
            IdentityMode::HeaderSimulation => SIMULATED_SUBJECT_HEADER,
        };
        headers
            .get(header)
            .and_then(|value| value.to_str().ok())
            .filter(|subject| !subject.is_empty())
            .map(|subject| VerifiedIdentity {
                subject: subject.to_owned(),
            })
    }
}

/// Middleware enforcing the identity requirement before the core runs.
pub async fn require_identity(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    if !state.identity.required() || state.identity.verify(req.headers()).is_some() {
        return next.run(req).await;
    }

    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "code": "UNAUTHORIZED",
            "message": "Client certificate required",
        })),
    )
        .into_response()
}

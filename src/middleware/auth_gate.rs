//! Per-kind authentication gate.
//!
//! Every protected request goes through the same three checks:
//! 1. the `auth-key` header is present,
//! 2. the token verifies against this gate's kind (signature and expiry),
//! 3. the token has not been revoked by a logout.
//!
//! Passing all three attaches an [`AuthContext`] to the request; failing any
//! of them answers `401` without saying which check failed.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use super::metrics;
use crate::auth::codec::{TokenCodec, VerificationError};
use crate::auth::kind::PrincipalKind;
use crate::errors::AppError;
use crate::revocation::service::RevocationService;

/// Header carrying the raw token. Not `Authorization: Bearer`.
pub const AUTH_HEADER: &str = "auth-key";

/// The verified caller, available to handlers as `Extension<AuthContext>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub principal_id: Uuid,
    pub kind: PrincipalKind,
    /// Raw token as presented; logout revokes exactly this string.
    pub token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    MissingToken,
    Invalid(VerificationError),
    Revoked,
}

impl Rejection {
    pub fn as_label(&self) -> &'static str {
        match self {
            Rejection::MissingToken => "missing_token",
            Rejection::Invalid(e) => e.as_label(),
            Rejection::Revoked => "revoked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Admitted(AuthContext),
    Rejected(Rejection),
}

#[derive(Clone)]
pub struct AuthGate {
    kind: PrincipalKind,
    codec: Arc<TokenCodec>,
    revocations: RevocationService,
}

impl AuthGate {
    pub fn new(kind: PrincipalKind, codec: Arc<TokenCodec>, revocations: RevocationService) -> Self {
        Self {
            kind,
            codec,
            revocations,
        }
    }

    pub fn kind(&self) -> PrincipalKind {
        self.kind
    }

    pub async fn evaluate(&self, headers: &HeaderMap) -> GateDecision {
        let decision = self.decide(headers).await;
        match &decision {
            GateDecision::Admitted(ctx) => {
                metrics::record_gate_decision(self.kind, "admitted");
                tracing::debug!(kind = %self.kind, principal = %ctx.principal_id, "auth gate: admitted");
            }
            GateDecision::Rejected(reason) => {
                metrics::record_gate_decision(self.kind, reason.as_label());
                tracing::debug!(kind = %self.kind, reason = reason.as_label(), "auth gate: rejected");
            }
        }
        decision
    }

    async fn decide(&self, headers: &HeaderMap) -> GateDecision {
        let Some(token) = headers.get(AUTH_HEADER).and_then(|v| v.to_str().ok()) else {
            return GateDecision::Rejected(Rejection::MissingToken);
        };

        let verified = match self.codec.verify(token, self.kind) {
            Ok(v) => v,
            Err(e) => return GateDecision::Rejected(Rejection::Invalid(e)),
        };

        if self
            .revocations
            .is_revoked(token, verified.principal_id, self.kind)
            .await
        {
            return GateDecision::Rejected(Rejection::Revoked);
        }

        GateDecision::Admitted(AuthContext {
            principal_id: verified.principal_id,
            kind: self.kind,
            token: token.to_string(),
        })
    }
}

/// Middleware: admits the request with an [`AuthContext`] extension or
/// answers `401 {"msg": "Unauthorized"}`.
pub async fn require_principal(
    State(gate): State<AuthGate>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    match gate.evaluate(req.headers()).await {
        GateDecision::Admitted(ctx) => {
            req.extensions_mut().insert(ctx);
            Ok(next.run(req).await)
        }
        GateDecision::Rejected(_) => Err(AppError::Unauthorized),
    }
}

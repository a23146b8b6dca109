//! Bearer token codec.
//!
//! Tokens are HS256 JWTs carrying the principal id (`sub`), its kind, and
//! `iat`/`exp`. Each kind signs with its own secret and lifetime, so a token
//! minted for one kind never verifies as the other.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::kind::{AuthConfig, PrincipalKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub kind: PrincipalKind,
    pub iat: i64,
    pub exp: i64,
}

/// The outcome of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub principal_id: Uuid,
    pub kind: PrincipalKind,
    pub expires_at: DateTime<Utc>,
}

/// Why a token was refused. Callers collapse all of these into a single
/// `401`; the distinction is kept for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VerificationError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("malformed token")]
    Malformed,
}

impl VerificationError {
    pub fn as_label(&self) -> &'static str {
        match self {
            VerificationError::InvalidSignature => "invalid_signature",
            VerificationError::Expired => "expired",
            VerificationError::Malformed => "malformed",
        }
    }
}

impl From<jsonwebtoken::errors::Error> for VerificationError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                VerificationError::InvalidSignature
            }
            ErrorKind::ExpiredSignature => VerificationError::Expired,
            _ => VerificationError::Malformed,
        }
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
    #[error("token lifetime overflows the clock")]
    LifetimeOverflow,
}

struct KindKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl KindKeys {
    fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }
}

pub struct TokenCodec {
    user: KindKeys,
    admin: KindKeys,
    validation: Validation,
}

impl TokenCodec {
    pub fn new(config: &AuthConfig) -> Self {
        let user = config.policy(PrincipalKind::User);
        let admin = config.policy(PrincipalKind::Admin);

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            user: KindKeys::new(user.secret(), user.ttl()),
            admin: KindKeys::new(admin.secret(), admin.ttl()),
            validation,
        }
    }

    fn keys(&self, kind: PrincipalKind) -> &KindKeys {
        match kind {
            PrincipalKind::User => &self.user,
            PrincipalKind::Admin => &self.admin,
        }
    }

    pub fn ttl(&self, kind: PrincipalKind) -> Duration {
        self.keys(kind).ttl
    }

    pub fn issue(&self, principal_id: Uuid, kind: PrincipalKind) -> Result<String, CodecError> {
        self.issue_at(principal_id, kind, Utc::now())
    }

    /// Mint a token as if issued at `issued_at`.
    pub fn issue_at(
        &self,
        principal_id: Uuid,
        kind: PrincipalKind,
        issued_at: DateTime<Utc>,
    ) -> Result<String, CodecError> {
        let keys = self.keys(kind);
        let ttl = i64::try_from(keys.ttl.as_secs()).map_err(|_| CodecError::LifetimeOverflow)?;
        let iat = issued_at.timestamp();
        let exp = iat.checked_add(ttl).ok_or(CodecError::LifetimeOverflow)?;

        let claims = Claims {
            sub: principal_id,
            kind,
            iat,
            exp,
        };
        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)?;
        Ok(token)
    }

    /// Verify `token` against `kind`'s key and expiry.
    pub fn verify(
        &self,
        token: &str,
        kind: PrincipalKind,
    ) -> Result<VerifiedToken, VerificationError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.keys(kind).decoding, &self.validation)?;
        let claims = data.claims;

        // Signed with this kind's key but claiming another kind.
        if claims.kind != kind {
            return Err(VerificationError::InvalidSignature);
        }

        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or(VerificationError::Malformed)?;

        Ok(VerifiedToken {
            principal_id: claims.sub,
            kind,
            expires_at,
        })
    }

    /// Verify `token` against every kind, reporting which one signed it.
    pub fn verify_any(&self, token: &str) -> Result<VerifiedToken, VerificationError> {
        for kind in PrincipalKind::ALL {
            match self.verify(token, kind) {
                Err(VerificationError::InvalidSignature) => continue,
                other => return other,
            }
        }
        Err(VerificationError::InvalidSignature)
    }
}

/// Shorten a token for logs: first and last 6 characters only.
pub fn mask_token(token: &str) -> String {
    const VISIBLE: usize = 6;
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= VISIBLE * 2 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..VISIBLE].iter().collect();
    let tail: String = chars[chars.len() - VISIBLE..].iter().collect();
    format!("{}...{}", head, tail)
}

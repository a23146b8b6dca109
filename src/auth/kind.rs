use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// The two kinds of account that can hold a session.
///
/// Each kind has its own signing secret, token lifetime and revocation
/// partition. Serialized as `"User"` / `"Admin"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrincipalKind {
    User,
    Admin,
}

impl PrincipalKind {
    pub const ALL: [PrincipalKind; 2] = [PrincipalKind::User, PrincipalKind::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            PrincipalKind::User => "User",
            PrincipalKind::Admin => "Admin",
        }
    }
}

impl fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrincipalKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" => Ok(PrincipalKind::User),
            "admin" => Ok(PrincipalKind::Admin),
            other => anyhow::bail!("unknown principal kind '{}': expected user or admin", other),
        }
    }
}

/// Signing secret and token lifetime for one principal kind.
pub struct KindPolicy {
    secret: Zeroizing<String>,
    ttl: Duration,
}

impl KindPolicy {
    pub fn new(secret: Zeroizing<String>, ttl: Duration) -> Self {
        Self { secret, ttl }
    }

    pub fn secret(&self) -> &[u8] {
        self.secret.as_bytes()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

// Never print the secret.
impl fmt::Debug for KindPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KindPolicy")
            .field("secret", &"<redacted>")
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// Per-kind signing configuration, built once at startup and handed to the
/// codec and the revocation service.
#[derive(Debug)]
pub struct AuthConfig {
    user: KindPolicy,
    admin: KindPolicy,
}

impl AuthConfig {
    /// Fails when both kinds share a secret: a user token would then carry a
    /// valid admin signature.
    pub fn new(user: KindPolicy, admin: KindPolicy) -> anyhow::Result<Self> {
        if user.secret() == admin.secret() {
            anyhow::bail!("JWT_SECRET_USER and JWT_SECRET_ADMIN must differ");
        }
        Ok(Self { user, admin })
    }

    pub fn policy(&self, kind: PrincipalKind) -> &KindPolicy {
        match kind {
            PrincipalKind::User => &self.user,
            PrincipalKind::Admin => &self.admin,
        }
    }

    pub fn ttl(&self, kind: PrincipalKind) -> Duration {
        self.policy(kind).ttl()
    }
}

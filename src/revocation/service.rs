use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{RevocationRecord, RevocationStore, RevokedEntry, StoreError};
use crate::auth::codec::mask_token;
use crate::auth::kind::{AuthConfig, PrincipalKind};

/// Records logouts and answers "is this token revoked?".
///
/// Store failures are handled asymmetrically:
/// - `revoke` returns `false`, so the logout is reported as failed rather
///   than silently lost;
/// - `is_revoked` returns `true`, so a request is refused rather than
///   admitted with a possibly logged-out token.
#[derive(Clone)]
pub struct RevocationService {
    store: Arc<dyn RevocationStore>,
    user_ttl: Duration,
    admin_ttl: Duration,
}

impl RevocationService {
    pub fn new(store: Arc<dyn RevocationStore>, auth: &AuthConfig) -> Self {
        Self {
            store,
            user_ttl: auth.ttl(PrincipalKind::User),
            admin_ttl: auth.ttl(PrincipalKind::Admin),
        }
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    fn ttl(&self, kind: PrincipalKind) -> Duration {
        match kind {
            PrincipalKind::User => self.user_ttl,
            PrincipalKind::Admin => self.admin_ttl,
        }
    }

    pub async fn revoke(&self, token: &str, principal_id: Uuid, kind: PrincipalKind) -> bool {
        self.revoke_at(token, principal_id, kind, Utc::now()).await
    }

    /// Revoke as of `now`. The entry lives for a full `kind` lifetime from
    /// `now`, regardless of how long the token itself had left.
    pub async fn revoke_at(
        &self,
        token: &str,
        principal_id: Uuid,
        kind: PrincipalKind,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(expires_at) = expiry_after(now, self.ttl(kind)) else {
            tracing::error!(kind = %kind, "revocation expiry overflows the clock");
            return false;
        };

        let entry = RevokedEntry {
            token: token.to_string(),
            expires_at,
        };

        match self.store.append(principal_id, kind, entry).await {
            Ok(()) => {
                tracing::info!(
                    principal = %principal_id,
                    kind = %kind,
                    token = %mask_token(token),
                    %expires_at,
                    backend = self.backend(),
                    "token revoked"
                );
                true
            }
            Err(e) => {
                tracing::error!(
                    principal = %principal_id,
                    kind = %kind,
                    backend = self.backend(),
                    "failed to record revocation: {}",
                    e
                );
                false
            }
        }
    }

    pub async fn is_revoked(&self, token: &str, principal_id: Uuid, kind: PrincipalKind) -> bool {
        self.is_revoked_at(token, principal_id, kind, Utc::now()).await
    }

    /// Check as of `now`, pruning entries that have expired by then.
    pub async fn is_revoked_at(
        &self,
        token: &str,
        principal_id: Uuid,
        kind: PrincipalKind,
        now: DateTime<Utc>,
    ) -> bool {
        match self.store.prune_expired(principal_id, kind, now).await {
            Ok(None) => false,
            Ok(Some(record)) => record.contains(token),
            Err(e) => {
                tracing::error!(
                    principal = %principal_id,
                    kind = %kind,
                    backend = self.backend(),
                    "revocation check failed, denying: {}",
                    e
                );
                true
            }
        }
    }

    /// The stored record, unpruned.
    pub async fn record(
        &self,
        principal_id: Uuid,
        kind: PrincipalKind,
    ) -> Result<Option<RevocationRecord>, StoreError> {
        self.store.get(principal_id, kind).await
    }

    /// Forget every revocation of a principal. The record is kept, emptied.
    pub async fn clear(&self, principal_id: Uuid, kind: PrincipalKind) -> Result<(), StoreError> {
        self.store
            .upsert(&RevocationRecord::new(principal_id, kind))
            .await?;
        tracing::warn!(principal = %principal_id, kind = %kind, "revocations cleared");
        Ok(())
    }
}

fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> Option<DateTime<Utc>> {
    let ttl = chrono::Duration::from_std(ttl).ok()?;
    now.checked_add_signed(ttl)
}

//! Server-side memory of logged-out tokens.
//!
//! A token stays valid by signature until it expires, so logout records it
//! here. Each (principal id, kind) pair owns one [`RevocationRecord`]; its
//! entries are dropped lazily once their `expires_at` has passed, the next
//! time that principal is checked. Records of dormant principals are never
//! swept and keep their stale entries until the principal comes back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::auth::kind::PrincipalKind;

pub mod memory;
pub mod postgres;
pub mod redis;
pub mod service;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokedEntry {
    pub token: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevocationRecord {
    pub principal_id: Uuid,
    pub kind: PrincipalKind,
    pub entries: Vec<RevokedEntry>,
}

impl RevocationRecord {
    pub fn new(principal_id: Uuid, kind: PrincipalKind) -> Self {
        Self {
            principal_id,
            kind,
            entries: Vec::new(),
        }
    }

    pub fn contains(&self, token: &str) -> bool {
        self.entries.iter().any(|e| e.token == token)
    }

    /// Add `entry`, replacing an existing entry for the same token.
    pub fn insert(&mut self, entry: RevokedEntry) {
        self.entries.retain(|e| e.token != entry.token);
        self.entries.push(entry);
    }

    /// Drop entries expiring at or before `now`. Returns how many were dropped.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.expires_at > now);
        before - self.entries.len()
    }

    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        self.entries.iter().any(|e| e.expires_at <= now)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("corrupt revocation record: {0}")]
    Corrupt(String),

    #[error("revocation store unavailable: {0}")]
    Unavailable(String),
}

/// Keyed by (principal id, kind). Implementations must serialize writes per
/// key: `append` and `prune_expired` are single atomic operations so that
/// concurrent logouts for one principal never lose an entry.
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    async fn get(
        &self,
        principal_id: Uuid,
        kind: PrincipalKind,
    ) -> Result<Option<RevocationRecord>, StoreError>;

    /// Create or fully replace the record for `record`'s key.
    async fn upsert(&self, record: &RevocationRecord) -> Result<(), StoreError>;

    /// Add `entry`, creating the record if absent.
    async fn append(
        &self,
        principal_id: Uuid,
        kind: PrincipalKind,
        entry: RevokedEntry,
    ) -> Result<(), StoreError>;

    /// Remove entries expiring at or before `now` and return what survives.
    async fn prune_expired(
        &self,
        principal_id: Uuid,
        kind: PrincipalKind,
        now: DateTime<Utc>,
    ) -> Result<Option<RevocationRecord>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn entry(token: &str, expires_at: DateTime<Utc>) -> RevokedEntry {
        RevokedEntry {
            token: token.into(),
            expires_at,
        }
    }

    #[test]
    fn test_insert_replaces_same_token() {
        let now = Utc::now();
        let mut rec = RevocationRecord::new(Uuid::new_v4(), PrincipalKind::User);
        rec.insert(entry("t1", now));
        rec.insert(entry("t1", now + Duration::hours(1)));
        assert_eq!(rec.entries.len(), 1);
        assert_eq!(rec.entries[0].expires_at, now + Duration::hours(1));
    }

    #[test]
    fn test_prune_boundary_is_inclusive() {
        let now = Utc::now();
        let mut rec = RevocationRecord::new(Uuid::new_v4(), PrincipalKind::Admin);
        rec.insert(entry("past", now - Duration::seconds(1)));
        rec.insert(entry("exact", now));
        rec.insert(entry("future", now + Duration::seconds(1)));
        assert!(rec.has_expired(now));
        assert_eq!(rec.prune(now), 2);
        assert!(!rec.contains("exact"));
        assert!(rec.contains("future"));
        assert!(!rec.has_expired(now));
    }

    #[test]
    fn test_entry_json_uses_epoch_millis() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let json = serde_json::to_value(entry("abc", at)).unwrap();
        assert_eq!(json["token"], "abc");
        assert_eq!(json["expires_at"], 1_700_000_000_123_i64);
    }
}

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use uuid::Uuid;

use super::{RevocationRecord, RevocationStore, RevokedEntry, StoreError};
use crate::auth::kind::PrincipalKind;

/// Drop expired members and return the survivors in one round trip.
static PRUNE_SCRIPT: Lazy<redis::Script> = Lazy::new(|| {
    redis::Script::new(
        r#"
        redis.call("ZREMRANGEBYSCORE", KEYS[1], "-inf", ARGV[1])
        return redis.call("ZRANGE", KEYS[1], 0, -1, "WITHSCORES")
    "#,
    )
});

/// One sorted set per principal: member = raw token, score = expiry in
/// epoch millis. `ZADD` on an existing member just moves its score, so a
/// repeated logout refreshes the entry.
///
/// Redis deletes a sorted set once its last member is removed, so an
/// emptied record reads back as absent. Both mean "nothing revoked".
#[derive(Clone)]
pub struct RedisRevocationStore {
    redis: ConnectionManager,
}

impl RedisRevocationStore {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

pub(crate) fn record_key(principal_id: Uuid, kind: PrincipalKind) -> String {
    format!("revoked:{}:{}", kind.as_str().to_lowercase(), principal_id)
}

fn record_from_members(
    principal_id: Uuid,
    kind: PrincipalKind,
    members: Vec<(String, f64)>,
) -> Result<Option<RevocationRecord>, StoreError> {
    if members.is_empty() {
        return Ok(None);
    }
    let entries = members
        .into_iter()
        .map(|(token, score)| {
            let expires_at = Utc
                .timestamp_millis_opt(score as i64)
                .single()
                .ok_or_else(|| StoreError::Corrupt(format!("expiry score {} out of range", score)))?;
            Ok(RevokedEntry { token, expires_at })
        })
        .collect::<Result<Vec<_>, StoreError>>()?;

    Ok(Some(RevocationRecord {
        principal_id,
        kind,
        entries,
    }))
}

#[async_trait]
impl RevocationStore for RedisRevocationStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn get(
        &self,
        principal_id: Uuid,
        kind: PrincipalKind,
    ) -> Result<Option<RevocationRecord>, StoreError> {
        let mut conn = self.redis.clone();
        let members: Vec<(String, f64)> = conn
            .zrange_withscores(record_key(principal_id, kind), 0, -1)
            .await?;
        record_from_members(principal_id, kind, members)
    }

    async fn upsert(&self, record: &RevocationRecord) -> Result<(), StoreError> {
        let key = record_key(record.principal_id, record.kind);
        let items: Vec<(i64, &str)> = record
            .entries
            .iter()
            .map(|e| (e.expires_at.timestamp_millis(), e.token.as_str()))
            .collect();

        let mut pipe = redis::pipe();
        pipe.atomic().del(&key).ignore();
        if !items.is_empty() {
            pipe.zadd_multiple(&key, items.as_slice()).ignore();
        }

        let mut conn = self.redis.clone();
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    async fn append(
        &self,
        principal_id: Uuid,
        kind: PrincipalKind,
        entry: RevokedEntry,
    ) -> Result<(), StoreError> {
        let mut conn = self.redis.clone();
        conn.zadd::<_, _, _, ()>(
            record_key(principal_id, kind),
            entry.token,
            entry.expires_at.timestamp_millis(),
        )
        .await?;
        Ok(())
    }

    async fn prune_expired(
        &self,
        principal_id: Uuid,
        kind: PrincipalKind,
        now: DateTime<Utc>,
    ) -> Result<Option<RevocationRecord>, StoreError> {
        let mut conn = self.redis.clone();
        let members: Vec<(String, f64)> = PRUNE_SCRIPT
            .key(record_key(principal_id, kind))
            .arg(now.timestamp_millis())
            .invoke_async(&mut conn)
            .await?;
        record_from_members(principal_id, kind, members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_key_partitions_by_kind() {
        let id = Uuid::parse_str("00000000-0000-0000-0000-000000000007").unwrap();
        assert_eq!(
            record_key(id, PrincipalKind::User),
            "revoked:user:00000000-0000-0000-0000-000000000007"
        );
        assert_ne!(
            record_key(id, PrincipalKind::User),
            record_key(id, PrincipalKind::Admin)
        );
    }

    #[test]
    fn test_members_decode_to_entries() {
        let id = Uuid::new_v4();
        let rec = record_from_members(
            id,
            PrincipalKind::User,
            vec![("tok".to_string(), 1_700_000_000_000.0)],
        )
        .unwrap()
        .unwrap();
        assert!(rec.contains("tok"));
        assert_eq!(rec.entries[0].expires_at.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_no_members_is_absent() {
        let rec = record_from_members(Uuid::new_v4(), PrincipalKind::Admin, vec![]).unwrap();
        assert!(rec.is_none());
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{RevocationRecord, RevocationStore, RevokedEntry, StoreError};
use crate::auth::kind::PrincipalKind;

/// Revocation records in the `revoked_tokens` table, one row per
/// (principal_id, principal_kind), entries in a JSONB array of
/// `{"token": .., "expires_at": <epoch millis>}`.
///
/// Every write is a single statement, so Postgres' row lock serializes
/// concurrent appends and prunes for the same principal.
#[derive(Clone)]
pub struct PgRevocationStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct RevocationRow {
    principal_id: Uuid,
    principal_kind: String,
    tokens: serde_json::Value,
}

impl TryFrom<RevocationRow> for RevocationRecord {
    type Error = StoreError;

    fn try_from(row: RevocationRow) -> Result<Self, Self::Error> {
        let kind = row
            .principal_kind
            .parse::<PrincipalKind>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let entries: Vec<RevokedEntry> = serde_json::from_value(row.tokens).map_err(|e| {
            StoreError::Corrupt(format!("tokens of {} {}: {}", kind, row.principal_id, e))
        })?;
        Ok(RevocationRecord {
            principal_id: row.principal_id,
            kind,
            entries,
        })
    }
}

impl PgRevocationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RevocationStore for PgRevocationStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn get(
        &self,
        principal_id: Uuid,
        kind: PrincipalKind,
    ) -> Result<Option<RevocationRecord>, StoreError> {
        let row = sqlx::query_as::<_, RevocationRow>(
            "SELECT principal_id, principal_kind, tokens FROM revoked_tokens WHERE principal_id = $1 AND principal_kind = $2",
        )
        .bind(principal_id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(RevocationRecord::try_from).transpose()
    }

    async fn upsert(&self, record: &RevocationRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO revoked_tokens (principal_id, principal_kind, tokens)
               VALUES ($1, $2, $3)
               ON CONFLICT (principal_id, principal_kind)
               DO UPDATE SET tokens = EXCLUDED.tokens, updated_at = NOW()"#,
        )
        .bind(record.principal_id)
        .bind(record.kind.as_str())
        .bind(Json(&record.entries))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append(
        &self,
        principal_id: Uuid,
        kind: PrincipalKind,
        entry: RevokedEntry,
    ) -> Result<(), StoreError> {
        // Drops any previous entry for the same token before appending, so a
        // repeated logout refreshes rather than duplicates.
        sqlx::query(
            r#"INSERT INTO revoked_tokens (principal_id, principal_kind, tokens)
               VALUES ($1, $2, jsonb_build_array(jsonb_build_object('token', $3::text, 'expires_at', $4::bigint)))
               ON CONFLICT (principal_id, principal_kind) DO UPDATE
               SET tokens = COALESCE(
                       (SELECT jsonb_agg(e)
                          FROM jsonb_array_elements(revoked_tokens.tokens) AS e
                         WHERE e->>'token' <> $3::text),
                       '[]'::jsonb
                   ) || EXCLUDED.tokens,
                   updated_at = NOW()"#,
        )
        .bind(principal_id)
        .bind(kind.as_str())
        .bind(&entry.token)
        .bind(entry.expires_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn prune_expired(
        &self,
        principal_id: Uuid,
        kind: PrincipalKind,
        now: DateTime<Utc>,
    ) -> Result<Option<RevocationRecord>, StoreError> {
        let Some(current) = self.get(principal_id, kind).await? else {
            return Ok(None);
        };
        if !current.has_expired(now) {
            return Ok(Some(current));
        }

        // Recomputed from the row as it is at update time, so an entry
        // appended since the read above is kept.
        let row = sqlx::query_as::<_, RevocationRow>(
            r#"UPDATE revoked_tokens
               SET tokens = COALESCE(
                       (SELECT jsonb_agg(e)
                          FROM jsonb_array_elements(tokens) AS e
                         WHERE (e->>'expires_at')::bigint > $3),
                       '[]'::jsonb
                   ),
                   updated_at = NOW()
               WHERE principal_id = $1 AND principal_kind = $2
               RETURNING principal_id, principal_kind, tokens"#,
        )
        .bind(principal_id)
        .bind(kind.as_str())
        .bind(now.timestamp_millis())
        .fetch_optional(&self.pool)
        .await?;

        let pruned = row.map(RevocationRecord::try_from).transpose()?;
        if let Some(record) = &pruned {
            tracing::debug!(
                principal = %principal_id,
                kind = %kind,
                dropped = current.entries.len().saturating_sub(record.entries.len()),
                "pruned expired revocations"
            );
        }
        Ok(pruned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_row_decodes_into_record() {
        let id = Uuid::new_v4();
        let row = RevocationRow {
            principal_id: id,
            principal_kind: "Admin".into(),
            tokens: json!([{ "token": "abc", "expires_at": 1_700_000_000_000_i64 }]),
        };
        let rec = RevocationRecord::try_from(row).unwrap();
        assert_eq!(rec.principal_id, id);
        assert_eq!(rec.kind, PrincipalKind::Admin);
        assert!(rec.contains("abc"));
        assert_eq!(rec.entries[0].expires_at.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_bad_kind_is_corrupt() {
        let row = RevocationRow {
            principal_id: Uuid::new_v4(),
            principal_kind: "Instructor".into(),
            tokens: json!([]),
        };
        assert!(matches!(
            RevocationRecord::try_from(row),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn test_bad_tokens_are_corrupt() {
        let row = RevocationRow {
            principal_id: Uuid::new_v4(),
            principal_kind: "User".into(),
            tokens: json!({ "not": "an array" }),
        };
        assert!(matches!(
            RevocationRecord::try_from(row),
            Err(StoreError::Corrupt(_))
        ));
    }
}

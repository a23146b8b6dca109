use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use super::{RevocationRecord, RevocationStore, RevokedEntry, StoreError};
use crate::auth::kind::PrincipalKind;

/// In-process revocation store.
///
/// Per-key atomicity comes from DashMap's shard locks held across each
/// read-modify-write. State is lost on restart and not shared between
/// instances, so this backend is for tests and single-node development.
#[derive(Clone, Default)]
pub struct MemoryRevocationStore {
    records: Arc<DashMap<(Uuid, PrincipalKind), RevocationRecord>>,
}

impl MemoryRevocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held, empty ones included.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RevocationStore for MemoryRevocationStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(
        &self,
        principal_id: Uuid,
        kind: PrincipalKind,
    ) -> Result<Option<RevocationRecord>, StoreError> {
        Ok(self
            .records
            .get(&(principal_id, kind))
            .map(|r| r.value().clone()))
    }

    async fn upsert(&self, record: &RevocationRecord) -> Result<(), StoreError> {
        self.records
            .insert((record.principal_id, record.kind), record.clone());
        Ok(())
    }

    async fn append(
        &self,
        principal_id: Uuid,
        kind: PrincipalKind,
        entry: RevokedEntry,
    ) -> Result<(), StoreError> {
        self.records
            .entry((principal_id, kind))
            .or_insert_with(|| RevocationRecord::new(principal_id, kind))
            .insert(entry);
        Ok(())
    }

    async fn prune_expired(
        &self,
        principal_id: Uuid,
        kind: PrincipalKind,
        now: DateTime<Utc>,
    ) -> Result<Option<RevocationRecord>, StoreError> {
        match self.records.get_mut(&(principal_id, kind)) {
            Some(mut record) => {
                record.prune(now);
                Ok(Some(record.value().clone()))
            }
            None => Ok(None),
        }
    }
}

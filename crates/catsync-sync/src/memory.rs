//! In-memory [`ProductStore`], used by tests and dry local runs.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use catsync_core::{LocalRecord, LookupTargets, PendingPatch, ProductStore, RecordId};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MemoryStoreError {
    #[error("injected failure on write {0}")]
    Injected(usize),

    #[error("record {0} not found")]
    NotFound(RecordId),
}

#[derive(Debug, Default)]
struct Inner {
    records: BTreeMap<RecordId, LocalRecord>,
    attempts: usize,
    writes: usize,
    fail_on_attempt: Option<usize>,
}

/// A cloneable handle to an in-memory record table. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(records: impl IntoIterator<Item = LocalRecord>) -> Self {
        let store = Self::default();
        store.lock().records = records.into_iter().map(|r| (r.id, r)).collect();
        store
    }

    /// Makes the `n`-th write attempt (1-based, counted over the store's
    /// lifetime) fail once with [`MemoryStoreError::Injected`].
    #[must_use]
    pub fn fail_on_write(self, n: usize) -> Self {
        self.lock().fail_on_attempt = Some(n);
        self
    }

    /// Every record, ordered by id.
    #[must_use]
    pub fn records(&self) -> Vec<LocalRecord> {
        self.lock().records.values().cloned().collect()
    }

    #[must_use]
    pub fn record(&self, id: RecordId) -> Option<LocalRecord> {
        self.lock().records.get(&id).cloned()
    }

    /// Number of successful writes.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn is_target(record: &LocalRecord, targets: &LookupTargets) -> bool {
    record
        .barcode
        .as_ref()
        .is_some_and(|b| targets.barcodes.contains(b))
        || record
            .vendor_code
            .as_ref()
            .is_some_and(|c| targets.vendor_codes.contains(c))
        || record
            .numeric_id
            .is_some_and(|n| targets.numeric_ids.contains(&n))
}

impl ProductStore for MemoryStore {
    type Error = MemoryStoreError;

    async fn load_records(
        &self,
        targets: Option<&LookupTargets>,
    ) -> Result<Vec<LocalRecord>, Self::Error> {
        let inner = self.lock();
        Ok(inner
            .records
            .values()
            .filter(|record| targets.is_none_or(|t| is_target(record, t)))
            .cloned()
            .collect())
    }

    async fn apply_patch(&self, patch: &PendingPatch) -> Result<(), Self::Error> {
        let mut inner = self.lock();
        inner.attempts += 1;
        if inner.fail_on_attempt == Some(inner.attempts) {
            return Err(MemoryStoreError::Injected(inner.attempts));
        }

        let record = inner
            .records
            .get_mut(&patch.record_id)
            .ok_or(MemoryStoreError::NotFound(patch.record_id))?;
        record.numeric_id = Some(patch.numeric_id);
        if let Some(label) = &patch.category_label {
            record.category_label = Some(label.clone());
        }
        inner.writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: RecordId, vendor_code: &str, barcode: &str, numeric_id: Option<i64>) -> LocalRecord {
        LocalRecord {
            id,
            vendor_code: Some(vendor_code.to_owned()),
            barcode: Some(barcode.to_owned()),
            numeric_id,
            category_label: None,
        }
    }

    #[tokio::test]
    async fn loads_only_target_records() {
        let store = MemoryStore::new([
            record(1, "A", "111", None),
            record(2, "B", "222", Some(77)),
            record(3, "C", "333", None),
        ]);
        let targets = LookupTargets::new(["111"], ["C"], [77]);

        let loaded = store.load_records(Some(&targets)).await.unwrap();
        let ids: Vec<RecordId> = loaded.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let narrow = LookupTargets::new(["222"], Vec::<String>::new(), []);
        let loaded = store.load_records(Some(&narrow)).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, 2);

        assert_eq!(store.load_records(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn injected_failure_fires_once() {
        let store = MemoryStore::new([record(1, "A", "111", None)]).fail_on_write(1);
        let patch = PendingPatch {
            record_id: 1,
            numeric_id: 9,
            category_label: None,
        };

        assert_eq!(
            store.apply_patch(&patch).await,
            Err(MemoryStoreError::Injected(1))
        );
        assert_eq!(store.apply_patch(&patch).await, Ok(()));
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn unknown_record_is_an_error() {
        let store = MemoryStore::default();
        let patch = PendingPatch {
            record_id: 5,
            numeric_id: 1,
            category_label: None,
        };
        assert_eq!(
            store.apply_patch(&patch).await,
            Err(MemoryStoreError::NotFound(5))
        );
    }
}

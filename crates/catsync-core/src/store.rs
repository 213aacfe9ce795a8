//! The product store seam.
//!
//! The synchronization engine only ever needs a keyed bulk read and a keyed
//! single-record write. Anything else about the store (schema, transactions,
//! indexing) belongs to the implementation.

use std::future::Future;

use crate::catalog::{LocalRecord, LookupTargets, PendingPatch};

pub trait ProductStore: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Loads the local records relevant to `targets`: every record whose
    /// barcode, vendor code, or numeric id appears in the target set. `None`
    /// loads every record in the store.
    fn load_records(
        &self,
        targets: Option<&LookupTargets>,
    ) -> impl Future<Output = Result<Vec<LocalRecord>, Self::Error>> + Send;

    /// Overwrites the numeric id and, when present, the category label of the
    /// record identified by `patch.record_id`. Applying the same patch twice
    /// must leave the same stored state as applying it once.
    fn apply_patch(
        &self,
        patch: &PendingPatch,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

//! Domain types shared by the marketplace client, the reconciliation engine,
//! and the product store.
//!
//! Remote data ([`CatalogEntry`], [`Cursor`]) lives for a single pass only.
//! [`LocalRecord`]s are loaded once per pass and never mutated in place;
//! changes are staged as [`PendingPatch`]es and handed to the store at the end.

use std::collections::HashSet;

use serde::Serialize;

/// Opaque identifier of a record in the local product store.
pub type RecordId = i64;

/// One normalized catalog entry from a remote page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    /// Marketplace-assigned numeric id. Always positive.
    pub numeric_id: i64,
    /// Seller vendor code. Empty when the payload carries none.
    pub vendor_code: String,
    /// Category label. Empty when the payload carries none.
    pub category_label: String,
    /// Barcodes / SKUs, trimmed and deduplicated in first-seen order.
    pub identifiers: Vec<String>,
}

impl CatalogEntry {
    /// Returns the category label, or `None` when it is empty.
    #[must_use]
    pub fn category(&self) -> Option<&str> {
        Some(self.category_label.as_str()).filter(|s| !s.is_empty())
    }

    #[must_use]
    pub fn has_identifier(&self, identifier: &str) -> bool {
        self.identifiers.iter().any(|id| id == identifier)
    }
}

/// A pre-existing record in the local product store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalRecord {
    pub id: RecordId,
    pub vendor_code: Option<String>,
    /// Primary alternate identifier (barcode).
    pub barcode: Option<String>,
    pub numeric_id: Option<i64>,
    pub category_label: Option<String>,
}

/// A staged, not-yet-applied update to a [`LocalRecord`].
///
/// At most one patch exists per record id within a pass; a later match for
/// the same record replaces the earlier patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPatch {
    pub record_id: RecordId,
    pub numeric_id: i64,
    /// `None` leaves the stored label untouched.
    pub category_label: Option<String>,
}

impl PendingPatch {
    #[must_use]
    pub fn from_entry(record_id: RecordId, entry: &CatalogEntry) -> Self {
        Self {
            record_id,
            numeric_id: entry.numeric_id,
            category_label: entry.category().map(str::to_owned),
        }
    }
}

/// Pagination cursor returned by the catalog list endpoint.
///
/// The initial cursor has both fields unset. A cursor returned by the remote
/// API is only usable when both fields are present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    pub updated_at: Option<String>,
    pub numeric_id: Option<i64>,
}

impl Cursor {
    #[must_use]
    pub fn new(updated_at: impl Into<String>, numeric_id: i64) -> Self {
        Self {
            updated_at: Some(updated_at.into()),
            numeric_id: Some(numeric_id),
        }
    }

    /// Both the timestamp token and the numeric id are present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.updated_at.is_some() && self.numeric_id.is_some()
    }

    #[must_use]
    pub fn is_initial(&self) -> bool {
        self.updated_at.is_none() && self.numeric_id.is_none()
    }
}

/// The set of keys a pass is asked to resolve.
///
/// An empty target set means "full scan": every catalog entry is reconciled
/// against every local record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupTargets {
    pub barcodes: Vec<String>,
    pub vendor_codes: Vec<String>,
    pub numeric_ids: Vec<i64>,
}

impl LookupTargets {
    /// Builds a target set, trimming string keys and dropping empty,
    /// duplicate, and non-positive values while keeping the input order.
    #[must_use]
    pub fn new<B, V, N>(barcodes: B, vendor_codes: V, numeric_ids: N) -> Self
    where
        B: IntoIterator,
        B::Item: AsRef<str>,
        V: IntoIterator,
        V::Item: AsRef<str>,
        N: IntoIterator<Item = i64>,
    {
        let mut seen_ids = HashSet::new();
        Self {
            barcodes: dedup_trimmed(barcodes),
            vendor_codes: dedup_trimmed(vendor_codes),
            numeric_ids: numeric_ids
                .into_iter()
                .filter(|id| *id > 0 && seen_ids.insert(*id))
                .collect(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.barcodes.is_empty() && self.vendor_codes.is_empty() && self.numeric_ids.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.barcodes.len() + self.vendor_codes.len() + self.numeric_ids.len()
    }
}

fn dedup_trimmed<I>(values: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut seen = HashSet::new();
    values
        .into_iter()
        .map(|v| v.as_ref().trim().to_owned())
        .filter(|v| !v.is_empty() && seen.insert(v.clone()))
        .collect()
}

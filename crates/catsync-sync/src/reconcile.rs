//! Matching of remote catalog entries to local records.
//!
//! Each entry is matched against a [`LocalIndex`] loaded once per pass:
//!
//! 1. by vendor code, when the entry carries a non-empty one;
//! 2. otherwise by each of its identifiers in order, stopping at the first hit.
//!
//! A match stages a [`PendingPatch`] for the record. Patches are keyed by
//! record id, so a later match for the same record replaces the earlier one.
//! Alongside the patches, a [`TargetTracker`] records which entry resolved
//! each requested target key.

use std::collections::{BTreeMap, HashMap};

use catsync_core::{CatalogEntry, LocalRecord, LookupTargets, PendingPatch, RecordId};
use serde::Serialize;

/// Read-only lookup indices over the local records of one pass.
///
/// When two records share a key the first one loaded keeps it.
#[derive(Debug, Default)]
pub struct LocalIndex {
    records: BTreeMap<RecordId, LocalRecord>,
    by_vendor_code: HashMap<String, RecordId>,
    by_identifier: HashMap<String, RecordId>,
}

impl LocalIndex {
    #[must_use]
    pub fn new(records: Vec<LocalRecord>) -> Self {
        let mut index = Self::default();
        for record in records {
            if let Some(code) = non_empty(record.vendor_code.as_deref()) {
                index.by_vendor_code.entry(code.to_owned()).or_insert(record.id);
            }
            if let Some(barcode) = non_empty(record.barcode.as_deref()) {
                index.by_identifier.entry(barcode.to_owned()).or_insert(record.id);
            }
            index.records.entry(record.id).or_insert(record);
        }
        index
    }

    #[must_use]
    pub fn get(&self, id: RecordId) -> Option<&LocalRecord> {
        self.records.get(&id)
    }

    #[must_use]
    pub fn by_vendor_code(&self, vendor_code: &str) -> Option<&LocalRecord> {
        self.by_vendor_code.get(vendor_code).and_then(|id| self.get(*id))
    }

    #[must_use]
    pub fn by_identifier(&self, identifier: &str) -> Option<&LocalRecord> {
        self.by_identifier.get(identifier).and_then(|id| self.get(*id))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Finds the local record for `entry`: vendor code first, then each
    /// identifier in order.
    #[must_use]
    pub fn match_entry(&self, entry: &CatalogEntry) -> Option<(&LocalRecord, MatchKey)> {
        if let Some(record) =
            non_empty(Some(entry.vendor_code.as_str())).and_then(|code| self.by_vendor_code(code))
        {
            return Some((record, MatchKey::VendorCode));
        }
        entry
            .identifiers
            .iter()
            .find_map(|identifier| self.by_identifier(identifier))
            .map(|record| (record, MatchKey::Identifier))
    }
}

/// Which index produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKey {
    VendorCode,
    Identifier,
}

/// A key the caller asked the pass to resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetKey {
    Barcode(String),
    VendorCode(String),
    NumericId(i64),
}

impl TargetKey {
    /// The key as it is reported back to the caller.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Barcode(value) | Self::VendorCode(value) => value.clone(),
            Self::NumericId(id) => id.to_string(),
        }
    }
}

/// How a target key was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedVia {
    /// The entry listed the barcode among its identifiers.
    Identifier,
    /// The entry carried the requested vendor code.
    VendorCode,
    /// The entry carried the requested numeric id.
    NumericId,
    /// The entry matched the local record that owns the key.
    LocalRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub numeric_id: i64,
    pub category_label: Option<String>,
    pub via: ResolvedVia,
}

impl Resolution {
    fn from_entry(entry: &CatalogEntry, via: ResolvedVia) -> Self {
        Self {
            numeric_id: entry.numeric_id,
            category_label: entry.category().map(str::to_owned),
            via,
        }
    }
}

/// Tracks, per target key, the entry that resolved it. A later entry
/// resolving the same key replaces the earlier resolution.
#[derive(Debug, Default)]
pub struct TargetTracker {
    keys: Vec<TargetKey>,
    resolutions: Vec<Option<Resolution>>,
    barcode_slots: HashMap<String, usize>,
    vendor_code_slots: HashMap<String, usize>,
    numeric_id_slots: HashMap<i64, usize>,
}

impl TargetTracker {
    #[must_use]
    pub fn new(targets: &LookupTargets) -> Self {
        let mut tracker = Self::default();
        for barcode in &targets.barcodes {
            let slot = tracker.push(TargetKey::Barcode(barcode.clone()));
            tracker.barcode_slots.insert(barcode.clone(), slot);
        }
        for code in &targets.vendor_codes {
            let slot = tracker.push(TargetKey::VendorCode(code.clone()));
            tracker.vendor_code_slots.insert(code.clone(), slot);
        }
        for id in &targets.numeric_ids {
            let slot = tracker.push(TargetKey::NumericId(*id));
            tracker.numeric_id_slots.insert(*id, slot);
        }
        tracker
    }

    fn push(&mut self, key: TargetKey) -> usize {
        self.keys.push(key);
        self.resolutions.push(None);
        self.keys.len() - 1
    }

    /// Records which targets `entry` resolves, directly or through the local
    /// record it matched.
    pub fn observe(&mut self, entry: &CatalogEntry, matched: Option<&LocalRecord>) {
        if self.keys.is_empty() {
            return;
        }

        let mut hits: Vec<(usize, ResolvedVia)> = Vec::new();
        hits.extend(
            entry
                .identifiers
                .iter()
                .filter_map(|id| self.barcode_slots.get(id))
                .map(|slot| (*slot, ResolvedVia::Identifier)),
        );
        if let Some(slot) = self.vendor_code_slots.get(&entry.vendor_code) {
            hits.push((*slot, ResolvedVia::VendorCode));
        }
        if let Some(slot) = self.numeric_id_slots.get(&entry.numeric_id) {
            hits.push((*slot, ResolvedVia::NumericId));
        }

        if let Some(record) = matched {
            let via_record = [
                record
                    .barcode
                    .as_ref()
                    .and_then(|b| self.barcode_slots.get(b)),
                record
                    .vendor_code
                    .as_ref()
                    .and_then(|c| self.vendor_code_slots.get(c)),
                record
                    .numeric_id
                    .as_ref()
                    .and_then(|n| self.numeric_id_slots.get(n)),
            ];
            for slot in via_record.into_iter().flatten() {
                if !hits.iter().any(|(hit, _)| hit == slot) {
                    hits.push((*slot, ResolvedVia::LocalRecord));
                }
            }
        }

        for (slot, via) in hits {
            self.resolutions[slot] = Some(Resolution::from_entry(entry, via));
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn resolved_count(&self) -> usize {
        self.resolutions.iter().filter(|r| r.is_some()).count()
    }

    /// True when every target has been resolved. Vacuously true for an empty
    /// target set.
    #[must_use]
    pub fn all_resolved(&self) -> bool {
        self.resolutions.iter().all(Option::is_some)
    }

    #[must_use]
    pub fn is_resolved(&self, key: &TargetKey) -> bool {
        let slot = match key {
            TargetKey::Barcode(barcode) => self.barcode_slots.get(barcode),
            TargetKey::VendorCode(code) => self.vendor_code_slots.get(code),
            TargetKey::NumericId(id) => self.numeric_id_slots.get(id),
        };
        slot.is_some_and(|slot| self.resolutions[*slot].is_some())
    }

    /// Target keys with their resolution, in request order.
    pub fn resolutions(&self) -> impl Iterator<Item = (&TargetKey, Option<&Resolution>)> {
        self.keys.iter().zip(self.resolutions.iter().map(Option::as_ref))
    }
}

/// Accumulates patches and target resolutions across every page of a pass.
#[derive(Debug)]
pub struct Reconciler<'a> {
    index: &'a LocalIndex,
    tracker: TargetTracker,
    patches: BTreeMap<RecordId, PendingPatch>,
    matches: usize,
}

impl<'a> Reconciler<'a> {
    #[must_use]
    pub fn new(index: &'a LocalIndex, targets: &LookupTargets) -> Self {
        Self {
            index,
            tracker: TargetTracker::new(targets),
            patches: BTreeMap::new(),
            matches: 0,
        }
    }

    /// Reconciles one page of entries, in delivery order. Returns the number
    /// of entries that matched a local record.
    pub fn reconcile(&mut self, entries: &[CatalogEntry]) -> usize {
        let index = self.index;
        let mut matched = 0;
        for entry in entries {
            let hit = index.match_entry(entry);
            if let Some((record, key)) = hit {
                let patch = PendingPatch::from_entry(record.id, entry);
                if let Some(previous) = self.patches.insert(record.id, patch) {
                    tracing::debug!(
                        record_id = record.id,
                        previous = previous.numeric_id,
                        numeric_id = entry.numeric_id,
                        ?key,
                        "later entry replaced staged patch"
                    );
                }
                matched += 1;
            }
            self.tracker.observe(entry, hit.map(|(record, _)| record));
        }
        self.matches += matched;
        matched
    }

    #[must_use]
    pub fn index(&self) -> &'a LocalIndex {
        self.index
    }

    #[must_use]
    pub fn tracker(&self) -> &TargetTracker {
        &self.tracker
    }

    /// Entries matched so far across the pass, counting replaced matches.
    #[must_use]
    pub fn matches(&self) -> usize {
        self.matches
    }

    #[must_use]
    pub fn patches(&self) -> &BTreeMap<RecordId, PendingPatch> {
        &self.patches
    }

    /// The staged patches, one per record, ordered by record id.
    #[must_use]
    pub fn into_patches(self) -> Vec<PendingPatch> {
        self.patches.into_values().collect()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

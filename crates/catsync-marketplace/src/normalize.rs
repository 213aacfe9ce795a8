//! Normalization from raw marketplace payloads to [`CatalogEntry`].
//!
//! The marketplace does not return one fixed shape: the list endpoint puts
//! entries under `cards`, supply item listings under `items` or `orders`, and
//! some gateways wrap everything in `data`. Lookup is table-driven: each
//! table below is probed in order and the first structurally valid match
//! wins, so supporting a new shape means adding a row.

use std::collections::HashSet;

use catsync_core::CatalogEntry;
use serde_json::Value;

/// A named place in a page body where an entry array may live.
struct EntryLocation {
    name: &'static str,
    path: &'static [&'static str],
}

const ENTRY_LOCATIONS: &[EntryLocation] = &[
    EntryLocation {
        name: "cards",
        path: &["cards"],
    },
    EntryLocation {
        name: "data.cards",
        path: &["data", "cards"],
    },
    EntryLocation {
        name: "items",
        path: &["items"],
    },
    EntryLocation {
        name: "data.items",
        path: &["data", "items"],
    },
    EntryLocation {
        name: "orders",
        path: &["orders"],
    },
    EntryLocation {
        name: "data.orders",
        path: &["data", "orders"],
    },
    EntryLocation {
        name: "data",
        path: &["data"],
    },
    EntryLocation {
        name: "root",
        path: &[],
    },
];

const NUMERIC_ID_FIELDS: &[&str] = &["nmID", "nmId"];
const CATEGORY_FIELDS: &[&str] = &["subjectName", "SubjectName"];
const VENDOR_CODE_FIELD: &str = "vendorCode";
const IDENTIFIER_LIST_FIELDS: &[&str] = &["skus", "barcodes"];
const IDENTIFIER_SCALAR_FIELDS: &[&str] = &["barcode"];
const VARIANT_LIST_FIELDS: &[&str] = &["sizes", "variants"];

/// Finds the entry array in a page body.
///
/// Returns the name of the matching location and the array, or `None` when
/// no candidate location holds a non-null array.
#[must_use]
pub fn locate_entries(body: &Value) -> Option<(&'static str, &Vec<Value>)> {
    ENTRY_LOCATIONS.iter().find_map(|location| {
        value_at(body, location.path)
            .and_then(Value::as_array)
            .map(|entries| (location.name, entries))
    })
}

/// Normalizes every entry in a page body.
///
/// A body with no recognizable entry array yields an empty page, not an
/// error. Entries without a positive numeric id are skipped.
#[must_use]
pub fn normalize_page(body: &Value) -> Vec<CatalogEntry> {
    let Some((location, raw_entries)) = locate_entries(body) else {
        return Vec::new();
    };

    let entries: Vec<CatalogEntry> = raw_entries.iter().filter_map(normalize_entry).collect();
    let skipped = raw_entries.len() - entries.len();
    if skipped > 0 {
        tracing::debug!(location, skipped, "skipped entries without a numeric id");
    }
    entries
}

/// Normalizes one raw entry. Returns `None` when the entry has no positive
/// numeric id.
///
/// Identifiers are the union of the direct identifier fields and the ones
/// nested under each variant, trimmed, deduplicated, with empties dropped.
/// An entry without identifiers is still returned so it can be matched by
/// vendor code.
#[must_use]
pub fn normalize_entry(raw: &Value) -> Option<CatalogEntry> {
    let numeric_id = first_field(raw, NUMERIC_ID_FIELDS)
        .and_then(as_i64)
        .filter(|id| *id > 0)?;

    let vendor_code = raw
        .get(VENDOR_CODE_FIELD)
        .and_then(as_text)
        .unwrap_or_default();

    let category_label = first_field(raw, CATEGORY_FIELDS)
        .and_then(as_text)
        .unwrap_or_default();

    let mut collector = IdentifierCollector::default();
    collector.collect_from(raw);
    for variant_field in VARIANT_LIST_FIELDS {
        if let Some(variants) = raw.get(*variant_field).and_then(Value::as_array) {
            for variant in variants {
                collector.collect_from(variant);
            }
        }
    }

    Some(CatalogEntry {
        numeric_id,
        vendor_code,
        category_label,
        identifiers: collector.into_identifiers(),
    })
}

#[derive(Default)]
struct IdentifierCollector {
    seen: HashSet<String>,
    identifiers: Vec<String>,
}

impl IdentifierCollector {
    fn collect_from(&mut self, object: &Value) {
        for field in IDENTIFIER_LIST_FIELDS {
            if let Some(values) = object.get(*field).and_then(Value::as_array) {
                for value in values {
                    self.push(value);
                }
            }
        }
        for field in IDENTIFIER_SCALAR_FIELDS {
            if let Some(value) = object.get(*field) {
                self.push(value);
            }
        }
    }

    fn push(&mut self, value: &Value) {
        if let Some(identifier) = as_text(value) {
            if !identifier.is_empty() && self.seen.insert(identifier.clone()) {
                self.identifiers.push(identifier);
            }
        }
    }

    fn into_identifiers(self) -> Vec<String> {
        self.identifiers
    }
}

fn value_at<'a>(body: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter()
        .try_fold(body, |current, key| current.get(*key))
        .filter(|v| !v.is_null())
}

fn first_field<'a>(raw: &'a Value, fields: &[&str]) -> Option<&'a Value> {
    fields
        .iter()
        .find_map(|field| raw.get(*field).filter(|v| !v.is_null()))
}

/// Reads a string or a number as trimmed text.
fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_owned()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

//! Cursor pagination for the catalog list endpoint.
//!
//! Each list request carries the cursor returned by the previous page:
//!
//! ```text
//! {"filter": {"textSearch": "111", "withPhoto": -1},
//!  "cursor": {"limit": 100, "updatedAt": "2024-05-01T10:00:00Z", "nmID": 4217}}
//! ```
//!
//! and each response carries the next one under `cursor`. The remote API is
//! known to repeat cursors and to omit cursor fields, so every page is
//! classified before the pager advances:
//!
//! | page                                | outcome                   |
//! |-------------------------------------|---------------------------|
//! | no entries                          | stop ([`Termination::Empty`]) |
//! | cursor missing a field              | stop ([`Termination::MissingCursor`]) |
//! | cursor equal to the one sent        | stop ([`Termination::Stuck`]) |
//! | cursor differs in at least one field | advance                  |

use std::time::Instant;

use catsync_core::Cursor;
use serde::Serialize;
use serde_json::{json, Value};

const CURSOR_LOCATIONS: &[&[&str]] = &[&["cursor"], &["data", "cursor"]];
const CURSOR_TIMESTAMP_FIELD: &str = "updatedAt";
const CURSOR_ID_FIELDS: &[&str] = &["nmID", "nmId"];

/// Parameters of one cursor scan.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Free-text filter (barcode, vendor code, or numeric id). `None` scans
    /// the whole catalog.
    pub filter: Option<String>,
    pub page_limit: u32,
    /// Page budget. Reaching it ends the scan successfully.
    pub max_pages: usize,
    /// Optional wall-clock budget, checked before each page.
    pub deadline: Option<Instant>,
}

impl ScanOptions {
    #[must_use]
    pub fn full(page_limit: u32, max_pages: usize) -> Self {
        Self {
            filter: None,
            page_limit,
            max_pages,
            deadline: None,
        }
    }

    #[must_use]
    pub fn filtered(filter: impl Into<String>, page_limit: u32, max_pages: usize) -> Self {
        Self {
            filter: Some(filter.into()),
            page_limit,
            max_pages,
            deadline: None,
        }
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }
}

/// Why a scan stopped. Every variant is a successful end of scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Empty,
    Stuck,
    MissingCursor,
    PageBudget,
    Deadline,
    /// The page consumer asked to stop.
    Satisfied,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageStats {
    pub pages: usize,
    pub entries: usize,
    pub termination: Termination,
    pub last_cursor: Cursor,
}

/// How the pager should proceed after a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PageOutcome {
    Advance(Cursor),
    Stop(Termination),
}

/// Classifies a page from its raw entry count and the cursor it returned,
/// relative to the cursor that was sent.
pub(crate) fn classify_page(current: &Cursor, entry_count: usize, next: &Cursor) -> PageOutcome {
    if entry_count == 0 {
        return PageOutcome::Stop(Termination::Empty);
    }
    if !next.is_complete() {
        return PageOutcome::Stop(Termination::MissingCursor);
    }
    if next == current {
        return PageOutcome::Stop(Termination::Stuck);
    }
    PageOutcome::Advance(next.clone())
}

/// Builds the list request body for `cursor`.
pub(crate) fn list_request_body(filter: Option<&str>, page_limit: u32, cursor: &Cursor) -> Value {
    let mut cursor_body = json!({ "limit": page_limit });
    if let Some(updated_at) = &cursor.updated_at {
        cursor_body["updatedAt"] = json!(updated_at);
    }
    if let Some(numeric_id) = cursor.numeric_id {
        cursor_body["nmID"] = json!(numeric_id);
    }

    let mut filter_body = json!({ "withPhoto": -1 });
    if let Some(text) = filter {
        filter_body["textSearch"] = json!(text);
    }

    json!({ "filter": filter_body, "cursor": cursor_body })
}

/// Reads the next cursor from a page body. Missing or mistyped fields are
/// left unset, which the classifier treats as a terminal page.
pub(crate) fn extract_cursor(body: &Value) -> Cursor {
    let Some(raw) = CURSOR_LOCATIONS.iter().find_map(|path| {
        path.iter()
            .try_fold(body, |current, key| current.get(*key))
            .filter(|v| v.is_object())
    }) else {
        return Cursor::default();
    };

    let updated_at = raw
        .get(CURSOR_TIMESTAMP_FIELD)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned);
    let numeric_id = CURSOR_ID_FIELDS
        .iter()
        .find_map(|field| raw.get(*field).and_then(Value::as_i64));

    Cursor {
        updated_at,
        numeric_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_page_stops_even_with_fresh_cursor() {
        let outcome = classify_page(&Cursor::default(), 0, &Cursor::new("t1", 1));
        assert_eq!(outcome, PageOutcome::Stop(Termination::Empty));
    }

    #[test]
    fn identical_cursor_is_stuck() {
        let current = Cursor::new("t1", 10);
        let outcome = classify_page(&current, 5, &current.clone());
        assert_eq!(outcome, PageOutcome::Stop(Termination::Stuck));
    }

    #[test]
    fn partial_cursor_is_terminal() {
        let next = Cursor {
            updated_at: None,
            numeric_id: Some(10),
        };
        let outcome = classify_page(&Cursor::default(), 5, &next);
        assert_eq!(outcome, PageOutcome::Stop(Termination::MissingCursor));
    }

    #[test]
    fn one_changed_field_advances() {
        let current = Cursor::new("t1", 10);
        let same_time = Cursor::new("t1", 11);
        let same_id = Cursor::new("t2", 10);
        assert_eq!(
            classify_page(&current, 1, &same_time),
            PageOutcome::Advance(same_time.clone())
        );
        assert_eq!(
            classify_page(&current, 1, &same_id),
            PageOutcome::Advance(same_id.clone())
        );
    }

    #[test]
    fn first_request_body_has_only_limit() {
        let body = list_request_body(None, 100, &Cursor::default());
        assert_eq!(body, json!({"filter": {"withPhoto": -1}, "cursor": {"limit": 100}}));
    }

    #[test]
    fn follow_up_body_carries_cursor_and_filter() {
        let body = list_request_body(Some("111"), 50, &Cursor::new("2024-05-01T10:00:00Z", 4217));
        assert_eq!(
            body,
            json!({
                "filter": {"withPhoto": -1, "textSearch": "111"},
                "cursor": {"limit": 50, "updatedAt": "2024-05-01T10:00:00Z", "nmID": 4217}
            })
        );
    }

    #[test]
    fn extracts_cursor_from_top_level_and_data() {
        let top = json!({"cursor": {"updatedAt": "t9", "nmID": 9, "total": 100}});
        assert_eq!(extract_cursor(&top), Cursor::new("t9", 9));

        let nested = json!({"data": {"cursor": {"updatedAt": "t8", "nmId": 8}}});
        assert_eq!(extract_cursor(&nested), Cursor::new("t8", 8));
    }

    #[test]
    fn malformed_cursor_fields_are_left_unset() {
        let body = json!({"cursor": {"updatedAt": 5, "nmID": "x"}});
        assert_eq!(extract_cursor(&body), Cursor::default());
        assert_eq!(extract_cursor(&json!({"cards": []})), Cursor::default());
    }
}

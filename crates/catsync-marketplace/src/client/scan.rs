//! Cursor scan loop for `MarketplaceClient`.

use std::ops::ControlFlow;
use std::time::Instant;

use catsync_core::{CatalogEntry, Cursor};

use crate::error::MarketplaceError;
use crate::normalize::{locate_entries, normalize_page};
use crate::pagination::{
    classify_page, extract_cursor, list_request_body, PageOutcome, PageStats, ScanOptions,
    Termination,
};

use super::{MarketplaceClient, Method};

impl MarketplaceClient {
    /// Scans the list endpoint at `path`, delivering each page's normalized
    /// entries to `on_page` in order.
    ///
    /// Each page is delivered before its cursor is evaluated, so the entries
    /// of a terminal page are never lost. The scan ends successfully on an
    /// empty page, a repeated or incomplete cursor, the page budget, the
    /// deadline, or when `on_page` returns [`ControlFlow::Break`]. It makes at
    /// most `options.max_pages` list calls.
    ///
    /// # Errors
    ///
    /// Propagates any error from [`Self::request`]. Pages delivered before
    /// the failure stay with the caller.
    pub async fn scan<F>(
        &self,
        path: &str,
        options: &ScanOptions,
        mut on_page: F,
    ) -> Result<PageStats, MarketplaceError>
    where
        F: FnMut(Vec<CatalogEntry>) -> ControlFlow<()>,
    {
        let mut cursor = Cursor::default();
        let mut pages = 0usize;
        let mut entries = 0usize;

        let termination = loop {
            if pages >= options.max_pages {
                break Termination::PageBudget;
            }
            if options.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                break Termination::Deadline;
            }

            let body = list_request_body(options.filter.as_deref(), options.page_limit, &cursor);
            let page = self.request(path, Method::POST, Some(&body)).await?;
            pages += 1;

            // Emptiness is judged on the raw array: a page of cards that all
            // fail normalization is not the end of the catalog.
            let raw_count = locate_entries(&page).map_or(0, |(_, raw)| raw.len());
            let page_entries = normalize_page(&page);
            let entry_count = page_entries.len();
            entries += entry_count;
            let next = extract_cursor(&page);

            tracing::debug!(
                page = pages,
                raw = raw_count,
                entries = entry_count,
                filter = options.filter.as_deref().unwrap_or(""),
                "catalog page received"
            );

            let flow = on_page(page_entries);

            match classify_page(&cursor, raw_count, &next) {
                PageOutcome::Stop(termination) => break termination,
                PageOutcome::Advance(next) => cursor = next,
            }
            if flow.is_break() {
                break Termination::Satisfied;
            }
        };

        tracing::debug!(pages, entries, ?termination, "catalog scan finished");

        Ok(PageStats {
            pages,
            entries,
            termination,
            last_cursor: cursor,
        })
    }
}

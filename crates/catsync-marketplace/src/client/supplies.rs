//! Supply discovery for `MarketplaceClient`.
//!
//! The supplies API has no cursor: `POST {base}/list` returns every supply,
//! then `GET {base}/{id}/items` lists the goods in one supply. Item calls are
//! paced so a large supply list does not trip the rate limiter.

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::time::Duration;

use catsync_core::CatalogEntry;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::MarketplaceError;
use crate::normalize::normalize_page;

use super::{MarketplaceClient, Method};

const SUPPLY_LIST_LOCATIONS: &[&[&str]] = &[&["supplies"], &["data"], &[]];
const SUPPLY_ID_FIELDS: &[&str] = &["supplyID", "supplyId", "id", "preorderID"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SupplyStats {
    pub supplies: usize,
    pub fetched: usize,
    pub entries: usize,
}

impl MarketplaceClient {
    /// Lists supply ids via `POST {base}/list`, deduplicated in response order.
    ///
    /// # Errors
    ///
    /// Propagates any error from [`Self::request`].
    pub async fn list_supply_ids(&self, limit: u32) -> Result<Vec<String>, MarketplaceError> {
        let body = self
            .request("list", Method::POST, Some(&json!({ "limit": limit })))
            .await?;
        Ok(extract_supply_ids(&body))
    }

    /// Fetches the items of every discovered supply (at most `max_supplies`),
    /// waiting `pacing` between item calls, and delivers each supply's
    /// normalized entries to `on_items`.
    ///
    /// # Errors
    ///
    /// Propagates any error from [`Self::request`]. Supplies delivered before
    /// the failure stay with the caller.
    pub async fn scan_supplies<F>(
        &self,
        max_supplies: usize,
        pacing: Duration,
        mut on_items: F,
    ) -> Result<SupplyStats, MarketplaceError>
    where
        F: FnMut(Vec<CatalogEntry>) -> ControlFlow<()>,
    {
        let limit = u32::try_from(max_supplies).unwrap_or(u32::MAX);
        let ids = self.list_supply_ids(limit).await?;
        let mut stats = SupplyStats {
            supplies: ids.len(),
            ..SupplyStats::default()
        };

        for (index, id) in ids.iter().take(max_supplies).enumerate() {
            if index > 0 && !pacing.is_zero() {
                tokio::time::sleep(pacing).await;
            }

            let url = self.segments_url(&[id.as_str(), "items"]);
            let body = self.request_url(url, Method::GET, None).await?;
            let entries = normalize_page(&body);
            stats.fetched += 1;
            stats.entries += entries.len();
            tracing::debug!(supply = %id, entries = entries.len(), "supply items received");

            if on_items(entries).is_break() {
                break;
            }
        }

        Ok(stats)
    }
}

fn extract_supply_ids(body: &Value) -> Vec<String> {
    let Some(supplies) = SUPPLY_LIST_LOCATIONS.iter().find_map(|path| {
        path.iter()
            .try_fold(body, |current, key| current.get(*key))
            .and_then(Value::as_array)
    }) else {
        return Vec::new();
    };

    let mut seen = HashSet::with_capacity(supplies.len());
    let mut ids: Vec<String> = Vec::with_capacity(supplies.len());
    for supply in supplies {
        let id = SUPPLY_ID_FIELDS
            .iter()
            .find_map(|field| match supply.get(*field) {
                Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_owned()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            });
        if let Some(id) = id {
            if seen.insert(id.clone()) {
                ids.push(id);
            }
        }
    }
    ids
}

//! One synchronization pass, from target keys to applied patches.
//!
//! A targeted catalog pass walks an ordered fallback chain:
//!
//! 1. a filtered lookup per target key (barcode, vendor code, numeric id);
//! 2. for barcodes still unresolved, lookups by the owning local record's
//!    vendor code and then its stored numeric id;
//! 3. when no target resolved at all, a bounded scan of the full catalog that
//!    stops as soon as every target is resolved.
//!
//! Per-item lookups are paced. Every page is reconciled as it arrives and
//! staged patches are written once at the end of the pass.

use std::ops::ControlFlow;
use std::time::{Duration, Instant};

use catsync_core::config::FULL_SCAN_PAGE_CEILING;
use catsync_core::{AppConfig, CatalogEntry, LookupTargets, PendingPatch, ProductStore};
use catsync_marketplace::{MarketplaceClient, MarketplaceError, PageStats, ScanOptions, Termination};
use serde::Serialize;

use crate::error::SyncError;
use crate::reconcile::{LocalIndex, Reconciler, TargetKey};
use crate::writer::{PatchWriter, WriteReport, DEFAULT_BATCH_SIZE};

const SAMPLE_LIMIT: usize = 5;

/// Knobs for every pass run by a [`SyncEngine`].
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub list_path: String,
    pub page_limit: u32,
    /// Default page budget when the request does not carry one.
    pub max_pages: usize,
    /// Page budget of the full-catalog fallback scan, never above
    /// [`FULL_SCAN_PAGE_CEILING`].
    pub full_scan_max_pages: usize,
    /// Delay between consecutive per-item lookups.
    pub pacing: Duration,
    pub batch_size: usize,
    /// Wall-clock budget for the lookup phases.
    pub deadline: Option<Duration>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            list_path: "/content/v2/get/cards/list".to_owned(),
            page_limit: 100,
            max_pages: 500,
            full_scan_max_pages: FULL_SCAN_PAGE_CEILING,
            pacing: Duration::from_millis(200),
            batch_size: DEFAULT_BATCH_SIZE,
            deadline: None,
        }
    }
}

impl SyncSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            list_path: config.catalog_list_path.clone(),
            page_limit: config.page_limit,
            max_pages: config.max_pages,
            full_scan_max_pages: config.full_scan_max_pages,
            pacing: Duration::from_millis(config.pacing_ms),
            batch_size: config.patch_batch_size,
            deadline: config.pass_deadline_secs.map(Duration::from_secs),
        }
    }
}

/// Where remote entries come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncSource {
    #[default]
    Catalog,
    Supplies,
}

#[derive(Debug, Clone, Default)]
pub struct SyncRequest {
    pub source: SyncSource,
    /// Empty targets mean a full pass over every local record.
    pub targets: LookupTargets,
    pub max_pages: Option<usize>,
    pub debug: bool,
    /// Stage patches without writing them.
    pub dry_run: bool,
}

/// One requested key and what it resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncItem {
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_label: Option<String>,
}

/// A lookup phase of the pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Barcode,
    VendorCode,
    NumericId,
    FallbackVendorCode,
    FallbackNumericId,
    FullScan,
    Catalog,
    Supplies,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseReport {
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    pub pages: usize,
    pub entries: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination: Option<Termination>,
}

impl PhaseReport {
    fn from_scan(phase: Phase, filter: Option<String>, stats: &PageStats) -> Self {
        Self {
            phase,
            filter,
            pages: stats.pages,
            entries: stats.entries,
            termination: Some(stats.termination),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub source: SyncSource,
    pub local_records: usize,
    pub phases: Vec<PhaseReport>,
    pub fallback_scan: bool,
    pub dry_run: bool,
    pub elapsed_ms: u64,
    pub samples: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub items: Vec<SyncItem>,
    /// Remote entries received across every phase.
    pub received: usize,
    /// Target keys requested, or local records loaded for a full pass.
    pub total: usize,
    /// Target keys resolved, or records matched for a full pass.
    pub matched: usize,
    pub patched: usize,
    pub applied: usize,
    /// Set when the write phase stopped early. `applied` patches were
    /// written before it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Diagnostics>,
    #[serde(skip)]
    pub staged: Vec<PendingPatch>,
}

impl SyncOutcome {
    #[must_use]
    pub fn is_partial_failure(&self) -> bool {
        self.write_error.is_some()
    }
}

/// Runs synchronization passes against one product store.
#[derive(Debug, Clone)]
pub struct SyncEngine<S> {
    catalog: MarketplaceClient,
    supplies: MarketplaceClient,
    store: S,
    settings: SyncSettings,
}

impl<S: ProductStore> SyncEngine<S> {
    #[must_use]
    pub fn new(
        catalog: MarketplaceClient,
        supplies: MarketplaceClient,
        store: S,
        settings: SyncSettings,
    ) -> Self {
        Self {
            catalog,
            supplies,
            store,
            settings,
        }
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Runs one pass.
    ///
    /// # Errors
    ///
    /// - [`SyncError::Store`] if the local records cannot be loaded.
    /// - [`SyncError::Marketplace`] if a remote call fails. The patches staged
    ///   before the failure travel with the error and can be written with
    ///   [`Self::flush`].
    ///
    /// A failed write is not an error: it is reported through
    /// [`SyncOutcome::write_error`] together with the applied count.
    pub async fn run(&self, request: &SyncRequest) -> Result<SyncOutcome, SyncError> {
        let started = Instant::now();
        let deadline = self.settings.deadline.map(|budget| started + budget);
        let max_pages = request.max_pages.unwrap_or(self.settings.max_pages).max(1);

        let targets = &request.targets;
        let records = self
            .store
            .load_records((!targets.is_empty()).then_some(targets))
            .await
            .map_err(|e| SyncError::Store(Box::new(e)))?;
        let index = LocalIndex::new(records);
        tracing::debug!(
            source = ?request.source,
            targets = targets.len(),
            local_records = index.len(),
            "sync pass started"
        );

        let mut pass = PassState::new(&index, targets);
        let collected = match request.source {
            SyncSource::Supplies => self.collect_supplies(&mut pass, max_pages, deadline).await,
            SyncSource::Catalog if targets.is_empty() => {
                self.collect_catalog(&mut pass, max_pages, deadline).await
            }
            SyncSource::Catalog => {
                self.collect_targets(&mut pass, targets, max_pages, deadline)
                    .await
            }
        };

        if let Err(source) = collected {
            let staged = pass.reconciler.into_patches();
            tracing::error!(
                error = %source,
                staged = staged.len(),
                "sync pass aborted by marketplace error"
            );
            return Err(SyncError::Marketplace { source, staged });
        }

        let items = pass.items();
        let total = if targets.is_empty() { index.len() } else { targets.len() };
        let matched = if targets.is_empty() {
            pass.reconciler.patches().len()
        } else {
            pass.reconciler.tracker().resolved_count()
        };
        let received = pass.received;
        let fallback_scan = pass.fallback_scan;
        let phases = std::mem::take(&mut pass.phases);
        let samples = std::mem::take(&mut pass.samples);
        let staged = pass.reconciler.into_patches();

        let (applied, write_error) = if request.dry_run || staged.is_empty() {
            (0, None)
        } else {
            let report = self.flush(&staged).await;
            (report.applied, report.error.map(|e| e.to_string()))
        };

        tracing::info!(
            source = ?request.source,
            received,
            total,
            matched,
            patched = staged.len(),
            applied,
            dry_run = request.dry_run,
            "sync pass finished"
        );

        let diagnostics = request.debug.then(|| Diagnostics {
            source: request.source,
            local_records: index.len(),
            phases,
            fallback_scan,
            dry_run: request.dry_run,
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            samples,
        });

        Ok(SyncOutcome {
            items,
            received,
            total,
            matched,
            patched: staged.len(),
            applied,
            write_error,
            diagnostics,
            staged,
        })
    }

    /// Writes `patches` with the configured batch size.
    pub async fn flush(&self, patches: &[PendingPatch]) -> WriteReport<S::Error> {
        PatchWriter::new(self.settings.batch_size)
            .apply(&self.store, patches)
            .await
    }

    async fn collect_targets(
        &self,
        pass: &mut PassState<'_>,
        targets: &LookupTargets,
        max_pages: usize,
        deadline: Option<Instant>,
    ) -> Result<(), MarketplaceError> {
        let mut pacer = Pacer::new(self.settings.pacing);

        let direct = targets
            .barcodes
            .iter()
            .map(|b| (Phase::Barcode, TargetKey::Barcode(b.clone())))
            .chain(
                targets
                    .vendor_codes
                    .iter()
                    .map(|c| (Phase::VendorCode, TargetKey::VendorCode(c.clone()))),
            )
            .chain(
                targets
                    .numeric_ids
                    .iter()
                    .map(|n| (Phase::NumericId, TargetKey::NumericId(*n))),
            );
        for (phase, key) in direct {
            if pass.satisfied() || expired(deadline) {
                break;
            }
            if pass.reconciler.tracker().is_resolved(&key) {
                continue;
            }
            self.lookup(pass, &mut pacer, phase, key.label(), max_pages, deadline)
                .await?;
        }

        let index = pass.reconciler.index();
        let unresolved_owners = targets
            .barcodes
            .iter()
            .map(|b| (TargetKey::Barcode(b.clone()), index.by_identifier(b)))
            .chain(
                targets
                    .vendor_codes
                    .iter()
                    .map(|c| (TargetKey::VendorCode(c.clone()), index.by_vendor_code(c))),
            );
        for (key, owner) in unresolved_owners {
            let Some(record) = owner else { continue };
            if let Some(code) = record
                .vendor_code
                .as_deref()
                .filter(|c| !c.is_empty() && !matches!(&key, TargetKey::VendorCode(_)))
            {
                if pass.satisfied() || expired(deadline) {
                    break;
                }
                if !pass.reconciler.tracker().is_resolved(&key) {
                    self.lookup(
                        pass,
                        &mut pacer,
                        Phase::FallbackVendorCode,
                        code.to_owned(),
                        max_pages,
                        deadline,
                    )
                    .await?;
                }
            }
            if let Some(numeric_id) = record.numeric_id {
                if pass.satisfied() || expired(deadline) {
                    break;
                }
                if !pass.reconciler.tracker().is_resolved(&key) {
                    self.lookup(
                        pass,
                        &mut pacer,
                        Phase::FallbackNumericId,
                        numeric_id.to_string(),
                        max_pages,
                        deadline,
                    )
                    .await?;
                }
            }
        }

        if pass.reconciler.tracker().resolved_count() == 0 && !expired(deadline) {
            let budget = max_pages
                .min(self.settings.full_scan_max_pages)
                .min(FULL_SCAN_PAGE_CEILING);
            tracing::info!(
                targets = targets.len(),
                max_pages = budget,
                "no target resolved by lookups; scanning full catalog"
            );
            pass.fallback_scan = true;
            pacer.wait().await;
            let options = ScanOptions::full(self.settings.page_limit, budget).with_deadline(deadline);
            let stats = self
                .catalog
                .scan(&self.settings.list_path, &options, |entries| pass.absorb(entries))
                .await?;
            pass.phases
                .push(PhaseReport::from_scan(Phase::FullScan, None, &stats));
        }

        Ok(())
    }

    async fn lookup(
        &self,
        pass: &mut PassState<'_>,
        pacer: &mut Pacer,
        phase: Phase,
        filter: String,
        max_pages: usize,
        deadline: Option<Instant>,
    ) -> Result<(), MarketplaceError> {
        pacer.wait().await;
        let options = ScanOptions::filtered(filter.clone(), self.settings.page_limit, max_pages)
            .with_deadline(deadline);
        let stats = self
            .catalog
            .scan(&self.settings.list_path, &options, |entries| pass.absorb(entries))
            .await?;
        pass.phases
            .push(PhaseReport::from_scan(phase, Some(filter), &stats));
        Ok(())
    }

    async fn collect_catalog(
        &self,
        pass: &mut PassState<'_>,
        max_pages: usize,
        deadline: Option<Instant>,
    ) -> Result<(), MarketplaceError> {
        let options =
            ScanOptions::full(self.settings.page_limit, max_pages).with_deadline(deadline);
        let stats = self
            .catalog
            .scan(&self.settings.list_path, &options, |entries| pass.absorb(entries))
            .await?;
        pass.phases
            .push(PhaseReport::from_scan(Phase::Catalog, None, &stats));
        Ok(())
    }

    async fn collect_supplies(
        &self,
        pass: &mut PassState<'_>,
        max_supplies: usize,
        deadline: Option<Instant>,
    ) -> Result<(), MarketplaceError> {
        if expired(deadline) {
            pass.phases.push(PhaseReport {
                phase: Phase::Supplies,
                filter: None,
                pages: 0,
                entries: 0,
                termination: Some(Termination::Deadline),
            });
            return Ok(());
        }

        let mut stopped_by_deadline = false;
        let stats = self
            .supplies
            .scan_supplies(max_supplies, self.settings.pacing, |entries| {
                let flow = pass.absorb(entries);
                if expired(deadline) {
                    stopped_by_deadline = true;
                    return ControlFlow::Break(());
                }
                flow
            })
            .await?;
        pass.phases.push(PhaseReport {
            phase: Phase::Supplies,
            filter: None,
            pages: stats.fetched,
            entries: stats.entries,
            termination: stopped_by_deadline.then_some(Termination::Deadline),
        });
        Ok(())
    }
}

/// Mutable state of one pass, fed page by page.
struct PassState<'a> {
    reconciler: Reconciler<'a>,
    received: usize,
    samples: Vec<CatalogEntry>,
    phases: Vec<PhaseReport>,
    fallback_scan: bool,
}

impl<'a> PassState<'a> {
    fn new(index: &'a LocalIndex, targets: &LookupTargets) -> Self {
        Self {
            reconciler: Reconciler::new(index, targets),
            received: 0,
            samples: Vec::new(),
            phases: Vec::new(),
            fallback_scan: false,
        }
    }

    fn absorb(&mut self, entries: Vec<CatalogEntry>) -> ControlFlow<()> {
        self.received += entries.len();
        let room = SAMPLE_LIMIT.saturating_sub(self.samples.len());
        self.samples.extend(entries.iter().take(room).cloned());
        self.reconciler.reconcile(&entries);

        if self.satisfied() {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    /// Every requested target is resolved. Never true for a full pass.
    fn satisfied(&self) -> bool {
        let tracker = self.reconciler.tracker();
        !tracker.is_empty() && tracker.all_resolved()
    }

    fn items(&self) -> Vec<SyncItem> {
        let tracker = self.reconciler.tracker();
        if !tracker.is_empty() {
            return tracker
                .resolutions()
                .map(|(key, resolution)| SyncItem {
                    identifier: key.label(),
                    numeric_id: resolution.map(|r| r.numeric_id),
                    category_label: resolution.and_then(|r| r.category_label.clone()),
                })
                .collect();
        }

        let index = self.reconciler.index();
        self.reconciler
            .patches()
            .values()
            .map(|patch| SyncItem {
                identifier: index
                    .get(patch.record_id)
                    .and_then(|r| r.barcode.clone().or_else(|| r.vendor_code.clone()))
                    .unwrap_or_else(|| patch.record_id.to_string()),
                numeric_id: Some(patch.numeric_id),
                category_label: patch.category_label.clone(),
            })
            .collect()
    }
}

/// Enforces a fixed delay between consecutive calls. The first call is not
/// delayed.
struct Pacer {
    delay: Duration,
    primed: bool,
}

impl Pacer {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            primed: false,
        }
    }

    async fn wait(&mut self) {
        if self.primed && !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.primed = true;
    }
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|deadline| Instant::now() >= deadline)
}

use catsync_core::{AppConfig, LookupTargets};
use catsync_db::PgProductStore;
use catsync_marketplace::{ClientConfig, MarketplaceClient};
use catsync_sync::{SyncEngine, SyncError, SyncOutcome, SyncRequest, SyncSettings, SyncSource};
use sqlx::PgPool;

use crate::{SourceArg, SyncArgs};

impl From<SourceArg> for SyncSource {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Catalog => Self::Catalog,
            SourceArg::Supplies => Self::Supplies,
        }
    }
}

pub(crate) fn build_request(args: &SyncArgs) -> SyncRequest {
    SyncRequest {
        source: args.source.into(),
        targets: LookupTargets::new(&args.barcodes, &args.vendor_codes, args.nm_ids.iter().copied()),
        max_pages: args.max_pages,
        debug: args.debug,
        dry_run: args.dry_run,
    }
}

pub(crate) async fn run_sync(pool: PgPool, config: &AppConfig, args: &SyncArgs) -> anyhow::Result<()> {
    let engine = SyncEngine::new(
        MarketplaceClient::new(ClientConfig::catalog(config))?,
        MarketplaceClient::new(ClientConfig::supplies(config))?,
        PgProductStore::new(pool),
        SyncSettings::from_app_config(config),
    );
    let request = build_request(args);

    if request.dry_run {
        println!("dry-run: patches are staged but not written");
    }

    match engine.run(&request).await {
        Ok(outcome) => {
            print_outcome(&outcome, args.json)?;
            if let Some(write_error) = &outcome.write_error {
                anyhow::bail!(
                    "write phase failed after {} of {} patches: {write_error}",
                    outcome.applied,
                    outcome.patched
                );
            }
            Ok(())
        }
        Err(SyncError::Marketplace { source, staged }) => {
            tracing::error!(error = %source, staged = staged.len(), "marketplace request failed");
            if args.flush_partial && !args.dry_run && !staged.is_empty() {
                let report = engine.flush(&staged).await;
                println!("flushed {} of {} staged patches", report.applied, staged.len());
                if let Some(e) = report.error {
                    tracing::error!(error = %e, "flush of staged patches failed");
                }
            } else if !staged.is_empty() {
                println!(
                    "{} staged patches discarded (rerun with --flush-partial to keep them)",
                    staged.len()
                );
            }
            Err(source.into())
        }
        Err(e) => Err(e.into()),
    }
}

fn print_outcome(outcome: &SyncOutcome, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }

    println!(
        "received {} (total {}), matched {}, patched {}, applied {}",
        outcome.received, outcome.total, outcome.matched, outcome.patched, outcome.applied
    );
    for item in &outcome.items {
        match item.numeric_id {
            Some(id) => println!(
                "  {} -> {id} {}",
                item.identifier,
                item.category_label.as_deref().unwrap_or("-")
            ),
            None => println!("  {} -> unresolved", item.identifier),
        }
    }
    if let Some(diagnostics) = &outcome.diagnostics {
        println!("{}", serde_json::to_string_pretty(diagnostics)?);
    }
    Ok(())
}

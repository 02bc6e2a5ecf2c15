//! Maintenance of the monitored symbol universe.
//!
//! A listing sweep walks the exchange listing and keeps the `symbols` table
//! in step with it:
//! - new codes are inserted, inactive when the name carries a
//!   special-treatment (`ST`) marker
//! - a known symbol whose name gains the marker is deactivated
//! - a known symbol whose name loses it is reactivated (relisting)
//!
//! Symbol writes go through the write queue like every other mutation.

pub mod listing;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use crate::model::Symbol;
use crate::store::{QuoteRepository, WriteQueue};

pub use listing::HttpListingSource;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListingEntry {
    pub code: String,
    pub name: String,
}

#[async_trait]
pub trait ListingSource: Send + Sync {
    async fn fetch_listing(&self) -> anyhow::Result<Vec<ListingEntry>>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub added: usize,
    pub deactivated: usize,
    pub reactivated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EntryChange {
    Added,
    Deactivated,
    Reactivated,
    Unchanged,
}

/// Special-treatment names (`ST`, `*ST`) mark symbols being wound down.
pub fn is_special_treatment(name: &str) -> bool {
    name.to_uppercase().contains("ST")
}

#[instrument(skip_all, name = "listing_sweep")]
pub async fn sweep_listing(
    source: &dyn ListingSource,
    writer: &WriteQueue,
) -> anyhow::Result<SweepSummary> {
    let entries = source.fetch_listing().await?;
    let mut summary = SweepSummary::default();

    for entry in entries {
        let code = entry.code.clone();
        let res = writer
            .submit(move |repo| async move { apply_entry(repo.as_ref(), &entry).await })
            .await;

        match res {
            Ok(EntryChange::Added) => summary.added += 1,
            Ok(EntryChange::Deactivated) => summary.deactivated += 1,
            Ok(EntryChange::Reactivated) => summary.reactivated += 1,
            Ok(EntryChange::Unchanged) => summary.unchanged += 1,
            Err(e) => {
                summary.failed += 1;
                warn!(code = %code, error = %e, "listing entry not applied");
            }
        }
    }

    info!(
        added = summary.added,
        deactivated = summary.deactivated,
        reactivated = summary.reactivated,
        unchanged = summary.unchanged,
        failed = summary.failed,
        "listing sweep finished"
    );

    Ok(summary)
}

async fn apply_entry(
    repo: &dyn QuoteRepository,
    entry: &ListingEntry,
) -> anyhow::Result<EntryChange> {
    let flagged = is_special_treatment(&entry.name);

    let Some(existing) = repo.get_symbol(&entry.code).await? else {
        repo.upsert_symbol(&Symbol::new(&entry.code, &entry.name, !flagged))
            .await?;
        info!(code = %entry.code, name = %entry.name, active = !flagged, "symbol added");
        return Ok(EntryChange::Added);
    };

    let was_flagged = is_special_treatment(&existing.name);
    let change = if flagged && existing.active {
        repo.set_symbol_active(&entry.code, false).await?;
        info!(code = %entry.code, name = %entry.name, "symbol under special treatment; deactivated");
        EntryChange::Deactivated
    } else if was_flagged && !flagged && !existing.active {
        repo.set_symbol_active(&entry.code, true).await?;
        info!(code = %entry.code, name = %entry.name, "symbol relisted; reactivated");
        EntryChange::Reactivated
    } else {
        EntryChange::Unchanged
    };

    if existing.name != entry.name {
        let mut renamed = existing;
        renamed.name = entry.name.clone();
        repo.upsert_symbol(&renamed).await?;
    }

    Ok(change)
}

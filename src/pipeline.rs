use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::db::Store;
use crate::export;
use crate::fetcher::{self, PostSource};
use crate::geocoder::{self, AddressResolver};

pub struct RunPlan<'a> {
    pub keyword: &'a str,
    pub pages: u32,
    pub delay: Duration,
    pub region: &'a str,
    pub export_path: &'a Path,
}

pub struct RunSummary {
    pub acquired: usize,
    pub geocoded: usize,
    pub exported: usize,
}

/// Full sweep: every search page from 0, then geocode, then export.
pub async fn run_scheduled<S, R>(
    store: &mut Store,
    source: &S,
    resolver: &mut R,
    plan: &RunPlan<'_>,
) -> Result<RunSummary>
where
    S: PostSource + ?Sized,
    R: AddressResolver + ?Sized,
{
    let pb = ProgressBar::new(plan.pages as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] page {pos}/{len}")?
            .progress_chars("#>-"),
    );

    let mut acquired = 0;
    for page in 0..plan.pages {
        acquired += fetcher::acquire(store, source, plan.keyword, page, false, plan.delay).await?;
        pb.inc(1);
    }
    pb.finish_and_clear();
    info!("Acquired {} posts over {} pages", acquired, plan.pages);

    let geocoded = geocoder::enrich_all(store, resolver).await?;
    let exported = export::export(store, plan.region, plan.export_path)?;

    Ok(RunSummary {
        acquired,
        geocoded,
        exported,
    })
}

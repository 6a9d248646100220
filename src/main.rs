mod curate;
mod db;
mod export;
mod fetcher;
mod geocoder;
mod import;
mod normalize;
mod pipeline;
mod record;
mod settings;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};

use settings::Settings;

#[derive(Parser)]
#[command(name = "weibo_aid_scraper", about = "Collect, geocode and export Weibo mutual-aid posts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge a spreadsheet (time, link, post) or exported JSON file into the store
    Import {
        path: PathBuf,
    },
    /// Fetch one search page and store posts not seen before
    Acquire {
        /// Search keyword (default: AID_KEYWORD)
        #[arg(short, long)]
        keyword: Option<String>,
        /// Search result page
        #[arg(short, long, default_value = "0")]
        page: u32,
        /// Keep going past posts already in the store instead of stopping
        #[arg(long)]
        full: bool,
    },
    /// Geocode every post not geocoded yet
    Enrich,
    /// Write valid posts inside the region to the export file
    Export {
        /// Address substring to keep (default: AID_REGION)
        #[arg(short, long)]
        region: Option<String>,
        /// Output file (default: AID_EXPORT_PATH)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Soft-delete posts by keyword and/or id
    Invalidate {
        /// Post id (last 16 characters of its link)
        #[arg(long)]
        id: Option<String>,
        /// Soft-delete every valid post containing this text; an empty keyword matches nothing
        #[arg(short, long)]
        keyword: Option<String>,
    },
    /// Restore a soft-deleted post
    Recover {
        id: String,
    },
    /// Full sweep over all search pages, then geocode and export
    Run {
        #[arg(short, long)]
        keyword: Option<String>,
        /// Number of search pages (default: AID_PAGES)
        #[arg(short = 'n', long)]
        pages: Option<u32>,
    },
    /// Show store statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;
    let mut store = db::Store::open(&settings.store_path)?;

    let result = match cli.command {
        Commands::Import { path } => {
            let n = import::load_into(&mut store, &path)?;
            println!("Imported {} rows ({} posts in store)", n, store.len());
            Ok(())
        }
        Commands::Acquire { keyword, page, full } => {
            let source = fetcher::WeiboClient::new(settings.http_timeout())?;
            let keyword = keyword.unwrap_or_else(|| settings.keyword.clone());
            let n = fetcher::acquire(
                &mut store,
                &source,
                &keyword,
                page,
                !full,
                settings.fetch_delay(),
            )
            .await?;
            println!("Acquired {} posts", n);
            Ok(())
        }
        Commands::Enrich => {
            let mut resolver = new_geocoder(&settings)?;
            let n = geocoder::enrich_all(&mut store, &mut resolver).await?;
            println!("Geocoded {} posts", n);
            Ok(())
        }
        Commands::Export { region, output } => {
            let region = region.unwrap_or_else(|| settings.region.clone());
            let output = output.unwrap_or_else(|| settings.export_path.clone());
            let n = export::export(&store, &region, &output)?;
            println!("Exported {} posts to {}", n, output.display());
            Ok(())
        }
        Commands::Invalidate { id, keyword } => {
            if id.is_none() && keyword.is_none() {
                println!("Nothing to do: pass --id and/or --keyword.");
                return Ok(());
            }
            let removed = curate::mark_invalid(&mut store, id.as_deref(), keyword.as_deref())?;
            for rid in &removed {
                if let Some(r) = store.get(rid) {
                    println!("  - {} {}", r.link, truncate(&r.post, 40));
                }
            }
            println!("Invalidated {} posts", removed.len());
            Ok(())
        }
        Commands::Recover { id } => {
            if curate::recover(&mut store, &id)? {
                println!("Recovered {}", id);
            } else {
                println!("No post with id {}", id);
            }
            Ok(())
        }
        Commands::Run { keyword, pages } => {
            let source = fetcher::WeiboClient::new(settings.http_timeout())?;
            let mut resolver = new_geocoder(&settings)?;
            let keyword = keyword.unwrap_or_else(|| settings.keyword.clone());
            let plan = pipeline::RunPlan {
                keyword: &keyword,
                pages: pages.unwrap_or(settings.pages),
                delay: settings.fetch_delay(),
                region: &settings.region,
                export_path: &settings.export_path,
            };
            let summary = pipeline::run_scheduled(&mut store, &source, &mut resolver, &plan).await?;
            println!(
                "Acquired {} posts, geocoded {}, exported {} to {}",
                summary.acquired,
                summary.geocoded,
                summary.exported,
                settings.export_path.display()
            );
            Ok(())
        }
        Commands::Stats => {
            if store.is_empty() {
                println!("Store is empty. Run 'import' or 'acquire' first.");
                return Ok(());
            }
            let s = store.stats();
            println!("Total:      {}", s.total);
            println!("Valid:      {}", s.valid);
            println!("Invalid:    {}", s.invalid);
            println!("Pending:    {}", s.pending);
            println!("Unresolved: {}", s.unresolved);
            println!("Resolved:   {}", s.resolved);
            println!(
                "Exportable: {}",
                export::select(&store, &settings.region).len()
            );
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn new_geocoder(settings: &Settings) -> anyhow::Result<geocoder::BaiduGeocoder> {
    if settings.geocoder_client_id.is_empty() || settings.geocoder_client_secret.is_empty() {
        tracing::warn!("AID_GEOCODER_CLIENT_ID/SECRET not set, every post will come back unresolved");
    }
    let geocoder = geocoder::BaiduGeocoder::new(
        settings.geocoder_client_id.clone(),
        settings.geocoder_client_secret.clone(),
        settings.http_timeout(),
    )?;
    Ok(geocoder.with_base_url(settings.geocoder_url.trim_end_matches('/')))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

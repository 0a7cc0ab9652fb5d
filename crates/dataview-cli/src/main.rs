//! dataview walkthrough
//!
//! Seeds an in-memory city table behind a simulated network delay and
//! drives a data source over it: paging, filter typing, adding and
//! submitting.
//!
//! Usage:
//!   dataview --items 40 --page-size 5 --filter Se

use anyhow::Result;
use clap::Parser;
use dataview_cli::{WalkthroughOptions, run_walkthrough, seed_cities};
use dataview_source::executor::mock::InMemoryExecutor;
use std::time::Duration;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "dataview")]
#[command(about = "Walk a paged, filtered data view over an in-memory table")]
struct Args {
    /// Number of seeded cities
    #[arg(short, long, default_value = "40")]
    items: usize,

    /// Items per page; 0 disables paging
    #[arg(short, long, default_value = "5")]
    page_size: usize,

    /// Items per query; pages are fetched several at a time when larger
    /// than the page size
    #[arg(short, long, default_value = "0")]
    load_size: usize,

    /// Simulated query latency in milliseconds
    #[arg(long, default_value = "40")]
    latency_ms: u64,

    /// Debounce before filter edits reload, in milliseconds
    #[arg(long, default_value = "300")]
    load_delay_ms: u64,

    /// Text to type into the name filter
    #[arg(short, long)]
    filter: Option<String>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    let executor = InMemoryExecutor::with_rows(seed_cities(args.items));
    executor.set_latency(Duration::from_millis(args.latency_ms));
    info!("Seeded {} cities", args.items);

    let options = WalkthroughOptions {
        page_size: args.page_size,
        load_size: args.load_size,
        load_delay: Duration::from_millis(args.load_delay_ms),
        filter: args.filter,
        ..WalkthroughOptions::default()
    };
    let report = run_walkthrough(&options, executor).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("\n========================================");
    println!("  dataview walkthrough");
    println!("========================================");
    for page in &report.pages {
        match page.page_index {
            Some(index) => println!("  Page {:>3}: {}", index, page.names.join(", ")),
            None => println!("  All:      {}", page.names.join(", ")),
        }
    }
    if let Some(filter) = &options.filter {
        println!("\n  Filter '{}': {}", filter, report.filtered_names.join(", "));
        println!("  Queries while typing: {}", report.filter_queries);
    }
    println!("\n  Total items:      {:?}", report.total_item_count);
    println!("  Paging queries:   {}", report.paging_queries);
    println!("  Cancelled loads:  {}", report.cancelled_loads);
    println!("  Submitted:        {}", report.submitted_changes);
    println!("  Queries overall:  {}", report.queries);
    println!("========================================\n");
    Ok(())
}

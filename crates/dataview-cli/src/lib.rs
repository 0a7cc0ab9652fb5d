//! Scripted walkthrough of a data source over an in-memory city table.
//!
//! The walkthrough pages through every page, types a name filter one key at
//! a time, adds a city and submits it. It reports what the view showed and
//! how many queries the server saw, which makes caching and debouncing
//! visible from the terminal.

use anyhow::{Context, Result};
use dataview_model::{Entity, EntitySchema, FilterDescriptor, FilterOperator, PropertyDef, SortDescriptor};
use dataview_source::executor::mock::InMemoryExecutor;
use dataview_source::{DataSource, DataSourceEvent, SourceConfig};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

const NAMES: [&str; 12] = [
    "Seattle", "Spokane", "Tacoma", "Vancouver", "Bellevue", "Kent", "Everett", "Renton",
    "Yakima", "Redmond", "Kirkland", "Olympia",
];

const STATES: [&str; 3] = ["WA", "OR", "ID"];

/// Schema of the seeded city table.
pub fn city_schema() -> EntitySchema {
    EntitySchema::new("City")
        .with(PropertyDef::text("Name"))
        .with(PropertyDef::text("State"))
        .with(PropertyDef::number("Population"))
}

/// Deterministic city rows. Names repeat with a numeric suffix once the
/// base list runs out.
pub fn seed_cities(count: usize) -> Vec<Entity> {
    (0..count)
        .map(|i| {
            let base = NAMES[i % NAMES.len()];
            let name = match i / NAMES.len() {
                0 => base.to_string(),
                n => format!("{base} {}", n + 1),
            };
            Entity::new(
                "City",
                json!({
                    "Name": name,
                    "State": STATES[i % STATES.len()],
                    "Population": 10_000 + (i as u64 * 7_919) % 500_000,
                }),
            )
        })
        .collect()
}

/// Knobs for [`run_walkthrough`].
#[derive(Debug, Clone)]
pub struct WalkthroughOptions {
    pub page_size: usize,
    pub load_size: usize,
    pub load_delay: Duration,
    /// Text typed into the name filter, one character per keystroke.
    pub filter: Option<String>,
    pub keystroke_interval: Duration,
}

impl Default for WalkthroughOptions {
    fn default() -> Self {
        Self {
            page_size: 5,
            load_size: 0,
            load_delay: Duration::from_millis(300),
            filter: None,
            keystroke_interval: Duration::from_millis(100),
        }
    }
}

/// One page as the view showed it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PageReport {
    pub page_index: Option<usize>,
    pub names: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WalkthroughReport {
    pub pages: Vec<PageReport>,
    pub total_item_count: Option<usize>,
    /// Queries issued while paging.
    pub paging_queries: usize,
    /// Queries issued while typing the filter.
    pub filter_queries: usize,
    pub filtered_names: Vec<String>,
    pub cancelled_loads: usize,
    pub submitted_changes: usize,
    pub queries: usize,
}

fn page_report(source: &DataSource) -> PageReport {
    PageReport {
        page_index: source.page_index(),
        names: names(source),
    }
}

fn names(source: &DataSource) -> Vec<String> {
    source
        .items()
        .iter()
        .filter_map(|e| e.get_str("Name").map(str::to_string))
        .collect()
}

/// Applies completions and timer ticks for `interval`, as a UI event loop
/// would between keystrokes.
async fn pump(source: &mut DataSource, interval: Duration) -> Result<()> {
    let deadline = Instant::now() + interval;
    while let Ok(result) = tokio::time::timeout_at(deadline, source.process_next()).await {
        result?;
    }
    Ok(())
}

/// Runs the walkthrough against `executor`.
pub async fn run_walkthrough(
    options: &WalkthroughOptions,
    executor: InMemoryExecutor,
) -> Result<WalkthroughReport> {
    let config = SourceConfig {
        page_size: options.page_size,
        load_size: options.load_size,
        load_delay: options.load_delay,
        auto_load: true,
        ..SourceConfig::new("GetCities")
    };
    let mut source = DataSource::new(config, city_schema(), Arc::new(executor.clone()))
        .context("Invalid data source configuration")?;
    let (_, mut events) = source.subscribe_channel();

    source.add_sort(SortDescriptor::ascending("Name"))?;
    source.load()?;
    source.settle().await?;
    info!(
        "Loaded {} of {:?} cities",
        source.count(),
        source.total_item_count()
    );

    let mut pages = vec![page_report(&source)];
    let page_limit = executor.row_count() / options.page_size.max(1) + 1;
    while pages.len() <= page_limit && source.move_to_next_page()? {
        source.wait_for_idle().await?;
        debug!("Showing page {:?}", source.page_index());
        pages.push(page_report(&source));
    }
    let paging_queries = executor.query_count();
    info!("Visited {} pages with {} queries", pages.len(), paging_queries);

    let mut filtered_names = names(&source);
    if let Some(text) = options.filter.as_deref() {
        source.move_to_first_page()?;
        source.wait_for_idle().await?;
        let filter = source.add_filter(
            FilterDescriptor::new("Name", FilterOperator::StartsWith, "").with_ignored_value(""),
        )?;
        let mut typed = String::new();
        for c in text.chars() {
            typed.push(c);
            if source.is_busy() {
                source.wait_for_idle().await?;
            }
            source.set_filter_value(filter, typed.as_str())?;
            pump(&mut source, options.keystroke_interval).await?;
        }
        source.settle().await?;
        filtered_names = names(&source);
        info!("Filter '{}' matched {:?} cities", text, source.total_item_count());
    }
    let filter_queries = executor.query_count() - paging_queries;

    source.add_new(Entity::new(
        "City",
        json!({ "Name": "Walla Walla", "State": "WA", "Population": 34_000 }),
    ))?;
    source.submit_changes()?;
    source.wait_for_idle().await?;
    let submitted_changes = executor
        .submits()
        .last()
        .map(|changes| changes.len())
        .unwrap_or_default();
    info!("Submitted {} changes", submitted_changes);

    let mut cancelled_loads = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, DataSourceEvent::LoadedData(loaded) if loaded.cancelled) {
            cancelled_loads += 1;
        }
    }

    Ok(WalkthroughReport {
        pages,
        total_item_count: source.total_item_count(),
        paging_queries,
        filter_queries,
        filtered_names,
        cancelled_loads,
        submitted_changes,
        queries: executor.query_count(),
    })
}

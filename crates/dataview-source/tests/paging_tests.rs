//! Tests for paging.rs: page cache reuse, clamping, empty-page fallback
//! and navigation helpers.

use dataview_model::{Entity, EntitySchema, PropertyDef, SortDescriptor};
use dataview_source::executor::mock::InMemoryExecutor;
use dataview_source::{DataSource, DataSourceEvent, SourceConfig, ViewProperty};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn schema() -> EntitySchema {
    EntitySchema::new("City")
        .with(PropertyDef::text("Name"))
        .with(PropertyDef::number("Population"))
}

fn cities(n: usize) -> Vec<Entity> {
    (0..n)
        .map(|i| Entity::new("City", json!({ "Name": format!("City {i:02}"), "Population": i })))
        .collect()
}

fn paged(page_size: usize, load_size: usize) -> SourceConfig {
    SourceConfig {
        page_size,
        load_size,
        ..SourceConfig::new("GetCities")
    }
}

fn source(config: SourceConfig, executor: &InMemoryExecutor) -> DataSource {
    DataSource::new(config, schema(), Arc::new(executor.clone())).unwrap()
}

fn names(source: &DataSource) -> Vec<String> {
    source
        .items()
        .iter()
        .filter_map(|e| e.get_str("Name").map(str::to_string))
        .collect()
}

async fn loaded(config: SourceConfig, executor: &InMemoryExecutor) -> DataSource {
    let mut source = source(config, executor);
    source.load().unwrap();
    source.wait_for_idle().await.unwrap();
    source
}

// ── Page cache reuse ────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn first_load_fetches_several_pages() {
    let executor = InMemoryExecutor::with_rows(cities(23));
    let source = loaded(paged(5, 15), &executor).await;

    assert_eq!(source.count(), 5);
    assert_eq!(source.page_index(), Some(0));
    assert_eq!(source.total_item_count(), Some(23));
    assert_eq!(source.page_count(), Some(5));
    assert_eq!(source.page_cache().cached_pages(), vec![0, 1, 2]);

    let request = &executor.requests()[0];
    let window = request.window.unwrap();
    assert_eq!((window.skip, window.take), (0, 15));
    assert!(request.include_total_count);
}

#[tokio::test(start_paused = true)]
async fn cached_page_needs_no_query() {
    let executor = InMemoryExecutor::with_rows(cities(23));
    let mut source = loaded(paged(5, 15), &executor).await;

    assert!(source.move_to_page(1).unwrap());
    assert!(!source.is_loading_data());
    assert_eq!(source.page_index(), Some(1));
    assert_eq!(names(&source)[0], "City 05");
    assert_eq!(executor.query_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn moving_to_the_shown_page_is_a_no_op() {
    let executor = InMemoryExecutor::with_rows(cities(23));
    let mut source = loaded(paged(5, 15), &executor).await;
    let (_, mut events) = source.subscribe_channel();

    assert!(!source.move_to_page(0).unwrap());
    assert!(events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn uncached_page_is_fetched() {
    let executor = InMemoryExecutor::with_rows(cities(23));
    let mut source = loaded(paged(5, 15), &executor).await;

    assert!(source.move_to_page(3).unwrap());
    assert!(source.is_loading_data());
    source.wait_for_idle().await.unwrap();

    assert_eq!(source.page_index(), Some(3));
    assert_eq!(names(&source)[0], "City 15");
    let window = executor.requests()[1].window.unwrap();
    assert_eq!((window.skip, window.take), (15, 15));
    assert_eq!(source.page_cache().cached_pages(), vec![0, 1, 2, 3, 4]);
}

#[tokio::test(start_paused = true)]
async fn repeated_request_for_page_in_flight_is_absorbed() {
    let executor = InMemoryExecutor::with_rows(cities(23));
    let mut source = loaded(paged(5, 5), &executor).await;
    executor.set_latency(Duration::from_millis(50));

    assert!(source.move_to_page(2).unwrap());
    let generation = source.load_generation();
    assert!(source.move_to_page(2).unwrap());
    assert_eq!(source.load_generation(), generation);
    source.wait_for_idle().await.unwrap();
    assert_eq!(executor.query_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn cached_page_cancels_load_in_flight() {
    let executor = InMemoryExecutor::with_rows(cities(23));
    let mut source = loaded(paged(5, 15), &executor).await;
    executor.set_latency(Duration::from_millis(100));

    source.move_to_page(4).unwrap();
    assert!(source.is_loading_data());
    assert!(source.move_to_page(1).unwrap());
    assert!(!source.is_loading_data());
    assert_eq!(source.page_index(), Some(1));

    tokio::time::sleep(Duration::from_millis(200)).await;
    source.process_pending().unwrap();
    assert_eq!(source.page_index(), Some(1));
}

// ── Clamping and fallback ───────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn index_beyond_known_end_is_clamped() {
    let executor = InMemoryExecutor::with_rows(cities(23));
    let mut source = loaded(paged(5, 15), &executor).await;

    source.move_to_page(10).unwrap();
    source.wait_for_idle().await.unwrap();
    assert_eq!(source.page_index(), Some(4));
    assert_eq!(source.count(), 3);
}

#[tokio::test(start_paused = true)]
async fn empty_page_with_unknown_total_falls_back_to_first() {
    let executor = InMemoryExecutor::with_rows(cities(7));
    executor.set_report_total_count(false);
    let mut source = loaded(paged(5, 0), &executor).await;
    assert_eq!(source.total_item_count(), None);
    assert_eq!(source.page_count(), None);

    source.move_to_page(3).unwrap();
    source.wait_for_idle().await.unwrap();

    assert_eq!(source.page_index(), Some(0));
    assert_eq!(source.count(), 5);
    let skips: Vec<_> = executor
        .requests()
        .iter()
        .map(|r| r.window.unwrap().skip)
        .collect();
    assert_eq!(skips, vec![0, 15, 0]);
}

#[tokio::test(start_paused = true)]
async fn shrunken_result_falls_back_to_last_page() {
    let executor = InMemoryExecutor::with_rows(cities(23));
    let mut source = loaded(paged(5, 0), &executor).await;
    source.move_to_page(4).unwrap();
    source.wait_for_idle().await.unwrap();
    assert_eq!(source.count(), 3);

    for row in executor.rows().into_iter().skip(12) {
        executor.delete(&row.key);
    }
    let (_, mut events) = source.subscribe_channel();
    source.load().unwrap();
    source.wait_for_idle().await.unwrap();

    assert_eq!(source.page_index(), Some(2));
    assert_eq!(source.count(), 2);
    assert_eq!(source.total_item_count(), Some(12));

    let mut page_changes = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let DataSourceEvent::PageChanged { page_index } = event {
            page_changes.push(page_index);
        }
    }
    assert_eq!(page_changes, vec![2]);
}

#[tokio::test(start_paused = true)]
async fn fallback_load_can_be_cancelled() {
    let executor = InMemoryExecutor::with_rows(cities(7));
    executor.set_report_total_count(false);
    let mut source = loaded(paged(5, 0), &executor).await;
    executor.set_latency(Duration::from_millis(50));

    source.move_to_page(3).unwrap();
    source.process_next().await.unwrap();
    assert!(source.is_loading_data());
    assert!(source.cancel_load());
    assert!(!source.is_busy());
    assert_eq!(source.page_index(), Some(0));
}

// ── Navigation helpers ──────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn next_previous_first_last() {
    let executor = InMemoryExecutor::with_rows(cities(23));
    let mut source = loaded(paged(5, 25), &executor).await;

    assert!(!source.move_to_previous_page().unwrap());
    assert!(source.move_to_next_page().unwrap());
    assert_eq!(source.page_index(), Some(1));
    assert!(source.move_to_previous_page().unwrap());
    assert_eq!(source.page_index(), Some(0));

    assert!(source.move_to_last_page().unwrap());
    assert_eq!(source.page_index(), Some(4));
    assert!(!source.move_to_next_page().unwrap());
    assert!(source.move_to_first_page().unwrap());
    assert_eq!(source.page_index(), Some(0));
    assert_eq!(executor.query_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn last_page_needs_a_total() {
    let executor = InMemoryExecutor::with_rows(cities(7));
    executor.set_report_total_count(false);
    let mut source = loaded(paged(5, 0), &executor).await;
    assert!(!source.move_to_last_page().unwrap());
}

#[tokio::test(start_paused = true)]
async fn paging_off_ignores_navigation() {
    let executor = InMemoryExecutor::with_rows(cities(7));
    let mut source = loaded(paged(0, 0), &executor).await;

    assert_eq!(source.page_index(), None);
    assert_eq!(source.count(), 7);
    assert!(!source.move_to_page(1).unwrap());
    assert!(!source.move_to_next_page().unwrap());
    assert_eq!(executor.query_count(), 1);
}

// ── Invalidation ────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn explicit_load_refetches_current_page() {
    let executor = InMemoryExecutor::with_rows(cities(23));
    let mut source = loaded(paged(5, 15), &executor).await;
    source.move_to_page(1).unwrap();
    let generation = source.page_cache().generation();

    source.load().unwrap();
    assert!(source.page_cache().generation() > generation);
    assert!(source.page_cache().cached_pages().is_empty());
    source.wait_for_idle().await.unwrap();

    assert_eq!(source.page_index(), Some(1));
    let window = executor.requests()[1].window.unwrap();
    assert_eq!(window.skip, 5);
}

#[tokio::test(start_paused = true)]
async fn descriptor_change_returns_to_first_page() {
    let executor = InMemoryExecutor::with_rows(cities(23));
    let mut source = loaded(paged(5, 15), &executor).await;
    source.move_to_page(2).unwrap();

    source.add_sort(SortDescriptor::descending("Population")).unwrap();
    assert!(source.page_cache().cached_pages().is_empty());
    source.load().unwrap();
    source.wait_for_idle().await.unwrap();

    assert_eq!(source.page_index(), Some(0));
    assert_eq!(names(&source)[0], "City 22");
}

// ── Notifications ───────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn page_events_bracket_the_load() {
    let executor = InMemoryExecutor::with_rows(cities(23));
    let mut source = loaded(paged(5, 5), &executor).await;
    let (_, mut events) = source.subscribe_channel();

    source.move_to_page(2).unwrap();
    source.wait_for_idle().await.unwrap();

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }
    let position = |wanted: &DataSourceEvent| received.iter().position(|e| e == wanted).unwrap();
    let changing = position(&DataSourceEvent::PageChanging { page_index: 2 });
    let index = position(&DataSourceEvent::PropertyChanged(ViewProperty::PageIndex));
    let loaded = received
        .iter()
        .position(|e| matches!(e, DataSourceEvent::LoadedData(l) if !l.cancelled))
        .unwrap();
    let changed = position(&DataSourceEvent::PageChanged { page_index: 2 });

    assert!(changing < index);
    assert!(index < loaded);
    assert!(loaded < changed);
}

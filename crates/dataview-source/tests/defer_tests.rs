//! Tests for defer.rs: batching edits into one load, nesting and the
//! difference between load and refresh scopes.

use dataview_model::{Entity, EntitySchema, FilterDescriptor, FilterOperator, PropertyDef, SortDescriptor};
use dataview_source::executor::mock::InMemoryExecutor;
use dataview_source::{Activity, DataSource, DataSourceError, SourceConfig};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn schema() -> EntitySchema {
    EntitySchema::new("City")
        .with(PropertyDef::text("Name"))
        .with(PropertyDef::text("State"))
}

fn cities() -> Vec<Entity> {
    [("Redmond", "WA"), ("Seattle", "WA"), ("Portland", "OR"), ("Eugene", "OR")]
        .into_iter()
        .map(|(name, state)| Entity::new("City", json!({ "Name": name, "State": state })))
        .collect()
}

fn source(auto_load: bool, executor: &InMemoryExecutor) -> DataSource {
    let config = SourceConfig {
        auto_load,
        ..SourceConfig::new("GetCities")
    };
    DataSource::new(config, schema(), Arc::new(executor.clone())).unwrap()
}

fn state_filter(state: &str) -> FilterDescriptor {
    FilterDescriptor::new("State", FilterOperator::IsEqualTo, state)
}

// ── Load scopes ─────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn edits_in_scope_load_once() {
    let executor = InMemoryExecutor::with_rows(cities());
    let mut source = source(true, &executor);

    let mut scope = source.defer_load();
    assert!(scope.is_load_deferred());
    assert!(!scope.can_load());
    scope.add_sort(SortDescriptor::ascending("Name")).unwrap();
    scope.add_filter(state_filter("WA")).unwrap();
    scope.set_page_size(1).unwrap();
    assert!(!scope.is_loading_data());
    scope.finish().unwrap();

    assert!(!source.is_load_deferred());
    assert!(source.is_loading_data());
    source.settle().await.unwrap();
    assert_eq!(executor.query_count(), 1);
    assert_eq!(source.items()[0].get_str("Name"), Some("Redmond"));
    assert_eq!(source.total_item_count(), Some(2));
}

#[tokio::test(start_paused = true)]
async fn clean_scope_does_not_load() {
    let executor = InMemoryExecutor::with_rows(cities());
    let mut source = source(true, &executor);

    source.defer_load().finish().unwrap();
    source.settle().await.unwrap();
    assert_eq!(executor.query_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_guard_ends_the_scope() {
    let executor = InMemoryExecutor::with_rows(cities());
    let mut source = source(true, &executor);
    {
        let mut scope = source.defer_load();
        scope.add_filter(state_filter("OR")).unwrap();
    }
    assert!(source.is_loading_data());
    source.wait_for_idle().await.unwrap();
    assert_eq!(source.count(), 2);
}

#[tokio::test(start_paused = true)]
async fn scope_loads_without_auto_load() {
    let executor = InMemoryExecutor::with_rows(cities());
    let mut source = source(false, &executor);

    let mut scope = source.defer_load();
    scope.add_filter(state_filter("OR")).unwrap();
    scope.finish().unwrap();
    source.wait_for_idle().await.unwrap();
    assert_eq!(executor.query_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn nested_scopes_load_at_outermost_exit() {
    let executor = InMemoryExecutor::with_rows(cities());
    let mut source = source(true, &executor);

    let mut outer = source.defer_load();
    {
        let mut inner = outer.defer_load();
        inner.add_sort(SortDescriptor::descending("Name")).unwrap();
        inner.finish().unwrap();
    }
    assert!(!outer.is_loading_data());
    assert!(outer.is_load_deferred());
    outer.add_filter(state_filter("WA")).unwrap();
    outer.finish().unwrap();

    source.settle().await.unwrap();
    assert_eq!(executor.query_count(), 1);
    assert_eq!(source.items()[0].get_str("Name"), Some("Seattle"));
}

#[tokio::test(start_paused = true)]
async fn scope_cancels_pending_debounce() {
    let executor = InMemoryExecutor::with_rows(cities());
    let mut source = source(true, &executor);

    source.add_sort(SortDescriptor::ascending("Name")).unwrap();
    let mut scope = source.defer_load();
    scope.add_filter(state_filter("WA")).unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    scope.process_pending().unwrap();
    assert!(!scope.is_loading_data());
    scope.finish().unwrap();

    source.settle().await.unwrap();
    assert_eq!(executor.query_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn explicit_load_inside_scope_is_rejected() {
    let executor = InMemoryExecutor::with_rows(cities());
    let mut source = source(true, &executor);

    let mut scope = source.defer_load();
    let err = scope.load().unwrap_err();
    assert_eq!(
        err,
        DataSourceError::Reentrancy {
            operation: "load",
            activity: Activity::Deferring,
        }
    );
    assert!(err.is_reentrancy());
    scope.finish().unwrap();
    assert_eq!(executor.query_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn load_size_change_in_scope_loads() {
    let executor = InMemoryExecutor::with_rows(cities());
    let mut source = source(false, &executor);

    let mut scope = source.defer_load();
    scope.set_load_size(2).unwrap();
    scope.finish().unwrap();
    source.wait_for_idle().await.unwrap();

    assert_eq!(source.count(), 4);
    assert_eq!(executor.query_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn page_navigation_in_scope_is_deferred() {
    let executor = InMemoryExecutor::with_rows(cities());
    let config = SourceConfig {
        page_size: 1,
        ..SourceConfig::new("GetCities")
    };
    let mut source = DataSource::new(config, schema(), Arc::new(executor.clone())).unwrap();
    source.load().unwrap();
    source.wait_for_idle().await.unwrap();

    let mut scope = source.defer_load();
    assert!(scope.move_to_page(2).unwrap());
    assert!(!scope.is_loading_data());
    scope.finish().unwrap();
    source.wait_for_idle().await.unwrap();

    assert_eq!(source.page_index(), Some(2));
    assert_eq!(executor.query_count(), 2);
}

// ── Refresh scopes ──────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn refresh_scope_always_loads() {
    let executor = InMemoryExecutor::with_rows(cities());
    let mut source = source(false, &executor);

    let scope = source.defer_refresh();
    assert!(scope.is_load_deferred());
    scope.finish().unwrap();
    assert!(source.is_loading_data());
    source.wait_for_idle().await.unwrap();
    assert_eq!(source.count(), 4);
}

#[tokio::test(start_paused = true)]
async fn refresh_inside_load_scope_defers_to_outer() {
    let executor = InMemoryExecutor::with_rows(cities());
    let mut source = source(false, &executor);

    let mut outer = source.defer_load();
    outer.defer_refresh().finish().unwrap();
    assert!(!outer.is_loading_data());
    outer.finish().unwrap();

    assert!(source.is_loading_data());
    source.wait_for_idle().await.unwrap();
    assert_eq!(executor.query_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn load_scope_inside_refresh_scope() {
    let executor = InMemoryExecutor::with_rows(cities());
    let mut source = source(true, &executor);

    let mut outer = source.defer_refresh();
    {
        let mut inner = outer.defer_load();
        inner.add_filter(state_filter("OR")).unwrap();
    }
    assert!(!outer.is_loading_data());
    outer.finish().unwrap();

    source.settle().await.unwrap();
    assert_eq!(executor.query_count(), 1);
    assert_eq!(source.count(), 2);
}

// ── Submits ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn scope_ending_during_submit_reports_reentrancy() {
    let executor = InMemoryExecutor::with_rows(cities());
    executor.set_submit_latency(Duration::from_millis(50));
    let mut source = source(false, &executor);
    source.load().unwrap();
    source.wait_for_idle().await.unwrap();

    let mut scope = source.defer_refresh();
    scope.submit_changes().unwrap();
    let err = scope.finish().unwrap_err();
    assert_eq!(
        err,
        DataSourceError::Reentrancy {
            operation: "deferred load",
            activity: Activity::Submitting,
        }
    );
    source.wait_for_idle().await.unwrap();
    assert_eq!(executor.query_count(), 1);
}

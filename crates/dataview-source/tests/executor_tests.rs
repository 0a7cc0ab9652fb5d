//! Tests for executor.rs: the in-memory executor.

use dataview_model::{
    Entity, FilterDescriptor, FilterOperator, Parameter, QueryDescriptor, SortDescriptor,
};
use dataview_source::executor::mock::InMemoryExecutor;
use dataview_source::{
    ChangeSet, ExecutorError, PagingWindow, QueryExecutor, QueryRequest, QuerySignature,
    SubmitExecutor,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;

fn city(name: &str, state: &str, population: u64) -> Entity {
    Entity::new(
        "City",
        json!({ "Name": name, "State": state, "Population": population }),
    )
}

fn executor() -> InMemoryExecutor {
    InMemoryExecutor::with_rows(vec![
        city("Redmond", "WA", 73_000),
        city("Portland", "OR", 650_000),
        city("Seattle", "WA", 750_000),
        city("Eugene", "OR", 175_000),
        city("Tacoma", "WA", 220_000),
    ])
}

fn request(descriptor: QueryDescriptor, window: Option<PagingWindow>) -> QueryRequest {
    QueryRequest {
        query_name: "GetCities".into(),
        descriptor,
        window,
        include_total_count: true,
    }
}

fn names(entities: &[Entity]) -> Vec<&str> {
    entities.iter().map(|e| e.get_str("Name").unwrap()).collect()
}

// ── Queries ─────────────────────────────────────────────────────

#[tokio::test]
async fn returns_all_rows_without_window() {
    let executor = executor();
    let response = executor
        .execute(request(QueryDescriptor::new(), None))
        .await
        .unwrap();
    assert_eq!(response.entities.len(), 5);
    assert_eq!(response.total_count, Some(5));
}

#[tokio::test]
async fn applies_filters_sorts_and_window() {
    let executor = executor();
    let descriptor = QueryDescriptor {
        filters: vec![FilterDescriptor::new("State", FilterOperator::IsEqualTo, "WA")],
        sorts: vec![SortDescriptor::descending("Population")],
        ..Default::default()
    };
    let response = executor
        .execute(request(descriptor, Some(PagingWindow { skip: 1, take: 5 })))
        .await
        .unwrap();
    assert_eq!(names(&response.entities), vec!["Tacoma", "Redmond"]);
    assert_eq!(response.total_count, Some(3));
}

#[tokio::test]
async fn parameters_narrow_by_matching_property() {
    let executor = executor();
    let descriptor = QueryDescriptor {
        parameters: vec![Parameter::new("State", "OR")],
        sorts: vec![SortDescriptor::ascending("Name")],
        ..Default::default()
    };
    let response = executor.execute(request(descriptor, None)).await.unwrap();
    assert_eq!(names(&response.entities), vec!["Eugene", "Portland"]);
}

#[tokio::test]
async fn total_count_only_when_requested_and_reported() {
    let executor = executor();
    let mut req = request(QueryDescriptor::new(), None);
    req.include_total_count = false;
    let response = executor.execute(req.clone()).await.unwrap();
    assert_eq!(response.total_count, None);

    executor.set_report_total_count(false);
    req.include_total_count = true;
    let response = executor.execute(req).await.unwrap();
    assert_eq!(response.total_count, None);
}

#[tokio::test]
async fn records_requests() {
    let executor = executor();
    let req = request(QueryDescriptor::new(), Some(PagingWindow { skip: 0, take: 2 }));
    executor.execute(req.clone()).await.unwrap();
    assert_eq!(executor.query_count(), 1);
    assert_eq!(executor.requests(), vec![req]);
}

#[tokio::test]
async fn injected_query_failure_is_used_once() {
    let executor = executor();
    executor.fail_next_query(ExecutorError::Network("offline".into()));
    let err = executor
        .execute(request(QueryDescriptor::new(), None))
        .await
        .unwrap_err();
    assert_eq!(err, ExecutorError::Network("offline".into()));
    assert!(executor.execute(request(QueryDescriptor::new(), None)).await.is_ok());
    assert_eq!(executor.query_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn latency_delays_response() {
    let executor = executor();
    executor.set_latency(Duration::from_millis(200));
    let start = tokio::time::Instant::now();
    executor
        .execute(request(QueryDescriptor::new(), None))
        .await
        .unwrap();
    assert!(start.elapsed() >= Duration::from_millis(200));
}

// ── Signatures ──────────────────────────────────────────────────

#[test]
fn signature_checks_parameter_names() {
    let signature = QuerySignature::new("GetCitiesByState", ["State"]);
    assert!(signature.check("State").is_ok());
    assert!(signature.check("Zip").is_err());
}

#[tokio::test]
async fn registered_signature_is_enforced_on_execute() {
    let executor = executor();
    executor.register_query(QuerySignature::new("GetCities", ["State"]));
    assert!(executor.signature("GetCities").is_some());
    assert!(executor.signature("Other").is_none());

    let err = executor
        .execute(request(QueryDescriptor::new(), None))
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutorError::InvalidQuery(_)));

    let descriptor = QueryDescriptor {
        parameters: vec![Parameter::new("State", "WA")],
        ..Default::default()
    };
    let response = executor.execute(request(descriptor, None)).await.unwrap();
    assert_eq!(response.entities.len(), 3);
}

// ── Submits ─────────────────────────────────────────────────────

#[tokio::test]
async fn submit_applies_changes() {
    let executor = executor();
    let rows = executor.rows();
    let mut modified = rows[0].clone();
    modified.set("Population", json!(80_000));
    let changes = ChangeSet {
        added: vec![city("Kirkland", "WA", 92_000)],
        modified: vec![modified],
        removed: vec![rows[1].clone()],
    };

    let response = executor.submit(changes).await.unwrap();
    assert!(response.conflicts.is_empty());
    assert_eq!(executor.row_count(), 5);
    assert_eq!(executor.submit_count(), 1);

    let rows = executor.rows();
    assert_eq!(rows[0].get_number("Population"), Some(80_000.0));
    assert!(rows.iter().all(|r| r.get_str("Name") != Some("Portland")));
    assert!(rows.iter().any(|r| r.get_str("Name") == Some("Kirkland")));
}

#[tokio::test]
async fn conflicts_apply_nothing() {
    let executor = executor();
    let rows = executor.rows();
    executor.conflict_next_submit(vec![rows[0].key]);
    let changes = ChangeSet {
        removed: vec![rows[0].clone()],
        ..Default::default()
    };
    let response = executor.submit(changes).await.unwrap();
    assert_eq!(response.conflicts, vec![rows[0].key]);
    assert_eq!(executor.row_count(), 5);
}

#[tokio::test]
async fn injected_submit_failure() {
    let executor = executor();
    executor.fail_next_submit(ExecutorError::Server("boom".into()));
    let err = executor.submit(ChangeSet::default()).await.unwrap_err();
    assert_eq!(err, ExecutorError::Server("boom".into()));
    assert_eq!(executor.submits(), vec![ChangeSet::default()]);
}

#[test]
fn clones_share_state() {
    let executor = InMemoryExecutor::new();
    let handle = executor.clone();
    executor.insert(city("Redmond", "WA", 73_000));
    assert_eq!(handle.row_count(), 1);
    let key = handle.rows()[0].key;
    assert!(executor.delete(&key));
    assert_eq!(handle.row_count(), 0);
}

//! Executor abstraction.
//!
//! The data source never talks to a server itself. It hands a
//! [`QueryRequest`] to a [`QueryExecutor`] and a [`ChangeSet`] to a
//! [`SubmitExecutor`] and applies whatever comes back on its own task.

use crate::error::ExecutorError;
use async_trait::async_trait;
use dataview_model::{Entity, EntityKey, QueryDescriptor, ValidationError};
use serde::{Deserialize, Serialize};

/// The slice of the result set a load asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagingWindow {
    pub skip: usize,
    pub take: usize,
}

/// Everything the executor needs to run one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query_name: String,
    pub descriptor: QueryDescriptor,
    /// `None` asks for the whole result set.
    pub window: Option<PagingWindow>,
    pub include_total_count: bool,
}

/// Result of a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResponse {
    pub entities: Vec<Entity>,
    /// Size of the full result set, when the executor reports it.
    pub total_count: Option<usize>,
}

/// Pending changes sent by a submit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub added: Vec<Entity>,
    pub modified: Vec<Entity>,
    pub removed: Vec<Entity>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }
}

/// Result of a submit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmitResponse {
    /// Entities the server refused because of conflicting state.
    pub conflicts: Vec<EntityKey>,
}

/// Parameter names a query accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySignature {
    pub name: String,
    pub parameters: Vec<String>,
}

impl QuerySignature {
    pub fn new<I, S>(name: impl Into<String>, parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            parameters: parameters.into_iter().map(Into::into).collect(),
        }
    }

    /// Fails if the query does not declare a parameter with this name.
    pub fn check(&self, parameter: &str) -> Result<(), ValidationError> {
        if self.parameters.iter().any(|p| p == parameter) {
            Ok(())
        } else {
            Err(ValidationError::UnknownParameter {
                query: self.name.clone(),
                name: parameter.to_string(),
            })
        }
    }
}

/// Runs queries on behalf of a data source.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Executes the query and returns the requested window.
    async fn execute(&self, request: QueryRequest) -> Result<QueryResponse, ExecutorError>;

    /// Describes a query's parameters, if the executor knows them.
    /// Returning `None` skips synchronous parameter validation.
    fn signature(&self, _query_name: &str) -> Option<QuerySignature> {
        None
    }
}

/// Persists change sets on behalf of a data source.
#[async_trait]
pub trait SubmitExecutor: Send + Sync {
    async fn submit(&self, changes: ChangeSet) -> Result<SubmitResponse, ExecutorError>;
}

/// An in-memory executor for testing.
pub mod mock {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
    use std::time::Duration;

    struct Inner {
        rows: Vec<Entity>,
        signatures: HashMap<String, QuerySignature>,
        requests: Vec<QueryRequest>,
        submits: Vec<ChangeSet>,
        latency: Duration,
        submit_latency: Duration,
        query_failures: VecDeque<ExecutorError>,
        submit_failures: VecDeque<ExecutorError>,
        conflicts: Vec<EntityKey>,
        report_total_count: bool,
    }

    /// Serves queries from a vector of rows and applies submits to it.
    ///
    /// Filters and sorts are evaluated with the descriptor itself. A
    /// parameter narrows the rows to those whose property of the same name
    /// equals the parameter value. Clones share state, so a test can keep a
    /// handle while the data source owns another.
    #[derive(Clone)]
    pub struct InMemoryExecutor {
        inner: Arc<Mutex<Inner>>,
    }

    impl Default for InMemoryExecutor {
        fn default() -> Self {
            Self::new()
        }
    }

    impl InMemoryExecutor {
        /// Creates an empty executor.
        pub fn new() -> Self {
            Self {
                inner: Arc::new(Mutex::new(Inner {
                    rows: Vec::new(),
                    signatures: HashMap::new(),
                    requests: Vec::new(),
                    submits: Vec::new(),
                    latency: Duration::ZERO,
                    submit_latency: Duration::ZERO,
                    query_failures: VecDeque::new(),
                    submit_failures: VecDeque::new(),
                    conflicts: Vec::new(),
                    report_total_count: true,
                })),
            }
        }

        /// Creates an executor serving the given rows.
        pub fn with_rows(rows: impl IntoIterator<Item = Entity>) -> Self {
            let executor = Self::new();
            executor.lock().rows.extend(rows);
            executor
        }

        fn lock(&self) -> MutexGuard<'_, Inner> {
            self.inner.lock().unwrap_or_else(PoisonError::into_inner)
        }

        /// Adds a server-side row.
        pub fn insert(&self, entity: Entity) {
            self.lock().rows.push(entity);
        }

        /// Removes a server-side row.
        pub fn delete(&self, key: &EntityKey) -> bool {
            let mut inner = self.lock();
            let before = inner.rows.len();
            inner.rows.retain(|r| r.key != *key);
            inner.rows.len() != before
        }

        /// Returns a copy of the server-side rows.
        pub fn rows(&self) -> Vec<Entity> {
            self.lock().rows.clone()
        }

        pub fn row_count(&self) -> usize {
            self.lock().rows.len()
        }

        /// Declares a query's parameters for synchronous validation. Every
        /// declared parameter is also required at execution time.
        pub fn register_query(&self, signature: QuerySignature) {
            self.lock()
                .signatures
                .insert(signature.name.clone(), signature);
        }

        /// Delays every query by `latency`.
        pub fn set_latency(&self, latency: Duration) {
            self.lock().latency = latency;
        }

        /// Delays every submit by `latency`.
        pub fn set_submit_latency(&self, latency: Duration) {
            self.lock().submit_latency = latency;
        }

        /// Controls whether responses carry a total count.
        pub fn set_report_total_count(&self, report: bool) {
            self.lock().report_total_count = report;
        }

        /// Fails the next query with `error`.
        pub fn fail_next_query(&self, error: ExecutorError) {
            self.lock().query_failures.push_back(error);
        }

        /// Fails the next submit with `error`.
        pub fn fail_next_submit(&self, error: ExecutorError) {
            self.lock().submit_failures.push_back(error);
        }

        /// Reports conflicts for these keys on the next submit, which then
        /// applies nothing.
        pub fn conflict_next_submit(&self, keys: Vec<EntityKey>) {
            self.lock().conflicts = keys;
        }

        /// Every query received so far, in arrival order.
        pub fn requests(&self) -> Vec<QueryRequest> {
            self.lock().requests.clone()
        }

        pub fn query_count(&self) -> usize {
            self.lock().requests.len()
        }

        /// Every change set received so far, in arrival order.
        pub fn submits(&self) -> Vec<ChangeSet> {
            self.lock().submits.clone()
        }

        pub fn submit_count(&self) -> usize {
            self.lock().submits.len()
        }

        fn run(inner: &Inner, request: &QueryRequest) -> Result<QueryResponse, ExecutorError> {
            let descriptor = &request.descriptor;
            if let Some(signature) = inner.signatures.get(&request.query_name) {
                for parameter in &descriptor.parameters {
                    signature
                        .check(&parameter.name)
                        .map_err(|e| ExecutorError::InvalidQuery(e.to_string()))?;
                }
                for name in &signature.parameters {
                    if descriptor.parameter(name).is_none() {
                        return Err(ExecutorError::InvalidQuery(format!(
                            "{} requires parameter '{name}'",
                            request.query_name
                        )));
                    }
                }
            }

            let mut matched: Vec<Entity> = inner
                .rows
                .iter()
                .filter(|row| {
                    descriptor.parameters.iter().all(|p| {
                        row.get(&p.name).is_none_or(|v| *v == p.value)
                    })
                })
                .filter(|row| descriptor.matches(row))
                .cloned()
                .collect();
            if descriptor.is_ordered() {
                matched.sort_by(|a, b| descriptor.compare(a, b));
            }

            let total = matched.len();
            let entities = match request.window {
                Some(window) => matched
                    .into_iter()
                    .skip(window.skip)
                    .take(window.take)
                    .collect(),
                None => matched,
            };
            Ok(QueryResponse {
                entities,
                total_count: (request.include_total_count && inner.report_total_count)
                    .then_some(total),
            })
        }
    }

    #[async_trait]
    impl QueryExecutor for InMemoryExecutor {
        async fn execute(&self, request: QueryRequest) -> Result<QueryResponse, ExecutorError> {
            let (latency, failure) = {
                let mut inner = self.lock();
                inner.requests.push(request.clone());
                (inner.latency, inner.query_failures.pop_front())
            };
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            if let Some(error) = failure {
                return Err(error);
            }
            let inner = self.lock();
            Self::run(&inner, &request)
        }

        fn signature(&self, query_name: &str) -> Option<QuerySignature> {
            self.lock().signatures.get(query_name).cloned()
        }
    }

    #[async_trait]
    impl SubmitExecutor for InMemoryExecutor {
        async fn submit(&self, changes: ChangeSet) -> Result<SubmitResponse, ExecutorError> {
            let (latency, failure) = {
                let mut inner = self.lock();
                inner.submits.push(changes.clone());
                (inner.submit_latency, inner.submit_failures.pop_front())
            };
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            if let Some(error) = failure {
                return Err(error);
            }

            let mut inner = self.lock();
            let conflicts = std::mem::take(&mut inner.conflicts);
            if !conflicts.is_empty() {
                return Ok(SubmitResponse { conflicts });
            }
            inner.rows.extend(changes.added);
            for entity in changes.modified {
                if let Some(row) = inner.rows.iter_mut().find(|r| r.key == entity.key) {
                    *row = entity;
                }
            }
            for entity in changes.removed {
                inner.rows.retain(|r| r.key != entity.key);
            }
            Ok(SubmitResponse::default())
        }
    }
}

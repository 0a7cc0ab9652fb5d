//! Query, paging and submit orchestration for observable data views.
//!
//! A [`DataSource`] binds an observable collection to a remote query. It
//! owns the query state, the loaded entities and the view over them, and
//! coordinates asynchronous loads and submits so that the view stays
//! consistent while the user types into filters, pages and edits rows.
//!
//! # Architecture
//!
//! - **Query configuration**: query name, parameters, sorts, filters,
//!   groups, page and load sizes
//! - **Page cache**: pages keyed by descriptor generation, so navigating
//!   back to a fetched page needs no I/O
//! - **Timers**: debounce for descriptor edits, periodic refresh and
//!   progressive chunk pacing
//! - **Load coordination**: one generation in flight at a time; anything
//!   older is reported cancelled and never touches the view
//! - **Defer scopes**: batch a burst of edits into a single load
//! - **Submit coordination**: builds a change set from the entity set and
//!   guards against overlapping loads
//! - **View projection**: current item, counts, groups and add/edit
//!   transactions
//!
//! Executors run on spawned tokio tasks and hand results back through a
//! channel. The owning task applies them with
//! [`DataSource::process_next`], [`DataSource::wait_for_idle`] or
//! [`DataSource::settle`].
//!
//! # Example
//!
//! ```
//! use dataview_model::{Entity, EntitySchema, PropertyDef};
//! use dataview_source::executor::mock::InMemoryExecutor;
//! use dataview_source::{DataSource, SourceConfig};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let executor = InMemoryExecutor::with_rows(
//!     (0..12).map(|i| Entity::new("City", json!({ "Name": format!("City {i}") }))),
//! );
//! let schema = EntitySchema::new("City").with(PropertyDef::text("Name"));
//! let config = SourceConfig {
//!     page_size: 5,
//!     ..SourceConfig::new("GetCities")
//! };
//!
//! let mut source = DataSource::new(config, schema, Arc::new(executor))?;
//! source.load()?;
//! source.wait_for_idle().await?;
//! assert_eq!(source.count(), 5);
//! assert_eq!(source.total_item_count(), Some(12));
//! # Ok(())
//! # }
//! ```

pub mod config;
mod defer;
mod editing;
pub mod entity_set;
mod error;
pub mod events;
pub mod executor;
mod load;
pub mod page_cache;
mod paging;
mod query;
mod source;
mod submit;
mod timer;
pub mod view;

pub use config::{SourceConfig, DEFAULT_LOAD_DELAY};
pub use defer::{DeferLoad, DeferRefresh};
pub use entity_set::{EntitySet, EntityState, RejectOutcome};
pub use error::{Activity, DataSourceError, DataSourceResult, ExecutorError};
pub use events::{
    CollectionChange, DataSourceEvent, EventBus, LoadedDataEvent, LoadingDataEvent,
    SubmittedChangesEvent, SubmittingChangesEvent, SubscriptionId, ViewProperty,
};
pub use executor::{
    ChangeSet, PagingWindow, QueryExecutor, QueryRequest, QueryResponse, QuerySignature,
    SubmitExecutor, SubmitResponse,
};
pub use page_cache::{Page, PageCache};
pub use source::DataSource;
pub use view::{ViewGroup, ViewProjection};

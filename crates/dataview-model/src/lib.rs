//! Core model types for dataview.
//!
//! This crate defines the data the orchestration engine moves around and the
//! declarative query state it sends to an executor:
//! - [`EntityKey`]: time-ordered entity identifiers (UUID v7)
//! - [`Entity`]: a keyed JSON record addressed by dotted property paths
//! - [`EntitySchema`]: the property paths an entity type exposes
//! - [`QueryDescriptor`]: parameters, sorts, filters and groups, plus the
//!   evaluation used by in-memory executors and by the view when it places
//!   locally added entities
//!
//! Nothing here performs I/O.

mod descriptor;
mod entity;
mod key;
mod schema;
mod value;

pub use descriptor::{
    FilterDescriptor, FilterOperator, GroupDescriptor, LogicalOperator, Parameter,
    QueryDescriptor, SortDescriptor, SortDirection,
};
pub use entity::Entity;
pub use key::EntityKey;
pub use schema::{EntitySchema, FieldType, PropertyDef};
pub use value::{compare_values, values_equal};

/// Result type for descriptor validation.
pub type ValidationResult<T> = std::result::Result<T, ValidationError>;

/// Errors raised synchronously when query state is mutated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A sort, filter or group path does not resolve against the schema.
    #[error("property '{path}' does not exist on entity type '{entity_type}'")]
    UnknownProperty { entity_type: String, path: String },

    /// A parameter name is not part of the query's signature.
    #[error("query '{query}' has no parameter named '{name}'")]
    UnknownParameter { query: String, name: String },

    /// The same parameter was supplied twice.
    #[error("duplicate parameter: {0}")]
    DuplicateParameter(String),

    /// Query name is empty.
    #[error("query name must not be empty")]
    EmptyQueryName,

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

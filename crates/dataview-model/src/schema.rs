use crate::ValidationError;
use serde::{Deserialize, Serialize};

/// Describes the properties an entity type exposes to queries.
///
/// Sort, filter and group descriptors are validated against this list when
/// they are added to a data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySchema {
    pub entity_type: String,
    pub properties: Vec<PropertyDef>,
}

impl EntitySchema {
    /// Creates a schema with no properties.
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            properties: Vec::new(),
        }
    }

    /// Adds a property, builder style.
    #[must_use]
    pub fn with(mut self, property: PropertyDef) -> Self {
        self.properties.push(property);
        self
    }

    /// Resolves a dotted property path.
    pub fn resolve(&self, path: &str) -> Result<&PropertyDef, ValidationError> {
        self.properties
            .iter()
            .find(|p| p.path == path)
            .ok_or_else(|| ValidationError::UnknownProperty {
                entity_type: self.entity_type.clone(),
                path: path.to_string(),
            })
    }

    /// Returns whether the path resolves.
    pub fn contains(&self, path: &str) -> bool {
        self.resolve(path).is_ok()
    }
}

/// A property reachable by a dotted path (e.g. `"Name"`, `"Address.City"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDef {
    pub path: String,
    pub field_type: FieldType,
}

impl PropertyDef {
    fn simple(path: &str, field_type: FieldType) -> Self {
        Self {
            path: path.into(),
            field_type,
        }
    }

    /// Shorthand for a text property.
    pub fn text(path: &str) -> Self {
        Self::simple(path, FieldType::Text)
    }

    /// Shorthand for a numeric property.
    pub fn number(path: &str) -> Self {
        Self::simple(path, FieldType::Number)
    }

    /// Shorthand for a boolean property.
    pub fn bool(path: &str) -> Self {
        Self::simple(path, FieldType::Bool)
    }

    /// Shorthand for a DateTime property (ISO-8601 text).
    pub fn datetime(path: &str) -> Self {
        Self::simple(path, FieldType::DateTime)
    }

    /// Shorthand for an opaque JSON property.
    pub fn json(path: &str) -> Self {
        Self::simple(path, FieldType::Json)
    }
}

/// The data type of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Number,
    Bool,
    DateTime,
    Json,
}

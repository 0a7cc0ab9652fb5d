use crate::key::EntityKey;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

static NULL: Value = Value::Null;

/// A keyed record flowing between the executor, the entity set and the view.
///
/// The `data` field holds arbitrary JSON. Properties are addressed with
/// dotted paths (`"Name"`, `"Address.City"`) walking nested objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub key: EntityKey,
    pub entity_type: String,
    pub data: Value,
}

impl Entity {
    /// Creates an entity with a fresh key.
    pub fn new(entity_type: impl Into<String>, data: Value) -> Self {
        Self::with_key(EntityKey::new(), entity_type, data)
    }

    /// Creates an entity with a known key.
    pub fn with_key(key: EntityKey, entity_type: impl Into<String>, data: Value) -> Self {
        Self {
            key,
            entity_type: entity_type.into(),
            data,
        }
    }

    /// Looks up a property by dotted path.
    pub fn get(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(&self.data, |value, segment| value.get(segment))
    }

    /// Like [`Entity::get`], but missing properties read as `null`.
    pub fn value(&self, path: &str) -> &Value {
        self.get(path).unwrap_or(&NULL)
    }

    /// Extract a string property.
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    /// Extract a numeric property.
    pub fn get_number(&self, path: &str) -> Option<f64> {
        self.get(path).and_then(Value::as_f64)
    }

    /// Extract a boolean property.
    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get(path).and_then(Value::as_bool)
    }

    /// Writes a property, creating intermediate objects as needed.
    pub fn set(&mut self, path: &str, value: Value) {
        let mut target = &mut self.data;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            if !target.is_object() {
                *target = Value::Object(Map::new());
            }
            let Some(map) = target.as_object_mut() else {
                return;
            };
            if segments.peek().is_none() {
                map.insert(segment.to_string(), value);
                return;
            }
            target = map.entry(segment.to_string()).or_insert(Value::Null);
        }
    }
}

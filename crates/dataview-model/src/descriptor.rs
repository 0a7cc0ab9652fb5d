//! Declarative query state: parameters, sorts, filters and groups.
//!
//! A [`QueryDescriptor`] is what the data source snapshots into every load
//! request. Executors that evaluate queries in memory use
//! [`QueryDescriptor::matches`] and [`QueryDescriptor::compare`]; the view
//! uses the same functions to place entities it adds locally.

use crate::entity::Entity;
use crate::schema::EntitySchema;
use crate::value::{compare_values, values_equal};
use crate::{ValidationError, ValidationResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashSet;

/// Sort direction for a sort descriptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    fn apply(self, ord: Ordering) -> Ordering {
        match self {
            Self::Ascending => ord,
            Self::Descending => ord.reverse(),
        }
    }
}

/// Orders results by one property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortDescriptor {
    pub property: String,
    pub direction: SortDirection,
}

impl SortDescriptor {
    pub fn ascending(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn descending(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: SortDirection::Descending,
        }
    }
}

/// Groups results by one property. Groups always sort ahead of sorts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDescriptor {
    pub property: String,
}

impl GroupDescriptor {
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
        }
    }
}

/// A named query parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: Value,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Comparison applied by a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    IsEqualTo,
    IsNotEqualTo,
    IsLessThan,
    IsLessThanOrEqualTo,
    IsGreaterThan,
    IsGreaterThanOrEqualTo,
    StartsWith,
    EndsWith,
    Contains,
    /// The property value is contained in the filter value (a string or an
    /// array of candidates).
    IsContainedIn,
}

impl FilterOperator {
    /// Evaluates `actual <op> expected`.
    pub fn evaluate(self, actual: &Value, expected: &Value, case_sensitive: bool) -> bool {
        match self {
            Self::IsEqualTo => values_equal(actual, expected, case_sensitive),
            Self::IsNotEqualTo => !values_equal(actual, expected, case_sensitive),
            Self::IsLessThan => compare_values(actual, expected) == Ordering::Less,
            Self::IsLessThanOrEqualTo => compare_values(actual, expected) != Ordering::Greater,
            Self::IsGreaterThan => compare_values(actual, expected) == Ordering::Greater,
            Self::IsGreaterThanOrEqualTo => compare_values(actual, expected) != Ordering::Less,
            Self::StartsWith => text_match(actual, expected, case_sensitive, |a, e| a.starts_with(e)),
            Self::EndsWith => text_match(actual, expected, case_sensitive, |a, e| a.ends_with(e)),
            Self::Contains => text_match(actual, expected, case_sensitive, |a, e| a.contains(e)),
            Self::IsContainedIn => match expected {
                Value::Array(candidates) => candidates
                    .iter()
                    .any(|c| values_equal(actual, c, case_sensitive)),
                _ => text_match(expected, actual, case_sensitive, |a, e| a.contains(e)),
            },
        }
    }
}

fn text_match(
    actual: &Value,
    expected: &Value,
    case_sensitive: bool,
    op: impl Fn(&str, &str) -> bool,
) -> bool {
    match (actual.as_str(), expected.as_str()) {
        (Some(a), Some(e)) if case_sensitive => op(a, e),
        (Some(a), Some(e)) => op(&a.to_lowercase(), &e.to_lowercase()),
        _ => false,
    }
}

/// How a filter combines with the filters before it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

/// Restricts results by one property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterDescriptor {
    pub property: String,
    pub operator: FilterOperator,
    pub value: Value,
    #[serde(default)]
    pub logical: LogicalOperator,
    #[serde(default)]
    pub case_sensitive: bool,
    /// While `value` equals this, the filter is inactive.
    #[serde(default)]
    pub ignored_value: Value,
}

impl FilterDescriptor {
    pub fn new(property: impl Into<String>, operator: FilterOperator, value: impl Into<Value>) -> Self {
        Self {
            property: property.into(),
            operator,
            value: value.into(),
            logical: LogicalOperator::And,
            case_sensitive: false,
            ignored_value: Value::Null,
        }
    }

    #[must_use]
    pub fn or(mut self) -> Self {
        self.logical = LogicalOperator::Or;
        self
    }

    #[must_use]
    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    #[must_use]
    pub fn with_ignored_value(mut self, ignored: impl Into<Value>) -> Self {
        self.ignored_value = ignored.into();
        self
    }

    /// Returns false while the value equals the ignored value.
    pub fn is_active(&self) -> bool {
        self.value != self.ignored_value
    }

    /// Evaluates this filter alone against an entity.
    pub fn matches(&self, entity: &Entity) -> bool {
        self.operator
            .evaluate(entity.value(&self.property), &self.value, self.case_sensitive)
    }
}

/// The full declarative query state of a data source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    pub parameters: Vec<Parameter>,
    pub sorts: Vec<SortDescriptor>,
    pub filters: Vec<FilterDescriptor>,
    pub groups: Vec<GroupDescriptor>,
}

impl QueryDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks every property path against the schema and rejects duplicate
    /// parameter names.
    pub fn validate(&self, schema: &EntitySchema) -> ValidationResult<()> {
        for sort in &self.sorts {
            schema.resolve(&sort.property)?;
        }
        for filter in &self.filters {
            schema.resolve(&filter.property)?;
        }
        for group in &self.groups {
            schema.resolve(&group.property)?;
        }
        let mut seen = HashSet::new();
        for parameter in &self.parameters {
            if !seen.insert(parameter.name.as_str()) {
                return Err(ValidationError::DuplicateParameter(parameter.name.clone()));
            }
        }
        Ok(())
    }

    /// Looks up a parameter value by name.
    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }

    /// Evaluates the active filters, folding left with each filter's
    /// logical operator. No active filters matches everything.
    pub fn matches(&self, entity: &Entity) -> bool {
        let mut result: Option<bool> = None;
        for filter in self.filters.iter().filter(|f| f.is_active()) {
            let hit = filter.matches(entity);
            result = Some(match (result, filter.logical) {
                (None, _) => hit,
                (Some(acc), LogicalOperator::And) => acc && hit,
                (Some(acc), LogicalOperator::Or) => acc || hit,
            });
        }
        result.unwrap_or(true)
    }

    /// Orders two entities by group keys, then by sorts.
    pub fn compare(&self, a: &Entity, b: &Entity) -> Ordering {
        let groups = self
            .groups
            .iter()
            .map(|g| (g.property.as_str(), self.group_direction(&g.property)));
        let sorts = self
            .sorts
            .iter()
            .map(|s| (s.property.as_str(), s.direction));

        for (path, direction) in groups.chain(sorts) {
            let ord = direction.apply(compare_values(a.value(path), b.value(path)));
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// A grouped property follows the direction of a sort on the same
    /// property, ascending otherwise.
    fn group_direction(&self, property: &str) -> SortDirection {
        self.sorts
            .iter()
            .find(|s| s.property == property)
            .map(|s| s.direction)
            .unwrap_or_default()
    }

    /// Returns whether any sort or group applies.
    pub fn is_ordered(&self) -> bool {
        !self.sorts.is_empty() || !self.groups.is_empty()
    }

    /// Returns whether the path is a grouped property.
    pub fn is_grouped_by(&self, path: &str) -> bool {
        self.groups.iter().any(|g| g.property == path)
    }

    /// The composite group key of an entity, one value per group descriptor.
    pub fn group_key(&self, entity: &Entity) -> Vec<Value> {
        self.groups
            .iter()
            .map(|g| entity.value(&g.property).clone())
            .collect()
    }
}

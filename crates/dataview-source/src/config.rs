//! Data source configuration.

use dataview_model::ValidationError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default delay between a descriptor edit and the automatic load it causes.
pub const DEFAULT_LOAD_DELAY: Duration = Duration::from_millis(750);

/// Configuration for a data source.
///
/// Durations serialize as whole milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Name of the query the executor runs.
    pub query_name: String,
    /// Entities per page; 0 disables paging.
    pub page_size: usize,
    /// Entities per request. With paging this widens the fetched window to
    /// several pages; without paging it enables progressive loading.
    pub load_size: usize,
    /// Debounce applied to sort, filter, group and parameter edits.
    #[serde(with = "millis")]
    pub load_delay: Duration,
    /// Reload the current configuration on this interval.
    #[serde(with = "opt_millis")]
    pub refresh_interval: Option<Duration>,
    /// Pause between progressive load chunks.
    #[serde(with = "millis")]
    pub progressive_load_interval: Duration,
    /// Load automatically when the query state changes.
    pub auto_load: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            query_name: String::new(),
            page_size: 0,
            load_size: 0,
            load_delay: DEFAULT_LOAD_DELAY,
            refresh_interval: None,
            progressive_load_interval: Duration::ZERO,
            auto_load: false,
        }
    }
}

impl SourceConfig {
    /// Creates a configuration for the named query.
    pub fn new(query_name: impl Into<String>) -> Self {
        Self {
            query_name: query_name.into(),
            ..Default::default()
        }
    }

    /// Checks the configuration before a data source adopts it.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.query_name.trim().is_empty() {
            return Err(ValidationError::EmptyQueryName);
        }
        if self.refresh_interval.is_some_and(|i| i.is_zero()) {
            return Err(ValidationError::InvalidConfig(
                "refresh interval must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Whether loads are split into size-capped chunks.
    pub fn is_progressive(&self) -> bool {
        self.page_size == 0 && self.load_size > 0
    }

    /// Number of pages fetched by one paged load.
    pub fn pages_per_load(&self) -> usize {
        if self.page_size == 0 {
            0
        } else {
            self.load_size.div_ceil(self.page_size).max(1)
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod opt_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|v| v.map(Duration::from_millis))
    }
}

//! Query configuration: name, sizes, timers, parameters, sorts, filters
//! and groups.
//!
//! Every mutation is rejected while a load or submit is in flight.
//! Descriptor edits invalidate the page cache and, with auto-load on,
//! restart the load delay; a new query name or page size loads at once.
//! Inside a defer scope they only mark the scope dirty.

use crate::error::{DataSourceError, DataSourceResult};
use crate::events::ViewProperty;
use crate::load::LoadTrigger;
use crate::source::DataSource;
use dataview_model::{
    FilterDescriptor, GroupDescriptor, Parameter, QueryDescriptor, SortDescriptor, ValidationError,
};
use serde_json::Value;
use std::time::Duration;

impl DataSource {
    fn ensure_configurable(&self, operation: &'static str) -> DataSourceResult<()> {
        self.ensure_idle(operation)
    }

    /// The query state changed: drop cached pages and reload.
    fn descriptor_changed(&mut self, trigger: LoadTrigger) {
        self.pages.invalidate();
        self.target_page = 0;
        if self.defer.is_active() {
            self.defer.mark_dirty();
        } else if self.config.auto_load {
            self.request_load(trigger);
        }
    }

    fn check_parameter(&self, query_name: &str, name: &str) -> DataSourceResult<()> {
        if let Some(signature) = self.query_executor.signature(query_name) {
            signature.check(name)?;
        }
        Ok(())
    }

    // ── Query and sizes ─────────────────────────────────────────────

    pub fn set_query_name(&mut self, query_name: impl Into<String>) -> DataSourceResult<()> {
        let query_name = query_name.into();
        self.ensure_configurable("changing the query name")?;
        if query_name.trim().is_empty() {
            return Err(ValidationError::EmptyQueryName.into());
        }
        if query_name == self.config.query_name {
            return Ok(());
        }
        for parameter in &self.descriptor.parameters {
            self.check_parameter(&query_name, &parameter.name)?;
        }
        self.config.query_name = query_name;
        self.descriptor_changed(LoadTrigger::Immediate);
        Ok(())
    }

    /// Sets the page size; 0 turns paging off.
    pub fn set_page_size(&mut self, page_size: usize) -> DataSourceResult<()> {
        self.ensure_configurable("changing the page size")?;
        if page_size == self.config.page_size {
            return Ok(());
        }
        self.config.page_size = page_size;
        self.notify(ViewProperty::PageSize);
        self.descriptor_changed(LoadTrigger::Immediate);
        Ok(())
    }

    /// Sets the load size. Takes effect with the next load.
    pub fn set_load_size(&mut self, load_size: usize) -> DataSourceResult<()> {
        self.ensure_configurable("changing the load size")?;
        if load_size != self.config.load_size {
            self.config.load_size = load_size;
            if self.defer.is_active() {
                self.defer.mark_dirty();
            }
        }
        Ok(())
    }

    /// Sets the debounce for descriptor edits. A delay already running
    /// keeps its original length.
    pub fn set_load_delay(&mut self, load_delay: Duration) {
        self.config.load_delay = load_delay;
    }

    pub fn set_progressive_load_interval(&mut self, interval: Duration) {
        self.config.progressive_load_interval = interval;
    }

    pub fn set_auto_load(&mut self, auto_load: bool) {
        self.config.auto_load = auto_load;
        if !auto_load {
            self.load_timer.stop();
        }
    }

    /// Starts, restarts or stops periodic reloading.
    pub fn set_refresh_interval(&mut self, interval: Option<Duration>) -> DataSourceResult<()> {
        if interval.is_some_and(|i| i.is_zero()) {
            return Err(ValidationError::InvalidConfig(
                "refresh interval must be greater than zero".into(),
            )
            .into());
        }
        self.config.refresh_interval = interval;
        match interval {
            Some(period) => self.refresh_timer.start_repeating(period, &self.tx),
            None => self.refresh_timer.stop(),
        }
        Ok(())
    }

    // ── Parameters ──────────────────────────────────────────────────

    pub fn set_parameter(&mut self, name: impl Into<String>, value: impl Into<Value>) -> DataSourceResult<()> {
        let name = name.into();
        let value = value.into();
        self.ensure_configurable("changing a parameter")?;
        self.check_parameter(&self.config.query_name, &name)?;
        match self.descriptor.parameters.iter_mut().find(|p| p.name == name) {
            Some(parameter) if parameter.value == value => return Ok(()),
            Some(parameter) => parameter.value = value,
            None => self.descriptor.parameters.push(Parameter::new(name, value)),
        }
        self.descriptor_changed(LoadTrigger::Debounced);
        Ok(())
    }

    pub fn remove_parameter(&mut self, name: &str) -> DataSourceResult<bool> {
        self.ensure_configurable("removing a parameter")?;
        let before = self.descriptor.parameters.len();
        self.descriptor.parameters.retain(|p| p.name != name);
        let removed = self.descriptor.parameters.len() != before;
        if removed {
            self.descriptor_changed(LoadTrigger::Debounced);
        }
        Ok(removed)
    }

    pub fn clear_parameters(&mut self) -> DataSourceResult<()> {
        self.ensure_configurable("clearing parameters")?;
        if !self.descriptor.parameters.is_empty() {
            self.descriptor.parameters.clear();
            self.descriptor_changed(LoadTrigger::Debounced);
        }
        Ok(())
    }

    // ── Sorts ───────────────────────────────────────────────────────

    /// Adds a sort, or changes the direction of an existing sort on the
    /// same property.
    pub fn add_sort(&mut self, sort: SortDescriptor) -> DataSourceResult<()> {
        self.ensure_configurable("changing sorts")?;
        self.schema.resolve(&sort.property)?;
        match self.descriptor.sorts.iter_mut().find(|s| s.property == sort.property) {
            Some(existing) if *existing == sort => return Ok(()),
            Some(existing) => *existing = sort,
            None => self.descriptor.sorts.push(sort),
        }
        self.descriptor_changed(LoadTrigger::Debounced);
        Ok(())
    }

    pub fn remove_sort(&mut self, property: &str) -> DataSourceResult<bool> {
        self.ensure_configurable("changing sorts")?;
        let before = self.descriptor.sorts.len();
        self.descriptor.sorts.retain(|s| s.property != property);
        let removed = self.descriptor.sorts.len() != before;
        if removed {
            self.descriptor_changed(LoadTrigger::Debounced);
        }
        Ok(removed)
    }

    pub fn clear_sorts(&mut self) -> DataSourceResult<()> {
        self.ensure_configurable("changing sorts")?;
        if !self.descriptor.sorts.is_empty() {
            self.descriptor.sorts.clear();
            self.descriptor_changed(LoadTrigger::Debounced);
        }
        Ok(())
    }

    // ── Filters ─────────────────────────────────────────────────────

    /// Adds a filter and returns its index.
    pub fn add_filter(&mut self, filter: FilterDescriptor) -> DataSourceResult<usize> {
        self.ensure_configurable("changing filters")?;
        self.schema.resolve(&filter.property)?;
        let active = filter.is_active();
        self.descriptor.filters.push(filter);
        if active {
            self.descriptor_changed(LoadTrigger::Debounced);
        }
        Ok(self.descriptor.filters.len() - 1)
    }

    /// Changes the value of a filter, as a search box does on every
    /// keystroke. Edits that leave the filter inactive do not reload.
    pub fn set_filter_value(&mut self, index: usize, value: impl Into<Value>) -> DataSourceResult<()> {
        let value = value.into();
        self.ensure_configurable("changing filters")?;
        let filter = self
            .descriptor
            .filters
            .get_mut(index)
            .ok_or_else(|| DataSourceError::InvalidOperation(format!("no filter at index {index}")))?;
        if filter.value == value {
            return Ok(());
        }
        let was_active = filter.is_active();
        filter.value = value;
        if was_active || filter.is_active() {
            self.descriptor_changed(LoadTrigger::Debounced);
        }
        Ok(())
    }

    pub fn remove_filter(&mut self, index: usize) -> DataSourceResult<FilterDescriptor> {
        self.ensure_configurable("changing filters")?;
        if index >= self.descriptor.filters.len() {
            return Err(DataSourceError::InvalidOperation(format!(
                "no filter at index {index}"
            )));
        }
        let filter = self.descriptor.filters.remove(index);
        if filter.is_active() {
            self.descriptor_changed(LoadTrigger::Debounced);
        }
        Ok(filter)
    }

    pub fn clear_filters(&mut self) -> DataSourceResult<()> {
        self.ensure_configurable("changing filters")?;
        if !self.descriptor.filters.is_empty() {
            self.descriptor.filters.clear();
            self.descriptor_changed(LoadTrigger::Debounced);
        }
        Ok(())
    }

    // ── Groups ──────────────────────────────────────────────────────

    pub fn add_group(&mut self, group: GroupDescriptor) -> DataSourceResult<()> {
        self.ensure_configurable("changing groups")?;
        self.schema.resolve(&group.property)?;
        if self.descriptor.is_grouped_by(&group.property) {
            return Ok(());
        }
        self.descriptor.groups.push(group);
        self.descriptor_changed(LoadTrigger::Debounced);
        Ok(())
    }

    pub fn remove_group(&mut self, property: &str) -> DataSourceResult<bool> {
        self.ensure_configurable("changing groups")?;
        let before = self.descriptor.groups.len();
        self.descriptor.groups.retain(|g| g.property != property);
        let removed = self.descriptor.groups.len() != before;
        if removed {
            self.descriptor_changed(LoadTrigger::Debounced);
        }
        Ok(removed)
    }

    pub fn clear_groups(&mut self) -> DataSourceResult<()> {
        self.ensure_configurable("changing groups")?;
        if !self.descriptor.groups.is_empty() {
            self.descriptor.groups.clear();
            self.descriptor_changed(LoadTrigger::Debounced);
        }
        Ok(())
    }

    /// Replaces the whole descriptor after validating it.
    pub fn set_descriptor(&mut self, descriptor: QueryDescriptor) -> DataSourceResult<()> {
        self.ensure_configurable("replacing the descriptor")?;
        descriptor.validate(&self.schema)?;
        for parameter in &descriptor.parameters {
            self.check_parameter(&self.config.query_name, &parameter.name)?;
        }
        if descriptor == self.descriptor {
            return Ok(());
        }
        self.descriptor = descriptor;
        self.descriptor_changed(LoadTrigger::Debounced);
        Ok(())
    }
}

//! Scoped batching of configuration changes.
//!
//! ```
//! # use dataview_source::{DataSource, SourceConfig};
//! # use dataview_source::executor::mock::InMemoryExecutor;
//! # use dataview_model::{EntitySchema, PropertyDef, SortDescriptor};
//! # use std::sync::Arc;
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let schema = EntitySchema::new("City").with(PropertyDef::text("Name"));
//! let mut config = SourceConfig::new("GetCities");
//! config.auto_load = true;
//! let mut source = DataSource::new(config, schema, Arc::new(InMemoryExecutor::new()))?;
//!
//! let mut scope = source.defer_load();
//! scope.add_sort(SortDescriptor::ascending("Name"))?;
//! scope.set_page_size(10)?;
//! scope.finish()?; // one load for both changes
//! # source.wait_for_idle().await?;
//! # Ok(())
//! # }
//! ```

use crate::error::DataSourceResult;
use crate::source::DataSource;
use std::ops::{Deref, DerefMut};
use tracing::warn;

/// Depths of the open scopes and whether a load was requested inside them.
#[derive(Debug, Default)]
pub(crate) struct DeferState {
    load_depth: usize,
    refresh_depth: usize,
    dirty: bool,
}

impl DeferState {
    pub(crate) fn is_active(&self) -> bool {
        self.load_depth > 0 || self.refresh_depth > 0
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}

/// Suppresses loads until dropped. The outermost scope loads once on exit
/// if anything inside it asked for a load.
#[must_use = "dropping the guard ends the scope immediately"]
pub struct DeferLoad<'a> {
    source: &'a mut DataSource,
    open: bool,
}

/// Suppresses loads until dropped. The outermost scope always loads once
/// on exit, even if nothing changed.
#[must_use = "dropping the guard ends the scope immediately"]
pub struct DeferRefresh<'a> {
    source: &'a mut DataSource,
    open: bool,
}

impl DataSource {
    /// Opens a load-deferral scope.
    pub fn defer_load(&mut self) -> DeferLoad<'_> {
        self.defer.load_depth += 1;
        self.load_timer.stop();
        DeferLoad {
            source: self,
            open: true,
        }
    }

    /// Opens a refresh-deferral scope.
    pub fn defer_refresh(&mut self) -> DeferRefresh<'_> {
        self.defer.refresh_depth += 1;
        self.load_timer.stop();
        DeferRefresh {
            source: self,
            open: true,
        }
    }

    /// Whether a defer scope is open.
    pub fn is_load_deferred(&self) -> bool {
        self.defer.is_active()
    }

    fn end_defer_load(&mut self) -> DataSourceResult<()> {
        self.defer.load_depth = self.defer.load_depth.saturating_sub(1);
        if self.defer.is_active() || !std::mem::take(&mut self.defer.dirty) {
            return Ok(());
        }
        self.flush_deferred_load()
    }

    fn end_defer_refresh(&mut self) -> DataSourceResult<()> {
        self.defer.refresh_depth = self.defer.refresh_depth.saturating_sub(1);
        if self.defer.refresh_depth > 0 {
            return Ok(());
        }
        if self.defer.is_active() {
            // an enclosing load scope performs the load
            self.defer.mark_dirty();
            return Ok(());
        }
        self.defer.dirty = false;
        self.flush_deferred_load()
    }

    fn flush_deferred_load(&mut self) -> DataSourceResult<()> {
        self.ensure_not_submitting("deferred load")?;
        self.load_timer.stop();
        self.pages.invalidate();
        self.start_load(self.plan(self.target_page));
        Ok(())
    }
}

impl DeferLoad<'_> {
    /// Ends the scope, returning the result of the load it triggers.
    pub fn finish(mut self) -> DataSourceResult<()> {
        self.open = false;
        self.source.end_defer_load()
    }
}

impl DeferRefresh<'_> {
    /// Ends the scope, returning the result of the load it triggers.
    pub fn finish(mut self) -> DataSourceResult<()> {
        self.open = false;
        self.source.end_defer_refresh()
    }
}

impl Deref for DeferLoad<'_> {
    type Target = DataSource;

    fn deref(&self) -> &DataSource {
        &*self.source
    }
}

impl DerefMut for DeferLoad<'_> {
    fn deref_mut(&mut self) -> &mut DataSource {
        &mut *self.source
    }
}

impl Deref for DeferRefresh<'_> {
    type Target = DataSource;

    fn deref(&self) -> &DataSource {
        &*self.source
    }
}

impl DerefMut for DeferRefresh<'_> {
    fn deref_mut(&mut self) -> &mut DataSource {
        &mut *self.source
    }
}

impl Drop for DeferLoad<'_> {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.source.end_defer_load() {
                warn!("Deferred load failed: {}", e);
            }
        }
    }
}

impl Drop for DeferRefresh<'_> {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.source.end_defer_refresh() {
                warn!("Deferred refresh failed: {}", e);
            }
        }
    }
}

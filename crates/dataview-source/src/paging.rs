//! Page navigation.

use crate::error::DataSourceResult;
use crate::events::{CollectionChange, DataSourceEvent, ViewProperty};
use crate::load::{LoadKind, LoadTrigger};
use crate::source::DataSource;
use dataview_model::EntityKey;
use tracing::debug;

impl DataSource {
    /// Moves to a page.
    ///
    /// A page cached under the current generation is shown without I/O.
    /// Beyond a known end the index is clamped to the last page; with an
    /// unknown total the page is requested as is. Returns false if nothing
    /// changes, e.g. when paging is off or the page is already shown.
    pub fn move_to_page(&mut self, page_index: usize) -> DataSourceResult<bool> {
        self.ensure_not_submitting("page navigation")?;
        let page_size = self.config.page_size;
        if page_size == 0 {
            return Ok(false);
        }

        let mut target = page_index;
        if let Some(last) = self.pages.last_page_index(page_size) {
            if target > last {
                debug!("Clamping page {} to last page {}", target, last);
                target = last;
            }
        }

        if self.load.as_ref().is_some_and(
            |op| matches!(op.kind, LoadKind::Page { page_index, .. } if page_index == target),
        ) {
            return Ok(true);
        }

        if let Some(page) = self.pages.get_page(target) {
            let keys = page.keys.clone();
            if self.is_loading_data() {
                self.cancel_load();
            } else if self.view.page_index() == Some(target) {
                return Ok(false);
            }
            self.show_cached_page(target, keys);
            return Ok(true);
        }

        self.target_page = target;
        self.request_load(LoadTrigger::Immediate);
        Ok(true)
    }

    pub fn move_to_first_page(&mut self) -> DataSourceResult<bool> {
        self.move_to_page(0)
    }

    pub fn move_to_previous_page(&mut self) -> DataSourceResult<bool> {
        match self.view.page_index() {
            Some(current) if current > 0 => self.move_to_page(current - 1),
            _ => Ok(false),
        }
    }

    pub fn move_to_next_page(&mut self) -> DataSourceResult<bool> {
        let next = self.view.page_index().map_or(0, |current| current + 1);
        if let Some(last) = self.pages.last_page_index(self.config.page_size) {
            if self.view.page_index().is_some() && next > last {
                return Ok(false);
            }
        }
        self.move_to_page(next)
    }

    /// Moves to the last page. Needs a known total count.
    pub fn move_to_last_page(&mut self) -> DataSourceResult<bool> {
        match self.pages.last_page_index(self.config.page_size) {
            Some(last) => self.move_to_page(last),
            None => Ok(false),
        }
    }

    fn show_cached_page(&mut self, page_index: usize, keys: Vec<EntityKey>) {
        self.commit_open_transactions();
        let snapshot = self.view_snapshot();
        let changed = self.view.page_index() != Some(page_index);
        if changed {
            self.emit(DataSourceEvent::PageChanging { page_index });
        }
        debug!("Showing cached page {}", page_index);
        self.view.replace(keys);
        self.view.set_page_index(Some(page_index));
        self.target_page = page_index;
        self.view.regroup(&self.descriptor, &self.entities);

        self.emit(DataSourceEvent::CollectionChanged(CollectionChange::Reset));
        self.notify_view_changes(&snapshot);
        if !self.descriptor.groups.is_empty() {
            self.notify(ViewProperty::Groups);
        }
        if changed {
            self.emit(DataSourceEvent::PageChanged { page_index });
        }
    }
}

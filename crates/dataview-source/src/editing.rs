//! Currency, add/edit transactions and mirroring between the view and the
//! entity set.

use crate::entity_set::EntityState;
use crate::error::{DataSourceError, DataSourceResult};
use crate::events::{CollectionChange, DataSourceEvent, ViewProperty};
use crate::source::DataSource;
use dataview_model::{Entity, EntityKey};
use serde_json::Value;
use tracing::debug;

/// Where a removed entity sat when it left the window.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RemovedSlot {
    key: EntityKey,
    generation: u64,
    /// Cached page and position within it.
    page: Option<(usize, usize)>,
    view_index: Option<usize>,
}

impl DataSource {
    // ── Currency ────────────────────────────────────────────────────

    /// Makes the item at `position` current. A position set this way
    /// survives the next reload if the item is still there.
    pub fn move_current_to_position(&mut self, position: usize) -> DataSourceResult<bool> {
        if position >= self.view.count() {
            return Err(DataSourceError::InvalidOperation(format!(
                "position {position} is outside a view of {} items",
                self.view.count()
            )));
        }
        Ok(self.set_currency(Some(position)))
    }

    /// Makes the item with `key` current. Returns false if it is not shown.
    pub fn move_current_to(&mut self, key: &EntityKey) -> bool {
        match self.view.index_of(key) {
            Some(index) => {
                self.set_currency(Some(index));
                true
            }
            None => false,
        }
    }

    pub fn move_current_to_first(&mut self) -> bool {
        if self.view.is_empty() {
            return false;
        }
        self.set_currency(Some(0))
    }

    pub fn move_current_to_last(&mut self) -> bool {
        match self.view.count() {
            0 => false,
            n => self.set_currency(Some(n - 1)),
        }
    }

    pub fn move_current_to_next(&mut self) -> bool {
        match self.view.current_position() {
            Some(p) if p + 1 < self.view.count() => self.set_currency(Some(p + 1)),
            Some(_) => false,
            None => self.move_current_to_first(),
        }
    }

    pub fn move_current_to_previous(&mut self) -> bool {
        match self.view.current_position() {
            Some(p) if p > 0 => self.set_currency(Some(p - 1)),
            _ => false,
        }
    }

    fn set_currency(&mut self, position: Option<usize>) -> bool {
        let snapshot = self.view_snapshot();
        let changed = self.view.set_current(position, true);
        if changed {
            self.notify_view_changes(&snapshot);
        }
        changed
    }

    // ── Add transactions ────────────────────────────────────────────

    /// Adds an entity through the view and opens an add transaction on it.
    /// It is placed where the active sort puts it and becomes current.
    /// Returns its index in the view.
    pub fn add_new(&mut self, entity: Entity) -> DataSourceResult<usize> {
        self.ensure_not_submitting("adding an entity")?;
        if self.entities.contains(&entity.key) {
            return Err(DataSourceError::InvalidOperation(format!(
                "entity {} is already tracked",
                entity.key
            )));
        }
        self.commit_open_transactions();

        let snapshot = self.view_snapshot();
        let had_changes = self.entities.has_changes();
        let key = entity.key;
        let index = self
            .view
            .insertion_index(&entity, &self.descriptor, &self.entities);
        self.track_new(entity);
        self.show_at(index, key);
        self.view.begin_add(key);
        self.view.set_current(Some(index), false);
        self.view.regroup(&self.descriptor, &self.entities);

        self.emit(DataSourceEvent::CollectionChanged(CollectionChange::Added { key, index }));
        self.notify_view_changes(&snapshot);
        self.notify(ViewProperty::IsAddingNew);
        self.notify_changes_flag(had_changes);
        if !self.descriptor.groups.is_empty() {
            self.notify(ViewProperty::Groups);
        }
        Ok(index)
    }

    /// Commits the open add transaction. The entity stays pending until
    /// submitted.
    pub fn commit_new(&mut self) -> DataSourceResult<()> {
        if !self.view.is_adding_new() {
            return Err(DataSourceError::InvalidOperation("no add transaction is open".into()));
        }
        self.finish_add();
        Ok(())
    }

    /// Discards the entity of the open add transaction.
    pub fn cancel_new(&mut self) -> DataSourceResult<()> {
        let key = self
            .view
            .end_add()
            .ok_or_else(|| DataSourceError::InvalidOperation("no add transaction is open".into()))?;
        let had_changes = self.entities.has_changes();
        self.entities.detach(&key);
        self.remove_from_window(&key);
        self.notify(ViewProperty::IsAddingNew);
        self.notify_changes_flag(had_changes);
        Ok(())
    }

    fn finish_add(&mut self) {
        if let Some(key) = self.view.end_add() {
            debug!("Committed new entity {}", key);
            self.notify(ViewProperty::IsAddingNew);
        }
    }

    // ── Edit transactions ───────────────────────────────────────────

    /// Opens an edit transaction on an entity, committing any open one.
    pub fn edit_item(&mut self, key: &EntityKey) -> DataSourceResult<()> {
        self.ensure_not_submitting("editing an entity")?;
        let snapshot = match self.entities.state(key) {
            EntityState::Deleted | EntityState::Detached => None,
            _ => self.entities.get(key).cloned(),
        }
        .ok_or(DataSourceError::EntityNotFound(*key))?;
        self.commit_open_transactions();
        self.view.begin_edit(snapshot);
        self.notify(ViewProperty::IsEditingItem);
        Ok(())
    }

    /// Sets a property on a tracked entity, inside or outside an edit
    /// transaction. Editing a grouped property regroups the view.
    pub fn set_property(
        &mut self,
        key: &EntityKey,
        path: &str,
        value: impl Into<Value>,
    ) -> DataSourceResult<()> {
        self.ensure_not_submitting("editing an entity")?;
        self.schema.resolve(path)?;
        let had_changes = self.entities.has_changes();
        if !self.entities.set_property(key, path, value.into()) {
            return Err(DataSourceError::EntityNotFound(*key));
        }
        if self.descriptor.is_grouped_by(path) {
            self.regroup();
        }
        self.notify_changes_flag(had_changes);
        Ok(())
    }

    pub fn commit_edit(&mut self) -> DataSourceResult<()> {
        if !self.view.is_editing_item() {
            return Err(DataSourceError::InvalidOperation("no edit transaction is open".into()));
        }
        self.finish_edit();
        Ok(())
    }

    /// Restores the entity to its state when the edit began.
    pub fn cancel_edit(&mut self) -> DataSourceResult<()> {
        let snapshot = self
            .view
            .end_edit()
            .ok_or_else(|| DataSourceError::InvalidOperation("no edit transaction is open".into()))?;
        let had_changes = self.entities.has_changes();
        self.entities.restore(snapshot);
        if !self.descriptor.groups.is_empty() {
            self.regroup();
        }
        self.notify(ViewProperty::IsEditingItem);
        self.notify_changes_flag(had_changes);
        Ok(())
    }

    fn finish_edit(&mut self) {
        if let Some(snapshot) = self.view.end_edit() {
            debug!("Committed edit of {}", snapshot.key);
            self.notify(ViewProperty::IsEditingItem);
        }
    }

    /// Commits whatever add or edit transaction is open.
    pub(crate) fn commit_open_transactions(&mut self) {
        self.finish_add();
        self.finish_edit();
    }

    // ── Removal ─────────────────────────────────────────────────────

    /// Removes an entity through the view. A pending addition is dropped;
    /// anything else is deleted on the next submit.
    pub fn remove(&mut self, key: &EntityKey) -> DataSourceResult<()> {
        self.ensure_not_submitting("removing an entity")?;
        if self.view.current_add_item() == Some(*key) {
            return self.cancel_new();
        }
        if self.view.current_edit_item() == Some(*key) {
            self.view.end_edit();
            self.notify(ViewProperty::IsEditingItem);
        }
        let had_changes = self.entities.has_changes();
        self.entities
            .remove(key)
            .ok_or(DataSourceError::EntityNotFound(*key))?;
        self.remove_from_window(key);
        self.notify_changes_flag(had_changes);
        Ok(())
    }

    pub fn remove_at(&mut self, index: usize) -> DataSourceResult<()> {
        let key = self.view.items().get(index).copied().ok_or_else(|| {
            DataSourceError::InvalidOperation(format!("no item at index {index}"))
        })?;
        self.remove(&key)
    }

    // ── Entity set ──────────────────────────────────────────────────

    /// Adds an entity straight to the entity set. It appears in the view
    /// only if it passes the active filters. Returns its view index when
    /// shown.
    pub fn entity_set_add(&mut self, entity: Entity) -> DataSourceResult<Option<usize>> {
        self.ensure_not_submitting("adding an entity")?;
        if self.entities.contains(&entity.key) {
            return Err(DataSourceError::InvalidOperation(format!(
                "entity {} is already tracked",
                entity.key
            )));
        }
        let had_changes = self.entities.has_changes();
        let key = entity.key;
        let visible = self.descriptor.matches(&entity);
        let index = self
            .view
            .insertion_index(&entity, &self.descriptor, &self.entities);
        self.track_new(entity);

        if visible {
            let snapshot = self.view_snapshot();
            self.show_at(index, key);
            self.view.regroup(&self.descriptor, &self.entities);
            self.emit(DataSourceEvent::CollectionChanged(CollectionChange::Added { key, index }));
            self.notify_view_changes(&snapshot);
            if !self.descriptor.groups.is_empty() {
                self.notify(ViewProperty::Groups);
            }
        }
        self.notify_changes_flag(had_changes);
        Ok(visible.then_some(index))
    }

    /// Removes an entity straight from the entity set. The view only
    /// changes if the entity is in the materialized window; cached pages
    /// drop it either way, without a reload.
    pub fn entity_set_remove(&mut self, key: &EntityKey) -> DataSourceResult<()> {
        self.ensure_not_submitting("removing an entity")?;
        if self.view.current_add_item() == Some(*key) {
            self.view.end_add();
            self.notify(ViewProperty::IsAddingNew);
        }
        if self.view.current_edit_item() == Some(*key) {
            self.view.end_edit();
            self.notify(ViewProperty::IsEditingItem);
        }
        let had_changes = self.entities.has_changes();
        self.entities
            .remove(key)
            .ok_or(DataSourceError::EntityNotFound(*key))?;
        self.remove_from_window(key);
        self.notify_changes_flag(had_changes);
        Ok(())
    }

    // ── Reject ──────────────────────────────────────────────────────

    /// Undoes every pending change without touching the network.
    pub fn reject_changes(&mut self) -> DataSourceResult<()> {
        self.ensure_not_submitting("rejecting changes")?;
        let snapshot = self.view_snapshot();
        let had_changes = self.entities.has_changes();
        let was_adding = self.view.end_add().is_some();
        let was_editing = self.view.end_edit().is_some();

        let outcome = self.entities.reject_changes();
        for key in &outcome.dropped {
            let in_page = self.pages.remove_entity(key).is_some();
            if self.view.remove(key).is_some() || in_page {
                self.pages.decrement_total();
            }
        }
        let slots = std::mem::take(&mut self.removed);
        let mut placed = Vec::new();
        for slot in slots.iter().rev() {
            if outcome.restored.contains(&slot.key) && self.restore_slot(slot) {
                placed.push(slot.key);
            }
        }
        for key in outcome.restored.iter().filter(|key| !placed.contains(*key)) {
            // A paged window only takes rows back into the slot they left.
            if self.view.page_index().is_some() {
                continue;
            }
            let index = match self.entities.get(key) {
                Some(entity) if self.descriptor.matches(entity) && !self.view.contains(key) => self
                    .view
                    .insertion_index(entity, &self.descriptor, &self.entities),
                _ => continue,
            };
            self.show_at(index, *key);
        }
        self.view.regroup(&self.descriptor, &self.entities);

        if !outcome.is_empty() {
            self.emit(DataSourceEvent::CollectionChanged(CollectionChange::Reset));
        }
        self.notify_view_changes(&snapshot);
        if was_adding {
            self.notify(ViewProperty::IsAddingNew);
        }
        if was_editing {
            self.notify(ViewProperty::IsEditingItem);
        }
        self.notify_changes_flag(had_changes);
        if !self.descriptor.groups.is_empty() {
            self.notify(ViewProperty::Groups);
        }
        Ok(())
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn track_new(&mut self, entity: Entity) {
        let descriptor = &self.descriptor;
        self.entities.add(entity, |a, b| descriptor.compare(a, b));
    }

    /// Inserts a key into the view and the current page.
    fn show_at(&mut self, index: usize, key: EntityKey) {
        self.view.insert(index, key);
        if let Some(page_index) = self.view.page_index() {
            self.pages.insert_entity(page_index, index, key);
        }
        self.pages.increment_total();
    }

    /// Puts a rejected delete back where it was removed from. Returns false
    /// if the slot belongs to an older generation or was never shown.
    fn restore_slot(&mut self, slot: &RemovedSlot) -> bool {
        if slot.generation != self.pages.generation() || self.view.contains(&slot.key) {
            return false;
        }
        let shown_page = self.view.page_index();
        match (slot.page, slot.view_index) {
            (Some((page_index, position)), _) => {
                self.pages.insert_entity(page_index, position, slot.key);
                if shown_page == Some(page_index) {
                    self.view.insert(position, slot.key);
                }
            }
            (None, Some(index)) if shown_page.is_none() => self.view.insert(index, slot.key),
            _ => return false,
        }
        self.pages.increment_total();
        true
    }

    /// Drops a key from cached pages and, if shown, from the view.
    fn remove_from_window(&mut self, key: &EntityKey) {
        let snapshot = self.view_snapshot();
        let page = self.pages.remove_entity(key);
        let in_page = page.is_some();
        let index = self.view.remove(key);
        if in_page || index.is_some() {
            self.pages.decrement_total();
            self.removed.push(RemovedSlot {
                key: *key,
                generation: self.pages.generation(),
                page,
                view_index: index,
            });
        }
        if let Some(index) = index {
            self.view.regroup(&self.descriptor, &self.entities);
            self.emit(DataSourceEvent::CollectionChanged(CollectionChange::Removed {
                key: *key,
                index,
            }));
            self.notify_view_changes(&snapshot);
            if !self.descriptor.groups.is_empty() {
                self.notify(ViewProperty::Groups);
            }
        } else if in_page {
            self.notify_view_changes(&snapshot);
        }
    }

    fn notify_changes_flag(&mut self, had_changes: bool) {
        if had_changes != self.entities.has_changes() {
            self.notify(ViewProperty::HasChanges);
        }
    }
}

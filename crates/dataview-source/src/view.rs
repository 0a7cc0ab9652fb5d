//! The observable window over the entity set.

use crate::entity_set::EntitySet;
use dataview_model::{Entity, EntityKey, QueryDescriptor};
use serde_json::Value;
use std::cmp::Ordering;

/// Items sharing one composite group key, in view order.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewGroup {
    pub key: Vec<Value>,
    pub items: Vec<EntityKey>,
}

/// Keys currently shown, currency, page position, groups and open
/// add/edit transactions.
#[derive(Debug, Default)]
pub struct ViewProjection {
    items: Vec<EntityKey>,
    current: Option<usize>,
    /// Currency was last set by the caller rather than by a load.
    user_currency: bool,
    page_index: Option<usize>,
    groups: Vec<ViewGroup>,
    adding: Option<EntityKey>,
    editing: Option<Entity>,
}

impl ViewProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[EntityKey] {
        &self.items
    }

    pub fn count(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn index_of(&self, key: &EntityKey) -> Option<usize> {
        self.items.iter().position(|k| k == key)
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.index_of(key).is_some()
    }

    pub fn current_position(&self) -> Option<usize> {
        self.current
    }

    pub fn current_key(&self) -> Option<EntityKey> {
        self.current.and_then(|i| self.items.get(i).copied())
    }

    pub fn page_index(&self) -> Option<usize> {
        self.page_index
    }

    pub fn groups(&self) -> &[ViewGroup] {
        &self.groups
    }

    pub fn is_adding_new(&self) -> bool {
        self.adding.is_some()
    }

    pub fn current_add_item(&self) -> Option<EntityKey> {
        self.adding
    }

    pub fn is_editing_item(&self) -> bool {
        self.editing.is_some()
    }

    pub fn current_edit_item(&self) -> Option<EntityKey> {
        self.editing.as_ref().map(|e| e.key)
    }

    /// Index at which `entity` belongs under the active sorts and groups.
    /// Unordered views append.
    pub fn insertion_index(
        &self,
        entity: &Entity,
        descriptor: &QueryDescriptor,
        entities: &EntitySet,
    ) -> usize {
        if !descriptor.is_ordered() {
            return self.items.len();
        }
        self.items
            .iter()
            .position(|key| {
                entities
                    .get(key)
                    .is_some_and(|existing| descriptor.compare(existing, entity) == Ordering::Greater)
            })
            .unwrap_or(self.items.len())
    }

    /// Replaces the items after a load. Currency the caller set is kept if
    /// that item is still present; otherwise it moves to the first item.
    pub(crate) fn replace(&mut self, keys: Vec<EntityKey>) {
        let previous = self.current_key();
        self.items = keys;
        let retained = match previous {
            Some(key) if self.user_currency => self.index_of(&key),
            _ => None,
        };
        match retained {
            Some(index) => self.current = Some(index),
            None => {
                self.user_currency = false;
                self.current = if self.items.is_empty() { None } else { Some(0) };
            }
        }
    }

    /// Appends a progressive chunk.
    pub(crate) fn append(&mut self, keys: Vec<EntityKey>) {
        self.items.extend(keys);
        if self.current.is_none() && !self.items.is_empty() {
            self.current = Some(0);
        }
    }

    pub(crate) fn insert(&mut self, index: usize, key: EntityKey) {
        let index = index.min(self.items.len());
        self.items.insert(index, key);
        if let Some(current) = self.current.as_mut() {
            if *current >= index {
                *current += 1;
            }
        }
    }

    /// Removes a key and returns the index it had. Currency stays on the
    /// same position when the current item goes, clamped to the end.
    pub(crate) fn remove(&mut self, key: &EntityKey) -> Option<usize> {
        let index = self.index_of(key)?;
        self.items.remove(index);
        self.current = match self.current {
            _ if self.items.is_empty() => None,
            Some(current) if current > index => Some(current - 1),
            Some(current) => Some(current.min(self.items.len() - 1)),
            None => None,
        };
        Some(index)
    }

    /// Moves currency. Returns whether the position changed.
    pub(crate) fn set_current(&mut self, position: Option<usize>, by_user: bool) -> bool {
        let position = position.filter(|p| *p < self.items.len());
        self.user_currency = by_user && position.is_some();
        let changed = self.current != position;
        self.current = position;
        changed
    }

    pub(crate) fn set_page_index(&mut self, page_index: Option<usize>) {
        self.page_index = page_index;
    }

    /// Rebuilds the groups from the current items.
    pub(crate) fn regroup(&mut self, descriptor: &QueryDescriptor, entities: &EntitySet) {
        self.groups.clear();
        if descriptor.groups.is_empty() {
            return;
        }
        for key in &self.items {
            let Some(entity) = entities.get(key) else {
                continue;
            };
            let group_key = descriptor.group_key(entity);
            match self.groups.iter_mut().find(|g| g.key == group_key) {
                Some(group) => group.items.push(*key),
                None => self.groups.push(ViewGroup {
                    key: group_key,
                    items: vec![*key],
                }),
            }
        }
    }

    pub(crate) fn begin_add(&mut self, key: EntityKey) {
        self.adding = Some(key);
    }

    pub(crate) fn end_add(&mut self) -> Option<EntityKey> {
        self.adding.take()
    }

    /// Opens an edit transaction holding a snapshot to restore on cancel.
    pub(crate) fn begin_edit(&mut self, snapshot: Entity) {
        self.editing = Some(snapshot);
    }

    pub(crate) fn end_edit(&mut self) -> Option<Entity> {
        self.editing.take()
    }
}

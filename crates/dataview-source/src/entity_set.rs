//! Change-tracked backing set of entities.

use crate::executor::ChangeSet;
use dataview_model::{Entity, EntityKey};
use serde_json::Value;
use std::cmp::Ordering;

/// Change tracking state of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    /// Matches the server.
    Unmodified,
    /// Added locally, not yet submitted.
    New,
    /// Edited locally, not yet submitted.
    Modified,
    /// Removed locally, not yet submitted.
    Deleted,
    /// No longer tracked.
    Detached,
}

#[derive(Debug, Clone)]
struct Tracked {
    entity: Entity,
    state: EntityState,
    /// Server values of a modified or deleted entity.
    original: Option<Entity>,
}

/// What [`EntitySet::reject_changes`] undid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RejectOutcome {
    /// New entities that were dropped.
    pub dropped: Vec<EntityKey>,
    /// Deleted entities that are tracked again.
    pub restored: Vec<EntityKey>,
    /// Modified entities whose server values came back.
    pub reverted: Vec<EntityKey>,
}

impl RejectOutcome {
    pub fn is_empty(&self) -> bool {
        self.dropped.is_empty() && self.restored.is_empty() && self.reverted.is_empty()
    }
}

/// Every entity the data source knows about, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct EntitySet {
    entries: Vec<Tracked>,
}

impl EntitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked entities, pending deletes included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, key: &EntityKey) -> Option<usize> {
        self.entries.iter().position(|t| t.entity.key == *key)
    }

    fn entry_mut(&mut self, key: &EntityKey) -> Option<&mut Tracked> {
        self.entries.iter_mut().find(|t| t.entity.key == *key)
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.position(key).is_some()
    }

    pub fn get(&self, key: &EntityKey) -> Option<&Entity> {
        self.entries
            .iter()
            .find(|t| t.entity.key == *key)
            .map(|t| &t.entity)
    }

    /// Returns the tracking state; untracked keys are detached.
    pub fn state(&self, key: &EntityKey) -> EntityState {
        self.entries
            .iter()
            .find(|t| t.entity.key == *key)
            .map_or(EntityState::Detached, |t| t.state)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entries.iter().map(|t| &t.entity)
    }

    /// Returns whether anything awaits submission.
    pub fn has_changes(&self) -> bool {
        self.entries
            .iter()
            .any(|t| t.state != EntityState::Unmodified)
    }

    /// Merges server rows by key. Unmodified entities take the server
    /// values; entities with pending changes keep theirs. Returns the keys
    /// to show, in server order, without pending deletes.
    pub fn merge_loaded(&mut self, entities: Vec<Entity>) -> Vec<EntityKey> {
        let mut keys = Vec::with_capacity(entities.len());
        for entity in entities {
            let key = entity.key;
            match self.entry_mut(&key) {
                Some(tracked) => {
                    match tracked.state {
                        EntityState::Unmodified => tracked.entity = entity,
                        EntityState::Deleted => continue,
                        _ => {}
                    }
                }
                None => self.entries.push(Tracked {
                    entity,
                    state: EntityState::Unmodified,
                    original: None,
                }),
            }
            keys.push(key);
        }
        keys
    }

    /// Tracks a locally created entity. It is placed before the first entity
    /// that `order` ranks after it. Returns false if the key is already
    /// tracked.
    pub fn add(&mut self, entity: Entity, order: impl Fn(&Entity, &Entity) -> Ordering) -> bool {
        if self.contains(&entity.key) {
            return false;
        }
        let index = self
            .entries
            .iter()
            .position(|t| order(&t.entity, &entity) == Ordering::Greater)
            .unwrap_or(self.entries.len());
        self.entries.insert(
            index,
            Tracked {
                entity,
                state: EntityState::New,
                original: None,
            },
        );
        true
    }

    /// Marks an entity removed. A new entity is dropped outright and comes
    /// back as [`EntityState::Detached`]; anything else becomes
    /// [`EntityState::Deleted`]. Returns `None` if the key is not tracked.
    pub fn remove(&mut self, key: &EntityKey) -> Option<EntityState> {
        let index = self.position(key)?;
        let tracked = &mut self.entries[index];
        match tracked.state {
            EntityState::New => {
                self.entries.remove(index);
                Some(EntityState::Detached)
            }
            EntityState::Unmodified => {
                tracked.original = Some(tracked.entity.clone());
                tracked.state = EntityState::Deleted;
                Some(EntityState::Deleted)
            }
            _ => {
                tracked.state = EntityState::Deleted;
                Some(EntityState::Deleted)
            }
        }
    }

    /// Stops tracking an entity, whatever its state.
    pub fn detach(&mut self, key: &EntityKey) -> Option<Entity> {
        let index = self.position(key)?;
        Some(self.entries.remove(index).entity)
    }

    /// Sets a property on a tracked entity. Returns false for unknown or
    /// deleted entities.
    pub fn set_property(&mut self, key: &EntityKey, path: &str, value: Value) -> bool {
        let Some(tracked) = self.entry_mut(key) else {
            return false;
        };
        match tracked.state {
            EntityState::Deleted | EntityState::Detached => return false,
            EntityState::Unmodified => {
                if tracked.entity.get(path) == Some(&value) {
                    return true;
                }
                tracked.original = Some(tracked.entity.clone());
                tracked.state = EntityState::Modified;
            }
            EntityState::New | EntityState::Modified => {}
        }
        tracked.entity.set(path, value);
        true
    }

    /// Puts back a snapshot taken when an edit began. An entity restored
    /// to its server values becomes unmodified again.
    pub fn restore(&mut self, snapshot: Entity) -> bool {
        let Some(tracked) = self.entry_mut(&snapshot.key) else {
            return false;
        };
        if tracked.state == EntityState::Modified && tracked.original.as_ref() == Some(&snapshot) {
            tracked.state = EntityState::Unmodified;
            tracked.original = None;
        }
        tracked.entity = snapshot;
        true
    }

    /// Builds the change set a submit sends.
    pub fn changeset(&self) -> ChangeSet {
        let mut changes = ChangeSet::default();
        for tracked in &self.entries {
            let target = match tracked.state {
                EntityState::New => &mut changes.added,
                EntityState::Modified => &mut changes.modified,
                EntityState::Deleted => &mut changes.removed,
                EntityState::Unmodified | EntityState::Detached => continue,
            };
            target.push(tracked.entity.clone());
        }
        changes
    }

    /// Clears change tracking after a successful submit. Deleted entities
    /// become detached; their keys are returned.
    pub fn accept_changes(&mut self) -> Vec<EntityKey> {
        let mut detached = Vec::new();
        self.entries.retain_mut(|tracked| {
            if tracked.state == EntityState::Deleted {
                detached.push(tracked.entity.key);
                return false;
            }
            tracked.state = EntityState::Unmodified;
            tracked.original = None;
            true
        });
        detached
    }

    /// Undoes every pending change.
    pub fn reject_changes(&mut self) -> RejectOutcome {
        let mut outcome = RejectOutcome::default();
        self.entries.retain_mut(|tracked| {
            let key = tracked.entity.key;
            match tracked.state {
                EntityState::New => {
                    outcome.dropped.push(key);
                    return false;
                }
                EntityState::Modified => outcome.reverted.push(key),
                EntityState::Deleted => outcome.restored.push(key),
                EntityState::Unmodified | EntityState::Detached => return true,
            }
            if let Some(original) = tracked.original.take() {
                tracked.entity = original;
            }
            tracked.state = EntityState::Unmodified;
            true
        });
        outcome
    }
}

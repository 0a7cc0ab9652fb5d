//! Per-page memoization of loaded keys.
//!
//! Every page remembers the generation it was fetched under. Invalidating
//! the cache bumps the generation, so pages from an older descriptor are
//! never served again even if a late response tries to store them.

use dataview_model::EntityKey;
use std::collections::BTreeMap;

/// One cached page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub index: usize,
    pub keys: Vec<EntityKey>,
    pub generation: u64,
}

/// Pages fetched under the current descriptor.
#[derive(Debug, Default)]
pub struct PageCache {
    pages: BTreeMap<usize, Page>,
    generation: u64,
    total_item_count: Option<usize>,
}

impl PageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current descriptor generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Drops every page and the total count, and starts a new generation.
    pub fn invalidate(&mut self) -> u64 {
        self.generation += 1;
        self.pages.clear();
        self.total_item_count = None;
        self.generation
    }

    /// Returns the page if it was fetched under the current generation.
    pub fn get_page(&self, index: usize) -> Option<&Page> {
        self.pages
            .get(&index)
            .filter(|page| page.generation == self.generation)
    }

    pub fn contains_page(&self, index: usize) -> bool {
        self.get_page(index).is_some()
    }

    /// Indexes of the cached pages, ascending.
    pub fn cached_pages(&self) -> Vec<usize> {
        self.pages
            .values()
            .filter(|page| page.generation == self.generation)
            .map(|page| page.index)
            .collect()
    }

    /// Splits a loaded window into pages starting at `first_index`. A stale
    /// generation stores nothing and returns false.
    pub fn store(
        &mut self,
        generation: u64,
        first_index: usize,
        page_size: usize,
        keys: &[EntityKey],
        total_item_count: Option<usize>,
    ) -> bool {
        if generation != self.generation || page_size == 0 {
            return false;
        }
        if keys.is_empty() {
            self.pages.insert(
                first_index,
                Page {
                    index: first_index,
                    keys: Vec::new(),
                    generation,
                },
            );
        }
        for (offset, chunk) in keys.chunks(page_size).enumerate() {
            let index = first_index + offset;
            self.pages.insert(
                index,
                Page {
                    index,
                    keys: chunk.to_vec(),
                    generation,
                },
            );
        }
        if total_item_count.is_some() {
            self.total_item_count = total_item_count;
        }
        true
    }

    pub fn total_item_count(&self) -> Option<usize> {
        self.total_item_count
    }

    pub fn set_total_item_count(&mut self, total: Option<usize>) {
        self.total_item_count = total;
    }

    pub fn increment_total(&mut self) {
        if let Some(total) = self.total_item_count.as_mut() {
            *total += 1;
        }
    }

    pub fn decrement_total(&mut self) {
        if let Some(total) = self.total_item_count.as_mut() {
            *total = total.saturating_sub(1);
        }
    }

    /// Number of pages implied by the total count.
    pub fn page_count(&self, page_size: usize) -> Option<usize> {
        if page_size == 0 {
            return None;
        }
        self.total_item_count.map(|t| t.div_ceil(page_size))
    }

    /// Index of the last page implied by the total count.
    pub fn last_page_index(&self, page_size: usize) -> Option<usize> {
        self.page_count(page_size).map(|n| n.saturating_sub(1))
    }

    /// Finds the cached page holding `key`.
    pub fn page_of(&self, key: &EntityKey) -> Option<usize> {
        self.pages
            .values()
            .find(|page| page.generation == self.generation && page.keys.contains(key))
            .map(|page| page.index)
    }

    /// Removes `key` from whichever page holds it. Returns that page and
    /// the position the key had in it.
    pub fn remove_entity(&mut self, key: &EntityKey) -> Option<(usize, usize)> {
        for page in self.pages.values_mut() {
            if let Some(pos) = page.keys.iter().position(|k| k == key) {
                page.keys.remove(pos);
                return Some((page.index, pos));
            }
        }
        None
    }

    /// Inserts `key` into a cached page at `position`, clamped to the page
    /// length. Returns false if the page is not cached.
    pub fn insert_entity(&mut self, page_index: usize, position: usize, key: EntityKey) -> bool {
        let generation = self.generation;
        match self
            .pages
            .get_mut(&page_index)
            .filter(|page| page.generation == generation)
        {
            Some(page) => {
                let position = position.min(page.keys.len());
                page.keys.insert(position, key);
                true
            }
            None => false,
        }
    }
}

/// Index of the last page for a known total.
pub(crate) fn last_page_for(total: usize, page_size: usize) -> usize {
    total.div_ceil(page_size).saturating_sub(1)
}

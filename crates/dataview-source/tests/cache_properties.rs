//! Property-based tests for the page cache and change tracking.
//!
//! - Stored windows are split into contiguous pages no larger than the
//!   page size, and the page count follows the total
//! - Invalidation hides every page and refuses stores from the old
//!   generation
//! - Rejecting changes after any mix of edits restores the loaded set

use dataview_model::{Entity, EntityKey};
use dataview_source::{EntitySet, PageCache};
use proptest::prelude::*;
use serde_json::json;
use std::cmp::Ordering;

fn keys(n: usize) -> Vec<EntityKey> {
    (0..n).map(|_| EntityKey::new()).collect()
}

fn row(n: i64) -> Entity {
    Entity::new("Row", json!({ "Value": n }))
}

#[derive(Debug, Clone)]
enum Edit {
    Modify(usize, i64),
    Remove(usize),
    Add(i64),
}

fn edit_strategy() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (0usize..20, any::<i64>()).prop_map(|(i, v)| Edit::Modify(i, v)),
        (0usize..20).prop_map(Edit::Remove),
        any::<i64>().prop_map(Edit::Add),
    ]
}

// =============================================================================
// PAGE CACHE PROPERTIES
// =============================================================================

proptest! {
    #[test]
    fn stored_window_is_split_into_pages(
        len in 0usize..60,
        page_size in 1usize..10,
        first in 0usize..5,
    ) {
        let window = keys(len);
        let mut cache = PageCache::new();
        let generation = cache.generation();
        prop_assert!(cache.store(generation, first, page_size, &window, Some(first * page_size + len)));

        let mut joined = Vec::new();
        for index in cache.cached_pages() {
            let page = cache.get_page(index).unwrap();
            prop_assert!(page.keys.len() <= page_size);
            joined.extend(page.keys.iter().copied());
        }
        prop_assert_eq!(joined, window);
        prop_assert_eq!(cache.cached_pages().first().copied(), Some(first));

        let total = first * page_size + len;
        prop_assert_eq!(cache.page_count(page_size), Some(total.div_ceil(page_size)));
    }

    #[test]
    fn invalidation_hides_old_pages(len in 1usize..30, page_size in 1usize..8) {
        let window = keys(len);
        let mut cache = PageCache::new();
        let old = cache.generation();
        cache.store(old, 0, page_size, &window, Some(len));

        let new = cache.invalidate();
        prop_assert!(new > old);
        prop_assert!(cache.cached_pages().is_empty());
        prop_assert_eq!(cache.total_item_count(), None);
        prop_assert!(!cache.store(old, 0, page_size, &window, Some(len)));
        prop_assert!(cache.get_page(0).is_none());
    }
}

// =============================================================================
// CHANGE TRACKING PROPERTIES
// =============================================================================

proptest! {
    #[test]
    fn reject_restores_loaded_entities(
        loaded in prop::collection::vec(any::<i64>(), 1..20),
        edits in prop::collection::vec(edit_strategy(), 0..30),
    ) {
        let rows: Vec<Entity> = loaded.iter().copied().map(row).collect();
        let mut set = EntitySet::new();
        let order = set.merge_loaded(rows.clone());

        for edit in edits {
            match edit {
                Edit::Modify(i, v) => {
                    set.set_property(&order[i % order.len()], "Value", json!(v));
                }
                Edit::Remove(i) => {
                    set.remove(&order[i % order.len()]);
                }
                Edit::Add(v) => {
                    set.add(row(v), |_, _| Ordering::Less);
                }
            }
        }

        set.reject_changes();
        prop_assert!(!set.has_changes());
        prop_assert_eq!(set.len(), rows.len());
        for original in &rows {
            prop_assert_eq!(set.get(&original.key), Some(original));
        }
    }

    #[test]
    fn changeset_counts_match_pending_changes(
        loaded in prop::collection::vec(any::<i64>(), 1..20),
        edits in prop::collection::vec(edit_strategy(), 0..30),
    ) {
        let mut set = EntitySet::new();
        let order = set.merge_loaded(loaded.iter().copied().map(row).collect());
        for edit in edits {
            match edit {
                Edit::Modify(i, v) => {
                    set.set_property(&order[i % order.len()], "Value", json!(v));
                }
                Edit::Remove(i) => {
                    set.remove(&order[i % order.len()]);
                }
                Edit::Add(v) => {
                    set.add(row(v), |_, _| Ordering::Less);
                }
            }
        }

        let changes = set.changeset();
        prop_assert_eq!(changes.is_empty(), !set.has_changes());
        let accepted = set.accept_changes();
        prop_assert_eq!(accepted.len(), changes.removed.len());
        prop_assert!(!set.has_changes());
    }
}

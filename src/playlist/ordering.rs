//! Drag-reorder index remapping.
//!
//! A move from `from` to `to` shifts every item between the two slots by one
//! toward `from`, places the moved item at `to`, and leaves the rest alone.
//! Only items whose position changed are reported for persistence.

use crate::protocol::PlaylistItem;

/// Result of a reorder that actually changed the order.
#[derive(Debug, Clone, PartialEq)]
pub struct ReorderOutcome {
    /// Full collection in new order with dense positions.
    pub items: Vec<PlaylistItem>,
    /// Items whose position changed, in new-position order.
    pub changed: Vec<PlaylistItem>,
    /// New position of the current item when its old position was inside the
    /// affected range.
    pub current_moved_to: Option<usize>,
}

/// Maps an original position to its position after moving `from` to `to`.
pub fn remap_position(position: usize, from: usize, to: usize) -> usize {
    if position == from {
        to
    } else if from < to && position > from && position <= to {
        position - 1
    } else if from > to && position >= to && position < from {
        position + 1
    } else {
        position
    }
}

/// Inclusive range of positions touched by a move.
pub fn affected_range(from: usize, to: usize) -> std::ops::RangeInclusive<usize> {
    from.min(to)..=from.max(to)
}

/// Computes the new order for dragging the item at `from` onto slot `to`.
///
/// Returns `None` for a no-op: identical slots or either index out of bounds.
/// The list index is taken as the original position.
pub fn reorder(
    items: &[PlaylistItem],
    from: usize,
    to: usize,
    current_position: Option<usize>,
) -> Option<ReorderOutcome> {
    let len = items.len();
    if from == to || from >= len || to >= len {
        return None;
    }

    let mut reordered: Vec<Option<PlaylistItem>> = vec![None; len];
    let mut changed_positions = Vec::with_capacity(from.abs_diff(to) + 1);
    for (original, item) in items.iter().enumerate() {
        let next = remap_position(original, from, to);
        let mut moved = item.clone();
        moved.position = next;
        if next != original {
            changed_positions.push(next);
        }
        reordered[next] = Some(moved);
    }

    let items: Vec<PlaylistItem> = reordered.into_iter().flatten().collect();
    changed_positions.sort_unstable();
    let changed = changed_positions
        .into_iter()
        .map(|position| items[position].clone())
        .collect();

    let current_moved_to = current_position
        .filter(|position| affected_range(from, to).contains(position))
        .map(|position| remap_position(position, from, to));

    Some(ReorderOutcome {
        items,
        changed,
        current_moved_to,
    })
}

/// Same as [`reorder`], resolving the dragged item by document key.
pub fn reorder_by_id(
    items: &[PlaylistItem],
    doc_id: &str,
    to: usize,
    current_position: Option<usize>,
) -> Option<ReorderOutcome> {
    let from = items.iter().position(|item| item.doc_id == doc_id)?;
    reorder(items, from, to, current_position)
}

#[cfg(test)]
mod tests {
    use super::{remap_position, reorder, reorder_by_id};
    use crate::playlist::{positions_are_dense, test_items};

    fn keys(items: &[crate::protocol::PlaylistItem]) -> Vec<&str> {
        items.iter().map(|item| item.doc_id.as_str()).collect()
    }

    #[test]
    fn test_reorder_moving_down_shifts_range_up() {
        let items = test_items(&["a", "b", "c", "d"]);
        let outcome = reorder(&items, 1, 3, None).expect("move should apply");

        assert_eq!(keys(&outcome.items), vec!["a", "c", "d", "b"]);
        assert!(positions_are_dense(&outcome.items));
        assert_eq!(keys(&outcome.changed), vec!["c", "d", "b"]);
        assert_eq!(
            outcome.changed.iter().map(|i| i.position).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_reorder_moving_up_shifts_range_down() {
        let items = test_items(&["a", "b", "c", "d", "e"]);
        let outcome = reorder(&items, 3, 1, None).expect("move should apply");

        assert_eq!(keys(&outcome.items), vec!["a", "d", "b", "c", "e"]);
        assert_eq!(keys(&outcome.changed), vec!["d", "b", "c"]);
    }

    #[test]
    fn test_reorder_reports_current_item_new_position() {
        let items = test_items(&["a", "b", "c", "d"]);
        let outcome = reorder(&items, 1, 3, Some(2)).expect("move should apply");
        assert_eq!(outcome.current_moved_to, Some(1));

        let moved_current = reorder(&items, 1, 3, Some(1)).expect("move should apply");
        assert_eq!(moved_current.current_moved_to, Some(3));
    }

    #[test]
    fn test_reorder_leaves_current_outside_range_unreported() {
        let items = test_items(&["a", "b", "c", "d"]);
        let outcome = reorder(&items, 1, 2, Some(3)).expect("move should apply");
        assert_eq!(outcome.current_moved_to, None);
        assert_eq!(outcome.items[3].doc_id, "d");
    }

    #[test]
    fn test_reorder_same_slot_or_out_of_bounds_is_noop() {
        let items = test_items(&["a", "b", "c"]);
        assert!(reorder(&items, 1, 1, None).is_none());
        assert!(reorder(&items, 0, 3, None).is_none());
        assert!(reorder(&items, 5, 0, None).is_none());
        assert!(reorder(&[], 0, 0, None).is_none());
    }

    #[test]
    fn test_reorder_by_id_unknown_key_is_noop() {
        let items = test_items(&["a", "b", "c"]);
        assert!(reorder_by_id(&items, "zz", 0, None).is_none());
        let outcome = reorder_by_id(&items, "c", 0, None).expect("move should apply");
        assert_eq!(keys(&outcome.items), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_reorder_every_pair_is_dense_and_touches_only_the_range() {
        let names = ["a", "b", "c", "d", "e", "f"];
        let items = test_items(&names);
        for from in 0..names.len() {
            for to in 0..names.len() {
                if from == to {
                    continue;
                }
                let outcome = reorder(&items, from, to, None).expect("move should apply");
                assert!(positions_are_dense(&outcome.items));
                assert_eq!(outcome.changed.len(), from.abs_diff(to) + 1);
                assert_eq!(outcome.items[to].doc_id, names[from]);
                for (original, item) in items.iter().enumerate() {
                    let expected = remap_position(original, from, to);
                    assert_eq!(outcome.items[expected].doc_id, item.doc_id);
                    let lo = from.min(to);
                    let hi = from.max(to);
                    if original < lo || original > hi {
                        assert_eq!(expected, original);
                        assert!(!outcome.changed.iter().any(|c| c.doc_id == item.doc_id));
                    }
                }
            }
        }
    }
}

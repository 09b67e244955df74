//! Ordered playlist collection: reorder math and the shared snapshot store.

pub mod ordering;
pub mod store;

use log::warn;

use crate::protocol::PlaylistItem;

/// Returns true when positions equal list indices, i.e. a dense `0..N-1` range in order.
pub fn positions_are_dense(items: &[PlaylistItem]) -> bool {
    items
        .iter()
        .enumerate()
        .all(|(index, item)| item.position == index)
}

/// Sorts by position (stable) and renumbers to a dense `0..N-1` range.
pub fn normalize_positions(mut items: Vec<PlaylistItem>) -> Vec<PlaylistItem> {
    if positions_are_dense(&items) {
        return items;
    }
    items.sort_by_key(|item| item.position);
    let mut renumbered = 0usize;
    for (index, item) in items.iter_mut().enumerate() {
        if item.position != index {
            item.position = index;
            renumbered += 1;
        }
    }
    if renumbered > 0 {
        warn!(
            "Playlist positions were not dense; renumbered {} of {} items",
            renumbered,
            items.len()
        );
    }
    items
}

#[cfg(test)]
pub(crate) fn test_items(keys: &[&str]) -> Vec<PlaylistItem> {
    keys.iter()
        .enumerate()
        .map(|(index, key)| PlaylistItem {
            doc_id: key.to_string(),
            position: index,
            title: format!("Video {}", key),
            subtitle: String::new(),
            description: String::new(),
            thumb: format!("https://cdn.example/{}.jpg", key),
            sources: vec![format!("https://cdn.example/{}.mp4", key)],
            skip: false,
        })
        .collect()
}

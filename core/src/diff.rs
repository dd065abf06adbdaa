//! Identity-keyed list reconciliation.
//!
//! Two snapshots of an ordered list are compared item by item: `Diffable::same_item`
//! decides whether two items are the same entity, `PartialEq` decides whether that
//! entity's content changed. The result is an edit script that turns the old list
//! into the new one with one update per inserted, removed, moved or changed item.

/// Identity check for list items. Content equality comes from `PartialEq`.
pub trait Diffable: PartialEq {
    fn same_item(&self, other: &Self) -> bool;
}

/// One structural update. Updates are applied in order and every position refers
/// to the list as it stands when that update is applied.
///
/// `calculate_diff` emits removals first, then moves, then insertions, then content
/// changes, so `Inserted` and `Changed` positions are always final positions in the
/// new list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListUpdate {
    Inserted { position: usize },
    Removed { position: usize },
    Moved { from: usize, to: usize },
    Changed { position: usize },
}

/// Compute the edit script from `old` to `new`.
///
/// Items in the longest common subsequence of identities stay in place; every
/// other item present in both lists is moved exactly once.
#[must_use]
pub fn calculate_diff<T: Diffable>(old: &[T], new: &[T]) -> Vec<ListUpdate> {
    let matching = match_items(old, new);
    let mut updates = Vec::new();

    // Removals back to front keep earlier positions valid.
    for i in (0..old.len()).rev() {
        if matching.old_to_new[i].is_none() {
            updates.push(ListUpdate::Removed { position: i });
        }
    }

    // Surviving items, in old order, named by their index in `new`.
    let mut current: Vec<usize> = matching.old_to_new.iter().filter_map(|m| *m).collect();

    let mut previous: Option<usize> = None;
    for j in 0..new.len() {
        if matching.new_to_old[j].is_none() {
            continue;
        }
        if !matching.anchored_new[j] {
            let from = position_of(&current, j);
            current.remove(from);
            let to = previous.map_or(0, |p| position_of(&current, p) + 1);
            current.insert(to, j);
            if from != to {
                updates.push(ListUpdate::Moved { from, to });
            }
        }
        previous = Some(j);
    }

    for j in 0..new.len() {
        if matching.new_to_old[j].is_none() {
            updates.push(ListUpdate::Inserted { position: j });
        }
    }

    for (j, item) in new.iter().enumerate() {
        if let Some(i) = matching.new_to_old[j] {
            if old[i] != *item {
                updates.push(ListUpdate::Changed { position: j });
            }
        }
    }

    updates
}

/// Replay an edit script produced by `calculate_diff(old, new)` on a copy of `old`.
#[must_use]
pub fn apply_updates<T: Clone>(old: &[T], new: &[T], updates: &[ListUpdate]) -> Vec<T> {
    let mut items = old.to_vec();
    for update in updates {
        match *update {
            ListUpdate::Inserted { position } => items.insert(position, new[position].clone()),
            ListUpdate::Removed { position } => {
                items.remove(position);
            }
            ListUpdate::Moved { from, to } => {
                let item = items.remove(from);
                items.insert(to, item);
            }
            ListUpdate::Changed { position } => items[position] = new[position].clone(),
        }
    }
    items
}

fn position_of(current: &[usize], new_index: usize) -> usize {
    current
        .iter()
        .position(|&j| j == new_index)
        .unwrap_or(current.len())
}

struct Matching {
    old_to_new: Vec<Option<usize>>,
    new_to_old: Vec<Option<usize>>,
    /// Items of `new` that are part of the common subsequence and never move.
    anchored_new: Vec<bool>,
}

impl Matching {
    fn pair(&mut self, i: usize, j: usize, anchored: bool) {
        self.old_to_new[i] = Some(j);
        self.new_to_old[j] = Some(i);
        self.anchored_new[j] = anchored;
    }
}

fn match_items<T: Diffable>(old: &[T], new: &[T]) -> Matching {
    let mut matching = Matching {
        old_to_new: vec![None; old.len()],
        new_to_old: vec![None; new.len()],
        anchored_new: vec![false; new.len()],
    };

    let mut prefix = 0;
    while prefix < old.len() && prefix < new.len() && old[prefix].same_item(&new[prefix]) {
        matching.pair(prefix, prefix, true);
        prefix += 1;
    }

    let mut suffix = 0;
    while suffix < old.len() - prefix
        && suffix < new.len() - prefix
        && old[old.len() - 1 - suffix].same_item(&new[new.len() - 1 - suffix])
    {
        matching.pair(old.len() - 1 - suffix, new.len() - 1 - suffix, true);
        suffix += 1;
    }

    let old_mid = &old[prefix..old.len() - suffix];
    let new_mid = &new[prefix..new.len() - suffix];
    for (i, j) in longest_common_subsequence(old_mid, new_mid) {
        matching.pair(prefix + i, prefix + j, true);
    }

    // Same identity outside the common subsequence: pair in order of appearance as moves.
    for j in prefix..new.len() - suffix {
        if matching.new_to_old[j].is_some() {
            continue;
        }
        let candidate = (prefix..old.len() - suffix)
            .find(|&i| matching.old_to_new[i].is_none() && old[i].same_item(&new[j]));
        if let Some(i) = candidate {
            matching.pair(i, j, false);
        }
    }

    matching
}

/// Index pairs of one longest common subsequence under `same_item`.
fn longest_common_subsequence<T: Diffable>(old: &[T], new: &[T]) -> Vec<(usize, usize)> {
    let (n, m) = (old.len(), new.len());
    if n == 0 || m == 0 {
        return Vec::new();
    }

    // lengths[i * (m + 1) + j] = LCS length of old[i..] and new[j..]
    let width = m + 1;
    let mut lengths = vec![0u32; (n + 1) * width];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lengths[i * width + j] = if old[i].same_item(&new[j]) {
                lengths[(i + 1) * width + j + 1] + 1
            } else {
                lengths[(i + 1) * width + j].max(lengths[i * width + j + 1])
            };
        }
    }

    let mut pairs = Vec::with_capacity(lengths[0] as usize);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if old[i].same_item(&new[j]) {
            pairs.push((i, j));
            i += 1;
            j += 1;
        } else if lengths[(i + 1) * width + j] >= lengths[i * width + j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: u32,
        label: &'static str,
    }

    impl Diffable for Item {
        fn same_item(&self, other: &Self) -> bool {
            self.id == other.id
        }
    }

    fn items(pairs: &[(u32, &'static str)]) -> Vec<Item> {
        pairs.iter().map(|&(id, label)| Item { id, label }).collect()
    }

    fn ids(ids: &[u32]) -> Vec<Item> {
        ids.iter().map(|&id| Item { id, label: "x" }).collect()
    }

    fn count(updates: &[ListUpdate], pred: fn(&ListUpdate) -> bool) -> usize {
        updates.iter().filter(|u| pred(u)).count()
    }

    fn assert_transforms(old: &[Item], new: &[Item]) -> Vec<ListUpdate> {
        let updates = calculate_diff(old, new);
        assert_eq!(apply_updates(old, new, &updates), new, "script {updates:?}");
        updates
    }

    #[test]
    fn test_identical_lists_produce_nothing() {
        let list = ids(&[1, 2, 3]);
        assert!(calculate_diff(&list, &list).is_empty());
        assert!(calculate_diff::<Item>(&[], &[]).is_empty());
    }

    #[test]
    fn test_insert_into_empty() {
        let updates = assert_transforms(&[], &ids(&[1, 2]));
        assert_eq!(
            updates,
            vec![
                ListUpdate::Inserted { position: 0 },
                ListUpdate::Inserted { position: 1 }
            ]
        );
    }

    #[test]
    fn test_remove_everything() {
        let updates = assert_transforms(&ids(&[1, 2, 3]), &[]);
        assert_eq!(
            updates,
            vec![
                ListUpdate::Removed { position: 2 },
                ListUpdate::Removed { position: 1 },
                ListUpdate::Removed { position: 0 }
            ]
        );
    }

    #[test]
    fn test_insert_in_middle() {
        let updates = assert_transforms(&ids(&[1, 2, 4]), &ids(&[1, 2, 3, 4]));
        assert_eq!(updates, vec![ListUpdate::Inserted { position: 2 }]);
    }

    #[test]
    fn test_content_change_keeps_identity() {
        let old = items(&[(1, "a"), (2, "b"), (3, "c")]);
        let new = items(&[(1, "a"), (2, "B"), (3, "c")]);
        let updates = assert_transforms(&old, &new);
        assert_eq!(updates, vec![ListUpdate::Changed { position: 1 }]);
    }

    #[test]
    fn test_rotation_is_a_single_move() {
        let updates = assert_transforms(&ids(&[1, 2, 3]), &ids(&[2, 3, 1]));
        assert_eq!(updates, vec![ListUpdate::Moved { from: 0, to: 2 }]);

        let updates = assert_transforms(&ids(&[1, 2, 3, 4]), &ids(&[4, 1, 2, 3]));
        assert_eq!(updates, vec![ListUpdate::Moved { from: 3, to: 0 }]);
    }

    #[test]
    fn test_swap_moves_one_item() {
        let updates = assert_transforms(&ids(&[1, 2]), &ids(&[2, 1]));
        assert_eq!(updates.len(), 1);
    }

    #[test]
    fn test_reverse_moves_all_but_one() {
        let updates = assert_transforms(&ids(&[1, 2, 3, 4, 5]), &ids(&[5, 4, 3, 2, 1]));
        assert_eq!(updates.len(), 4);
        assert!(
            updates
                .iter()
                .all(|u| matches!(u, ListUpdate::Moved { .. }))
        );
    }

    #[test]
    fn test_mixed_edit_counts_are_minimal() {
        let old = items(&[(1, "a"), (2, "b"), (3, "c"), (4, "d"), (5, "e")]);
        // id 2 removed, id 6 inserted, id 5 moved to the front, id 3 changed
        let new = items(&[(5, "e"), (1, "a"), (3, "C"), (6, "f"), (4, "d")]);
        let updates = assert_transforms(&old, &new);

        assert_eq!(count(&updates, |u| matches!(u, ListUpdate::Removed { .. })), 1);
        assert_eq!(count(&updates, |u| matches!(u, ListUpdate::Inserted { .. })), 1);
        assert_eq!(count(&updates, |u| matches!(u, ListUpdate::Moved { .. })), 1);
        assert_eq!(count(&updates, |u| matches!(u, ListUpdate::Changed { .. })), 1);
    }

    #[test]
    fn test_moved_and_changed_item() {
        let old = items(&[(1, "a"), (2, "b"), (3, "c")]);
        let new = items(&[(3, "C"), (1, "a"), (2, "b")]);
        let updates = assert_transforms(&old, &new);
        assert_eq!(
            updates,
            vec![
                ListUpdate::Moved { from: 2, to: 0 },
                ListUpdate::Changed { position: 0 }
            ]
        );
    }

    #[test]
    fn test_duplicate_identities_still_transform() {
        // Unsaved rows share identity 0
        let old = items(&[(0, "a"), (0, "b"), (1, "c")]);
        let new = items(&[(1, "c"), (0, "b"), (0, "z"), (0, "y")]);
        assert_transforms(&old, &new);
    }

    fn ordered_selections(pool: &[u32], max_len: usize) -> Vec<Vec<u32>> {
        let mut all = vec![Vec::new()];
        let mut frontier: Vec<Vec<u32>> = vec![Vec::new()];
        for _ in 0..max_len {
            let mut next = Vec::new();
            for case in &frontier {
                for &id in pool {
                    if !case.contains(&id) {
                        let mut extended = case.clone();
                        extended.push(id);
                        next.push(extended);
                    }
                }
            }
            all.extend(next.iter().cloned());
            frontier = next;
        }
        all
    }

    fn longest_increasing_run(values: &[u32]) -> usize {
        let mut best = vec![1usize; values.len()];
        for i in 0..values.len() {
            for j in 0..i {
                if values[j] < values[i] {
                    best[i] = best[i].max(best[j] + 1);
                }
            }
        }
        best.into_iter().max().unwrap_or(0)
    }

    #[test]
    fn test_exhaustive_small_selections() {
        let old = items(&[(1, "a"), (2, "b"), (3, "c"), (4, "d")]);
        for case in ordered_selections(&[1, 2, 3, 4, 5], 4) {
            let new: Vec<Item> = case
                .iter()
                .map(|&id| match id {
                    2 => Item { id, label: "changed" },
                    5 => Item { id, label: "e" },
                    _ => old[(id - 1) as usize].clone(),
                })
                .collect();
            let updates = assert_transforms(&old, &new);

            let survivors: Vec<u32> = case.iter().copied().filter(|&id| id <= 4).collect();
            let inserted = case.len() - survivors.len();
            let removed = 4 - survivors.len();
            let changed = usize::from(case.contains(&2));
            let moved = survivors.len() - longest_increasing_run(&survivors);

            assert_eq!(count(&updates, |u| matches!(u, ListUpdate::Inserted { .. })), inserted);
            assert_eq!(count(&updates, |u| matches!(u, ListUpdate::Removed { .. })), removed);
            assert_eq!(count(&updates, |u| matches!(u, ListUpdate::Changed { .. })), changed);
            assert_eq!(count(&updates, |u| matches!(u, ListUpdate::Moved { .. })), moved);
        }
    }
}

//! Position arithmetic for entry mutations.
//!
//! These functions work on entry rows already sorted by position and return
//! entry ids in their new order. Nothing here touches the database, so every
//! rule is checked before a mutation writes anything.

use core_library::models::PlaylistEntryRow;
use std::collections::{HashMap, HashSet};

use crate::error::{PlaylistError, Result};

/// Ids of the entries currently at `positions`, in the order given.
///
/// Positions are matched against stored positions, which may have gaps
/// after a removal.
pub(crate) fn ids_at(rows: &[PlaylistEntryRow], positions: &[i64]) -> Result<Vec<i64>> {
    let by_position: HashMap<i64, i64> = rows.iter().map(|r| (r.position, r.id)).collect();
    let mut seen = HashSet::with_capacity(positions.len());

    positions
        .iter()
        .map(|position| {
            if !seen.insert(*position) {
                return Err(PlaylistError::validation(format!(
                    "position {} given more than once",
                    position
                )));
            }
            by_position.get(position).copied().ok_or_else(|| {
                PlaylistError::validation(format!("no entry at position {}", position))
            })
        })
        .collect()
}

/// Move the entries at `positions` (kept in playlist order) so the block
/// starts at `destination` of the remaining sequence.
///
/// Positions index the entries in position order, so gaps left by a removal
/// are closed rather than matched.
pub(crate) fn move_block(
    rows: &[PlaylistEntryRow],
    positions: &[i64],
    destination: i64,
) -> Result<Vec<i64>> {
    let moving: HashSet<usize> = block_indices(positions, rows.len())?.into_iter().collect();

    let (block, remaining): (Vec<(usize, i64)>, Vec<(usize, i64)>) = rows
        .iter()
        .map(|r| r.id)
        .enumerate()
        .partition(|(index, _)| moving.contains(index));
    let block: Vec<i64> = block.into_iter().map(|(_, id)| id).collect();
    let mut remaining: Vec<i64> = remaining.into_iter().map(|(_, id)| id).collect();

    let at = destination_index(destination, remaining.len())?;
    remaining.splice(at..at, block);
    Ok(remaining)
}

/// Inverse of [`move_block`]: lift the block of `positions.len()` entries at
/// `destination` and put them back at `positions`, lowest first.
pub(crate) fn restore_block(
    rows: &[PlaylistEntryRow],
    positions: &[i64],
    destination: i64,
) -> Result<Vec<i64>> {
    let mut ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let originals = block_indices(positions, ids.len())?;

    let start = destination_index(destination, ids.len() - originals.len())?;
    let block: Vec<i64> = ids.drain(start..start + originals.len()).collect();

    // Ascending inserts land each entry exactly on its original index.
    for (index, id) in originals.into_iter().zip(block) {
        ids.insert(index, id);
    }
    Ok(ids)
}

/// Validated, ascending sequence indices for a reorder block.
fn block_indices(positions: &[i64], len: usize) -> Result<Vec<usize>> {
    let mut indices = Vec::with_capacity(positions.len());
    let mut seen = HashSet::with_capacity(positions.len());
    for &position in positions {
        if !seen.insert(position) {
            return Err(PlaylistError::validation(format!(
                "position {} given more than once",
                position
            )));
        }
        match usize::try_from(position) {
            Ok(index) if index < len => indices.push(index),
            _ => {
                return Err(PlaylistError::validation(format!(
                    "position {} is outside 0..{}",
                    position, len
                )))
            }
        }
    }
    indices.sort_unstable();
    Ok(indices)
}

/// Where each re-added entry goes: `(requested position, entry id)` pairs
/// are inserted lowest position first into `order`, clamped to its length.
pub(crate) fn insert_at_positions(mut order: Vec<i64>, mut placed: Vec<(i64, i64)>) -> Vec<i64> {
    placed.sort_by_key(|(position, _)| *position);
    for (position, id) in placed {
        let index = usize::try_from(position).unwrap_or(0).min(order.len());
        order.insert(index, id);
    }
    order
}

/// True when positions already run `0..n` without gaps.
pub(crate) fn is_dense(rows: &[PlaylistEntryRow]) -> bool {
    rows.iter()
        .enumerate()
        .all(|(index, row)| row.position == index as i64)
}

fn destination_index(destination: i64, bound: usize) -> Result<usize> {
    usize::try_from(destination)
        .ok()
        .filter(|index| *index <= bound)
        .ok_or_else(|| {
            PlaylistError::validation(format!(
                "destination {} is outside 0..={}",
                destination, bound
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Rows with ids 100.. at the given positions.
    fn rows(positions: &[i64]) -> Vec<PlaylistEntryRow> {
        positions
            .iter()
            .enumerate()
            .map(|(i, position)| PlaylistEntryRow {
                id: 100 + i as i64,
                playlist_id: 1,
                position: *position,
                entry_kind: "album".to_string(),
                music_file_id: None,
                remote_track_id: None,
                nested_playlist_id: None,
                requested_track_id: None,
                album_artist: Some("A".to_string()),
                album_title: Some("B".to_string()),
            })
            .collect()
    }

    fn dense(n: i64) -> Vec<PlaylistEntryRow> {
        rows(&(0..n).collect::<Vec<_>>())
    }

    fn offsets(ids: &[i64]) -> Vec<i64> {
        ids.iter().map(|id| id - 100).collect()
    }

    #[test]
    fn test_move_block_to_front() {
        let order = move_block(&dense(10), &[1, 3], 0).unwrap();
        assert_eq!(offsets(&order), vec![1, 3, 0, 2, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_move_block_keeps_playlist_order_of_block() {
        let order = move_block(&dense(5), &[3, 1], 3).unwrap();
        assert_eq!(offsets(&order), vec![0, 2, 4, 1, 3]);
    }

    #[test]
    fn test_restore_block_inverts_move() {
        let cases: &[(&[i64], i64)] = &[(&[1, 3], 0), (&[0, 9], 4), (&[2, 3, 4], 7), (&[5], 5)];
        for (positions, destination) in cases {
            let moved = move_block(&dense(10), positions, *destination).unwrap();
            let moved_rows: Vec<PlaylistEntryRow> = moved
                .iter()
                .enumerate()
                .map(|(position, id)| PlaylistEntryRow {
                    id: *id,
                    position: position as i64,
                    ..dense(1).remove(0)
                })
                .collect();

            let restored = restore_block(&moved_rows, positions, *destination).unwrap();
            assert_eq!(offsets(&restored), (0..10).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_invalid_positions_and_destinations() {
        assert!(matches!(
            move_block(&dense(4), &[1, 1], 0),
            Err(PlaylistError::Validation(_))
        ));
        assert!(move_block(&dense(4), &[7], 0).is_err());
        assert!(move_block(&dense(4), &[-1], 0).is_err());
        // Two entries remain after lifting two, so 3 is out of range.
        assert!(move_block(&dense(4), &[0, 1], 3).is_err());
        assert!(move_block(&dense(4), &[0, 1], 2).is_ok());

        assert!(restore_block(&dense(4), &[0, 4], 0).is_err());
        assert!(restore_block(&dense(4), &[0, 1], 3).is_err());
    }

    #[test]
    fn test_move_block_indexes_past_gaps() {
        let gapped = rows(&[0, 2, 4]);
        let moved = move_block(&gapped, &[2], 0).unwrap();
        assert_eq!(offsets(&moved), vec![2, 0, 1]);
        assert!(move_block(&gapped, &[4], 0).is_err());

        let moved_rows: Vec<PlaylistEntryRow> = moved
            .iter()
            .enumerate()
            .map(|(position, id)| PlaylistEntryRow {
                id: *id,
                position: position as i64,
                ..dense(1).remove(0)
            })
            .collect();
        let restored = restore_block(&moved_rows, &[2], 0).unwrap();
        assert_eq!(offsets(&restored), vec![0, 1, 2]);
    }

    #[test]
    fn test_ids_at_follows_stored_positions_with_gaps() {
        let gapped = rows(&[0, 2, 5]);
        assert_eq!(offsets(&ids_at(&gapped, &[5, 0]).unwrap()), vec![2, 0]);
        assert!(ids_at(&gapped, &[1]).is_err());
        assert!(!is_dense(&gapped));
        assert!(is_dense(&dense(3)));
    }

    #[test]
    fn test_insert_at_positions_clamps_and_sorts() {
        let order = insert_at_positions(vec![1, 2, 3], vec![(10, 9), (0, 7), (2, 8)]);
        assert_eq!(order, vec![7, 1, 8, 2, 3, 9]);
    }
}

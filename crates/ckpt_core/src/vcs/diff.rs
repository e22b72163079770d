//! Change statistics between two path maps.

use super::tree::PathMap;
use super::DiffStat;
use crate::error::Result;
use crate::ObjectStore;

/// Bytes inspected for a NUL when deciding whether a blob is binary.
const BINARY_PROBE: usize = 8 * 1024;

/// Above this many cells the line matcher gives up and counts every
/// remaining line as changed.
const MAX_LCS_CELLS: usize = 4_000_000;

/// Counts files and lines that differ between `old` and `new`.
pub(crate) fn diff_maps(store: &ObjectStore, old: &PathMap, new: &PathMap) -> Result<DiffStat> {
    let mut stat = DiffStat::default();

    for (path, new_id) in new {
        match old.get(path) {
            Some(old_id) if old_id == new_id => {}
            Some(old_id) => {
                stat.files += 1;
                let before = store.get_blob(*old_id)?;
                let after = store.get_blob(*new_id)?;
                let (ins, del) = line_changes(&before, &after);
                stat.insertions += ins;
                stat.deletions += del;
            }
            None => {
                stat.files += 1;
                let after = store.get_blob(*new_id)?;
                if !is_binary(&after) {
                    stat.insertions += count_lines(&after);
                }
            }
        }
    }

    for (path, old_id) in old {
        if !new.contains_key(path) {
            stat.files += 1;
            let before = store.get_blob(*old_id)?;
            if !is_binary(&before) {
                stat.deletions += count_lines(&before);
            }
        }
    }

    Ok(stat)
}

fn is_binary(data: &[u8]) -> bool {
    data[..data.len().min(BINARY_PROBE)].contains(&0)
}

fn split_lines(data: &[u8]) -> Vec<&[u8]> {
    if data.is_empty() {
        return Vec::new();
    }
    let body = data.strip_suffix(b"\n").unwrap_or(data);
    body.split(|b| *b == b'\n').collect()
}

fn count_lines(data: &[u8]) -> usize {
    split_lines(data).len()
}

/// Returns `(insertions, deletions)` for a modified file. Binary files count zero lines.
fn line_changes(before: &[u8], after: &[u8]) -> (usize, usize) {
    if is_binary(before) || is_binary(after) {
        return (0, 0);
    }

    let old = split_lines(before);
    let new = split_lines(after);

    let prefix = old.iter().zip(&new).take_while(|(a, b)| a == b).count();
    let old = &old[prefix..];
    let new = &new[prefix..];
    let suffix = old
        .iter()
        .rev()
        .zip(new.iter().rev())
        .take_while(|(a, b)| a == b)
        .count();
    let old = &old[..old.len() - suffix];
    let new = &new[..new.len() - suffix];

    let common = if old.len().saturating_mul(new.len()) > MAX_LCS_CELLS {
        0
    } else {
        lcs_len(old, new)
    };

    (new.len() - common, old.len() - common)
}

/// Length of the longest common subsequence, two rows at a time.
fn lcs_len(a: &[&[u8]], b: &[&[u8]]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for line_a in a {
        for (j, line_b) in b.iter().enumerate() {
            curr[j + 1] = if line_a == line_b {
                prev[j] + 1
            } else {
                curr[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

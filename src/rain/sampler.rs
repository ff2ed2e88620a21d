use std::collections::BTreeMap;

use super::PositionedChar;

pub const MIN_ROW_QUOTA: usize = 5;

/// Picks the characters that get animated and marks every other one as revealed.
///
/// Returns indices into `chars`, ordered row by row. When everything fits in `budget`
/// all indices are returned untouched. Otherwise each row gets `max(5, budget / rows)`
/// evenly spaced picks until the budget is used up.
pub fn sample(chars: &mut [PositionedChar], budget: usize) -> Vec<usize> {
    if chars.len() <= budget {
        return (0..chars.len()).collect();
    }

    let mut rows: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (idx, c) in chars.iter().enumerate() {
        rows.entry(c.y).or_default().push(idx);
    }

    let quota = (budget / rows.len()).max(MIN_ROW_QUOTA);
    let mut selected = Vec::with_capacity(budget);
    for row in rows.values() {
        if row.len() <= quota {
            selected.extend_from_slice(row);
        } else {
            selected.extend((0..quota).map(|i| row[i * row.len() / quota]));
        }
        if selected.len() >= budget { break; }
    }
    selected.truncate(budget);

    let mut keep = vec![false; chars.len()];
    for &idx in &selected { keep[idx] = true; }
    for (c, animated) in chars.iter_mut().zip(keep) {
        if !animated { c.revealed = true; }
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_of(y: usize, n: usize) -> Vec<PositionedChar> {
        (0..n).map(|x| PositionedChar { glyph: 'x', x, y, revealed: false }).collect()
    }

    #[test]
    fn small_inputs_are_fully_animated() {
        let mut chars = row_of(3, 10);
        assert_eq!(sample(&mut chars, 300), (0..10).collect::<Vec<_>>());
        assert!(chars.iter().all(|c| !c.revealed));
    }

    #[test]
    fn picks_are_evenly_spaced_within_a_row() {
        let mut chars = row_of(0, 20);
        let picked = sample(&mut chars, 5);
        assert_eq!(picked, vec![0, 4, 8, 12, 16]);
        assert_eq!(chars.iter().filter(|c| !c.revealed).count(), 5);
    }

    #[test]
    fn every_row_is_represented() {
        let mut chars = Vec::new();
        for y in 0..15 { chars.extend(row_of(y, 70)); }
        let picked = sample(&mut chars, 300);
        assert_eq!(picked.len(), 300);
        for y in 0..15 {
            assert!(picked.iter().any(|&i| chars[i].y == y), "row {y} has no animated glyph");
        }
    }

    #[test]
    fn unselected_characters_are_pre_revealed() {
        let mut chars = Vec::new();
        for y in 0..4 { chars.extend(row_of(y, 100)); }
        let picked = sample(&mut chars, 40);
        assert_eq!(picked.len(), 40);
        for (i, c) in chars.iter().enumerate() {
            assert_eq!(c.revealed, !picked.contains(&i));
        }
    }

    #[test]
    fn minimum_quota_can_exhaust_the_budget_early() {
        let mut chars = Vec::new();
        for y in 0..10 { chars.extend(row_of(y, 10)); }
        // budget / rows = 1, raised to the minimum quota of 5
        let picked = sample(&mut chars, 12);
        assert_eq!(picked.len(), 12);
        assert!(picked.iter().all(|&i| chars[i].y <= 2));
    }
}

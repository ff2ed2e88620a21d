use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;

use super::layout::FOOTER_ROWS;
use super::lanes::Lane;
use super::{Grid, PositionedChar};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CellStyle { Rain, Lead, Text, Border }

/// A cell-addressable character target. Writes outside the surface are ignored.
pub trait Surface {
    fn clear(&mut self);
    fn put(&mut self, row: usize, col: usize, glyph: char, style: CellStyle);
}

const H_LINE: char = '─';
const V_LINE: char = '│';
const CORNERS: [char; 4] = ['┌', '┐', '└', '┘'];

fn drawable_rows(grid: Grid) -> usize { grid.height.saturating_sub(FOOTER_ROWS) }

/// Draws the glyph chains of active lanes. When more than `budget` lanes are active a
/// fresh random subset is drawn, so the full set still reads as motion over a few frames.
pub fn draw_lanes<R: Rng + ?Sized>(
    surface: &mut dyn Surface,
    lanes: &[Lane],
    grid: Grid,
    chain_on_screen: usize,
    budget: usize,
    rng: &mut R,
) {
    let mut columns: Vec<usize> = lanes.iter().enumerate().filter(|(_, l)| l.active).map(|(i, _)| i).collect();
    if columns.len() > budget {
        columns.shuffle(rng);
        columns.truncate(budget);
    }
    let rows = drawable_rows(grid) as isize;
    for col in columns {
        let lane = &lanes[col];
        let head = lane.head_row();
        for (j, &glyph) in lane.chain.iter().take(chain_on_screen).enumerate() {
            let row = head - j as isize;
            if row < 0 || row >= rows || col >= grid.width { continue; }
            let style = if j == 0 && !lane.is_decorative() { CellStyle::Lead } else { CellStyle::Rain };
            surface.put(row as usize, col, glyph, style);
        }
    }
}

/// Draws every revealed character, left to right per row, inside a border hugging
/// their bounding box.
pub fn draw_revealed(surface: &mut dyn Surface, chars: &[PositionedChar], grid: Grid) {
    let mut by_row: BTreeMap<usize, Vec<&PositionedChar>> = BTreeMap::new();
    for c in chars.iter().filter(|c| c.revealed) {
        by_row.entry(c.y).or_default().push(c);
    }
    if by_row.is_empty() { return; }
    for row in by_row.values_mut() { row.sort_by_key(|c| c.x); }

    let (Some(&first), Some(&last)) = (by_row.keys().next(), by_row.keys().next_back()) else { return };
    let left  = by_row.values().filter_map(|r| r.first()).map(|c| c.x).min().unwrap_or(0);
    let right = by_row.values().filter_map(|r| r.last()).map(|c| c.x).max().unwrap_or(0);
    let top    = first.saturating_sub(1);
    let bottom = (last + 1).min(drawable_rows(grid).saturating_sub(1));
    let left   = left.saturating_sub(2);
    let right  = (right + 2).min(grid.width.saturating_sub(1));
    draw_border(surface, top, bottom, left, right);

    for row in by_row.values() {
        for c in row {
            if c.y < drawable_rows(grid) && c.x < grid.width {
                surface.put(c.y, c.x, c.glyph, CellStyle::Text);
            }
        }
    }
}

fn draw_border(surface: &mut dyn Surface, top: usize, bottom: usize, left: usize, right: usize) {
    if bottom <= top || right <= left { return; }
    for x in left..=right {
        surface.put(top, x, H_LINE, CellStyle::Border);
        surface.put(bottom, x, H_LINE, CellStyle::Border);
    }
    for y in top + 1..bottom {
        surface.put(y, left, V_LINE, CellStyle::Border);
        surface.put(y, right, V_LINE, CellStyle::Border);
    }
    surface.put(top, left, CORNERS[0], CellStyle::Border);
    surface.put(top, right, CORNERS[1], CellStyle::Border);
    surface.put(bottom, left, CORNERS[2], CellStyle::Border);
    surface.put(bottom, right, CORNERS[3], CellStyle::Border);
}

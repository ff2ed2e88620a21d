use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use super::{Grid, PositionedChar};

pub const FOOTER_ROWS: usize = 3;
pub const HORIZONTAL_MARGIN: usize = 8;
pub const LEFT_MARGIN: usize = 2;
pub const MAX_LINES: usize = 15;
pub const TRUNCATION_MARKER: &str = "... (Response truncated)";

fn cell_width(ch: char) -> usize { UnicodeWidthChar::width(ch).unwrap_or(0) }

fn keep_char(ch: char) -> bool {
    ch.is_whitespace() || (!ch.is_control() && cell_width(ch) > 0)
}

/// Strips control and zero-width characters so every kept glyph owns at least one cell.
pub fn sanitize(text: &str) -> String {
    text.chars().filter(|&c| keep_char(c)).collect()
}

fn split_word(word: &str, max: usize) -> Vec<String> {
    let mut fragments = Vec::new();
    let mut current = String::new();
    let mut current_w = 0;
    for ch in word.chars() {
        let w = cell_width(ch);
        if current_w + w > max && !current.is_empty() {
            fragments.push(std::mem::take(&mut current));
            current_w = 0;
        }
        current.push(ch);
        current_w += w;
    }
    if !current.is_empty() { fragments.push(current); }
    let last = fragments.len().saturating_sub(1);
    for f in fragments.iter_mut().take(last) { f.push('-'); }
    fragments
}

/// Greedy word wrap. Words wider than `width - 2` are hard-split and every fragment
/// except the last carries a trailing `-`.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let split_at = width.saturating_sub(2).max(1);
    let mut lines = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_w = 0;
    for word in text.split_whitespace() {
        let w = UnicodeWidthStr::width(word);
        if w > split_at {
            if !current.is_empty() {
                lines.push(current.join(" "));
                current.clear();
                current_w = 0;
            }
            lines.extend(split_word(word, split_at));
            continue;
        }
        let sep = usize::from(!current.is_empty());
        if current.is_empty() || current_w + sep + w <= width {
            current.push(word);
            current_w += sep + w;
        } else {
            lines.push(current.join(" "));
            current = vec![word];
            current_w = w;
        }
    }
    if !current.is_empty() { lines.push(current.join(" ")); }
    lines
}

pub fn max_visible_lines(grid: Grid) -> usize {
    grid.height.saturating_sub(8).min(MAX_LINES).max(1)
}

/// Wraps, truncates and centres `text` on `grid`, returning one entry per visible
/// non-space glyph. Rows that fall into the footer and cells past the right edge are
/// dropped.
pub fn layout(text: &str, grid: Grid) -> Vec<PositionedChar> {
    let wrap_width = grid.width.saturating_sub(HORIZONTAL_MARGIN);
    let mut lines = wrap_text(&sanitize(text), wrap_width);
    let max_lines = max_visible_lines(grid);
    if lines.len() > max_lines {
        lines.truncate(max_lines - 1);
        lines.push(TRUNCATION_MARKER.to_string());
    }

    let anchor = (grid.height / 2) as isize - 5;
    let top = (anchor - (lines.len() / 2) as isize).max(1);
    let bottom = grid.height.saturating_sub(FOOTER_ROWS) as isize;

    let mut out = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        let y = top + i as isize;
        if y < 0 || y >= bottom { continue; }
        let slack = wrap_width as isize - UnicodeWidthStr::width(line.as_str()) as isize;
        let mut x = LEFT_MARGIN as isize + slack.div_euclid(2);
        for ch in line.chars() {
            let w = cell_width(ch) as isize;
            if ch != ' ' && x >= 0 && x + w <= grid.width as isize {
                out.push(PositionedChar { glyph: ch, x: x as usize, y: y as usize, revealed: false });
            }
            x += w;
        }
    }
    out
}

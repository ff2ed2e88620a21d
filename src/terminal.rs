use std::io::{self, Write};

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute, queue,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor},
    terminal::{
        self, BeginSynchronizedUpdate, Clear, ClearType, DisableLineWrap, EnableLineWrap,
        EndSynchronizedUpdate, EnterAlternateScreen, LeaveAlternateScreen,
    },
};
use unicode_width::UnicodeWidthChar;

use crate::config::{Config, RainColor};
use crate::rain::{CellStyle, Surface};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Paint { Plain, Rain, Lead, Text, Border, Status, Heading }

impl From<CellStyle> for Paint {
    fn from(style: CellStyle) -> Self {
        match style {
            CellStyle::Rain   => Paint::Rain,
            CellStyle::Lead   => Paint::Lead,
            CellStyle::Text   => Paint::Text,
            CellStyle::Border => Paint::Border,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Palette { pub rain: Color, pub text: Color }

impl Palette {
    pub fn from_config(config: &Config) -> Self {
        Self { rain: term_color(config.rain_color), text: term_color(config.text_color) }
    }
    fn ink(&self, paint: Paint) -> (Color, Option<Attribute>) {
        match paint {
            Paint::Plain   => (Color::Reset, None),
            Paint::Rain    => (self.rain, None),
            Paint::Border  => (self.rain, None),
            Paint::Lead    => (self.text, Some(Attribute::Bold)),
            Paint::Text    => (self.text, Some(Attribute::Bold)),
            Paint::Heading => (Color::Reset, Some(Attribute::Bold)),
            Paint::Status  => (Color::DarkGrey, Some(Attribute::Italic)),
        }
    }
}

pub fn term_color(c: RainColor) -> Color {
    match c {
        RainColor::Green   => Color::Green,
        RainColor::Red     => Color::Red,
        RainColor::Blue    => Color::Blue,
        RainColor::Cyan    => Color::Cyan,
        RainColor::Magenta => Color::Magenta,
        RainColor::Yellow  => Color::Yellow,
        RainColor::White   => Color::White,
    }
}

/// `width == 0` marks the right half of a double-width glyph.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cell { pub ch: char, pub paint: Paint, pub width: u8 }

impl Default for Cell {
    fn default() -> Self { Self { ch: ' ', paint: Paint::Plain, width: 1 } }
}

/// Off-screen cell buffer. `flush` sends only the cells that changed since the last flush.
pub struct Screen {
    width:    usize,
    height:   usize,
    cells:    Vec<Cell>,
    previous: Option<Vec<Cell>>,
}

impl Screen {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height, cells: vec![Cell::default(); width * height], previous: None }
    }

    pub fn width(&self) -> usize { self.width }
    pub fn height(&self) -> usize { self.height }

    pub fn resize(&mut self, width: usize, height: usize) {
        *self = Self::new(width, height);
    }

    /// Forces the next flush to repaint everything.
    pub fn invalidate(&mut self) { self.previous = None; }

    pub fn cell(&self, row: usize, col: usize) -> Option<Cell> {
        (row < self.height && col < self.width).then(|| self.cells[row * self.width + col])
    }

    fn blank(&mut self, row: usize, col: usize) {
        if row < self.height && col < self.width { self.cells[row * self.width + col] = Cell::default(); }
    }

    pub fn put_char(&mut self, row: usize, col: usize, ch: char, paint: Paint) -> usize {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0).clamp(1, 2);
        if row >= self.height || col + w > self.width { return w; }
        let idx = row * self.width + col;
        if self.cells[idx].width == 0 && col > 0 { self.blank(row, col - 1); }
        if self.cells[idx].width == 2 { self.blank(row, col + 1); }
        self.cells[idx] = Cell { ch, paint, width: w as u8 };
        if w == 2 {
            if self.cells[idx + 1].width == 2 { self.blank(row, col + 2); }
            self.cells[idx + 1] = Cell { ch: ' ', paint, width: 0 };
        }
        w
    }

    /// Writes `text` from `col`, clipped at the right edge. Returns the column after it.
    pub fn put_str(&mut self, row: usize, col: usize, text: &str, paint: Paint) -> usize {
        let mut x = col;
        for ch in text.chars().filter(|c| !c.is_control()) {
            if x >= self.width { break; }
            x += self.put_char(row, x, ch, paint);
        }
        x
    }

    pub fn fill_rows(&mut self, from: usize, to: usize) {
        for row in from..to.min(self.height) {
            for col in 0..self.width { self.blank(row, col); }
        }
    }

    pub fn draw_box(&mut self, top: usize, left: usize, width: usize, height: usize, paint: Paint) {
        if width < 2 || height < 2 { return; }
        let (right, bottom) = (left + width - 1, top + height - 1);
        for x in left + 1..right {
            self.put_char(top, x, '─', paint);
            self.put_char(bottom, x, '─', paint);
        }
        for y in top + 1..bottom {
            self.put_char(y, left, '│', paint);
            self.put_char(y, right, '│', paint);
        }
        self.put_char(top, left, '┌', paint);
        self.put_char(top, right, '┐', paint);
        self.put_char(bottom, left, '└', paint);
        self.put_char(bottom, right, '┘', paint);
    }

    pub fn row_text(&self, row: usize) -> String {
        if row >= self.height { return String::new(); }
        self.cells[row * self.width..(row + 1) * self.width].iter().filter(|c| c.width > 0).map(|c| c.ch).collect()
    }

    pub fn flush<W: Write>(&mut self, out: &mut W, palette: &Palette) -> io::Result<()> {
        queue!(out, BeginSynchronizedUpdate)?;
        let mut pen: Option<Paint> = None;
        let mut cursor: Option<(usize, usize)> = None;
        for row in 0..self.height {
            for col in 0..self.width {
                let idx = row * self.width + col;
                let cell = self.cells[idx];
                let unchanged = self.previous.as_ref().is_some_and(|p| p[idx] == cell);
                if unchanged || cell.width == 0 { continue; }
                if cursor != Some((row, col)) { queue!(out, MoveTo(col as u16, row as u16))?; }
                if pen != Some(cell.paint) {
                    let (color, attr) = palette.ink(cell.paint);
                    queue!(out, SetAttribute(Attribute::Reset), SetForegroundColor(color))?;
                    if let Some(attr) = attr { queue!(out, SetAttribute(attr))?; }
                    pen = Some(cell.paint);
                }
                queue!(out, Print(cell.ch))?;
                cursor = Some((row, col + cell.width as usize));
            }
        }
        queue!(out, SetAttribute(Attribute::Reset), ResetColor, EndSynchronizedUpdate)?;
        out.flush()?;
        self.previous = Some(self.cells.clone());
        Ok(())
    }
}

impl Surface for Screen {
    fn clear(&mut self) { self.cells.fill(Cell::default()); }
    fn put(&mut self, row: usize, col: usize, glyph: char, style: CellStyle) {
        self.put_char(row, col, glyph, style.into());
    }
}

/// Raw mode plus alternate screen for as long as the guard lives.
pub struct TerminalGuard;

impl TerminalGuard {
    pub fn enter() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        execute!(io::stdout(), EnterAlternateScreen, Hide, DisableLineWrap, Clear(ClearType::All))?;
        Ok(Self)
    }

    pub fn size() -> io::Result<(usize, usize)> {
        let (w, h) = terminal::size()?;
        Ok((w as usize, h as usize))
    }
}

pub fn restore_terminal() {
    let _ = terminal::disable_raw_mode();
    let _ = execute!(io::stdout(), SetAttribute(Attribute::Reset), ResetColor, EnableLineWrap, Show, LeaveAlternateScreen);
}

impl Drop for TerminalGuard {
    fn drop(&mut self) { restore_terminal(); }
}

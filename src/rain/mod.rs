//! Falling-code reveal animation.
//!
//! Text is laid out on a fixed grid, a representative subset of its glyphs is handed to
//! falling lanes, and every glyph ends up revealed within a bounded number of frames.

pub mod engine;
pub mod glyph;
pub mod lanes;
pub mod layout;
pub mod render;
pub mod sampler;

pub use engine::{EngineConfig, FinishReason, Phase, RevealEngine};
pub use lanes::Lane;
pub use render::{CellStyle, Surface};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Grid {
    pub width:  usize,
    pub height: usize,
}

impl Grid {
    pub fn new(width: usize, height: usize) -> Self { Self { width, height } }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PositionedChar {
    pub glyph:    char,
    pub x:        usize,
    pub y:        usize,
    pub revealed: bool,
}

use std::time::{Duration, Instant};

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::lanes::{Lane, LanePool, DECORATIVE_CAP, HARD_COLUMN_CAP};
use super::layout::layout;
use super::render::{draw_lanes, draw_revealed, Surface};
use super::sampler::sample;
use super::{Grid, PositionedChar};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase { Idle, Running, Done }

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinishReason { AllRevealed, LanesExhausted, TimedOut }

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub frame_interval:    Duration,
    pub max_duration:      Duration,
    /// Most glyphs that get a falling lane; the rest appear at once.
    pub animation_budget:  usize,
    pub column_cap:        usize,
    pub decorative_cap:    usize,
    /// Most lanes drawn in one frame.
    pub draw_budget:       usize,
    pub chain_on_screen:   usize,
    pub reveal_quota:      usize,
    pub endgame_quota:     usize,
    pub endgame_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frame_interval:    Duration::from_millis(30),
            max_duration:      Duration::from_secs(15),
            animation_budget:  300,
            column_cap:        HARD_COLUMN_CAP,
            decorative_cap:    DECORATIVE_CAP,
            draw_budget:       100,
            chain_on_screen:   10,
            reveal_quota:      3,
            endgame_quota:     5,
            endgame_threshold: 20,
        }
    }
}

impl EngineConfig {
    /// Upper bound on the ticks a run can take before the time cutoff fires.
    pub fn max_ticks(&self) -> u32 {
        let interval = self.frame_interval.as_nanos().max(1);
        self.max_duration.as_nanos().div_ceil(interval) as u32 + 1
    }
}

/// Owns one animation run at a time. Only the host's tick loop touches it.
pub struct RevealEngine<R: Rng = StdRng> {
    config:      EngineConfig,
    rng:         R,
    grid:        Grid,
    source_text: String,
    chars:       Vec<PositionedChar>,
    lanes:       LanePool,
    phase:       Phase,
    started_at:  Instant,
    ticks:       u32,
    finish:      Option<FinishReason>,
}

impl RevealEngine<StdRng> {
    pub fn new(config: EngineConfig) -> Self { Self::with_rng(config, StdRng::from_entropy()) }
}

impl Default for RevealEngine<StdRng> {
    fn default() -> Self { Self::new(EngineConfig::default()) }
}

impl<R: Rng> RevealEngine<R> {
    pub fn with_rng(config: EngineConfig, mut rng: R) -> Self {
        let grid = Grid::default();
        let lanes = LanePool::new(grid, &mut rng);
        Self {
            config, rng, grid, source_text: String::new(), chars: Vec::new(), lanes,
            phase: Phase::Idle, started_at: Instant::now(), ticks: 0, finish: None,
        }
    }

    pub fn config(&self) -> &EngineConfig { &self.config }
    pub fn phase(&self) -> Phase { self.phase }
    pub fn finish_reason(&self) -> Option<FinishReason> { self.finish }
    pub fn grid(&self) -> Grid { self.grid }
    pub fn source_text(&self) -> &str { &self.source_text }
    pub fn characters(&self) -> &[PositionedChar] { &self.chars }
    pub fn lanes(&self) -> &[Lane] { self.lanes.lanes() }
    pub fn ticks(&self) -> u32 { self.ticks }
    pub fn unrevealed(&self) -> usize { self.chars.iter().filter(|c| !c.revealed).count() }

    /// Starts a new run for `text`, discarding whatever run was in flight.
    pub fn submit(&mut self, text: &str, grid: Grid) {
        self.grid = grid;
        self.source_text = text.to_string();
        self.chars = layout(text, grid);
        let animated = sample(&mut self.chars, self.config.animation_budget);
        self.lanes = LanePool::new(grid, &mut self.rng);
        self.lanes.assign(&self.chars, &animated, self.config.column_cap, self.config.decorative_cap, &mut self.rng);
        self.phase = Phase::Running;
        self.started_at = Instant::now();
        self.ticks = 0;
        self.finish = None;
        debug!(
            "reveal run: {}x{} grid, {} glyphs, {} animated, {} target lanes, {} active lanes",
            grid.width, grid.height, self.chars.len(), animated.len(),
            self.lanes.target_count(), self.lanes.active_count()
        );
    }

    /// Re-lays the current text out on a new grid. A finished run stays finished.
    pub fn resize(&mut self, grid: Grid) {
        if grid == self.grid || self.phase == Phase::Idle { return; }
        let was_done = self.phase == Phase::Done;
        let text = std::mem::take(&mut self.source_text);
        self.submit(&text, grid);
        if was_done { self.finish_now(FinishReason::AllRevealed); }
    }

    fn elapsed(&self) -> Duration {
        self.started_at.elapsed().max(self.config.frame_interval * self.ticks)
    }

    fn finish_now(&mut self, reason: FinishReason) {
        for c in &mut self.chars { c.revealed = true; }
        self.phase = Phase::Done;
        self.finish = Some(reason);
        match reason {
            FinishReason::TimedOut => info!("reveal run hit the {:?} cutoff after {} ticks", self.config.max_duration, self.ticks),
            _ => debug!("reveal run finished ({reason:?}) after {} ticks", self.ticks),
        }
    }

    /// Advances one frame. Does nothing unless a run is in progress.
    pub fn tick(&mut self) {
        if self.phase != Phase::Running { return; }
        self.ticks += 1;
        if self.elapsed() > self.config.max_duration {
            self.finish_now(FinishReason::TimedOut);
            return;
        }

        let before = self.unrevealed();
        let mut natural = 0;
        for idx in self.lanes.advance(&self.chars, &mut self.rng) {
            let target = &mut self.chars[idx];
            if !target.revealed {
                target.revealed = true;
                natural += 1;
            }
        }

        let mut pending: Vec<usize> = (0..self.chars.len()).filter(|&i| !self.chars[i].revealed).collect();
        // endgame is judged on what was hidden when the tick started
        let endgame = before > 0 && before < self.config.endgame_threshold;
        let quota = if endgame { self.config.endgame_quota } else { self.config.reveal_quota };
        // uniform pick, independent of how close each glyph's lane is
        for _ in 0..quota.saturating_sub(natural).min(pending.len()) {
            let idx = pending.swap_remove(self.rng.gen_range(0..pending.len()));
            self.chars[idx].revealed = true;
        }

        if pending.is_empty() {
            self.finish_now(FinishReason::AllRevealed);
        } else if !self.lanes.any_active() {
            self.finish_now(FinishReason::LanesExhausted);
        }
    }

    /// Draws the current frame: lanes while running, then every revealed glyph.
    pub fn render(&mut self, surface: &mut dyn Surface) {
        surface.clear();
        match self.phase {
            Phase::Idle => return,
            Phase::Running => {
                let c = &self.config;
                draw_lanes(surface, self.lanes.lanes(), self.grid, c.chain_on_screen, c.draw_budget, &mut self.rng);
            }
            Phase::Done => {}
        }
        draw_revealed(surface, &self.chars, self.grid);
    }

    #[cfg(test)]
    pub(crate) fn lanes_mut(&mut self) -> &mut [Lane] { self.lanes.lanes_mut() }
}

use rand::seq::SliceRandom;
use rand::Rng;

use super::glyph::{random_chain, random_glyph};
use super::{Grid, PositionedChar};

pub const HARD_COLUMN_CAP: usize = 100;
pub const DECORATIVE_CAP: usize = 20;

const DRIFT_SPEED: std::ops::Range<f32> = 0.8..2.0;
const TARGET_SPEED: std::ops::Range<f32> = 0.8..1.5;

#[derive(Clone, Debug, PartialEq)]
pub struct Lane {
    pub position: f32,
    pub speed:    f32,
    pub chain:    Vec<char>,
    pub active:   bool,
    pub target:   Option<usize>,
    pub locked:   bool,
}

impl Lane {
    fn parked<R: Rng + ?Sized>(rng: &mut R, height: usize) -> Self {
        Self {
            position: rng.gen_range(-(height as i32)..=0) as f32,
            speed:    rng.gen_range(DRIFT_SPEED),
            chain:    Vec::new(),
            active:   false,
            target:   None,
            locked:   false,
        }
    }
    pub fn is_decorative(&self) -> bool { self.target.is_none() }
    pub fn head_row(&self) -> isize { self.position.floor() as isize }
}

/// One lane per grid column. Lanes are indexed by the column they are drawn in; a
/// target lane may reveal a character that sits in a different column.
#[derive(Clone, Debug)]
pub struct LanePool {
    lanes:  Vec<Lane>,
    height: usize,
}

impl LanePool {
    pub fn new<R: Rng + ?Sized>(grid: Grid, rng: &mut R) -> Self {
        let lanes = (0..grid.width).map(|_| Lane::parked(rng, grid.height)).collect();
        Self { lanes, height: grid.height }
    }

    pub fn lanes(&self) -> &[Lane] { &self.lanes }
    pub fn active_count(&self) -> usize { self.lanes.iter().filter(|l| l.active).count() }
    pub fn any_active(&self) -> bool { self.lanes.iter().any(|l| l.active) }
    pub fn target_count(&self) -> usize { self.lanes.iter().filter(|l| l.target.is_some()).count() }

    /// Hands `animated` characters to randomly chosen columns, at most one per lane and
    /// at most `column_cap` overall, then wakes a few purely decorative lanes.
    pub fn assign<R: Rng + ?Sized>(
        &mut self,
        chars: &[PositionedChar],
        animated: &[usize],
        column_cap: usize,
        decorative_cap: usize,
        rng: &mut R,
    ) {
        let mut columns: Vec<usize> = (0..self.lanes.len()).collect();
        columns.shuffle(rng);

        let with_target = animated.len().min(columns.len()).min(column_cap);
        for (&col, &idx) in columns.iter().zip(animated).take(with_target) {
            let target = &chars[idx];
            let lane = &mut self.lanes[col];
            lane.active = true;
            lane.target = Some(idx);
            lane.speed  = rng.gen_range(TARGET_SPEED) * (1.0 + target.y as f32 / self.height as f32);
            let len = rng.gen_range(3..=8);
            lane.chain = std::iter::once(target.glyph).chain((1..len).map(|_| random_glyph(rng))).collect();
        }

        let extra = (self.lanes.len() / 5).min(decorative_cap);
        for &col in columns.iter().skip(with_target).take(extra) {
            let lane = &mut self.lanes[col];
            lane.active = true;
            let len = rng.gen_range(3..=6);
            lane.chain = random_chain(rng, len);
        }
    }

    /// Moves every active lane one step. Returns the character indices whose lanes
    /// arrived this step.
    pub fn advance<R: Rng + ?Sized>(&mut self, chars: &[PositionedChar], rng: &mut R) -> Vec<usize> {
        let bottom = self.height as f32;
        let mut arrivals = Vec::new();
        for lane in self.lanes.iter_mut().filter(|l| l.active) {
            lane.position += lane.speed;
            if let Some(idx) = lane.target {
                if !lane.locked && lane.position >= chars[idx].y as f32 {
                    lane.locked = true;
                    arrivals.push(idx);
                }
                if lane.locked && lane.position > bottom {
                    lane.active = false;
                }
            } else if lane.position > bottom {
                lane.position = rng.gen_range(-((self.height / 2) as i32)..=0) as f32;
            }
        }
        arrivals
    }

    #[cfg(test)]
    pub(crate) fn lanes_mut(&mut self) -> &mut [Lane] { &mut self.lanes }
}

//! Grid quantization and looped step intervals

use crate::error::{Result, TandemError};
use crate::tempo::{TICKS_PER_QUARTER, Tick};

pub const TICKS_PER_SIXTEENTH: Tick = TICKS_PER_QUARTER / 4;
/// One 4/4 measure
pub const TICKS_PER_MEASURE: Tick = TICKS_PER_QUARTER * 4;
pub const STEPS_PER_MEASURE: u32 = 16;

/// Smallest multiple of `grid` that is >= `tick`. A zero grid leaves `tick` as is.
pub fn quantize_tick_up(tick: Tick, grid: Tick) -> Tick {
    if grid == 0 {
        return tick;
    }
    tick.div_ceil(grid) * grid
}

/// Nearest multiple of `grid`, halves rounding up
pub fn round_to_grid(tick: Tick, grid: Tick) -> Tick {
    if grid == 0 {
        return tick;
    }
    (tick + grid / 2) / grid * grid
}

/// Forward distance from `p1` to `p2` on a ring of `modulus` positions.
///
/// Positions are taken mod `modulus`; an empty ring has no distance.
pub fn interval_between(p1: u32, p2: u32, modulus: u32) -> u32 {
    if modulus == 0 {
        return 0;
    }
    let (p1, p2) = (p1 % modulus, p2 % modulus);
    if p2 > p1 {
        p2 - p1
    } else if p1 > p2 {
        p2 + modulus - p1
    } else {
        0
    }
}

/// Ticks between two sixteenth-note steps of a looped measure
pub fn step_interval_ticks(p1: u32, p2: u32) -> Tick {
    interval_between(p1, p2, STEPS_PER_MEASURE) as Tick * TICKS_PER_SIXTEENTH
}

/// A looping set of sixteenth-note steps within one measure.
///
/// Drives periodic triggers: `first_due` gives the first firing tick,
/// then each firing calls `advance` to get the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepCycle {
    steps: Vec<u32>,
    index: usize,
}

impl StepCycle {
    pub fn new(steps: impl IntoIterator<Item = u32>) -> Result<Self> {
        let steps: Vec<u32> = steps.into_iter().map(|s| s % STEPS_PER_MEASURE).collect();
        if steps.is_empty() {
            return Err(TandemError::EmptyCycle);
        }
        Ok(Self { steps, index: 0 })
    }

    pub fn steps(&self) -> &[u32] {
        &self.steps
    }

    /// Step that fires next
    pub fn current_step(&self) -> u32 {
        self.steps[self.index]
    }

    /// First trigger: the next measure boundary plus the first step's offset
    pub fn first_due(&self, now: Tick) -> Tick {
        quantize_tick_up(now, TICKS_PER_MEASURE) + step_interval_ticks(0, self.steps[0])
    }

    /// Move to the following step and return its due tick, measured from
    /// `now` snapped to the sixteenth grid
    pub fn advance(&mut self, now: Tick) -> Tick {
        let current = round_to_grid(now, TICKS_PER_SIXTEENTH);
        let next = (self.index + 1) % self.steps.len();
        let interval = if self.steps.len() == 1 {
            TICKS_PER_MEASURE
        } else {
            step_interval_ticks(self.steps[self.index], self.steps[next])
        };
        self.index = next;
        current + interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantize_tick_up() {
        assert_eq!(quantize_tick_up(0, 480), 0);
        assert_eq!(quantize_tick_up(480, 480), 480);
        assert_eq!(quantize_tick_up(481, 480), 960);
        assert_eq!(quantize_tick_up(1, 480), 480);
        assert_eq!(quantize_tick_up(17, 0), 17);
        for tick in 0..1000 {
            let q = quantize_tick_up(tick, 120);
            assert_eq!(q == tick, tick % 120 == 0);
            assert!(q >= tick && q - tick < 120 && q % 120 == 0);
        }
    }

    #[test]
    fn test_interval_between() {
        assert_eq!(interval_between(14, 2, 16), 4);
        assert_eq!(interval_between(2, 2, 16), 0);
        assert_eq!(interval_between(0, 15, 16), 15);
        assert_eq!(interval_between(3, 5, 16), 2);
    }

    #[test]
    fn test_interval_between_wraps_out_of_range_positions() {
        assert_eq!(interval_between(20, 2, 16), 14);
        assert_eq!(interval_between(2, 18, 16), 0);
        assert_eq!(interval_between(31, 0, 16), 1);
        assert_eq!(interval_between(5, 3, 0), 0);
    }

    #[test]
    fn test_round_to_grid() {
        assert_eq!(round_to_grid(59, 120), 0);
        assert_eq!(round_to_grid(60, 120), 120);
        assert_eq!(round_to_grid(2000, TICKS_PER_SIXTEENTH), 2040);
    }

    #[test]
    fn test_step_cycle_walks_points() {
        let mut cycle = StepCycle::new([4, 12]).unwrap();
        assert_eq!(cycle.first_due(100), TICKS_PER_MEASURE + 4 * TICKS_PER_SIXTEENTH);
        assert_eq!(cycle.first_due(0), 4 * TICKS_PER_SIXTEENTH);

        let t = TICKS_PER_MEASURE + 4 * TICKS_PER_SIXTEENTH;
        // 4 -> 12: eight sixteenths
        let next = cycle.advance(t + 3);
        assert_eq!(next, t + 8 * TICKS_PER_SIXTEENTH);
        assert_eq!(cycle.current_step(), 12);
        // 12 -> 4 wraps: eight sixteenths again
        assert_eq!(cycle.advance(next), next + 8 * TICKS_PER_SIXTEENTH);
        assert_eq!(cycle.current_step(), 4);
    }

    #[test]
    fn test_single_step_repeats_every_measure() {
        let mut cycle = StepCycle::new([0]).unwrap();
        assert_eq!(cycle.advance(TICKS_PER_MEASURE), 2 * TICKS_PER_MEASURE);
    }

    #[test]
    fn test_empty_cycle_rejected() {
        assert!(matches!(StepCycle::new([]), Err(TandemError::EmptyCycle)));
    }
}

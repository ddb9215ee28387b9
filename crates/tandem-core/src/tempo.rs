//! Tick <-> seconds conversion with live tempo changes

use serde::{Deserialize, Serialize};

use crate::error::{Result, TandemError};

/// Smallest schedulable unit
pub type Tick = u64;

/// Tick resolution: subdivisions of one quarter note
pub const TICKS_PER_QUARTER: Tick = 480;

/// Point where a tempo segment begins
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoAnchor {
    /// Fractional tick at the anchor (anchors may land between ticks)
    pub tick: f64,
    /// Seconds at the anchor
    pub time: f64,
    pub ticks_per_sec: f64,
}

impl TempoAnchor {
    fn time_at(&self, tick: f64) -> f64 {
        self.time + (tick - self.tick) / self.ticks_per_sec
    }

    fn tick_at(&self, time: f64) -> f64 {
        self.tick + (time - self.time) * self.ticks_per_sec
    }
}

/// Piecewise-linear tempo map.
///
/// Every `set_tempo` appends a segment anchored where the previous segment
/// was at that moment, so the mapping stays continuous and everything
/// before the change keeps its old conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TempoMap {
    anchors: Vec<TempoAnchor>,
    bpm: f64,
}

impl Default for TempoMap {
    fn default() -> Self {
        Self::constant(120.0)
    }
}

impl TempoMap {
    pub fn new(bpm: f64) -> Result<Self> {
        validate_bpm(bpm)?;
        Ok(Self::constant(bpm))
    }

    fn constant(bpm: f64) -> Self {
        Self {
            anchors: vec![TempoAnchor {
                tick: 0.0,
                time: 0.0,
                ticks_per_sec: ticks_per_sec(bpm),
            }],
            bpm,
        }
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn anchors(&self) -> &[TempoAnchor] {
        &self.anchors
    }

    /// Change tempo effective at `at_time` seconds.
    ///
    /// Times earlier than the latest anchor are treated as happening at that
    /// anchor; the past is never rewritten.
    pub fn set_tempo(&mut self, bpm: f64, at_time: f64) -> Result<()> {
        validate_bpm(bpm)?;

        let last = *self.current_anchor();
        let time = at_time.max(last.time);
        let anchor = TempoAnchor {
            tick: last.tick_at(time),
            time,
            ticks_per_sec: ticks_per_sec(bpm),
        };

        if anchor.time == last.time {
            // Same instant: replace instead of stacking a zero-length segment
            if let Some(slot) = self.anchors.last_mut() {
                *slot = anchor;
            }
        } else {
            self.anchors.push(anchor);
        }
        self.bpm = bpm;
        Ok(())
    }

    /// Seconds at which `tick` occurs
    pub fn tick_to_time(&self, tick: Tick) -> f64 {
        let tick = tick as f64;
        let idx = self.anchors.partition_point(|a| a.tick <= tick);
        self.anchors[idx.saturating_sub(1)].time_at(tick)
    }

    /// Fractional tick position at `time`
    pub fn tick_at(&self, time: f64) -> f64 {
        let idx = self.anchors.partition_point(|a| a.time <= time);
        self.anchors[idx.saturating_sub(1)].tick_at(time).max(0.0)
    }

    /// Tick nearest to `time`
    pub fn time_to_tick(&self, time: f64) -> Tick {
        self.tick_at(time).round() as Tick
    }

    fn current_anchor(&self) -> &TempoAnchor {
        // Never empty: constructed with one anchor and only ever grows
        &self.anchors[self.anchors.len() - 1]
    }
}

fn validate_bpm(bpm: f64) -> Result<()> {
    if bpm.is_finite() && bpm > 0.0 {
        Ok(())
    } else {
        Err(TandemError::InvalidTempo(bpm))
    }
}

fn ticks_per_sec(bpm: f64) -> f64 {
    TICKS_PER_QUARTER as f64 * bpm / 60.0
}

/// Debug label for a tick position
pub fn tick_str(tick: Tick) -> String {
    let beat = tick as f64 / TICKS_PER_QUARTER as f64;
    format!("tick:{}\nbeat:{:.2}", tick, beat)
}

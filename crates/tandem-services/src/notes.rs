//! Note playback with scheduled note-offs

use std::collections::HashMap;

use tandem_core::{CommandHandle, Firing, Scheduler, Tick, TimeSource};
use tracing::debug;

/// How long a triggered note sounds
pub const NOTE_LENGTH_TICKS: Tick = 240;
pub const DEFAULT_VELOCITY: u8 = 100;

/// The audio engine side: anything that can start and stop notes
pub trait NoteSink {
    fn note_on(&mut self, channel: u8, pitch: u8, velocity: u8);
    fn note_off(&mut self, channel: u8, pitch: u8);
}

/// Plays fixed-length notes, retriggering cleanly when the same note is hit
/// again before its note-off.
#[derive(Debug, Default)]
pub struct NotePlayer {
    pending_off: HashMap<(u8, u8), CommandHandle>,
}

impl NotePlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Note-on now, note-off `NOTE_LENGTH_TICKS` later. A pending note-off
    /// for the same channel and pitch is cancelled first.
    pub fn play<S, N>(&mut self, sched: &mut Scheduler<S, N>, sink: &mut N, channel: u8, pitch: u8)
    where
        S: TimeSource,
        N: NoteSink + 'static,
    {
        self.pending_off.retain(|_, handle| sched.is_pending(*handle));

        if let Some(handle) = self.pending_off.remove(&(channel, pitch)) {
            sched.cancel(handle);
            debug!(channel, pitch, "retriggered note");
        }

        sink.note_on(channel, pitch, DEFAULT_VELOCITY);
        let due = sched.get_tick() + NOTE_LENGTH_TICKS;
        let handle = sched.post_at_tick(due, move |f: &mut Firing<'_, N>| {
            f.context.note_off(channel, pitch);
            Ok(())
        });
        self.pending_off.insert((channel, pitch), handle);
    }

    /// Notes still waiting for their note-off
    pub fn sounding(&self) -> usize {
        self.pending_off.len()
    }
}

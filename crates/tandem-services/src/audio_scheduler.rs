//! Scheduling driven by rendered audio frames
//!
//! The realtime audio path is the only writer of the frame count; the update
//! loop reads it to derive the current tick. Callbacks therefore land on the
//! sample that was actually produced, not on the UI frame that noticed it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tandem_core::{Scheduler, TandemError, TempoMap, TimeSource};

/// Write side of the frame count, owned by the audio callback.
///
/// Deliberately not `Clone`: there is exactly one writer.
pub struct FrameWriter {
    frames: Arc<AtomicU64>,
}

impl FrameWriter {
    /// Record `frames` more frames as rendered
    pub fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::Release);
    }

    /// Render one interleaved buffer with `render` and count its frames
    pub fn render<F>(&self, buffer: &mut [f32], channels: u16, render: F)
    where
        F: FnOnce(&mut [f32]),
    {
        render(buffer);
        let frames = buffer.len() / channels.max(1) as usize;
        self.advance(frames as u64);
    }
}

/// Read side of the frame count; a time source in seconds of audio
#[derive(Clone)]
pub struct FrameClock {
    frames: Arc<AtomicU64>,
    sample_rate: u32,
}

impl FrameClock {
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl TimeSource for FrameClock {
    fn seconds(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Shared frame counter starting at zero
pub fn frame_counter(sample_rate: u32) -> (FrameWriter, FrameClock) {
    let frames = Arc::new(AtomicU64::new(0));
    let writer = FrameWriter {
        frames: frames.clone(),
    };
    let clock = FrameClock {
        frames,
        sample_rate: sample_rate.max(1),
    };
    (writer, clock)
}

/// Scheduler whose clock is the count of rendered audio frames
pub type AudioScheduler<C> = Scheduler<FrameClock, C>;

/// Build an audio scheduler plus the writer to hand to the audio callback
pub fn audio_scheduler<C>(
    sample_rate: u32,
    bpm: f64,
) -> Result<(AudioScheduler<C>, FrameWriter), TandemError> {
    let tempo_map = TempoMap::new(bpm)?;
    let (writer, clock) = frame_counter(sample_rate);
    Ok((Scheduler::new(clock, tempo_map), writer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tandem_core::{Firing, TICKS_PER_QUARTER};

    #[test]
    fn test_ticks_follow_rendered_frames() {
        let (sched, writer) = audio_scheduler::<()>(48_000, 60.0).unwrap();
        assert_eq!(sched.get_tick(), 0);

        writer.advance(24_000);
        assert_eq!(sched.get_tick(), TICKS_PER_QUARTER / 2);
        assert_eq!(sched.source().frames(), 24_000);
    }

    #[test]
    fn test_render_counts_frames_not_samples() {
        let (writer, clock) = frame_counter(44_100);
        let mut buffer = vec![0.0f32; 512];
        writer.render(&mut buffer, 2, |b| b.fill(0.25));
        assert_eq!(clock.frames(), 256);
        assert!(buffer.iter().all(|s| *s == 0.25));
    }

    #[test]
    fn test_fires_on_exact_frame() {
        // 60 bpm at 48kHz: 100 frames per tick
        let (mut sched, writer) = audio_scheduler::<Vec<u64>>(48_000, 60.0).unwrap();
        let mut fired = Vec::new();
        sched.post_at_tick(240, |f: &mut Firing<'_, Vec<u64>>| {
            let now = f.now();
            f.context.push(now);
            Ok(())
        });

        // Ticks round to nearest, so tick 240 is current from frame 23_950
        writer.advance(23_940);
        sched.on_update(&mut fired).unwrap();
        assert!(fired.is_empty());

        writer.advance(20);
        sched.on_update(&mut fired).unwrap();
        assert_eq!(fired, vec![240]);
    }

    #[test]
    fn test_writer_on_audio_thread() {
        let (sched, writer) = audio_scheduler::<()>(1_000, 60.0).unwrap();
        let audio = thread::spawn(move || {
            for _ in 0..1_000 {
                writer.advance(1);
            }
        });
        audio.join().unwrap();
        assert_eq!(sched.source().frames(), 1_000);
        assert_eq!(sched.get_tick(), TICKS_PER_QUARTER);
    }
}

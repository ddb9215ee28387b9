//! Tick-ordered, cancellable callback scheduling
//!
//! Pending commands are kept sorted by `(due_tick, sequence)`. Each
//! `on_update` reads the current tick from the time source and fires every
//! command that is due, oldest-first, exactly once.

use std::collections::BTreeMap;

use crate::clock::{Clock, TimeSource};
use crate::error::Result;
use crate::tempo::{TempoMap, Tick};

/// Opaque handle to a posted command.
///
/// Ordering is `(due tick, insertion sequence)`, which is also firing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CommandHandle {
    due: Tick,
    seq: u64,
}

impl CommandHandle {
    pub fn due_tick(&self) -> Tick {
        self.due
    }
}

/// Boxed callback. Arguments are captured by the closure.
pub type Callback<C> = Box<dyn FnOnce(&mut Firing<'_, C>) -> anyhow::Result<()>>;

struct CommandQueue<C> {
    pending: BTreeMap<CommandHandle, Callback<C>>,
    next_seq: u64,
}

impl<C> CommandQueue<C> {
    fn new() -> Self {
        Self {
            pending: BTreeMap::new(),
            next_seq: 0,
        }
    }

    fn post(&mut self, tick: Tick, callback: Callback<C>) -> CommandHandle {
        let handle = CommandHandle {
            due: tick,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.pending.insert(handle, callback);
        handle
    }

    fn cancel(&mut self, handle: CommandHandle) -> bool {
        self.pending.remove(&handle).is_some()
    }
}

/// What a callback sees while it fires
pub struct Firing<'a, C> {
    handle: CommandHandle,
    now: Tick,
    pub context: &'a mut C,
    queue: &'a mut CommandQueue<C>,
    /// Commands due in this pass that have not fired yet
    batch: &'a mut BTreeMap<CommandHandle, Callback<C>>,
}

impl<C> Firing<'_, C> {
    /// Tick the command was due at
    pub fn tick(&self) -> Tick {
        self.handle.due
    }

    /// Tick of the update pass doing the firing
    pub fn now(&self) -> Tick {
        self.now
    }

    pub fn handle(&self) -> CommandHandle {
        self.handle
    }

    /// Post a follow-up command. It fires on a later `on_update` at the
    /// earliest, even if already due.
    pub fn post_at_tick<F>(&mut self, tick: Tick, callback: F) -> CommandHandle
    where
        F: FnOnce(&mut Firing<'_, C>) -> anyhow::Result<()> + 'static,
    {
        self.queue.post(tick, Box::new(callback))
    }

    /// Cancel a command, including one due later in this same pass
    pub fn cancel(&mut self, handle: CommandHandle) -> bool {
        self.queue.cancel(handle) || self.batch.remove(&handle).is_some()
    }
}

/// Fires callbacks at musical ticks derived from a time source and tempo map.
///
/// `C` is the context handed to callbacks on each update (e.g. a synth).
pub struct Scheduler<S, C> {
    source: S,
    tempo_map: TempoMap,
    queue: CommandQueue<C>,
}

impl<C> Scheduler<Clock, C> {
    /// Wall-clock scheduler at a fixed starting tempo
    pub fn with_clock(bpm: f64) -> Result<Self> {
        Ok(Self::new(Clock::new(), TempoMap::new(bpm)?))
    }
}

impl<S: TimeSource, C> Scheduler<S, C> {
    pub fn new(source: S, tempo_map: TempoMap) -> Self {
        Self {
            source,
            tempo_map,
            queue: CommandQueue::new(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn tempo_map(&self) -> &TempoMap {
        &self.tempo_map
    }

    /// Seconds according to the time source
    pub fn get_time(&self) -> f64 {
        self.source.seconds()
    }

    pub fn get_tick(&self) -> Tick {
        self.tempo_map.time_to_tick(self.get_time())
    }

    /// Change tempo from the current time onwards
    pub fn set_tempo(&mut self, bpm: f64) -> Result<()> {
        let now = self.get_time();
        self.tempo_map.set_tempo(bpm, now)
    }

    pub fn post_at_tick<F>(&mut self, tick: Tick, callback: F) -> CommandHandle
    where
        F: FnOnce(&mut Firing<'_, C>) -> anyhow::Result<()> + 'static,
    {
        self.queue.post(tick, Box::new(callback))
    }

    /// Cancel a pending command. Returns false if it already fired or was
    /// already cancelled.
    pub fn cancel(&mut self, handle: CommandHandle) -> bool {
        self.queue.cancel(handle)
    }

    pub fn is_pending(&self, handle: CommandHandle) -> bool {
        self.queue.pending.contains_key(&handle)
    }

    pub fn pending_count(&self) -> usize {
        self.queue.pending.len()
    }

    /// Fire every due command in `(tick, sequence)` order.
    ///
    /// The first callback error aborts the pass and is returned as-is; the
    /// remaining due commands stay pending. Returns how many fired.
    pub fn on_update(&mut self, context: &mut C) -> anyhow::Result<usize> {
        let now = self.get_tick();
        let later = self.queue.pending.split_off(&CommandHandle {
            due: now.saturating_add(1),
            seq: 0,
        });
        let mut batch = std::mem::replace(&mut self.queue.pending, later);

        let mut fired = 0;
        while let Some((handle, callback)) = batch.pop_first() {
            let mut firing = Firing {
                handle,
                now,
                context: &mut *context,
                queue: &mut self.queue,
                batch: &mut batch,
            };
            if let Err(err) = callback(&mut firing) {
                self.queue.pending.append(&mut batch);
                return Err(err);
            }
            fired += 1;
        }
        Ok(fired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SharedClock, shared_clock};
    use crate::tempo::TICKS_PER_QUARTER;

    type Log = Vec<&'static str>;

    // 60 bpm: one quarter note per second
    fn scheduler() -> (Scheduler<ManualClock, Log>, ManualClock) {
        let clock = ManualClock::new();
        let sched = Scheduler::new(clock.clone(), TempoMap::new(60.0).unwrap());
        (sched, clock)
    }

    fn push(name: &'static str) -> impl FnOnce(&mut Firing<'_, Log>) -> anyhow::Result<()> {
        move |f: &mut Firing<'_, Log>| {
            f.context.push(name);
            Ok(())
        }
    }

    #[test]
    fn test_fires_in_tick_then_insertion_order() {
        let (mut sched, clock) = scheduler();
        let mut log = Log::new();

        sched.post_at_tick(2 * TICKS_PER_QUARTER, push("a"));
        sched.post_at_tick(2 * TICKS_PER_QUARTER, push("b"));
        sched.post_at_tick(TICKS_PER_QUARTER, push("first"));

        clock.set(0.5);
        assert_eq!(sched.on_update(&mut log).unwrap(), 0);

        clock.set(2.0);
        assert_eq!(sched.on_update(&mut log).unwrap(), 3);
        assert_eq!(log, vec!["first", "a", "b"]);
    }

    #[test]
    fn test_fires_at_most_once() {
        let (mut sched, clock) = scheduler();
        let mut log = Log::new();
        let handle = sched.post_at_tick(10, push("x"));

        clock.set(1.0);
        sched.on_update(&mut log).unwrap();
        sched.on_update(&mut log).unwrap();
        clock.advance(5.0);
        sched.on_update(&mut log).unwrap();

        assert_eq!(log, vec!["x"]);
        assert!(!sched.is_pending(handle));
    }

    #[test]
    fn test_cancel() {
        let (mut sched, clock) = scheduler();
        let mut log = Log::new();
        let keep = sched.post_at_tick(10, push("keep"));
        let drop = sched.post_at_tick(10, push("drop"));

        assert!(sched.cancel(drop));
        assert!(!sched.cancel(drop));

        clock.set(1.0);
        sched.on_update(&mut log).unwrap();
        assert_eq!(log, vec!["keep"]);

        // Cancel after firing is a no-op
        assert!(!sched.cancel(keep));
        assert_eq!(sched.pending_count(), 0);
    }

    #[test]
    fn test_posts_from_callback_wait_for_next_update() {
        let (mut sched, clock) = scheduler();
        let mut log = Log::new();

        sched.post_at_tick(0, |f: &mut Firing<'_, Log>| {
            f.context.push("outer");
            let now = f.now();
            f.post_at_tick(now, push("inner"));
            Ok(())
        });

        clock.set(1.0);
        assert_eq!(sched.on_update(&mut log).unwrap(), 1);
        assert_eq!(log, vec!["outer"]);

        assert_eq!(sched.on_update(&mut log).unwrap(), 1);
        assert_eq!(log, vec!["outer", "inner"]);
    }

    #[test]
    fn test_callback_can_cancel_later_command_in_same_pass() {
        let (mut sched, clock) = scheduler();
        let mut log = Log::new();

        let victim = sched.post_at_tick(20, push("victim"));
        sched.post_at_tick(10, move |f: &mut Firing<'_, Log>| {
            assert!(f.cancel(victim));
            f.context.push("killer");
            Ok(())
        });

        clock.set(1.0);
        assert_eq!(sched.on_update(&mut log).unwrap(), 1);
        assert_eq!(log, vec!["killer"]);
    }

    #[test]
    fn test_callback_error_propagates() {
        let (mut sched, clock) = scheduler();
        let mut log = Log::new();

        sched.post_at_tick(5, push("before"));
        sched.post_at_tick(6, |_: &mut Firing<'_, Log>| anyhow::bail!("bad note"));
        let after = sched.post_at_tick(7, push("after"));

        clock.set(1.0);
        let err = sched.on_update(&mut log).unwrap_err();
        assert_eq!(err.to_string(), "bad note");
        assert_eq!(log, vec!["before"]);
        assert!(sched.is_pending(after));

        sched.on_update(&mut log).unwrap();
        assert_eq!(log, vec!["before", "after"]);
    }

    #[test]
    fn test_firing_reports_due_tick() {
        let (mut sched, clock) = scheduler();
        let mut log = Log::new();
        sched.post_at_tick(100, |f: &mut Firing<'_, Log>| {
            assert_eq!(f.tick(), 100);
            assert_eq!(f.now(), TICKS_PER_QUARTER);
            f.context.push("checked");
            Ok(())
        });
        clock.set(1.0);
        sched.on_update(&mut log).unwrap();
        assert_eq!(log, vec!["checked"]);
    }

    #[test]
    fn test_set_tempo_speeds_up_ticks() {
        let (mut sched, clock) = scheduler();
        clock.set(1.0);
        assert_eq!(sched.get_tick(), TICKS_PER_QUARTER);

        sched.set_tempo(120.0).unwrap();
        assert_eq!(sched.get_tick(), TICKS_PER_QUARTER);

        clock.set(2.0);
        assert_eq!(sched.get_tick(), 3 * TICKS_PER_QUARTER);
        assert!(sched.set_tempo(0.0).is_err());
        assert_eq!(sched.tempo_map().bpm(), 120.0);
    }

    #[test]
    fn test_schedulers_share_one_pausable_clock() {
        let clock = shared_clock();
        let mut a: Scheduler<SharedClock, Log> =
            Scheduler::new(clock.clone(), TempoMap::new(60.0).unwrap());
        let b: Scheduler<SharedClock, Log> =
            Scheduler::new(clock.clone(), TempoMap::new(120.0).unwrap());

        clock.borrow_mut().stop();
        clock.borrow_mut().set_time(3.0);
        assert_eq!(a.get_time(), 3.0);
        assert_eq!(a.get_tick(), 3 * TICKS_PER_QUARTER);
        assert_eq!(b.get_tick(), 6 * TICKS_PER_QUARTER);

        // Paused: nothing becomes due
        let mut log = Log::new();
        a.post_at_tick(3 * TICKS_PER_QUARTER + 1, push("late"));
        assert_eq!(a.on_update(&mut log).unwrap(), 0);
        assert!(clock.borrow().is_paused());

        clock.borrow_mut().toggle();
        assert!(!clock.borrow().is_paused());
        assert!(a.get_time() >= 3.0);
    }
}

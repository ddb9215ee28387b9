//! Pausable elapsed-time sources

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Instant;

/// Anything that reports elapsed seconds
pub trait TimeSource {
    fn seconds(&self) -> f64;
}

/// Monotonic wall clock that only counts while running
#[derive(Debug, Clone)]
pub struct Clock {
    paused: bool,
    /// Seconds accumulated before `started`
    offset: f64,
    started: Instant,
}

impl Clock {
    /// A running clock starting at zero
    pub fn new() -> Self {
        Self {
            paused: false,
            offset: 0.0,
            started: Instant::now(),
        }
    }

    /// Seconds elapsed while not paused
    pub fn get_time(&self) -> f64 {
        if self.paused {
            self.offset
        } else {
            self.offset + self.started.elapsed().as_secs_f64()
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Flip between running and paused
    pub fn toggle(&mut self) {
        if self.paused {
            self.start();
        } else {
            self.stop();
        }
    }

    pub fn start(&mut self) {
        if self.paused {
            self.paused = false;
            self.started = Instant::now();
        }
    }

    pub fn stop(&mut self) {
        if !self.paused {
            self.offset = self.get_time();
            self.paused = true;
        }
    }

    /// Re-base elapsed time without changing the running state
    pub fn set_time(&mut self, seconds: f64) {
        self.offset = seconds;
        self.started = Instant::now();
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for Clock {
    fn seconds(&self) -> f64 {
        self.get_time()
    }
}

/// One pausable clock driving several schedulers
pub type SharedClock = Rc<RefCell<Clock>>;

pub fn shared_clock() -> SharedClock {
    Rc::new(RefCell::new(Clock::new()))
}

impl<T: TimeSource + ?Sized> TimeSource for Rc<T> {
    fn seconds(&self) -> f64 {
        (**self).seconds()
    }
}

impl<T: TimeSource> TimeSource for RefCell<T> {
    fn seconds(&self) -> f64 {
        self.borrow().seconds()
    }
}

/// Hand-driven time source for offline runs and tests.
///
/// Clones share the same underlying time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<f64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, seconds: f64) {
        self.now.set(seconds);
    }

    pub fn advance(&self, seconds: f64) {
        self.now.set(self.now.get() + seconds);
    }
}

impl TimeSource for ManualClock {
    fn seconds(&self) -> f64 {
        self.now.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_clock_runs_from_zero() {
        let clock = Clock::new();
        thread::sleep(Duration::from_millis(5));
        let t = clock.get_time();
        assert!(t >= 0.005, "{t}");
        assert!(!clock.is_paused());
    }

    #[test]
    fn test_pause_freezes_and_resumes() {
        let mut clock = Clock::new();
        thread::sleep(Duration::from_millis(5));
        clock.toggle();
        assert!(clock.is_paused());

        let frozen = clock.get_time();
        thread::sleep(Duration::from_millis(5));
        assert_eq!(clock.get_time(), frozen);

        clock.toggle();
        assert!(!clock.is_paused());
        let resumed = clock.get_time();
        assert!(resumed >= frozen);
        // Paused interval is not counted
        assert!(resumed < frozen + 0.005);
    }

    #[test]
    fn test_set_time_while_paused() {
        let mut clock = Clock::new();
        clock.stop();
        clock.set_time(12.5);
        assert_eq!(clock.get_time(), 12.5);
        clock.start();
        assert!(clock.get_time() >= 12.5);
    }

    #[test]
    fn test_manual_clock_shared() {
        let a = ManualClock::new();
        let b = a.clone();
        a.advance(1.5);
        b.advance(0.5);
        assert_eq!(a.seconds(), 2.0);
    }
}

use log::{debug, info};
use rand::Rng;
use std::cell::Cell;
use std::thread;
use std::time::{Duration, Instant};

/// Source of time for every wait in a run.
///
/// Production code sleeps the thread; tests use [`ManualClock`] so polling
/// loops finish instantly while still observing elapsed time.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// A clock that only moves when slept on.
#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    elapsed: Cell<Duration>,
    sleeps: Cell<usize>,
}

impl ManualClock {
    pub fn new() -> Self {
        ManualClock {
            start: Instant::now(),
            elapsed: Cell::new(Duration::ZERO),
            sleeps: Cell::new(0),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed.get()
    }

    pub fn sleeps(&self) -> usize {
        self.sleeps.get()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed.get()
    }

    fn sleep(&self, duration: Duration) {
        self.elapsed.set(self.elapsed.get() + duration);
        self.sleeps.set(self.sleeps.get() + 1);
    }
}

/// Pause between consecutive page navigations.
///
/// A pause of `min == max` is a fixed delay; a wider range picks uniformly
/// inside it.
pub fn page_delay(clock: &dyn Clock, min: Duration, max: Duration) {
    let delay = if max > min {
        let mut rng = rand::thread_rng();
        Duration::from_millis(rng.gen_range(min.as_millis() as u64..=max.as_millis() as u64))
    } else {
        min
    };
    if delay.is_zero() {
        return;
    }
    if delay >= Duration::from_secs(5) {
        info!("Waiting for {} seconds (Page Delay)...", delay.as_secs());
    } else {
        debug!("Waiting for {} ms (Page Delay)...", delay.as_millis());
    }
    clock.sleep(delay);
}

//! Fixed-rate tick clock for the main loop.

use std::time::{Duration, Instant};

use tracing::warn;

/// Ticks this far behind schedule are dropped instead of caught up.
pub const MAX_LAG: Duration = Duration::from_millis(250);

/// Schedules ticks at a fixed rate.
pub struct TickClock {
    rate: u32,
    period: Duration,
    next: Instant,
    ticks: u64,
}

impl TickClock {
    /// Clock running at `rate` ticks per second (at least 1), starting now.
    pub fn new(rate: u32) -> Self {
        Self::starting_at(rate, Instant::now())
    }

    fn starting_at(rate: u32, start: Instant) -> Self {
        let rate = rate.max(1);
        let period = Duration::from_secs(1) / rate;
        Self {
            rate,
            period,
            next: start + period,
            ticks: 0,
        }
    }

    /// Ticks completed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Whether the current tick falls on a multiple of `seconds`.
    /// Always `false` for zero.
    pub fn every(&self, seconds: u32) -> bool {
        let interval = u64::from(seconds) * u64::from(self.rate);
        interval > 0 && self.ticks % interval == 0
    }

    /// Finish a tick at `now`; returns how long to sleep before the next one.
    pub fn advance(&mut self, now: Instant) -> Duration {
        self.ticks += 1;
        if now > self.next + MAX_LAG {
            let behind = now - self.next;
            warn!(
                "Tick {} is {:.1}ms behind, skipping ahead",
                self.ticks,
                behind.as_secs_f64() * 1000.0
            );
            self.next = now + self.period;
            return Duration::ZERO;
        }
        let wait = self.next.saturating_duration_since(now);
        self.next += self.period;
        wait
    }

    /// Finish a tick and sleep until the next one is due.
    pub fn wait(&mut self) {
        let pause = self.advance(Instant::now());
        if !pause.is_zero() {
            std::thread::sleep(pause);
        }
    }
}

//! Randomized busy-wait inserted before a response is packed.
//!
//! The wait spins on the handling thread on purpose: it stands in for
//! synchronous compute cost, and the router's load-balancing experiments
//! depend on the worker being occupied for its duration. Replacing it with
//! a sleep or an async yield changes the load profile under test.

use rand::Rng;

use crate::telemetry::TimeSource;

/// Uniform busy-wait over `[0, max_us)` microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispersionDelay {
    max_us: u64,
}

impl DispersionDelay {
    pub fn new(max_us: u64) -> Self {
        Self { max_us }
    }

    /// No delay at all.
    pub fn disabled() -> Self {
        Self { max_us: 0 }
    }

    pub fn max_us(&self) -> u64 {
        self.max_us
    }

    /// Draw the next wait duration.
    pub fn draw(&self) -> u64 {
        if self.max_us == 0 {
            return 0;
        }
        rand::rng().random_range(0..self.max_us)
    }

    /// Spin for a freshly drawn duration. Returns the microseconds actually
    /// spent. Holds no locks.
    pub fn stall(&self, clock: &dyn TimeSource) -> u64 {
        spin_for(clock, self.draw())
    }
}

fn spin_for(clock: &dyn TimeSource, target_us: u64) -> u64 {
    let start = clock.now_micros();
    loop {
        let elapsed = clock.now_micros().saturating_sub(start);
        if elapsed >= target_us {
            return elapsed;
        }
        std::hint::spin_loop();
    }
}

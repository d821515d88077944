//! # Cycle Clock
//!
//! Monotonic cycle counter abstraction. The scheduling core only ever reads
//! time through [`CycleClock`]; the hardware port lives in
//! [`crate::arch`], a deterministic [`SimClock`] drives tests and the
//! simulated host.

use core::cell::Cell;
use core::sync::atomic::{compiler_fence, Ordering};

/// A monotonically non-decreasing cycle counter. Reads never block.
pub trait CycleClock {
    fn now(&self) -> u64;
}

impl<C: CycleClock + ?Sized> CycleClock for &C {
    #[inline]
    fn now(&self) -> u64 {
        (**self).now()
    }
}

/// Read `clock` without letting the compiler move surrounding memory
/// accesses across the read.
///
/// The measurement loop depends on the accumulation it performs between two
/// samples staying between them.
#[inline]
pub fn sample<C: CycleClock + ?Sized>(clock: &C) -> u64 {
    compiler_fence(Ordering::SeqCst);
    let now = clock.now();
    compiler_fence(Ordering::SeqCst);
    now
}

// ---------------------------------------------------------------------------
// Synthetic clock
// ---------------------------------------------------------------------------

/// Manually advanced clock for simulation and synthetic clock injection.
#[derive(Debug, Default)]
pub struct SimClock {
    now: Cell<u64>,
}

impl SimClock {
    pub const fn new(start: u64) -> Self {
        Self { now: Cell::new(start) }
    }

    /// Move time forward by `cycles`. Returns the new time.
    pub fn advance(&self, cycles: u64) -> u64 {
        let now = self.now.get().saturating_add(cycles);
        self.now.set(now);
        now
    }

    /// Jump to `at`; earlier targets are ignored so time never runs backwards.
    pub fn advance_to(&self, at: u64) -> u64 {
        let now = self.now.get().max(at);
        self.now.set(now);
        now
    }
}

impl CycleClock for SimClock {
    #[inline]
    fn now(&self) -> u64 {
        self.now.get()
    }
}

// ---------------------------------------------------------------------------
// Counter extension
// ---------------------------------------------------------------------------

/// Extends a free-running 32-bit hardware counter to 64 bits.
///
/// Must see at least one raw reading per counter wrap (2^32 cycles, about
/// 25 s at 168 MHz); a wrap missed entirely is lost time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WrapExtender {
    last: u32,
    high: u64,
}

impl WrapExtender {
    pub const fn new() -> Self {
        Self { last: 0, high: 0 }
    }

    /// Feed one raw reading and return the extended value.
    pub fn extend(&mut self, raw: u32) -> u64 {
        if raw < self.last {
            self.high += 1 << 32;
        }
        self.last = raw;
        self.high | raw as u64
    }
}

// ---------------------------------------------------------------------------
// Host clock
// ---------------------------------------------------------------------------

/// Host monotonic clock counting nanoseconds since construction.
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: std::time::Instant,
}

#[cfg(feature = "std")]
impl MonotonicClock {
    pub fn new() -> Self {
        Self { origin: std::time::Instant::now() }
    }
}

#[cfg(feature = "std")]
impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl CycleClock for MonotonicClock {
    fn now(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }
}

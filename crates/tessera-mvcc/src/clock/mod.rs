//! Monotonic hybrid-time clocks.
//!
//! A [`Clock`] is the source of [`HybridTime`] values for a tablet server.
//! The contract every implementation upholds:
//!
//! - `now()` is strictly increasing on one instance: each call returns a
//!   value greater than every value previously returned by `now()` and
//!   greater than or equal to every value previously passed to `update()`.
//! - `update(t)` raises the clock so that later `now()` calls return values
//!   above `t`; it is a no-op if the clock is already past `t`. It never
//!   blocks and never fails.
//!
//! Two implementations are provided:
//!
//! - [`HybridClock`]: physical microseconds with a logical low-order
//!   counter, the production clock.
//! - [`LogicalClock`]: a pure counter with a [`LogicalClock::peek`]
//!   accessor, used by tests and deterministic replay.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::warn;

use crate::hybrid_time::HybridTime;

/// Maximum tolerated clock skew in microseconds.
///
/// An `update()` that jumps further than this ahead of physical time is
/// still applied (the update contract is unconditional), but is logged.
pub const MAX_CLOCK_SKEW_US: u64 = 500_000;

/// A source of monotonically increasing hybrid times.
pub trait Clock: Send + Sync {
    /// Returns the current hybrid time, strictly greater than any value
    /// previously returned by this instance.
    fn now(&self) -> HybridTime;

    /// Raises the clock to at least `ht`, so that subsequent [`Clock::now`]
    /// calls return values above it. No-op if the clock is already past `ht`.
    fn update(&self, ht: HybridTime);
}

/// The production clock: physical time in microseconds combined with a
/// logical counter in the low [`BITS_FOR_LOGICAL`] bits.
///
/// Within one microsecond the logical counter disambiguates; across
/// microseconds physical time dominates. Monotonicity is maintained with a
/// single compare-and-swap loop over the last value handed out.
pub struct HybridClock {
    /// The last hybrid time handed out or adopted via `update`.
    last: AtomicU64,
}

impl HybridClock {
    /// Creates a hybrid clock starting at the current physical time.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last: AtomicU64::new(Self::physical_now().to_u64()),
        }
    }

    /// Returns the current physical time as a hybrid time with a zero
    /// logical component.
    fn physical_now() -> HybridTime {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_micros() as u64;
        HybridTime::from_micros_and_logical(micros, 0)
    }
}

impl Default for HybridClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for HybridClock {
    fn now(&self) -> HybridTime {
        let physical = Self::physical_now().to_u64();
        let mut prev = self.last.load(AtomicOrdering::Acquire);
        loop {
            // Advance to physical time if it moved past us, else take the
            // next logical step.
            let next = physical.max(prev + 1);
            match self.last.compare_exchange_weak(
                prev,
                next,
                AtomicOrdering::AcqRel,
                AtomicOrdering::Acquire,
            ) {
                Ok(_) => return HybridTime::from_u64(next),
                Err(actual) => prev = actual,
            }
        }
    }

    fn update(&self, ht: HybridTime) {
        let physical = Self::physical_now();
        if ht.physical_micros() > physical.physical_micros() + MAX_CLOCK_SKEW_US {
            warn!(
                received = %ht,
                physical = %physical,
                "hybrid time update is far ahead of physical time"
            );
        }
        self.last.fetch_max(ht.to_u64(), AtomicOrdering::AcqRel);
    }
}

impl std::fmt::Debug for HybridClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridClock")
            .field("last", &HybridTime::from_u64(self.last.load(AtomicOrdering::Relaxed)))
            .finish()
    }
}

/// A purely logical clock: `now()` counts up by one on each call.
///
/// Used in tests and replay, where deterministic, densely packed timestamps
/// make assertions exact. `peek()` returns the value the last `now()` call
/// produced without advancing the counter.
pub struct LogicalClock {
    /// The last value handed out.
    now: AtomicU64,
}

impl LogicalClock {
    /// Creates a logical clock whose first [`Clock::now`] call returns
    /// `initial`.
    #[must_use]
    pub fn starting_at(initial: HybridTime) -> Self {
        debug_assert!(!initial.is_min());
        Self {
            now: AtomicU64::new(initial.to_u64() - 1),
        }
    }

    /// Returns the current value without advancing the clock.
    #[must_use]
    pub fn peek(&self) -> HybridTime {
        HybridTime::from_u64(self.now.load(AtomicOrdering::Acquire))
    }
}

impl Clock for LogicalClock {
    fn now(&self) -> HybridTime {
        HybridTime::from_u64(self.now.fetch_add(1, AtomicOrdering::AcqRel) + 1)
    }

    fn update(&self, ht: HybridTime) {
        self.now.fetch_max(ht.to_u64(), AtomicOrdering::AcqRel);
    }
}

impl std::fmt::Debug for LogicalClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogicalClock").field("now", &self.peek()).finish()
    }
}

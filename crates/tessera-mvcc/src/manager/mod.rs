//! The MVCC safe-time manager.
//!
//! Each tablet replica owns one [`MvccManager`]. The replication layer
//! registers every in-flight write with it ([`MvccManager::add_pending`]) and
//! reports the outcome ([`MvccManager::replicated`] /
//! [`MvccManager::aborted`]); readers ask it for the *safe time*: the
//! greatest hybrid time `t` such that no write will ever be committed at or
//! below `t`. A snapshot read at the safe time therefore observes a stable
//! prefix of the tablet's history.
//!
//! # Safe time
//!
//! On the leader, with pending writes outstanding, the safe time is the
//! immediate predecessor of the smallest pending timestamp; with none
//! outstanding it is the clock reading (never below the last replicated
//! timestamp), so that the manager can vouch that any *future* write will be
//! assigned a strictly larger timestamp. The result is capped by the leader's
//! lease horizon: a stale leader must not vend reads a new leader could
//! contradict.
//!
//! On a follower, authority flows from the leader: the safe time is capped
//! by the propagated safe time received over replication heartbeats, and is
//! kept monotonic locally even if heartbeats arrive out of order.
//!
//! # Concurrency
//!
//! A single mutex protects all manager state; safe-time reads are short, so
//! finer-grained locking has not been necessary. Readers whose required
//! bound is not yet safe block on a shared condition variable with an
//! absolute deadline; every state change that can raise the safe time wakes
//! all waiters and each re-checks its own predicate.
//!
//! Violations of the registration protocol (registering a timestamp at or
//! below the replicated prefix, completing an unknown operation, duplicate
//! registration) are bugs in the replication layer that cannot be recovered
//! from; they panic with a diagnostic.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, trace};

use crate::clock::Clock;
use crate::hybrid_time::HybridTime;

/// State protected by the manager's mutex.
struct Inner {
    /// In-flight writes: timestamp to insertion order. Strictly sorted by
    /// timestamp; every entry is above `last_replicated`.
    queue: BTreeMap<HybridTime, u64>,
    /// Insertion counter for `queue` values.
    next_op_order: u64,
    /// The largest timestamp ever placed in `queue`. Newly assigned
    /// timestamps must exceed it even after the entry itself is gone.
    max_issued: HybridTime,
    /// Timestamp of the most recently replicated operation. Only ever
    /// increases.
    last_replicated: HybridTime,
    /// The leader's last announced safe time, delivered via replication
    /// heartbeats. Follower input only.
    propagated_safe_time: HybridTime,
    /// The largest value ever returned on the follower path, making the
    /// follower-visible safe time monotonic even when heartbeats arrive out
    /// of order.
    max_safe_time_returned_for_follower: HybridTime,
}

/// Tracks in-flight writes for one tablet replica and computes the hybrid
/// time at which snapshot reads are safe.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use tessera_mvcc::{HybridTime, LogicalClock, MvccManager};
///
/// let clock = Arc::new(LogicalClock::starting_at(HybridTime::INITIAL));
/// let manager = MvccManager::new("tablet-1", clock);
///
/// let mut ht = HybridTime::MIN;
/// manager.add_pending(&mut ht);
/// assert_eq!(manager.safe_time(HybridTime::MAX), ht.decremented());
///
/// manager.replicated(ht);
/// assert_eq!(manager.last_replicated_hybrid_time(), ht);
/// ```
pub struct MvccManager {
    /// Prefix for diagnostics, typically the tablet id.
    name: String,
    /// Shared clock. Must outlive the manager; consulted when the pending
    /// set is empty and raised when the leader assigns a timestamp.
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
    /// Shared by all safe-time waiters. Spurious wakes are fine: each waiter
    /// re-checks its predicate.
    cond: Condvar,
}

impl MvccManager {
    /// Creates a manager for the named tablet using the given clock.
    #[must_use]
    pub fn new(name: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            clock,
            inner: Mutex::new(Inner {
                queue: BTreeMap::new(),
                next_op_order: 0,
                max_issued: HybridTime::MIN,
                last_replicated: HybridTime::MIN,
                propagated_safe_time: HybridTime::MIN,
                max_safe_time_returned_for_follower: HybridTime::MIN,
            }),
            cond: Condvar::new(),
        }
    }

    /// Returns the manager's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers an in-flight write.
    ///
    /// If `ht` is the unset sentinel ([`HybridTime::MIN`]), this is the
    /// leader path: the manager assigns a fresh timestamp, strictly greater
    /// than the last replicated timestamp and every timestamp it has ever
    /// issued, and raises the clock to it so later clock readings stay
    /// ahead. The assigned value is written back through `ht`.
    ///
    /// If `ht` is preset, this is the follower / replay path: the value
    /// chosen upstream is recorded as-is.
    ///
    /// # Panics
    ///
    /// Panics if a preset `ht` is at or below the last replicated timestamp,
    /// or if `ht` is already pending. Both indicate a bug in the replication
    /// layer.
    pub fn add_pending(&self, ht: &mut HybridTime) {
        let mut inner = self.inner.lock();
        if ht.is_min() {
            let assigned = self
                .clock
                .now()
                .max(inner.last_replicated.incremented())
                .max(inner.max_issued.incremented());
            self.clock.update(assigned);
            *ht = assigned;
        } else {
            if *ht <= inner.last_replicated {
                error!(
                    manager = %self.name,
                    ht = %ht,
                    last_replicated = %inner.last_replicated,
                    "attempted to register an operation at or below the replicated prefix"
                );
                panic!(
                    "{}: cannot add pending operation at {} <= last replicated {}",
                    self.name, ht, inner.last_replicated
                );
            }
            if inner.queue.contains_key(ht) {
                error!(manager = %self.name, ht = %ht, "duplicate pending operation");
                panic!("{}: operation at {} is already pending", self.name, ht);
            }
        }
        let order = inner.next_op_order;
        inner.next_op_order += 1;
        let previous = inner.queue.insert(*ht, order);
        debug_assert!(previous.is_none());
        if *ht > inner.max_issued {
            inner.max_issued = *ht;
        }
    }

    /// Marks the pending operation at `ht` as durably replicated and
    /// advances the replicated prefix to it.
    ///
    /// `last_replicated` only ever increases; on the leader operations
    /// complete in insertion order, so this is the front of the queue.
    ///
    /// # Panics
    ///
    /// Panics if `ht` is not pending or does not advance the replicated
    /// prefix.
    pub fn replicated(&self, ht: HybridTime) {
        {
            let mut inner = self.inner.lock();
            if ht <= inner.last_replicated {
                error!(
                    manager = %self.name,
                    ht = %ht,
                    last_replicated = %inner.last_replicated,
                    "replicated timestamp does not advance the replicated prefix"
                );
                panic!(
                    "{}: replicated {} <= last replicated {}",
                    self.name, ht, inner.last_replicated
                );
            }
            if inner.queue.remove(&ht).is_none() {
                error!(manager = %self.name, ht = %ht, "replicated an unknown operation");
                panic!("{}: replicated operation at {} is not pending", self.name, ht);
            }
            inner.last_replicated = ht;
        }
        self.cond.notify_all();
    }

    /// Removes the pending operation at `ht` without committing it. Any
    /// pending entry may be aborted, not only the front; the replicated
    /// prefix is untouched.
    ///
    /// # Panics
    ///
    /// Panics if `ht` is not pending.
    pub fn aborted(&self, ht: HybridTime) {
        {
            let mut inner = self.inner.lock();
            if inner.queue.remove(&ht).is_none() {
                error!(manager = %self.name, ht = %ht, "aborted an unknown operation");
                panic!("{}: aborted operation at {} is not pending", self.name, ht);
            }
        }
        self.cond.notify_all();
    }

    /// Returns the current leader-path safe time capped by `ht_lease`,
    /// without waiting.
    ///
    /// Pass [`HybridTime::MAX`] to disable lease capping.
    #[must_use]
    pub fn safe_time(&self, ht_lease: HybridTime) -> HybridTime {
        let inner = self.inner.lock();
        self.leader_safe_time(&inner, ht_lease)
    }

    /// Waits until the leader-path safe time reaches `required`, up to
    /// `deadline`.
    ///
    /// Returns the safe time (at least `required`, at most `ht_lease`), or
    /// `None` if the deadline passed first. The wait is woken by any state
    /// change that can raise the safe time; each wake re-evaluates.
    pub fn wait_for_safe_time(
        &self,
        required: HybridTime,
        deadline: Instant,
        ht_lease: HybridTime,
    ) -> Option<HybridTime> {
        let mut inner = self.inner.lock();
        loop {
            let safe = self.leader_safe_time(&inner, ht_lease);
            if safe >= required {
                return Some(safe);
            }
            trace!(
                manager = %self.name,
                safe = %safe,
                required = %required,
                "waiting for safe time"
            );
            if self.cond.wait_until(&mut inner, deadline).timed_out() {
                let safe = self.leader_safe_time(&inner, ht_lease);
                if safe >= required {
                    return Some(safe);
                }
                trace!(
                    manager = %self.name,
                    required = %required,
                    "deadline passed waiting for safe time"
                );
                return None;
            }
        }
    }

    /// Waits until the follower-path safe time reaches `required`, up to
    /// `deadline`.
    ///
    /// The follower safe time is bounded by the propagated safe time rather
    /// than a lease, and never decreases even if propagated values arrive
    /// out of order. Returns `None` if the deadline passed first.
    pub fn safe_time_for_follower(
        &self,
        required: HybridTime,
        deadline: Instant,
    ) -> Option<HybridTime> {
        let mut inner = self.inner.lock();
        loop {
            let safe = Self::follower_safe_time(&mut inner);
            if safe >= required {
                return Some(safe);
            }
            trace!(
                manager = %self.name,
                safe = %safe,
                required = %required,
                "waiting for follower safe time"
            );
            if self.cond.wait_until(&mut inner, deadline).timed_out() {
                let safe = Self::follower_safe_time(&mut inner);
                if safe >= required {
                    return Some(safe);
                }
                return None;
            }
        }
    }

    /// Returns the timestamp of the most recently replicated operation.
    #[must_use]
    pub fn last_replicated_hybrid_time(&self) -> HybridTime {
        self.inner.lock().last_replicated
    }

    /// Records the leader's announced safe time, received over a
    /// replication heartbeat. Values that arrive out of order are dropped;
    /// the propagated safe time only ever increases.
    pub fn set_propagated_safe_time(&self, ht: HybridTime) {
        {
            let mut inner = self.inner.lock();
            if ht < inner.propagated_safe_time {
                debug!(
                    manager = %self.name,
                    ht = %ht,
                    propagated = %inner.propagated_safe_time,
                    "ignoring out-of-order propagated safe time"
                );
            } else {
                inner.propagated_safe_time = ht;
            }
        }
        self.cond.notify_all();
    }

    /// Returns the number of in-flight operations.
    #[must_use]
    pub fn num_pending(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Leader-path safe time under the lock: predecessor of the smallest
    /// pending timestamp, or the clock reading (never below the replicated
    /// prefix) when nothing is pending; capped by the lease horizon.
    fn leader_safe_time(&self, inner: &Inner, ht_lease: HybridTime) -> HybridTime {
        let raw = match inner.queue.keys().next() {
            Some(&min_pending) => min_pending.decremented(),
            None => self.clock.now().max(inner.last_replicated),
        };
        raw.min(ht_lease)
    }

    /// Follower-path safe time under the lock: as the leader path but with
    /// the replicated prefix standing in for the clock, capped by the
    /// propagated safe time, and clamped to be monotonic across calls.
    fn follower_safe_time(inner: &mut Inner) -> HybridTime {
        let raw = match inner.queue.keys().next() {
            Some(&min_pending) => min_pending.decremented(),
            None => inner.last_replicated,
        };
        let bounded = raw.min(inner.propagated_safe_time);
        if bounded > inner.max_safe_time_returned_for_follower {
            inner.max_safe_time_returned_for_follower = bounded;
        }
        inner.max_safe_time_returned_for_follower
    }
}

impl std::fmt::Debug for MvccManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("MvccManager")
            .field("name", &self.name)
            .field("pending", &inner.queue.len())
            .field("last_replicated", &inner.last_replicated)
            .field("propagated_safe_time", &inner.propagated_safe_time)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::LogicalClock;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
    use std::thread;
    use std::time::Duration;

    use rand::Rng;

    fn new_manager() -> (Arc<LogicalClock>, MvccManager) {
        let clock = Arc::new(LogicalClock::starting_at(HybridTime::INITIAL));
        let manager = MvccManager::new("test-tablet", Arc::clone(&clock) as Arc<dyn Clock>);
        (clock, manager)
    }

    fn far_future() -> Instant {
        Instant::now() + Duration::from_secs(3600)
    }

    #[test]
    fn test_basic() {
        const TOTAL_ENTRIES: usize = 10;
        let (_clock, manager) = new_manager();

        let mut hts = vec![HybridTime::MIN; TOTAL_ENTRIES];
        for ht in &mut hts {
            manager.add_pending(ht);
        }
        for window in hts.windows(2) {
            assert!(window[0] < window[1]);
        }
        for &ht in &hts {
            manager.replicated(ht);
            assert_eq!(ht, manager.last_replicated_hybrid_time());
        }
    }

    #[test]
    fn test_safe_time_without_pending() {
        const LEASE: u64 = 10;
        const DELTA: u64 = 10;
        let (clock, manager) = new_manager();

        let ht_lease = clock.now().add_logical(LEASE);
        clock.update(ht_lease.add_logical(DELTA));
        assert_eq!(ht_lease, manager.safe_time(ht_lease));

        let mut ht1 = clock.now();
        manager.add_pending(&mut ht1);
        assert_eq!(ht1.decremented(), manager.safe_time(HybridTime::MAX));

        let mut ht2 = HybridTime::MIN;
        manager.add_pending(&mut ht2);
        assert!(ht2 > ht1);
        assert_eq!(ht1.decremented(), manager.safe_time(HybridTime::MAX));

        manager.replicated(ht1);
        assert_eq!(ht2.decremented(), manager.safe_time(HybridTime::MAX));

        manager.replicated(ht2);
        let now = clock.now();
        assert_eq!(now, manager.safe_time(now));
    }

    #[test]
    fn test_abort() {
        const TOTAL_ENTRIES: usize = 10;
        let (clock, manager) = new_manager();

        let mut hts = vec![HybridTime::MIN; TOTAL_ENTRIES];
        for ht in &mut hts {
            manager.add_pending(ht);
        }
        // Abort every other entry; aborting a non-minimum entry must not
        // advance the safe time.
        for ht in hts.iter().skip(1).step_by(2) {
            manager.aborted(*ht);
        }
        for ht in hts.iter().step_by(2) {
            assert_eq!(ht.decremented(), manager.safe_time(HybridTime::MAX));
            manager.replicated(*ht);
        }
        let now = clock.now();
        assert_eq!(now, manager.safe_time(now));
    }

    #[test]
    fn test_wait_for_safe_time() {
        const LEASE: u64 = 10;
        const DELTA: u64 = 10;
        let (clock, manager) = new_manager();
        let manager = Arc::new(manager);

        let limit = clock.now().add_logical(LEASE);
        clock.update(limit.add_logical(DELTA));

        let mut ht1 = clock.now();
        manager.add_pending(&mut ht1);
        let mut ht2 = HybridTime::MIN;
        manager.add_pending(&mut ht2);

        let t1_done = Arc::new(AtomicBool::new(false));
        let t1 = {
            let manager = Arc::clone(&manager);
            let t1_done = Arc::clone(&t1_done);
            thread::spawn(move || {
                manager.wait_for_safe_time(ht2.decremented(), far_future(), HybridTime::MAX);
                t1_done.store(true, AtomicOrdering::Release);
            })
        };
        let t2_done = Arc::new(AtomicBool::new(false));
        let t2 = {
            let manager = Arc::clone(&manager);
            let t2_done = Arc::clone(&t2_done);
            thread::spawn(move || {
                manager.wait_for_safe_time(ht2.add_logical(1), far_future(), HybridTime::MAX);
                t2_done.store(true, AtomicOrdering::Release);
            })
        };

        thread::sleep(Duration::from_millis(100));
        assert!(!t1_done.load(AtomicOrdering::Acquire));
        assert!(!t2_done.load(AtomicOrdering::Acquire));

        manager.replicated(ht1);
        thread::sleep(Duration::from_millis(100));
        assert!(t1_done.load(AtomicOrdering::Acquire));
        assert!(!t2_done.load(AtomicOrdering::Acquire));

        manager.replicated(ht2);
        thread::sleep(Duration::from_millis(100));
        assert!(t1_done.load(AtomicOrdering::Acquire));
        assert!(t2_done.load(AtomicOrdering::Acquire));

        t1.join().unwrap();
        t2.join().unwrap();

        // A required bound that stays above the safe time times out.
        let mut ht3 = HybridTime::MIN;
        manager.add_pending(&mut ht3);
        let deadline = Instant::now() + Duration::from_millis(100);
        assert_eq!(
            manager.wait_for_safe_time(ht3, deadline, HybridTime::MAX),
            None
        );
    }

    #[test]
    fn test_wait_returns_at_least_required() {
        let (clock, manager) = new_manager();
        clock.update(HybridTime::from_u64(100));
        let safe = manager
            .wait_for_safe_time(HybridTime::from_u64(50), far_future(), HybridTime::MAX)
            .unwrap();
        assert!(safe >= HybridTime::from_u64(50));
    }

    #[test]
    fn test_follower_safe_time_monotonic() {
        let (_clock, manager) = new_manager();

        let mut ht1 = HybridTime::MIN;
        manager.add_pending(&mut ht1);
        manager.replicated(ht1);

        manager.set_propagated_safe_time(ht1);
        let first = manager
            .safe_time_for_follower(HybridTime::MIN, far_future())
            .unwrap();
        assert_eq!(first, ht1);

        // An out-of-order (older) propagated safe time must not drag the
        // follower safe time backwards.
        manager.set_propagated_safe_time(ht1.decremented());
        let second = manager
            .safe_time_for_follower(HybridTime::MIN, far_future())
            .unwrap();
        assert_eq!(second, first);
    }

    #[test]
    fn test_follower_safe_time_bounded_by_propagated() {
        let (_clock, manager) = new_manager();

        let mut ht1 = HybridTime::MIN;
        manager.add_pending(&mut ht1);
        manager.replicated(ht1);

        // Nothing propagated yet: the follower cannot vouch for anything.
        let safe = manager
            .safe_time_for_follower(HybridTime::MIN, far_future())
            .unwrap();
        assert_eq!(safe, HybridTime::MIN);

        // A propagated safe time above the replicated prefix is clamped to
        // the locally known prefix.
        manager.set_propagated_safe_time(ht1.add_logical(10));
        let safe = manager
            .safe_time_for_follower(HybridTime::MIN, far_future())
            .unwrap();
        assert_eq!(safe, ht1);
    }

    #[test]
    fn test_follower_wait_woken_by_propagated_safe_time() {
        let (_clock, manager) = new_manager();
        let manager = Arc::new(manager);

        let mut ht1 = HybridTime::MIN;
        manager.add_pending(&mut ht1);
        manager.replicated(ht1);

        let waiter = {
            let manager = Arc::clone(&manager);
            thread::spawn(move || manager.safe_time_for_follower(ht1, far_future()))
        };
        thread::sleep(Duration::from_millis(50));
        manager.set_propagated_safe_time(ht1);
        assert_eq!(waiter.join().unwrap(), Some(ht1));
    }

    #[test]
    fn test_follower_wait_timeout() {
        let (_clock, manager) = new_manager();
        let deadline = Instant::now() + Duration::from_millis(50);
        assert_eq!(
            manager.safe_time_for_follower(HybridTime::from_u64(100), deadline),
            None
        );
    }

    #[test]
    #[should_panic(expected = "already pending")]
    fn test_duplicate_add_panics() {
        let (clock, manager) = new_manager();
        let mut ht = clock.now();
        manager.add_pending(&mut ht);
        let mut dup = ht;
        manager.add_pending(&mut dup);
    }

    #[test]
    #[should_panic(expected = "is not pending")]
    fn test_replicated_unknown_panics() {
        let (clock, manager) = new_manager();
        manager.replicated(clock.now());
    }

    #[test]
    #[should_panic(expected = "is not pending")]
    fn test_aborted_unknown_panics() {
        let (clock, manager) = new_manager();
        manager.aborted(clock.now());
    }

    #[test]
    #[should_panic(expected = "last replicated")]
    fn test_add_below_replicated_prefix_panics() {
        let (_clock, manager) = new_manager();
        let mut ht = HybridTime::MIN;
        manager.add_pending(&mut ht);
        manager.replicated(ht);
        let mut stale = ht;
        manager.add_pending(&mut stale);
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Op {
        Add,
        Replicated,
        Aborted,
    }

    fn run_randomized_test(use_ht_lease: bool) {
        const TOTAL_OPERATIONS: usize = 20_000;
        const TARGET_CONCURRENCY: i64 = 50;

        let clock = Arc::new(LogicalClock::starting_at(HybridTime::INITIAL));
        let manager = Arc::new(MvccManager::new(
            "random-test",
            Arc::clone(&clock) as Arc<dyn Clock>,
        ));

        let max_ht_lease = Arc::new(AtomicU64::new(0));
        let stopped = Arc::new(AtomicBool::new(false));

        let ht_lease_provider = {
            let clock = Arc::clone(&clock);
            let max_ht_lease = Arc::clone(&max_ht_lease);
            move || -> HybridTime {
                if !use_ht_lease {
                    return HybridTime::MAX;
                }
                let lease = clock
                    .peek()
                    .add_micros(rand::thread_rng().gen_range(0..=50));
                max_ht_lease.fetch_max(lease.to_u64(), AtomicOrdering::AcqRel);
                lease
            }
        };

        // Keeps querying the safe time in the background while the main
        // thread mutates the pending set.
        let query_thread = {
            let manager = Arc::clone(&manager);
            let stopped = Arc::clone(&stopped);
            let ht_lease_provider = ht_lease_provider.clone();
            thread::spawn(move || {
                while !stopped.load(AtomicOrdering::Acquire) {
                    manager.wait_for_safe_time(HybridTime::MIN, far_future(), ht_lease_provider());
                    thread::yield_now();
                }
            })
        };

        let mut rng = rand::thread_rng();
        let mut queue: BTreeMap<HybridTime, usize> = BTreeMap::new();
        let mut alive: Vec<HybridTime> = Vec::new();
        let mut ops: Vec<(Op, HybridTime)> = Vec::with_capacity(TOTAL_OPERATIONS);
        let mut counts = [0usize; 3];

        let mut i = 0usize;
        while i < TOTAL_OPERATIONS || !alive.is_empty() {
            let rnd: i64 = if TOTAL_OPERATIONS.saturating_sub(i) <= alive.len() {
                // Only finishing work remains.
                TARGET_CONCURRENCY + rng.gen_range(0..=1)
            } else {
                // Below the target concurrency we mostly start operations;
                // at or above it we start and finish in equal proportion.
                rng.gen_range(-TARGET_CONCURRENCY..TARGET_CONCURRENCY)
                    + (alive.len() as i64).min(TARGET_CONCURRENCY)
            };
            if rnd < TARGET_CONCURRENCY {
                let mut ht = HybridTime::MIN;
                manager.add_pending(&mut ht);
                alive.push(ht);
                queue.insert(ht, alive.len() - 1);
                ops.push((Op::Add, ht));
                counts[Op::Add as usize] += 1;
            } else {
                let idx = if rnd & 1 == 1 {
                    // Finish replication of the oldest operation.
                    let idx = *queue.values().next().unwrap();
                    ops.push((Op::Replicated, alive[idx]));
                    counts[Op::Replicated as usize] += 1;
                    manager.replicated(alive[idx]);
                    idx
                } else {
                    // Abort a random live operation.
                    let idx = rng.gen_range(0..alive.len());
                    ops.push((Op::Aborted, alive[idx]));
                    counts[Op::Aborted as usize] += 1;
                    manager.aborted(alive[idx]);
                    idx
                };
                queue.remove(&alive[idx]);
                let last = alive.pop().unwrap();
                if idx < alive.len() {
                    alive[idx] = last;
                    let previous = queue.insert(last, idx);
                    assert_eq!(previous, Some(alive.len()));
                }
            }
            i += 1;

            let safe_time;
            if alive.is_empty() {
                let time_before = clock.now();
                safe_time = manager.safe_time(ht_lease_provider());
                let time_after = clock.now();
                assert!(safe_time >= time_before);
                assert!(safe_time <= time_after);
            } else {
                let min = *queue.keys().next().unwrap();
                safe_time = manager.safe_time(ht_lease_provider());
                assert_eq!(min.decremented(), safe_time);
            }
            if use_ht_lease {
                assert!(safe_time.to_u64() <= max_ht_lease.load(AtomicOrdering::Acquire));
            }
        }

        stopped.store(true, AtomicOrdering::Release);
        query_thread.join().unwrap();

        let finished = counts[Op::Replicated as usize] + counts[Op::Aborted as usize];
        assert_eq!(TOTAL_OPERATIONS, counts[Op::Add as usize] + finished);
        assert_eq!(counts[Op::Add as usize], finished);

        // Replay the recorded operations, shifted into the future, as if a
        // follower were receiving them from the leader.
        let shift = (max_ht_lease.load(AtomicOrdering::Acquire) + 1)
            .max(clock.now().to_u64() + 1);
        let follower = Arc::new(MvccManager::new(
            "random-test-follower",
            Arc::clone(&clock) as Arc<dyn Clock>,
        ));
        let follower_stopped = Arc::new(AtomicBool::new(false));
        let follower_query_thread = {
            let follower = Arc::clone(&follower);
            let stopped = Arc::clone(&follower_stopped);
            thread::spawn(move || {
                let mut previous = HybridTime::MIN;
                while !stopped.load(AtomicOrdering::Acquire) {
                    let safe = follower
                        .safe_time_for_follower(HybridTime::MIN, far_future())
                        .unwrap();
                    assert!(safe >= previous, "follower safe time went backwards");
                    previous = safe;
                    thread::yield_now();
                }
            })
        };

        for (op, ht) in &ops {
            let shifted = HybridTime::from_u64(ht.to_u64() + shift);
            match op {
                Op::Add => {
                    let mut preset = shifted;
                    follower.add_pending(&mut preset);
                    assert_eq!(preset, shifted);
                }
                Op::Replicated => {
                    follower.replicated(shifted);
                    // The leader announces its safe time along with commits.
                    follower.set_propagated_safe_time(shifted);
                }
                Op::Aborted => follower.aborted(shifted),
            }
        }

        follower_stopped.store(true, AtomicOrdering::Release);
        follower_query_thread.join().unwrap();
        assert_eq!(follower.num_pending(), 0);
    }

    #[test]
    fn test_random_without_ht_lease() {
        run_randomized_test(false);
    }

    #[test]
    fn test_random_with_ht_lease() {
        run_randomized_test(true);
    }
}

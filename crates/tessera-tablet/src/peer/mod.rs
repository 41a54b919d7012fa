//! Tablet peer lifecycle.
//!
//! A peer in a tablet consensus configuration, coordinating writes to one
//! tablet replica. The peer itself is thin bookkeeping: it tracks the
//! replica's lifecycle state, records a permanent error on failure, and
//! forwards writes, completions, and safe-time queries to the MVCC manager
//! with the right leader/follower flavor.
//!
//! # Lifecycle
//!
//! ```text
//! ┌────────────┐   set_bootstrapping()   ┌───────────────┐
//! │ NotStarted │────────────────────────▶│ Bootstrapping │
//! └────────────┘                         └───────────────┘
//!                                               │ start()
//!                                               ▼
//!    ┌──────────┐      shutdown()         ┌─────────┐
//!    │ Shutdown │◀───────(via Stopping)───│ Running │
//!    └──────────┘                         └─────────┘
//! ```
//!
//! `Failed` is reachable from any state via [`TabletPeer::set_failed`] and
//! is terminal apart from shutdown.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::info;

use tessera_common::{TabletId, TesseraError, TesseraResult};
use tessera_mvcc::{Clock, HybridTime, MvccManager};

/// The lifecycle state of a tablet peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabletState {
    /// The peer has been created but not initialized.
    NotStarted,
    /// The peer is replaying its log and rebuilding in-memory state.
    Bootstrapping,
    /// The peer is serving reads and writes.
    Running,
    /// The peer is shutting down.
    Stopping,
    /// The peer has shut down.
    Shutdown,
    /// The peer hit a permanent error; see [`TabletPeer::error`].
    Failed,
}

impl TabletState {
    /// Returns true if the peer can serve reads and writes.
    #[must_use]
    pub fn is_running(&self) -> bool {
        *self == TabletState::Running
    }

    /// Returns true if the peer has stopped or failed for good.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TabletState::Shutdown | TabletState::Failed)
    }
}

impl fmt::Display for TabletState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TabletState::NotStarted => "NOT_STARTED",
            TabletState::Bootstrapping => "BOOTSTRAPPING",
            TabletState::Running => "RUNNING",
            TabletState::Stopping => "STOPPING",
            TabletState::Shutdown => "SHUTDOWN",
            TabletState::Failed => "FAILED",
        };
        write!(f, "{}", name)
    }
}

/// The consensus role of a tablet peer, selecting the safe-time path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    /// The peer assigns timestamps and is bounded by its leader lease.
    Leader,
    /// The peer accepts timestamps chosen upstream and is bounded by the
    /// propagated safe time.
    Follower,
}

/// A closure supplying the leader's current lease horizon: the upper bound
/// on hybrid times this leader may vouch for. Returning
/// [`HybridTime::MAX`] disables capping. Must not call back into the peer
/// or its manager.
type LeaseProvider = Box<dyn Fn() -> HybridTime + Send + Sync>;

/// One replica of a tablet, wiring the replication layer to the tablet's
/// MVCC manager.
pub struct TabletPeer {
    tablet_id: TabletId,
    clock: Arc<dyn Clock>,
    mvcc: MvccManager,
    ht_lease_provider: LeaseProvider,
    state: Mutex<TabletState>,
    role: Mutex<PeerRole>,
    /// The first permanent error, kept forever once set.
    error: Mutex<Option<TesseraError>>,
}

impl TabletPeer {
    /// Creates a peer for `tablet_id` in the `NotStarted` state.
    ///
    /// The clock is shared with the rest of the server and must outlive the
    /// peer. The lease provider is consulted on every leader-path safe-time
    /// query.
    pub fn new(
        tablet_id: TabletId,
        clock: Arc<dyn Clock>,
        ht_lease_provider: impl Fn() -> HybridTime + Send + Sync + 'static,
    ) -> Self {
        let mvcc = MvccManager::new(format!("T {}", tablet_id), Arc::clone(&clock));
        Self {
            tablet_id,
            clock,
            mvcc,
            ht_lease_provider: Box::new(ht_lease_provider),
            state: Mutex::new(TabletState::NotStarted),
            role: Mutex::new(PeerRole::Follower),
            error: Mutex::new(None),
        }
    }

    /// Returns the tablet id of the tablet managed by this peer.
    #[must_use]
    pub fn tablet_id(&self) -> TabletId {
        self.tablet_id
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TabletState {
        *self.state.lock()
    }

    /// Returns the current consensus role.
    #[must_use]
    pub fn role(&self) -> PeerRole {
        *self.role.lock()
    }

    /// Records a leadership change.
    pub fn set_role(&self, role: PeerRole) {
        let mut current = self.role.lock();
        if *current != role {
            info!(tablet = %self.tablet_id, ?role, "tablet peer role changed");
            *current = role;
        }
    }

    /// Returns the peer's MVCC manager.
    #[must_use]
    pub fn mvcc_manager(&self) -> &MvccManager {
        &self.mvcc
    }

    /// Moves the peer from `NotStarted` to `Bootstrapping`.
    pub fn set_bootstrapping(&self) -> TesseraResult<()> {
        self.update_state(TabletState::NotStarted, TabletState::Bootstrapping)
    }

    /// Moves the peer from `Bootstrapping` to `Running`, making it
    /// available for writes.
    pub fn start(&self) -> TesseraResult<()> {
        self.update_state(TabletState::Bootstrapping, TabletState::Running)
    }

    /// Shuts the peer down. Idempotent: shutting down a peer that is
    /// already `Shutdown` is a no-op.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        if *state == TabletState::Shutdown {
            return;
        }
        *state = TabletState::Stopping;
        // In-memory state only; nothing to flush or join here.
        *state = TabletState::Shutdown;
        info!(tablet = %self.tablet_id, "tablet peer shut down");
    }

    /// Checks that the peer is in the `Running` state.
    pub fn check_running(&self) -> TesseraResult<()> {
        let state = *self.state.lock();
        if state.is_running() {
            Ok(())
        } else {
            Err(TesseraError::TabletNotRunning {
                tablet_id: self.tablet_id,
                state: state.to_string(),
            })
        }
    }

    /// Marks the peer as failed, recording the first error permanently.
    pub fn set_failed(&self, error: TesseraError) {
        let mut slot = self.error.lock();
        if slot.is_none() {
            *slot = Some(error);
        }
        *self.state.lock() = TabletState::Failed;
    }

    /// Returns the error recorded when the peer failed, if any.
    #[must_use]
    pub fn error(&self) -> Option<TesseraError> {
        self.error.lock().clone()
    }

    /// Returns the current hybrid time from the shared clock.
    #[must_use]
    pub fn now(&self) -> HybridTime {
        self.clock.now()
    }

    /// Raises the shared clock to at least `ht`, e.g. after observing a
    /// timestamp from another node.
    pub fn update_clock(&self, ht: HybridTime) {
        self.clock.update(ht);
    }

    /// Returns the leader's current lease horizon.
    #[must_use]
    pub fn ht_lease_expiration(&self) -> HybridTime {
        (self.ht_lease_provider)()
    }

    /// Records the leader's announced safe time received over a
    /// replication heartbeat.
    pub fn set_propagated_safe_time(&self, ht: HybridTime) {
        self.mvcc.set_propagated_safe_time(ht);
    }

    /// Submits a write on the leader path: assigns it a fresh hybrid time
    /// and registers it as in-flight. The replication layer completes it
    /// later via [`TabletPeer::write_replicated`] or
    /// [`TabletPeer::write_aborted`].
    pub fn submit_write(&self) -> TesseraResult<HybridTime> {
        self.check_running()?;
        if self.role() != PeerRole::Leader {
            return Err(TesseraError::NotLeader { leader_id: None });
        }
        let mut ht = HybridTime::MIN;
        self.mvcc.add_pending(&mut ht);
        Ok(ht)
    }

    /// Starts a replica write on the follower path: registers the
    /// timestamp chosen by the leader, and adopts the safe time the leader
    /// piggybacked on the request, if any.
    pub fn start_replica_write(
        &self,
        ht: HybridTime,
        propagated_safe_time: Option<HybridTime>,
    ) -> TesseraResult<()> {
        self.check_running()?;
        self.clock.update(ht);
        let mut preset = ht;
        self.mvcc.add_pending(&mut preset);
        if let Some(propagated) = propagated_safe_time {
            self.mvcc.set_propagated_safe_time(propagated);
        }
        Ok(())
    }

    /// Reports that the write at `ht` was durably replicated.
    pub fn write_replicated(&self, ht: HybridTime) {
        self.mvcc.replicated(ht);
    }

    /// Reports that the write at `ht` will never commit.
    pub fn write_aborted(&self, ht: HybridTime) {
        self.mvcc.aborted(ht);
    }

    /// Returns a hybrid time at which a snapshot read observes a stable
    /// prefix, waiting until it reaches `required` or `deadline` passes.
    ///
    /// On the leader the result is capped by the lease horizon; on a
    /// follower by the propagated safe time.
    pub fn safe_time_to_read_at(
        &self,
        required: HybridTime,
        deadline: Instant,
    ) -> TesseraResult<HybridTime> {
        self.check_running()?;
        let started = Instant::now();
        let safe = match self.role() {
            PeerRole::Leader => {
                self.mvcc
                    .wait_for_safe_time(required, deadline, self.ht_lease_expiration())
            }
            PeerRole::Follower => self.mvcc.safe_time_for_follower(required, deadline),
        };
        safe.ok_or_else(|| TesseraError::Timeout {
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Performs a lifecycle transition, failing if the peer is not in the
    /// expected state.
    fn update_state(&self, expected: TabletState, new_state: TabletState) -> TesseraResult<()> {
        let mut state = self.state.lock();
        if *state != expected {
            return Err(TesseraError::illegal_state(
                expected.to_string(),
                state.to_string(),
            ));
        }
        info!(tablet = %self.tablet_id, from = %expected, to = %new_state, "tablet peer state change");
        *state = new_state;
        Ok(())
    }
}

impl fmt::Debug for TabletPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TabletPeer")
            .field("tablet_id", &self.tablet_id)
            .field("state", &self.state())
            .field("role", &self.role())
            .field("pending", &self.mvcc.num_pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tessera_common::ErrorCode;
    use tessera_mvcc::LogicalClock;

    fn running_peer() -> TabletPeer {
        let clock = Arc::new(LogicalClock::starting_at(HybridTime::INITIAL));
        let peer = TabletPeer::new(TabletId::new(1), clock, || HybridTime::MAX);
        peer.set_bootstrapping().unwrap();
        peer.start().unwrap();
        peer
    }

    #[test]
    fn test_lifecycle() {
        let clock = Arc::new(LogicalClock::starting_at(HybridTime::INITIAL));
        let peer = TabletPeer::new(TabletId::new(1), clock, || HybridTime::MAX);

        assert_eq!(peer.state(), TabletState::NotStarted);
        assert!(peer.check_running().is_err());

        peer.set_bootstrapping().unwrap();
        assert_eq!(peer.state(), TabletState::Bootstrapping);

        peer.start().unwrap();
        assert_eq!(peer.state(), TabletState::Running);
        peer.check_running().unwrap();

        peer.shutdown();
        assert_eq!(peer.state(), TabletState::Shutdown);
        assert!(peer.state().is_terminal());

        // Shutdown is idempotent.
        peer.shutdown();
        assert_eq!(peer.state(), TabletState::Shutdown);
    }

    #[test]
    fn test_invalid_transition() {
        let clock = Arc::new(LogicalClock::starting_at(HybridTime::INITIAL));
        let peer = TabletPeer::new(TabletId::new(1), clock, || HybridTime::MAX);

        let err = peer.start().unwrap_err();
        assert_eq!(err.code(), ErrorCode::IllegalState);
    }

    #[test]
    fn test_set_failed_keeps_first_error() {
        let peer = running_peer();
        peer.set_failed(TesseraError::internal("first"));
        peer.set_failed(TesseraError::internal("second"));

        assert_eq!(peer.state(), TabletState::Failed);
        let err = peer.error().unwrap();
        assert_eq!(err.to_string(), "internal error: first");
    }

    #[test]
    fn test_submit_write_requires_leader() {
        let peer = running_peer();
        let err = peer.submit_write().unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotLeader);

        peer.set_role(PeerRole::Leader);
        let ht = peer.submit_write().unwrap();
        assert!(ht > HybridTime::MIN);
        assert_eq!(peer.mvcc_manager().num_pending(), 1);

        peer.write_replicated(ht);
        assert_eq!(peer.mvcc_manager().last_replicated_hybrid_time(), ht);
    }

    #[test]
    fn test_replica_write_adopts_propagated_safe_time() {
        let peer = running_peer();
        let ht = HybridTime::from_u64(100);
        peer.start_replica_write(ht, Some(ht.decremented())).unwrap();
        assert_eq!(peer.mvcc_manager().num_pending(), 1);

        // The replica's clock was raised past the leader's timestamp.
        assert!(peer.now() > ht);

        peer.write_replicated(ht);
        let safe = peer
            .safe_time_to_read_at(HybridTime::MIN, Instant::now() + Duration::from_secs(1))
            .unwrap();
        assert_eq!(safe, ht.decremented());
    }

    #[test]
    fn test_safe_time_to_read_at_leader() {
        let peer = running_peer();
        peer.set_role(PeerRole::Leader);

        let ht = peer.submit_write().unwrap();
        let deadline = Instant::now() + Duration::from_millis(50);
        let err = peer.safe_time_to_read_at(ht, deadline).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Timeout);

        peer.write_replicated(ht);
        let safe = peer
            .safe_time_to_read_at(ht, Instant::now() + Duration::from_secs(1))
            .unwrap();
        assert!(safe >= ht);
    }

    #[test]
    fn test_leader_safe_time_capped_by_lease() {
        let clock = Arc::new(LogicalClock::starting_at(HybridTime::INITIAL));
        let lease = HybridTime::from_u64(5);
        let peer = TabletPeer::new(TabletId::new(1), Arc::clone(&clock) as Arc<dyn Clock>, move || {
            lease
        });
        peer.set_bootstrapping().unwrap();
        peer.start().unwrap();
        peer.set_role(PeerRole::Leader);

        clock.update(HybridTime::from_u64(100));
        let safe = peer
            .safe_time_to_read_at(HybridTime::MIN, Instant::now() + Duration::from_secs(1))
            .unwrap();
        assert_eq!(safe, lease);
    }

    #[test]
    fn test_aborted_write_frees_safe_time() {
        let peer = running_peer();
        peer.set_role(PeerRole::Leader);

        let ht1 = peer.submit_write().unwrap();
        let ht2 = peer.submit_write().unwrap();
        peer.write_aborted(ht1);
        assert_eq!(peer.mvcc_manager().safe_time(HybridTime::MAX), ht2.decremented());
        peer.write_aborted(ht2);
    }

    #[test]
    fn test_writes_rejected_unless_running() {
        let clock = Arc::new(LogicalClock::starting_at(HybridTime::INITIAL));
        let peer = TabletPeer::new(TabletId::new(1), clock, || HybridTime::MAX);
        peer.set_role(PeerRole::Leader);

        let err = peer.submit_write().unwrap_err();
        assert_eq!(err.code(), ErrorCode::TabletNotRunning);

        let err = peer
            .start_replica_write(HybridTime::from_u64(10), None)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::TabletNotRunning);
    }
}

//! # tessera-tablet
//!
//! Tablet peer lifecycle plumbing for TesseraDB.
//!
//! A [`TabletPeer`] is one replica of a tablet in a consensus
//! configuration. It owns the tablet's MVCC manager, shares the server-wide
//! clock, and wires the replication layer's callbacks (write submission,
//! commit/abort notifications, propagated safe time, leader lease horizon)
//! to the manager.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// The tablet peer
pub mod peer;

pub use peer::{PeerRole, TabletPeer, TabletState};

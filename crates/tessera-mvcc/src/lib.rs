//! # tessera-mvcc
//!
//! Multi-version concurrency control core for TesseraDB.
//!
//! This crate implements:
//! - Hybrid time: the 64-bit timestamp ordering all writes in the system
//! - Clocks: monotonic hybrid-time sources (physical and purely logical)
//! - The MVCC manager: the per-tablet registry of in-flight writes that
//!   computes the *safe time* under which snapshot reads may proceed

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Hybrid time timestamps
pub mod hybrid_time;

/// Monotonic hybrid-time clocks
pub mod clock;

/// The MVCC safe-time manager
pub mod manager;

pub use clock::{Clock, HybridClock, LogicalClock};
pub use hybrid_time::HybridTime;
pub use manager::MvccManager;

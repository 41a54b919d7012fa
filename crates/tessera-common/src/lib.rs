//! # tessera-common
//!
//! Common types, errors, and utilities for TesseraDB.
//!
//! This crate provides the foundational types and abstractions used across
//! all TesseraDB components. It includes:
//!
//! - **Types**: Core identifiers (`TabletId`, `NodeId`)
//! - **Errors**: Unified error handling with `TesseraError`
//!
//! ## Example
//!
//! ```rust
//! use tessera_common::types::{NodeId, TabletId};
//! use tessera_common::error::TesseraResult;
//!
//! fn example() -> TesseraResult<()> {
//!     let tablet_id = TabletId::new(7);
//!     let node_id = NodeId::new(1);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod types;

// Re-export commonly used items at the crate root
pub use error::{ErrorCode, TesseraError, TesseraResult};
pub use types::{NodeId, TabletId};

//! Error handling for TesseraDB.
//!
//! This module provides a unified error type and result alias used
//! across all TesseraDB components.

mod replica;

pub use replica::{ErrorCode, TesseraError};

/// Result type alias for TesseraDB operations.
pub type TesseraResult<T> = std::result::Result<T, TesseraError>;

//! # tessera-sql
//!
//! Query-layer bookkeeping for TesseraDB.
//!
//! This crate holds the thin, table-driven pieces of the query layer:
//!
//! - The stable query error-code table and its human-readable messages
//! - Builtin-function overload resolution by name and argument types

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Query error codes
pub mod error;

/// Builtin-function lookup
pub mod builtin;

pub use builtin::{find_opcode, BuiltinDecl, BuiltinError, BuiltinOpcode, DataType};
pub use error::QueryErrorCode;

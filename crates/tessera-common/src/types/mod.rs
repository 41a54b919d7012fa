//! Core types for TesseraDB.

mod ids;

pub use ids::{NodeId, TabletId};

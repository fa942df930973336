//! Shared Batchline model types.
//!
//! Pure data: identifiers, statuses, counters, read positions, checkpoints
//! and skip records. Kept free of I/O so the engine, the state store and
//! connectors can share them without circular dependencies.

pub mod error;
pub mod position;
pub mod skip;
pub mod state;

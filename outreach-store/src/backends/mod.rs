//! Store implementations
//!
//! - `memory`: In-memory tables, optionally mirrored to a snapshot file
//! - `test`: Memory store with hooks for tests

pub mod memory;

pub use memory::MemoryStore;
pub use test::TestStore;

//! Transport implementations
//!
//! - `outbox`: Writes messages as `.eml` files, for development and dry runs
//! - `test`: Scriptable in-memory transport for tests

pub mod outbox;

pub use outbox::OutboxTransport;
pub use test::TestTransport;

//! Integration test crate for the remix graph engine.
//!
//! This crate has no library code. It only contains integration tests
//! that drive the engine end to end over a real SQLite closure store.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p remix-integration-tests
//! ```

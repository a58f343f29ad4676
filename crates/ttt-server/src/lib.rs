//! ttt-server library entry point.
//!
//! Re-exports the application module so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.

pub mod application;

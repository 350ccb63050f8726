//! Deterministic, pure logic shared by the runner.
//!
//! Core modules must be free of I/O and event publishing. They operate on
//! declarations and return values suitable for tests.

pub mod mode;
pub mod structure;

//! I/O-facing pieces: configuration, file selection and fixture replay.

pub mod config;
pub mod fixture;
pub mod selection;

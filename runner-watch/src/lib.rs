//! Watch mode for the typecase runner.
//!
//! A [`actor::Watch`] owns every watch resource (file watchers, the keyboard
//! reader, the debounce timer) inside one actor task and hands task batches to
//! the caller over a channel. [`session::run_session`] feeds those batches to a
//! [`runner::coordinator::RunCoordinator`].

pub mod actor;
pub mod fs;
pub mod input;
pub mod keyboard;
pub mod session;
pub mod state;

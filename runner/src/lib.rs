//! Run execution and result aggregation for a type-level test runner.
//!
//! Given collected declaration trees, the runner executes them against one or
//! more targets, publishes an ordered stream of lifecycle events and builds a
//! hierarchical result tree from that stream.
//!
//! - **[`core`]**: Pure, deterministic logic (mode resolution, structural
//!   validation). No I/O, no events.
//! - **[`io`]**: Configuration, file selection and fixture-backed
//!   collaborators.
//!
//! [`coordinator`] and [`walker`] drive collaborators from [`engine`] and
//! publish onto an [`events::EventBus`]; [`aggregator`] reduces the stream into
//! a [`result::RunResult`].

pub mod aggregator;
pub mod cancellation;
pub mod coordinator;
pub mod core;
pub mod declaration;
pub mod diagnostic;
pub mod engine;
pub mod events;
pub mod exit_codes;
pub mod fail_fast;
pub mod io;
pub mod logging;
pub mod reporter;
pub mod result;
pub mod task;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod walker;

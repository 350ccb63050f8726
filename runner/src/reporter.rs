//! Tracing mirror of the event stream.

use anyhow::Result;
use tracing::{debug, info};

use crate::diagnostic::has_errors;
use crate::events::{Event, EventHandler};

/// Logs every event: error-bearing ones at `info`, the rest at `debug`.
#[derive(Debug, Default)]
pub struct LogReporter;

impl EventHandler for LogReporter {
    fn handle(&mut self, event: &Event) -> Result<()> {
        match event {
            Event::TaskStart { task } | Event::TaskEnd { task } => {
                debug!(event = event.name(), %task);
            }
            Event::TargetStart { target } | Event::TargetEnd { target } => {
                debug!(event = event.name(), %target);
            }
            _ => match event.diagnostics() {
                Some(diagnostics) if has_errors(diagnostics) => {
                    for diagnostic in diagnostics {
                        info!(event = event.name(), "{diagnostic}");
                    }
                }
                _ => debug!(event = event.name()),
            },
        }
        Ok(())
    }
}

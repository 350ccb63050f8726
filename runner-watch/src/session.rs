//! One watch session: an initial run followed by a run per watch batch.

use anyhow::Result;
use runner::cancellation::{CancelReason, CancellationToken};
use runner::coordinator::RunCoordinator;
use runner::engine::EngineProvider;
use runner::events::{Event, EventBus};
use runner::task::{Target, Task};
use tracing::{info, instrument};

use crate::actor::{Watch, WatchSignal};

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Quit key or explicit close.
    Closed,
    /// The configuration changed; resolve it again and start over.
    Restart,
}

/// Everything a session needs to run batches.
pub struct Session<'a, P: EngineProvider> {
    pub bus: &'a mut EventBus,
    pub provider: &'a mut P,
    pub coordinator: &'a RunCoordinator,
    pub targets: &'a [Target],
    pub token: &'a CancellationToken,
}

/// Run `initial`, then every batch `watch` yields, until the watch stops.
///
/// Watch diagnostics are published as `watch:error`. A handler error ends the
/// session; the watch is dropped with it.
#[instrument(skip_all, fields(initial = initial.len()))]
pub async fn run_session<P: EngineProvider>(
    session: Session<'_, P>,
    initial: &[Task],
    mut watch: Watch,
) -> Result<SessionEnd> {
    let Session {
        bus,
        provider,
        coordinator,
        targets,
        token,
    } = session;

    if !initial.is_empty() {
        coordinator.run(bus, provider, targets, initial, token)?;
    }

    while let Some(signal) = watch.next().await {
        match signal {
            WatchSignal::Batch(tasks) => {
                coordinator.run(bus, provider, targets, &tasks, token)?;
            }
            WatchSignal::Error(diagnostics) => {
                bus.publish(Event::WatchError { diagnostics })?;
            }
        }
    }

    let end = match watch.finish().await? {
        Some(CancelReason::ConfigChange) => SessionEnd::Restart,
        _ => SessionEnd::Closed,
    };
    info!(?end, "watch session ended");
    Ok(end)
}

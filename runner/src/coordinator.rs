//! Orchestration of one run: targets × tasks.

use std::path::PathBuf;

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::cancellation::{CancelReason, CancellationToken};
use crate::core::mode::{RunFilters, has_only};
use crate::engine::{Collector, EngineProvider, Evaluator};
use crate::events::{Event, EventBus};
use crate::task::{Target, Task};
use crate::walker::TreeWalker;

/// Drives every task against every target, publishing onto a bus.
#[derive(Debug, Clone, Default)]
pub struct RunCoordinator {
    filters: RunFilters,
}

impl RunCoordinator {
    /// `filters` carries the run-wide name filters; positions come from tasks.
    pub fn new(filters: RunFilters) -> Self {
        Self { filters }
    }

    /// Run `tasks` against each target in order.
    ///
    /// Cancellation is checked before each target and each task; skipped work
    /// publishes nothing. A fail-fast cancellation is reset before returning
    /// so the next run starts clean.
    #[instrument(skip_all, fields(targets = targets.len(), tasks = tasks.len()))]
    pub fn run<P: EngineProvider>(
        &self,
        bus: &mut EventBus,
        provider: &mut P,
        targets: &[Target],
        tasks: &[Task],
        token: &CancellationToken,
    ) -> Result<()> {
        bus.publish(Event::RunStart {
            targets: targets.to_vec(),
            tasks: tasks.to_vec(),
        })?;

        for target in targets {
            if token.is_cancellation_requested() {
                debug!(%target, "skipping target after cancellation");
                break;
            }
            self.run_target(bus, provider, target, tasks, token)?;
        }

        bus.publish(Event::RunEnd)?;

        if token.reason() == Some(CancelReason::FailFast) {
            info!("run stopped early by fail fast");
            token.reset();
        }
        Ok(())
    }

    fn run_target<P: EngineProvider>(
        &self,
        bus: &mut EventBus,
        provider: &mut P,
        target: &Target,
        tasks: &[Task],
        token: &CancellationToken,
    ) -> Result<()> {
        bus.publish(Event::TargetStart {
            target: target.clone(),
        })?;

        match provider.acquire(target) {
            Ok(mut engine) => {
                debug!(%target, "engine acquired");
                let mut project: Option<Option<PathBuf>> = None;
                for task in tasks {
                    if token.is_cancellation_requested() {
                        debug!(%target, "skipping remaining tasks after cancellation");
                        break;
                    }
                    let task_project = engine.project_for(task);
                    if project.as_ref() != Some(&task_project) {
                        if project.is_some() {
                            bus.publish(Event::ProjectEnd)?;
                        }
                        bus.publish(Event::ProjectStart {
                            config_file: task_project.clone(),
                        })?;
                        project = Some(task_project);
                    }
                    self.run_task(bus, &mut engine, task, token)?;
                }
                if project.is_some() {
                    bus.publish(Event::ProjectEnd)?;
                }
            }
            Err(diagnostics) => {
                warn!(%target, "engine acquisition failed");
                bus.publish(Event::TargetError {
                    target: target.clone(),
                    diagnostics,
                })?;
            }
        }

        bus.publish(Event::TargetEnd {
            target: target.clone(),
        })
    }

    /// Collect, then walk one file between `task:start` and `task:end`.
    fn run_task<E: Collector + Evaluator>(
        &self,
        bus: &mut EventBus,
        engine: &mut E,
        task: &Task,
        token: &CancellationToken,
    ) -> Result<()> {
        bus.publish(Event::TaskStart { task: task.clone() })?;

        match engine.collect(task) {
            Ok(tree) => {
                if !tree.deprecations.is_empty() {
                    bus.publish(Event::DeprecationInfo {
                        diagnostics: tree.deprecations.clone(),
                    })?;
                }
                if tree.diagnostics.is_empty() {
                    let filters = self.filters.for_task(task);
                    let has_only = has_only(&tree, &filters);
                    TreeWalker::new(bus, token, engine, task, filters, has_only).walk(&tree)?;
                } else {
                    bus.publish(Event::TaskError {
                        task: task.clone(),
                        diagnostics: tree.diagnostics,
                    })?;
                }
            }
            Err(diagnostics) => {
                debug!(%task, "collection failed");
                bus.publish(Event::TaskError {
                    task: task.clone(),
                    diagnostics,
                })?;
            }
        }

        bus.publish(Event::TaskEnd { task: task.clone() })
    }
}

//! Lifecycle events and the synchronous bus that dispatches them.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Result, anyhow};
use tracing::trace;

use crate::diagnostic::Diagnostic;
use crate::task::{Target, Task};

/// Every lifecycle event a run can publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    RunStart { targets: Vec<Target>, tasks: Vec<Task> },
    RunEnd,

    TargetStart { target: Target },
    /// Engine acquisition failed; nothing runs for this target.
    TargetError { target: Target, diagnostics: Vec<Diagnostic> },
    TargetEnd { target: Target },

    ProjectStart { config_file: Option<PathBuf> },
    ProjectEnd,

    TaskStart { task: Task },
    TaskError { task: Task, diagnostics: Vec<Diagnostic> },
    TaskEnd { task: Task },

    GroupStart { name: String },
    GroupEnd { name: String },

    CaseStart { name: String },
    CaseError { name: String, diagnostics: Vec<Diagnostic> },
    CaseFail { name: String },
    CasePass { name: String },
    CaseSkip { name: String },
    CaseTodo { name: String },

    ExpectStart { matcher: String, negated: bool },
    ExpectError { diagnostics: Vec<Diagnostic> },
    ExpectFail { diagnostics: Vec<Diagnostic> },
    ExpectPass,
    ExpectSkip,

    WatchError { diagnostics: Vec<Diagnostic> },
    DeprecationInfo { diagnostics: Vec<Diagnostic> },
}

impl Event {
    /// Stable `family:kind` name, e.g. `case:pass`.
    pub fn name(&self) -> &'static str {
        match self {
            Event::RunStart { .. } => "run:start",
            Event::RunEnd => "run:end",
            Event::TargetStart { .. } => "target:start",
            Event::TargetError { .. } => "target:error",
            Event::TargetEnd { .. } => "target:end",
            Event::ProjectStart { .. } => "project:start",
            Event::ProjectEnd => "project:end",
            Event::TaskStart { .. } => "task:start",
            Event::TaskError { .. } => "task:error",
            Event::TaskEnd { .. } => "task:end",
            Event::GroupStart { .. } => "group:start",
            Event::GroupEnd { .. } => "group:end",
            Event::CaseStart { .. } => "case:start",
            Event::CaseError { .. } => "case:error",
            Event::CaseFail { .. } => "case:fail",
            Event::CasePass { .. } => "case:pass",
            Event::CaseSkip { .. } => "case:skip",
            Event::CaseTodo { .. } => "case:todo",
            Event::ExpectStart { .. } => "expect:start",
            Event::ExpectError { .. } => "expect:error",
            Event::ExpectFail { .. } => "expect:fail",
            Event::ExpectPass => "expect:pass",
            Event::ExpectSkip => "expect:skip",
            Event::WatchError { .. } => "watch:error",
            Event::DeprecationInfo { .. } => "deprecation:info",
        }
    }

    /// Diagnostics carried by this event, if it carries any.
    pub fn diagnostics(&self) -> Option<&[Diagnostic]> {
        match self {
            Event::TargetError { diagnostics, .. }
            | Event::TaskError { diagnostics, .. }
            | Event::CaseError { diagnostics, .. }
            | Event::ExpectError { diagnostics }
            | Event::ExpectFail { diagnostics }
            | Event::WatchError { diagnostics }
            | Event::DeprecationInfo { diagnostics } => Some(diagnostics),
            _ => None,
        }
    }
}

/// Receiver of published events.
pub trait EventHandler {
    fn handle(&mut self, event: &Event) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Box<dyn FnMut(&Event) -> Result<()>>;

/// Ordered, synchronous publish/subscribe.
///
/// `publish` runs every handler in registration order before returning. The
/// first handler error stops dispatch and is returned to the publisher.
/// Handlers cannot reach the bus during dispatch, so the subscriber list is
/// fixed for the duration of one `publish`.
///
/// Each bus is independent; tests build their own. [`with_default_bus`]
/// offers a shared per-thread instance.
#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    handlers: Vec<(SubscriptionId, Handler)>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: FnMut(&Event) -> Result<()> + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.handlers.push((id, Box::new(handler)));
        id
    }

    /// Subscribe a shared handler; the caller keeps its own handle to inspect
    /// state between or after runs.
    pub fn subscribe_shared<H>(&mut self, handler: Rc<RefCell<H>>) -> SubscriptionId
    where
        H: EventHandler + 'static,
    {
        self.subscribe(move |event| handler.borrow_mut().handle(event))
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(existing, _)| *existing != id);
        self.handlers.len() != before
    }

    pub fn publish(&mut self, event: Event) -> Result<()> {
        trace!(event = event.name(), "publish");
        for (_, handler) in &mut self.handlers {
            handler(&event)?;
        }
        Ok(())
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.len()
    }
}

thread_local! {
    static DEFAULT_BUS: RefCell<EventBus> = RefCell::new(EventBus::new());
}

/// Run `f` against this thread's default bus.
///
/// Fails if called from a handler while the default bus is dispatching.
pub fn with_default_bus<R>(f: impl FnOnce(&mut EventBus) -> R) -> Result<R> {
    DEFAULT_BUS.with(|bus| {
        let mut bus = bus
            .try_borrow_mut()
            .map_err(|_| anyhow!("default event bus is already in use"))?;
        Ok(f(&mut bus))
    })
}

//! Test-only helpers: declaration builders, scripted collaborators and event
//! recording.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result};

use crate::aggregator::ResultAggregator;
use crate::cancellation::CancellationToken;
use crate::coordinator::RunCoordinator;
use crate::core::mode::RunFilters;
use crate::declaration::{AssertionInfo, DeclarationKind, Flags, TestDeclaration, TestTree};
use crate::diagnostic::Diagnostic;
use crate::engine::{Collector, EngineProvider, Evaluation, Evaluator};
use crate::events::{Event, EventBus, EventHandler};
use crate::fail_fast::FailFast;
use crate::io::fixture::FixtureFile;
use crate::result::RunResult;
use crate::task::{Target, Task};

fn declaration(
    kind: DeclarationKind,
    name: &str,
    start: usize,
    children: Vec<TestDeclaration>,
) -> TestDeclaration {
    TestDeclaration {
        kind,
        name: name.to_string(),
        flags: Flags::default(),
        start,
        end: start + 1,
        diagnostics: Vec::new(),
        children,
    }
}

pub fn group(name: &str, start: usize, children: Vec<TestDeclaration>) -> TestDeclaration {
    declaration(DeclarationKind::Group, name, start, children)
}

pub fn case(name: &str, start: usize, children: Vec<TestDeclaration>) -> TestDeclaration {
    declaration(DeclarationKind::Case, name, start, children)
}

/// Assertion named `expect` using `matcher`.
pub fn assertion(matcher: &str, start: usize) -> TestDeclaration {
    declaration(
        DeclarationKind::Assertion(AssertionInfo {
            matcher: matcher.to_string(),
            ..AssertionInfo::default()
        }),
        "expect",
        start,
        Vec::new(),
    )
}

pub fn negated(matcher: &str, start: usize) -> TestDeclaration {
    let mut node = assertion(matcher, start);
    if let DeclarationKind::Assertion(info) = &mut node.kind {
        info.negated = true;
    }
    node
}

pub fn only(mut node: TestDeclaration) -> TestDeclaration {
    node.flags.only = true;
    node
}

pub fn skip(mut node: TestDeclaration) -> TestDeclaration {
    node.flags.skip = true;
    node
}

pub fn todo(mut node: TestDeclaration) -> TestDeclaration {
    node.flags.todo = true;
    node
}

pub fn fail(mut node: TestDeclaration) -> TestDeclaration {
    node.flags.fail = true;
    node
}

pub fn with_diagnostic(mut node: TestDeclaration, text: &str) -> TestDeclaration {
    node.diagnostics.push(Diagnostic::error(text));
    node
}

pub fn tree(children: Vec<TestDeclaration>) -> TestTree {
    TestTree {
        children,
        ..TestTree::default()
    }
}

/// Scripted evaluation result for one assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scripted {
    Match,
    Mismatch(String),
    Rejected(String),
}

/// Collector + evaluator answering from in-memory scripts.
///
/// Assertions without a scripted outcome match.
#[derive(Debug, Clone, Default)]
pub struct ScriptedEngine {
    files: HashMap<PathBuf, Result<TestTree, Vec<Diagnostic>>>,
    projects: HashMap<PathBuf, PathBuf>,
    outcomes: HashMap<(PathBuf, usize), Scripted>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, path: &str, tree: TestTree) -> Self {
        self.files.insert(PathBuf::from(path), Ok(tree));
        self
    }

    pub fn broken_file(mut self, path: &str, text: &str) -> Self {
        self.files
            .insert(PathBuf::from(path), Err(vec![Diagnostic::error(text)]));
        self
    }

    pub fn project(mut self, path: &str, project: &str) -> Self {
        self.projects
            .insert(PathBuf::from(path), PathBuf::from(project));
        self
    }

    pub fn outcome(mut self, path: &str, start: usize, outcome: Scripted) -> Self {
        self.outcomes.insert((PathBuf::from(path), start), outcome);
        self
    }
}

impl Collector for ScriptedEngine {
    fn collect(&mut self, task: &Task) -> Result<TestTree, Vec<Diagnostic>> {
        match self.files.get(&task.file) {
            Some(scripted) => scripted.clone(),
            None => Err(vec![Diagnostic::error(format!(
                "no script for {}",
                task.file.display()
            ))]),
        }
    }

    fn project_for(&mut self, task: &Task) -> Option<PathBuf> {
        self.projects.get(&task.file).cloned()
    }
}

impl Evaluator for ScriptedEngine {
    fn evaluate(
        &mut self,
        task: &Task,
        assertion: &TestDeclaration,
    ) -> Result<Evaluation, Vec<Diagnostic>> {
        let key = (task.file.clone(), assertion.start);
        match self.outcomes.get(&key).cloned().unwrap_or(Scripted::Match) {
            Scripted::Match => Ok(Evaluation::new(true, Vec::new)),
            Scripted::Mismatch(text) => Ok(Evaluation::new(false, move || {
                vec![Diagnostic::error(text)]
            })),
            Scripted::Rejected(text) => Err(vec![Diagnostic::error(text)]),
        }
    }
}

/// Provider cloning one scripted engine per target.
#[derive(Debug, Clone, Default)]
pub struct ScriptedProvider {
    engine: ScriptedEngine,
    unavailable: Vec<Target>,
}

impl ScriptedProvider {
    pub fn new(engine: ScriptedEngine) -> Self {
        Self {
            engine,
            unavailable: Vec::new(),
        }
    }

    pub fn unavailable(mut self, target: &str) -> Self {
        self.unavailable.push(Target::new(target));
        self
    }
}

impl EngineProvider for ScriptedProvider {
    type Engine = ScriptedEngine;

    fn acquire(&mut self, target: &Target) -> Result<ScriptedEngine, Vec<Diagnostic>> {
        if self.unavailable.contains(target) {
            return Err(vec![Diagnostic::error(format!(
                "cannot load target {target}"
            ))]);
        }
        Ok(self.engine.clone())
    }
}

/// Shared recorder of every published event.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Rc<RefCell<Vec<Event>>>,
}

impl EventLog {
    pub fn attach(bus: &mut EventBus) -> Self {
        let log = Self::default();
        bus.subscribe_shared(Rc::new(RefCell::new(log.clone())));
        log
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events.borrow().iter().map(Event::name).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|event| event.name() == name)
            .count()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}

impl EventHandler for EventLog {
    fn handle(&mut self, event: &Event) -> Result<()> {
        self.events.borrow_mut().push(event.clone());
        Ok(())
    }
}

/// Bus, aggregator, log and token wired the way the CLI wires them.
pub struct RunHarness {
    pub bus: EventBus,
    pub log: EventLog,
    pub aggregator: Rc<RefCell<ResultAggregator>>,
    pub token: CancellationToken,
}

impl Default for RunHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl RunHarness {
    pub fn new() -> Self {
        let mut bus = EventBus::new();
        let aggregator = Rc::new(RefCell::new(ResultAggregator::new()));
        bus.subscribe_shared(Rc::clone(&aggregator));
        let log = EventLog::attach(&mut bus);
        Self {
            bus,
            log,
            aggregator,
            token: CancellationToken::new(),
        }
    }

    pub fn with_fail_fast(mut self) -> Self {
        FailFast::install(&mut self.bus, &self.token);
        self
    }

    pub fn run<P: EngineProvider>(
        &mut self,
        provider: &mut P,
        targets: &[&str],
        tasks: &[Task],
        filters: RunFilters,
    ) -> Result<()> {
        let targets: Vec<Target> = targets.iter().map(|t| Target::new(*t)).collect();
        RunCoordinator::new(filters).run(&mut self.bus, provider, &targets, tasks, &self.token)
    }

    /// Snapshot of the aggregated run, if one has started.
    pub fn result(&self) -> Option<RunResult> {
        self.aggregator.borrow().result().cloned()
    }
}

/// Temporary directory of fixture files.
pub struct FixtureDir {
    dir: tempfile::TempDir,
}

impl FixtureDir {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create fixture tempdir")?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, name: &str, fixture: &FixtureFile) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let payload = serde_json::to_string_pretty(fixture).context("serialize fixture")?;
        fs::write(&path, payload).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }
}

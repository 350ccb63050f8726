//! `typecase`: run type-level test files once or in watch mode.
//!
//! Test files are replayed from JSON fixtures (see `runner::io::fixture`).
//! Results are reported through the exit code and, with `--json`, as a result
//! tree on stdout; `RUST_LOG` controls diagnostic tracing on stderr.

use std::cell::RefCell;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use runner::aggregator::ResultAggregator;
use runner::cancellation::{CancelReason, CancellationToken};
use runner::coordinator::RunCoordinator;
use runner::events::{Event, EventBus};
use runner::exit_codes;
use runner::fail_fast::FailFast;
use runner::io::config::{CONFIG_FILE_NAME, ConfigOverrides, RunnerConfig, load_config};
use runner::io::fixture::FixtureProvider;
use runner::io::selection::FileSelection;
use runner::logging;
use runner::reporter::LogReporter;
use runner::task::Task;
use tracing::{info, warn};
use watch::actor::Watch;
use watch::fs::FsSource;
use watch::input::InputSource;
use watch::keyboard::KeySource;
use watch::session::{Session, SessionEnd, run_session};
use watch::state::WatchState;

#[derive(Parser)]
#[command(name = "typecase", version, about = "Type-level test runner")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the selected test files once against every target.
    Run(RunArgs),
    /// Run, then re-run changed files until quit.
    Watch(RunArgs),
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// Configuration file.
    #[arg(long, default_value = CONFIG_FILE_NAME)]
    config: PathBuf,

    /// Target to run against; repeat for several. Replaces `targets`.
    #[arg(long = "target", value_name = "VERSION")]
    targets: Vec<String>,

    /// Only run tests whose name contains this.
    #[arg(long)]
    only: Option<String>,

    /// Skip tests whose name contains this.
    #[arg(long)]
    skip: Option<String>,

    /// Stop at the first error.
    #[arg(long)]
    fail_fast: bool,

    /// Print each run result as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Only run files whose path contains one of these.
    paths: Vec<String>,
}

impl RunArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            targets: self.targets.clone(),
            fail_fast: self.fail_fast,
            only: self.only.clone(),
            skip: self.skip.clone(),
        }
    }
}

/// Configuration with command-line overrides applied and the test root
/// resolved.
struct Resolved {
    config: RunnerConfig,
    root: PathBuf,
    selection: FileSelection,
}

impl Resolved {
    fn load(args: &RunArgs) -> Result<Self> {
        let config = load_config(&args.config)?.with_overrides(&args.overrides());
        config.validate().context("validate command-line options")?;
        let root = config.root_dir(&args.config);
        let root = root
            .canonicalize()
            .with_context(|| format!("resolve test root {}", root.display()))?;
        let selection = FileSelection::from_config(&config, args.paths.clone())?;
        Ok(Self {
            config,
            root,
            selection,
        })
    }

    fn tasks(&self) -> Result<Vec<Task>> {
        let files = self.selection.select_files(&self.root)?;
        if files.is_empty() {
            warn!(root = %self.root.display(), "no test files selected");
        }
        Ok(files.into_iter().map(Task::new).collect())
    }
}

/// Event bus with the aggregator and the subscribers every command uses.
struct Pipeline {
    bus: EventBus,
    aggregator: Rc<RefCell<ResultAggregator>>,
}

impl Pipeline {
    fn new(config: &RunnerConfig, json: bool, token: &CancellationToken) -> Self {
        let mut bus = EventBus::new();
        let aggregator = Rc::new(RefCell::new(ResultAggregator::new()));
        bus.subscribe_shared(Rc::clone(&aggregator));
        bus.subscribe_shared(Rc::new(RefCell::new(LogReporter)));
        if config.fail_fast {
            FailFast::install(&mut bus, token);
        }

        let finished = Rc::clone(&aggregator);
        bus.subscribe(move |event: &Event| {
            if !matches!(event, Event::RunEnd) {
                return Ok(());
            }
            let aggregator = finished.borrow();
            let Some(result) = aggregator.result() else {
                return Ok(());
            };
            info!(
                status = ?result.status,
                files = result.file_counts.total,
                failed = result.file_counts.failed,
                tests = result.test_counts.total,
                assertions = result.assertion_counts.total,
                "run finished"
            );
            if json {
                let payload =
                    serde_json::to_string_pretty(result).context("serialize run result")?;
                println!("{payload}");
            }
            Ok(())
        });

        Self { bus, aggregator }
    }
}

#[tokio::main]
async fn main() {
    logging::init();
    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::Run(args) => run(&args),
        Command::Watch(args) => watch(&args).await,
    };
    match outcome {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::FAILED);
        }
    }
}

fn run(args: &RunArgs) -> Result<i32> {
    let resolved = match Resolved::load(args) {
        Ok(resolved) => resolved,
        Err(err) => {
            eprintln!("{err:#}");
            return Ok(exit_codes::INVALID);
        }
    };
    let tasks = resolved.tasks()?;
    let token = CancellationToken::new();
    let mut pipeline = Pipeline::new(&resolved.config, args.json, &token);
    let coordinator = RunCoordinator::new(resolved.config.filters());
    let mut provider = FixtureProvider::new();

    coordinator.run(
        &mut pipeline.bus,
        &mut provider,
        &resolved.config.targets(),
        &tasks,
        &token,
    )?;

    let result = pipeline.aggregator.borrow_mut().take_result();
    Ok(exit_codes::for_result(result.as_ref()))
}

async fn watch(args: &RunArgs) -> Result<i32> {
    let config_path = std::path::absolute(&args.config)
        .with_context(|| format!("resolve {}", args.config.display()))?;
    let mut resolved = match Resolved::load(args) {
        Ok(resolved) => resolved,
        Err(err) => {
            eprintln!("{err:#}");
            return Ok(exit_codes::INVALID);
        }
    };
    let interactive = std::io::stdin().is_terminal();
    let token = CancellationToken::new();

    loop {
        token.reset();
        let tasks = resolved.tasks()?;
        let mut pipeline = Pipeline::new(&resolved.config, args.json, &token);
        let coordinator = RunCoordinator::new(resolved.config.filters());
        let mut provider = FixtureProvider::new();
        let targets = resolved.config.targets();

        let mut sources: Vec<Box<dyn InputSource>> = vec![Box::new(FsSource::new(
            resolved.root.clone(),
            Some(config_path.clone()),
        ))];
        if interactive {
            sources.push(Box::new(KeySource::new()));
        }
        let watch = Watch::spawn(
            WatchState::new(tasks.clone()),
            Box::new(resolved.selection.clone()),
            resolved.config.watch_debounce(),
            token.clone(),
            sources,
        )?;

        let session = Session {
            bus: &mut pipeline.bus,
            provider: &mut provider,
            coordinator: &coordinator,
            targets: &targets,
            token: &token,
        };
        if run_session(session, &tasks, watch).await? == SessionEnd::Closed {
            return Ok(exit_codes::OK);
        }

        info!("configuration changed, restarting");
        match reload(args, &config_path, &token, interactive).await? {
            Some(next) => resolved = next,
            None => return Ok(exit_codes::OK),
        }
    }
}

/// Resolve the configuration again, waiting out invalid edits.
///
/// Returns `None` if the user quit while waiting.
async fn reload(
    args: &RunArgs,
    config_path: &Path,
    token: &CancellationToken,
    interactive: bool,
) -> Result<Option<Resolved>> {
    loop {
        token.reset();
        let err = match Resolved::load(args) {
            Ok(resolved) => return Ok(Some(resolved)),
            Err(err) => err,
        };
        token.cancel(CancelReason::ConfigError);
        warn!(error = %format!("{err:#}"), "invalid configuration, waiting for a change");
        eprintln!("{err:#}");

        let mut sources: Vec<Box<dyn InputSource>> =
            vec![Box::new(FsSource::config_only(config_path.to_path_buf()))];
        if interactive {
            sources.push(Box::new(KeySource::new()));
        }
        let mut watch = Watch::spawn(
            WatchState::default(),
            Box::new(FileSelection::new(&[], Vec::new())?),
            RunnerConfig::default().watch_debounce(),
            token.clone(),
            sources,
        )?;
        while watch.next().await.is_some() {}
        if watch.finish().await? != Some(CancelReason::ConfigChange) {
            return Ok(None);
        }
    }
}

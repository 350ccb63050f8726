//! The watch actor.
//!
//! One task owns the watch state, the debounce timer and every input source.
//! Inputs arrive over one channel; task batches and non-fatal diagnostics
//! leave over another. The signal channel closes when the actor stops, which
//! ends the caller's sequence.

use std::pin::Pin;
use std::time::Duration;

use anyhow::{Context, Result};
use runner::cancellation::{CancelReason, CancellationToken};
use runner::diagnostic::Diagnostic;
use runner::io::selection::FileFilter;
use runner::task::Task;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Sleep};
use tracing::{debug, info, instrument, warn};

use crate::input::{InputSource, KeyAction, WatchInput, key_action};
use crate::state::{Removal, WatchState};

const INPUT_CAPACITY: usize = 256;
const SIGNAL_CAPACITY: usize = 16;

pub const NO_FILES_LEFT: &str = "no test files left to watch";

/// Output of the watch sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchSignal {
    /// Non-empty set of tasks to run.
    Batch(Vec<Task>),
    Error(Vec<Diagnostic>),
}

/// Handle to a running watch actor.
pub struct Watch {
    signals: mpsc::Receiver<WatchSignal>,
    inputs: mpsc::Sender<WatchInput>,
    token: CancellationToken,
    actor: Option<JoinHandle<Option<CancelReason>>>,
}

impl Watch {
    /// Start `sources` and spawn the actor on the current runtime.
    ///
    /// Sources that fail to start are dropped before returning the error.
    #[instrument(skip_all, fields(watched = state.watched_len(), sources = sources.len()))]
    pub fn spawn(
        state: WatchState,
        filter: Box<dyn FileFilter + Send>,
        debounce: Duration,
        token: CancellationToken,
        mut sources: Vec<Box<dyn InputSource>>,
    ) -> Result<Self> {
        let (input_tx, input_rx) = mpsc::channel(INPUT_CAPACITY);
        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_CAPACITY);

        for source in &mut sources {
            source
                .start(input_tx.clone())
                .context("start watch input")?;
        }

        let actor = WatchActor {
            state,
            filter,
            token: token.clone(),
            sources,
            inputs: input_rx,
            signals: signal_tx,
            debounce: Debounce::new(debounce),
        };
        Ok(Self {
            signals: signal_rx,
            inputs: input_tx,
            token,
            actor: Some(tokio::spawn(actor.run())),
        })
    }

    /// Sender for feeding inputs directly (used by sources and tests).
    pub fn inputs(&self) -> mpsc::Sender<WatchInput> {
        self.inputs.clone()
    }

    /// Next signal; `None` once the actor has stopped.
    ///
    /// Batches still queued when a quit or config change stopped the actor
    /// are discarded.
    pub async fn next(&mut self) -> Option<WatchSignal> {
        loop {
            let signal = self.signals.recv().await?;
            if matches!(signal, WatchSignal::Batch(_)) && self.stopping() {
                debug!("discarding batch queued before stop");
                continue;
            }
            return Some(signal);
        }
    }

    fn stopping(&self) -> bool {
        matches!(
            self.token.reason(),
            Some(CancelReason::WatchClose | CancelReason::ConfigChange)
        )
    }

    /// Wait for the actor to stop and return the reason it cancelled with.
    pub async fn finish(mut self) -> Result<Option<CancelReason>> {
        match self.actor.take() {
            Some(actor) => actor.await.context("join watch actor"),
            None => Ok(None),
        }
    }

    /// Ask the actor to stop, then wait for it.
    pub async fn close(self) -> Result<Option<CancelReason>> {
        // a stopped actor has dropped its receiver
        let _ = self.inputs.send(WatchInput::Close).await;
        self.finish().await
    }
}

impl Drop for Watch {
    fn drop(&mut self) {
        if let Some(actor) = &self.actor {
            actor.abort();
        }
    }
}

/// Trailing debounce: every arm pushes the deadline out by the full delay.
struct Debounce {
    delay: Duration,
    sleep: Pin<Box<Sleep>>,
    armed: bool,
}

impl Debounce {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            sleep: Box::pin(tokio::time::sleep(delay)),
            armed: false,
        }
    }

    fn arm(&mut self) {
        self.sleep.as_mut().reset(Instant::now() + self.delay);
        self.armed = true;
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop(Option<CancelReason>),
}

struct WatchActor {
    state: WatchState,
    filter: Box<dyn FileFilter + Send>,
    token: CancellationToken,
    sources: Vec<Box<dyn InputSource>>,
    inputs: mpsc::Receiver<WatchInput>,
    signals: mpsc::Sender<WatchSignal>,
    debounce: Debounce,
}

impl WatchActor {
    async fn run(mut self) -> Option<CancelReason> {
        debug!("watch started");
        let reason = loop {
            let flow = tokio::select! {
                input = self.inputs.recv() => match input {
                    Some(input) => self.handle(input).await,
                    None => Flow::Stop(None),
                },
                () = self.debounce.sleep.as_mut(), if self.debounce.armed => {
                    self.debounce.disarm();
                    match self.state.flush() {
                        Some(tasks) => emit(&self.signals, WatchSignal::Batch(tasks)).await,
                        None => Flow::Continue,
                    }
                }
            };
            if let Flow::Stop(reason) = flow {
                break reason;
            }
        };
        self.shutdown(reason);
        reason
    }

    async fn handle(&mut self, input: WatchInput) -> Flow {
        match input {
            WatchInput::Changed(path) => {
                if self.state.on_changed(&path, self.filter.as_ref()) {
                    debug!(path = %path.display(), "change pending");
                    self.debounce.arm();
                }
                Flow::Continue
            }
            WatchInput::Removed(path) => match self.state.on_removed(&path) {
                Removal::Emptied => {
                    self.debounce.disarm();
                    warn!(path = %path.display(), "last watched file removed");
                    let diagnostics = vec![Diagnostic::warning(NO_FILES_LEFT)];
                    emit(&self.signals, WatchSignal::Error(diagnostics)).await
                }
                Removal::Dropped | Removal::Untracked => Flow::Continue,
            },
            WatchInput::ConfigChanged => self.stop_with(CancelReason::ConfigChange),
            WatchInput::Key(byte) => match key_action(byte) {
                Some(KeyAction::RunAll) => {
                    self.debounce.disarm();
                    match self.state.run_all() {
                        Some(tasks) => emit(&self.signals, WatchSignal::Batch(tasks)).await,
                        None => Flow::Continue,
                    }
                }
                Some(KeyAction::Quit) => self.stop_with(CancelReason::WatchClose),
                None => Flow::Continue,
            },
            WatchInput::Close => Flow::Stop(None),
        }
    }

    fn stop_with(&self, reason: CancelReason) -> Flow {
        self.token.cancel(reason);
        Flow::Stop(Some(reason))
    }

    fn shutdown(&mut self, reason: Option<CancelReason>) {
        self.debounce.disarm();
        self.sources.clear();
        match reason {
            Some(reason) => info!(%reason, "watch stopped"),
            None => debug!("watch stopped"),
        }
    }
}

/// Send a signal; a dropped receiver stops the actor.
async fn emit(signals: &mpsc::Sender<WatchSignal>, signal: WatchSignal) -> Flow {
    if let WatchSignal::Batch(tasks) = &signal {
        info!(files = tasks.len(), "flushing watch batch");
    }
    match signals.send(signal).await {
        Ok(()) => Flow::Continue,
        Err(_) => Flow::Stop(None),
    }
}

//! File system input: a polling watcher over the test root and the config
//! file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{Event as NotifyEvent, EventKind, PollWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::input::{InputSource, WatchInput};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Polls `root` recursively and `config_file`, translating notify events
/// into [`WatchInput`]s. The watcher stops when the source is dropped.
pub struct FsSource {
    root: Option<PathBuf>,
    config_file: Option<PathBuf>,
    poll_interval: Duration,
    watcher: Option<PollWatcher>,
}

impl FsSource {
    pub fn new(root: PathBuf, config_file: Option<PathBuf>) -> Self {
        Self {
            root: Some(root),
            config_file,
            poll_interval: POLL_INTERVAL,
            watcher: None,
        }
    }

    /// Watch only the configuration file.
    pub fn config_only(config_file: PathBuf) -> Self {
        Self {
            root: None,
            config_file: Some(config_file),
            poll_interval: POLL_INTERVAL,
            watcher: None,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

impl InputSource for FsSource {
    fn start(&mut self, inputs: mpsc::Sender<WatchInput>) -> Result<()> {
        let config_file = self.config_file.clone();
        let mut watcher = PollWatcher::new(
            move |res: Result<NotifyEvent, notify::Error>| match res {
                Ok(event) => {
                    for input in translate(&event, config_file.as_deref()) {
                        if inputs.try_send(input).is_err() {
                            warn!("watch input dropped");
                        }
                    }
                }
                Err(err) => warn!(error = %err, "file watcher error"),
            },
            notify::Config::default().with_poll_interval(self.poll_interval),
        )
        .context("create file watcher")?;

        if let Some(root) = &self.root {
            watcher
                .watch(root, RecursiveMode::Recursive)
                .with_context(|| format!("watch {}", root.display()))?;
            info!(path = %root.display(), "watching test files");
        }
        // a missing config file is created later; watch its directory then
        if let Some(config) = &self.config_file {
            let target = if config.exists() {
                config.as_path()
            } else {
                config.parent().unwrap_or_else(|| Path::new("."))
            };
            watcher
                .watch(target, RecursiveMode::NonRecursive)
                .with_context(|| format!("watch {}", target.display()))?;
            info!(path = %config.display(), "watching configuration");
        }

        self.watcher = Some(watcher);
        Ok(())
    }
}

/// Translate one notify event. Anything touching the config file is a config
/// change; other create/modify events are changes and removals are removals.
pub fn translate(event: &NotifyEvent, config_file: Option<&Path>) -> Vec<WatchInput> {
    let mut inputs = Vec::new();
    for path in &event.paths {
        if config_file.is_some_and(|config| config == path.as_path()) {
            if matches!(
                event.kind,
                EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
            ) {
                inputs.push(WatchInput::ConfigChanged);
            }
            continue;
        }
        match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) => {
                inputs.push(WatchInput::Changed(path.clone()));
            }
            EventKind::Remove(_) => inputs.push(WatchInput::Removed(path.clone())),
            _ => {}
        }
    }
    inputs
}

#[cfg(test)]
mod tests {
    use notify::event::{CreateKind, ModifyKind, RemoveKind};

    use super::*;

    fn event(kind: EventKind, path: &str) -> NotifyEvent {
        NotifyEvent {
            kind,
            paths: vec![PathBuf::from(path)],
            attrs: Default::default(),
        }
    }

    #[test]
    fn create_and_modify_are_changes() {
        let created = event(EventKind::Create(CreateKind::File), "/w/a.tst.json");
        let modified = event(EventKind::Modify(ModifyKind::Any), "/w/a.tst.json");
        for event in [created, modified] {
            assert_eq!(
                translate(&event, None),
                vec![WatchInput::Changed(PathBuf::from("/w/a.tst.json"))]
            );
        }
    }

    #[test]
    fn removal_is_reported() {
        let removed = event(EventKind::Remove(RemoveKind::File), "/w/a.tst.json");
        assert_eq!(
            translate(&removed, None),
            vec![WatchInput::Removed(PathBuf::from("/w/a.tst.json"))]
        );
    }

    #[test]
    fn config_file_events_are_config_changes() {
        let config = Path::new("/w/typecase.toml");
        let modified = event(EventKind::Modify(ModifyKind::Any), "/w/typecase.toml");
        assert_eq!(
            translate(&modified, Some(config)),
            vec![WatchInput::ConfigChanged]
        );
        let access = event(EventKind::Access(notify::event::AccessKind::Any), "/w/x");
        assert!(translate(&access, Some(config)).is_empty());
    }

    #[test]
    fn poll_watcher_reports_new_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().canonicalize().expect("canonical root");
        let (tx, mut rx) = mpsc::channel(16);
        let mut source =
            FsSource::new(root.clone(), None).with_poll_interval(Duration::from_millis(20));
        source.start(tx).expect("start");

        let file = root.join("a.tst.json");
        std::fs::write(&file, "{}").expect("write");

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        let mut seen = false;
        while std::time::Instant::now() < deadline {
            match rx.try_recv() {
                Ok(WatchInput::Changed(path)) if path == file => {
                    seen = true;
                    break;
                }
                Ok(_) => {}
                Err(_) => std::thread::sleep(Duration::from_millis(20)),
            }
        }
        assert!(seen, "expected a change for {}", file.display());
    }
}

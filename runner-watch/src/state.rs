//! Watched and pending file sets.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use runner::io::selection::FileFilter;
use runner::task::Task;

/// What a removal did to the watched set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// The path was not watched.
    Untracked,
    Dropped,
    /// The last watched file went away.
    Emptied,
}

/// Files being watched and the subset changed since the last flush.
///
/// Both maps are keyed by file path; iteration order is path order.
#[derive(Debug, Clone, Default)]
pub struct WatchState {
    watched: BTreeMap<PathBuf, Task>,
    pending: BTreeMap<PathBuf, Task>,
}

impl WatchState {
    pub fn new(tasks: impl IntoIterator<Item = Task>) -> Self {
        let watched = tasks
            .into_iter()
            .map(|task| (task.file.clone(), task))
            .collect();
        Self {
            watched,
            pending: BTreeMap::new(),
        }
    }

    /// Mark a changed file pending, registering it first if it is a new
    /// eligible file. Returns whether anything became pending.
    pub fn on_changed(&mut self, path: &Path, filter: &dyn FileFilter) -> bool {
        let task = match self.watched.get(path) {
            Some(task) => task.clone(),
            None if filter.is_eligible(path) => {
                let task = Task::new(path);
                self.watched.insert(path.to_path_buf(), task.clone());
                task
            }
            None => return false,
        };
        self.pending.insert(path.to_path_buf(), task);
        true
    }

    pub fn on_removed(&mut self, path: &Path) -> Removal {
        self.pending.remove(path);
        if self.watched.remove(path).is_none() {
            return Removal::Untracked;
        }
        if self.watched.is_empty() {
            Removal::Emptied
        } else {
            Removal::Dropped
        }
    }

    /// Take the files changed since the last flush.
    pub fn flush(&mut self) -> Option<Vec<Task>> {
        if self.pending.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.pending).into_values().collect())
    }

    /// Every watched file; clears anything pending.
    pub fn run_all(&mut self) -> Option<Vec<Task>> {
        self.pending.clear();
        if self.watched.is_empty() {
            return None;
        }
        Some(self.watched.values().cloned().collect())
    }

    pub fn watched_len(&self) -> usize {
        self.watched.len()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use runner::io::selection::FileSelection;

    use super::*;

    fn selection() -> FileSelection {
        FileSelection::new(&[r"\.tst\.json$".to_string()], Vec::new()).expect("selection")
    }

    fn state(paths: &[&str]) -> WatchState {
        WatchState::new(paths.iter().map(|p| Task::new(*p)))
    }

    #[test]
    fn repeated_changes_collapse_into_one_pending_task() {
        let mut state = state(&["/w/a.tst.json", "/w/b.tst.json"]);
        for _ in 0..3 {
            assert!(state.on_changed(Path::new("/w/a.tst.json"), &selection()));
        }
        let batch = state.flush().expect("batch");
        assert_eq!(batch, vec![Task::new("/w/a.tst.json")]);
        assert_eq!(state.flush(), None);
    }

    #[test]
    fn new_files_are_registered_only_when_eligible() {
        let mut state = state(&["/w/a.tst.json"]);
        assert!(state.on_changed(Path::new("/w/new.tst.json"), &selection()));
        assert!(!state.on_changed(Path::new("/w/readme.md"), &selection()));
        assert_eq!(state.watched_len(), 2);
        assert_eq!(state.flush().map(|b| b.len()), Some(1));
    }

    #[test]
    fn run_all_returns_every_watched_file_and_clears_pending() {
        let mut state = state(&["/w/b.tst.json", "/w/a.tst.json"]);
        state.on_changed(Path::new("/w/a.tst.json"), &selection());
        let all = state.run_all().expect("all");
        assert_eq!(
            all,
            vec![Task::new("/w/a.tst.json"), Task::new("/w/b.tst.json")]
        );
        assert!(!state.has_pending());
    }

    #[test]
    fn removing_the_last_file_empties_the_set() {
        let mut state = state(&["/w/a.tst.json", "/w/b.tst.json"]);
        state.on_changed(Path::new("/w/a.tst.json"), &selection());
        assert_eq!(state.on_removed(Path::new("/w/a.tst.json")), Removal::Dropped);
        assert!(!state.has_pending());
        assert_eq!(state.on_removed(Path::new("/w/zzz.tst.json")), Removal::Untracked);
        assert_eq!(state.on_removed(Path::new("/w/b.tst.json")), Removal::Emptied);
        assert_eq!(state.run_all(), None);
    }
}

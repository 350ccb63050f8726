//! Fixture files on disk replayed through the full pipeline.

use std::path::PathBuf;

use runner::core::mode::RunFilters;
use runner::io::config::RunnerConfig;
use runner::io::fixture::{FixtureFile, FixtureProvider, RecordedAssertion, RecordedOutcome};
use runner::io::selection::FileSelection;
use runner::result::ResultStatus;
use runner::task::{Target, Task};
use runner::test_support::{FixtureDir, RunHarness, assertion, case, tree};

fn recorded(start: usize, target: Option<&str>, outcome: RecordedOutcome) -> RecordedAssertion {
    RecordedAssertion {
        start,
        target: target.map(str::to_string),
        outcome,
    }
}

fn sample_fixture() -> FixtureFile {
    FixtureFile {
        project: Some(PathBuf::from("tsconfig.json")),
        tree: tree(vec![
            case("identity", 10, vec![assertion("toBe", 11)]),
            case("narrowing", 20, vec![assertion("toBeAssignableTo", 21)]),
        ]),
        outcomes: vec![
            recorded(11, None, RecordedOutcome::Match),
            recorded(21, None, RecordedOutcome::Match),
            recorded(
                21,
                Some("4.9"),
                RecordedOutcome::Mismatch {
                    explain: vec!["Type 'string' is not assignable to type 'never'.".into()],
                },
            ),
        ],
    }
}

#[test]
fn recorded_outcomes_are_replayed_per_target() {
    let dir = FixtureDir::new().expect("fixture dir");
    let file = dir
        .write("types/narrowing.tst.json", &sample_fixture())
        .expect("write fixture");

    let mut harness = RunHarness::new();
    let mut provider = FixtureProvider::new();
    harness
        .run(
            &mut provider,
            &["4.9", "5.5"],
            &[Task::new(&file)],
            RunFilters::default(),
        )
        .expect("run");

    let result = harness.result().expect("result");
    assert_eq!(result.targets.len(), 2);
    assert_eq!(result.targets[0].status, ResultStatus::Failed);
    assert_eq!(result.targets[0].assertion_counts.failed, 1);
    assert_eq!(result.targets[1].status, ResultStatus::Passed);
    assert_eq!(
        result.targets[1].projects[0].config_file,
        Some(PathBuf::from("tsconfig.json"))
    );
    assert_eq!(result.test_counts.total, 4);
    assert_eq!(result.file_counts.failed, 1);
    assert_eq!(result.file_counts.passed, 1);
}

#[test]
fn selection_feeds_tasks_in_sorted_order() {
    let dir = FixtureDir::new().expect("fixture dir");
    dir.write("b.tst.json", &sample_fixture()).expect("write b");
    dir.write("a.tst.json", &sample_fixture()).expect("write a");
    dir.write("notes.json", &FixtureFile::default())
        .expect("write other");

    let config = RunnerConfig::default();
    let selection = FileSelection::from_config(&config, Vec::new()).expect("selection");
    let files = selection.select_files(dir.path()).expect("select");
    let tasks: Vec<Task> = files.iter().map(Task::new).collect();
    assert_eq!(tasks.len(), 2);
    assert!(tasks[0].file.ends_with("a.tst.json"));

    let mut harness = RunHarness::new();
    let mut provider = FixtureProvider::supporting(vec![Target::new("5.5")]);
    harness
        .run(&mut provider, &["5.5"], &tasks, RunFilters::default())
        .expect("run");
    let result = harness.result().expect("result");
    assert_eq!(result.file_counts.passed, 2);
    assert!(!result.has_failures());
}

#[test]
fn unreadable_fixture_fails_only_its_file() {
    let dir = FixtureDir::new().expect("fixture dir");
    let good = dir.write("good.tst.json", &sample_fixture()).expect("write");
    let missing = dir.path().join("missing.tst.json");

    let mut harness = RunHarness::new();
    let mut provider = FixtureProvider::new();
    harness
        .run(
            &mut provider,
            &["5.5"],
            &[Task::new(&missing), Task::new(&good)],
            RunFilters::default(),
        )
        .expect("run");

    assert_eq!(harness.log.count("task:error"), 1);
    let result = harness.result().expect("result");
    assert_eq!(result.file_counts.failed, 1);
    assert_eq!(result.file_counts.passed, 1);
}

#[test]
fn unsupported_target_is_a_target_error() {
    let mut harness = RunHarness::new();
    let mut provider = FixtureProvider::supporting(vec![Target::new("5.5")]);
    harness
        .run(&mut provider, &["3.0"], &[], RunFilters::default())
        .expect("run");

    let events = harness.log.events();
    let diagnostics = events
        .iter()
        .find_map(|event| event.diagnostics())
        .expect("target error diagnostics");
    assert!(diagnostics[0].text.contains("'3.0' is not available"));
}

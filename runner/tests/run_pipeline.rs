//! End-to-end runs through the coordinator, walker and aggregator using
//! scripted collaborators.

use std::path::Path;

use runner::core::mode::RunFilters;
use runner::events::Event;
use runner::result::{ResultCounts, ResultNode, ResultStatus};
use runner::task::Task;
use runner::test_support::{
    RunHarness, Scripted, ScriptedEngine, ScriptedProvider, assertion, case, fail, group, negated,
    only, skip, todo, tree, with_diagnostic,
};

fn run_one(engine: ScriptedEngine, task: Task) -> RunHarness {
    let mut harness = RunHarness::new();
    let mut provider = ScriptedProvider::new(engine);
    harness
        .run(&mut provider, &["current"], &[task], RunFilters::default())
        .expect("run");
    harness
}

fn terminal_case_events(harness: &RunHarness) -> Vec<&'static str> {
    harness
        .log
        .names()
        .into_iter()
        .filter(|name| name.starts_with("case:") && *name != "case:start")
        .collect()
}

#[test]
fn every_visited_node_has_one_start_and_one_terminal_event() {
    let engine = ScriptedEngine::new().file(
        "a.tst",
        tree(vec![group(
            "math",
            0,
            vec![
                case("adds", 10, vec![assertion("toBe", 11), assertion("toBe", 12)]),
                skip(case("divides", 20, vec![assertion("toBe", 21)])),
                todo(case("rounds", 30, vec![assertion("toBe", 31)])),
            ],
        )]),
    );
    let harness = run_one(engine, Task::new("a.tst"));
    let log = &harness.log;

    assert_eq!(log.count("group:start"), 1);
    assert_eq!(log.count("group:end"), 1);
    assert_eq!(log.count("case:start"), 3);
    assert_eq!(terminal_case_events(&harness).len(), 3);
    assert_eq!(log.count("expect:start"), 3);
    assert_eq!(
        log.count("expect:pass") + log.count("expect:skip") + log.count("expect:fail"),
        3
    );
    assert_eq!(
        log.names(),
        vec![
            "run:start",
            "target:start",
            "project:start",
            "task:start",
            "group:start",
            "case:start",
            "expect:start",
            "expect:pass",
            "expect:start",
            "expect:pass",
            "case:pass",
            "case:start",
            "expect:start",
            "expect:skip",
            "case:skip",
            "case:start",
            "case:todo",
            "group:end",
            "task:end",
            "project:end",
            "target:end",
            "run:end",
        ]
    );
}

#[test]
fn only_prunes_siblings_regardless_of_order() {
    let layouts = [
        vec![
            only(case("a", 10, vec![assertion("toBe", 11)])),
            case("b", 20, vec![assertion("toBe", 21)]),
            case("c", 30, vec![assertion("toBe", 31)]),
        ],
        vec![
            case("a", 10, vec![assertion("toBe", 11)]),
            case("b", 20, vec![assertion("toBe", 21)]),
            only(case("c", 30, vec![assertion("toBe", 31)])),
        ],
    ];

    for children in layouts {
        let engine = ScriptedEngine::new().file("a.tst", tree(children));
        let harness = run_one(engine, Task::new("a.tst"));
        let terminals = terminal_case_events(&harness);
        assert_eq!(terminals.iter().filter(|n| **n == "case:pass").count(), 1);
        assert_eq!(terminals.iter().filter(|n| **n == "case:skip").count(), 2);
    }
}

#[test]
fn fail_flag_inverts_assertion_outcome() {
    let engine = ScriptedEngine::new()
        .file(
            "a.tst",
            tree(vec![
                fail(case("holds", 10, vec![assertion("toBe", 11)])),
                fail(case("breaks", 20, vec![assertion("toBe", 21)])),
            ]),
        )
        .outcome("a.tst", 11, Scripted::Match)
        .outcome("a.tst", 21, Scripted::Mismatch("not assignable".into()));
    let harness = run_one(engine, Task::new("a.tst"));

    let expect_terminals: Vec<&str> = harness
        .log
        .names()
        .into_iter()
        .filter(|name| name.starts_with("expect:") && *name != "expect:start")
        .collect();
    assert_eq!(expect_terminals, vec!["expect:error", "expect:pass"]);
    assert_eq!(terminal_case_events(&harness), vec!["case:fail", "case:pass"]);
}

#[test]
fn negated_assertion_passes_on_mismatch() {
    let engine = ScriptedEngine::new()
        .file("a.tst", tree(vec![case("c", 10, vec![negated("toBe", 11)])]))
        .outcome("a.tst", 11, Scripted::Mismatch("unused".into()));
    let harness = run_one(engine, Task::new("a.tst"));
    assert_eq!(harness.log.count("expect:pass"), 1);
}

#[test]
fn todo_case_publishes_no_assertion_events() {
    let engine = ScriptedEngine::new().file(
        "a.tst",
        tree(vec![todo(case(
            "later",
            10,
            vec![assertion("toBe", 11), assertion("toBe", 12)],
        ))]),
    );
    let harness = run_one(engine, Task::new("a.tst"));
    assert_eq!(terminal_case_events(&harness), vec!["case:todo"]);
    assert!(harness.log.names().iter().all(|n| !n.starts_with("expect:")));

    let result = harness.result().expect("result");
    assert_eq!(result.test_counts.todo, 1);
    assert_eq!(result.file_counts.todo, 1);
}

#[test]
fn counts_roll_up_to_task_target_and_run() {
    let engine = ScriptedEngine::new()
        .file(
            "a.tst",
            tree(vec![
                case("one", 10, vec![assertion("toBe", 11), assertion("toBe", 12)]),
                case("two", 20, vec![assertion("toBe", 21), assertion("toBe", 22)]),
                case("three", 30, vec![assertion("toBe", 31)]),
            ]),
        )
        .outcome("a.tst", 31, Scripted::Mismatch("expected string".into()));
    let harness = run_one(engine, Task::new("a.tst"));
    let result = harness.result().expect("result");

    let tests = ResultCounts {
        passed: 2,
        failed: 1,
        total: 3,
        ..ResultCounts::default()
    };
    let assertions = ResultCounts {
        passed: 4,
        failed: 1,
        total: 5,
        ..ResultCounts::default()
    };
    assert_eq!(result.test_counts, tests);
    assert_eq!(result.assertion_counts, assertions);

    let target = &result.targets[0];
    assert_eq!(target.test_counts, tests);
    assert_eq!(target.assertion_counts, assertions);
    let task = &target.projects[0].tasks[0];
    assert_eq!(task.test_counts, tests);
    assert_eq!(task.status, ResultStatus::Failed);
    assert_eq!(result.status, ResultStatus::Failed);
    assert!(result.has_failures());
}

#[test]
fn fail_fast_stops_remaining_files_and_targets() {
    let file = || {
        tree(vec![case(
            "c",
            10,
            vec![assertion("toBe", 11), assertion("toBe", 12)],
        )])
    };
    let engine = ScriptedEngine::new()
        .file("a.tst", file())
        .file("b.tst", file())
        .outcome("a.tst", 11, Scripted::Mismatch("boom".into()));

    let mut harness = RunHarness::new().with_fail_fast();
    let mut provider = ScriptedProvider::new(engine);
    harness
        .run(
            &mut provider,
            &["5.4", "5.5"],
            &[Task::new("a.tst"), Task::new("b.tst")],
            RunFilters::default(),
        )
        .expect("run");

    let events = harness.log.events();
    assert_eq!(harness.log.count("target:start"), 1);
    assert_eq!(harness.log.count("task:start"), 1);
    // the second assertion of the failing case is never visited
    assert_eq!(harness.log.count("expect:start"), 1);
    assert!(!events.iter().any(|event| matches!(
        event,
        Event::TaskStart { task } if task.file == Path::new("b.tst")
    )));
    assert_eq!(harness.log.names().last(), Some(&"run:end"));

    // reset for the next run
    assert!(!harness.token.is_cancellation_requested());
}

#[test]
fn assertion_inside_group_is_a_single_task_error() {
    let engine = ScriptedEngine::new().file(
        "a.tst",
        tree(vec![group(
            "math",
            0,
            vec![assertion("toBe", 1), case("adds", 10, vec![assertion("toBe", 11)])],
        )]),
    );
    let harness = run_one(engine, Task::new("a.tst"));

    assert_eq!(harness.log.count("task:error"), 1);
    assert!(
        harness
            .log
            .names()
            .iter()
            .all(|n| !n.starts_with("case:") && !n.starts_with("expect:"))
    );
    let result = harness.result().expect("result");
    assert_eq!(result.file_counts.failed, 1);
}

#[test]
fn position_runs_only_the_selected_declaration() {
    let engine = ScriptedEngine::new().file(
        "a.tst",
        tree(vec![
            case("first", 10, vec![assertion("toBe", 11)]),
            skip(case("second", 20, vec![assertion("toBe", 21)])),
        ]),
    );
    let harness = run_one(engine, Task::at("a.tst", 20));
    assert_eq!(terminal_case_events(&harness), vec!["case:skip", "case:pass"]);
}

#[test]
fn name_filters_select_and_skip_cases() {
    let engine = ScriptedEngine::new().file(
        "a.tst",
        tree(vec![
            case("parses numbers", 10, vec![assertion("toBe", 11)]),
            case("parses strings", 20, vec![assertion("toBe", 21)]),
            case("formats output", 30, vec![assertion("toBe", 31)]),
        ]),
    );
    let mut harness = RunHarness::new();
    let mut provider = ScriptedProvider::new(engine);
    let filters = RunFilters {
        only: Some("PARSES".into()),
        skip: Some("strings".into()),
        position: None,
    };
    harness
        .run(&mut provider, &["current"], &[Task::new("a.tst")], filters)
        .expect("run");
    assert_eq!(
        terminal_case_events(&harness),
        vec!["case:pass", "case:skip", "case:skip"]
    );
}

#[test]
fn siblings_before_an_illegal_node_still_run() {
    let engine = ScriptedEngine::new().file(
        "a.tst",
        tree(vec![
            group(
                "math",
                0,
                vec![
                    case("ok", 10, vec![assertion("toBe", 11)]),
                    assertion("toBe", 20),
                    case("unreached", 30, vec![assertion("toBe", 31)]),
                ],
            ),
            case("after", 40, vec![assertion("toBe", 41)]),
        ]),
    );
    let harness = run_one(engine, Task::new("a.tst"));

    assert_eq!(
        harness.log.names()[4..15].to_vec(),
        vec![
            "group:start",
            "case:start",
            "expect:start",
            "expect:pass",
            "case:pass",
            "task:error",
            "group:end",
            "case:start",
            "expect:start",
            "expect:pass",
            "case:pass",
        ]
    );
    let errors: Vec<_> = harness
        .log
        .events()
        .into_iter()
        .filter_map(|event| match event {
            Event::TaskError { diagnostics, .. } => Some(diagnostics),
            _ => None,
        })
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].len(), 1);
    assert_eq!(errors[0][0].origin.as_ref().map(|o| o.start), Some(20));
    assert_eq!(harness.result().expect("result").file_counts.failed, 1);
}

#[test]
fn assertion_diagnostics_fail_the_case() {
    let engine = ScriptedEngine::new().file(
        "a.tst",
        tree(vec![case(
            "c",
            10,
            vec![with_diagnostic(assertion("toBe", 11), "Type 'string' is not assignable")],
        )]),
    );
    let harness = run_one(engine, Task::new("a.tst"));

    assert_eq!(
        harness.log.names()[4..8].to_vec(),
        vec!["case:start", "expect:start", "expect:error", "case:fail"]
    );
    let result = harness.result().expect("result");
    let ResultNode::Case(case) = &result.targets[0].projects[0].tasks[0].children[0] else {
        panic!("expected a case");
    };
    assert_eq!(case.status, ResultStatus::Failed);
}

#[test]
fn assertion_diagnostics_are_dropped_when_skipped() {
    let engine = ScriptedEngine::new().file(
        "a.tst",
        tree(vec![skip(case(
            "c",
            10,
            vec![with_diagnostic(assertion("toBe", 11), "Type 'string' is not assignable")],
        ))]),
    );
    let harness = run_one(engine, Task::new("a.tst"));

    assert_eq!(
        harness.log.names()[4..8].to_vec(),
        vec!["case:start", "expect:start", "expect:skip", "case:skip"]
    );
    assert_eq!(harness.log.count("expect:error"), 0);
}

#[test]
fn group_diagnostics_abort_the_rest_of_the_file() {
    let engine = ScriptedEngine::new().file(
        "a.tst",
        tree(vec![
            group(
                "outer",
                0,
                vec![with_diagnostic(
                    group("inner", 1, vec![case("x", 2, Vec::new())]),
                    "name must be a string literal",
                )],
            ),
            case("after", 10, vec![assertion("toBe", 11)]),
        ]),
    );
    let harness = run_one(engine, Task::new("a.tst"));

    assert_eq!(
        harness.log.names()[4..9].to_vec(),
        vec![
            "group:start",
            "group:start",
            "task:error",
            "group:end",
            "group:end"
        ]
    );
    assert_eq!(harness.log.count("case:start"), 0);
}

#[test]
fn case_diagnostics_are_dropped_when_skipped() {
    let engine = ScriptedEngine::new().file(
        "a.tst",
        tree(vec![
            with_diagnostic(case("broken", 10, Vec::new()), "syntax"),
            skip(with_diagnostic(case("ignored", 20, Vec::new()), "syntax")),
        ]),
    );
    let harness = run_one(engine, Task::new("a.tst"));
    assert_eq!(terminal_case_events(&harness), vec!["case:error", "case:skip"]);
}

#[test]
fn evaluator_rejection_is_an_expect_error() {
    let engine = ScriptedEngine::new()
        .file("a.tst", tree(vec![case("c", 10, vec![assertion("toBe", 11)])]))
        .outcome("a.tst", 11, Scripted::Rejected("missing type argument".into()));
    let harness = run_one(engine, Task::new("a.tst"));

    assert_eq!(harness.log.count("expect:error"), 1);
    let result = harness.result().expect("result");
    let ResultNode::Case(case) = &result.targets[0].projects[0].tasks[0].children[0] else {
        panic!("expected case result");
    };
    assert_eq!(case.status, ResultStatus::Failed);
    assert_eq!(case.assertion_counts.failed, 1);
    assert_eq!(
        case.children[0].status(),
        ResultStatus::Failed,
        "assertion result records the error"
    );
}

#[test]
fn unavailable_target_reports_and_continues() {
    let engine = ScriptedEngine::new().file("a.tst", tree(vec![case("c", 10, Vec::new())]));
    let mut harness = RunHarness::new();
    let mut provider = ScriptedProvider::new(engine).unavailable("4.9");
    harness
        .run(
            &mut provider,
            &["4.9", "5.5"],
            &[Task::new("a.tst")],
            RunFilters::default(),
        )
        .expect("run");

    assert_eq!(harness.log.count("target:error"), 1);
    assert_eq!(harness.log.count("task:start"), 1);
    let result = harness.result().expect("result");
    assert_eq!(result.targets[0].status, ResultStatus::Failed);
    assert_eq!(result.targets[1].status, ResultStatus::Passed);
    assert_eq!(result.status, ResultStatus::Failed);
}

#[test]
fn collection_failure_is_a_task_error() {
    let engine = ScriptedEngine::new()
        .broken_file("a.tst", "cannot read file")
        .file("b.tst", tree(vec![case("c", 10, Vec::new())]));
    let mut harness = RunHarness::new();
    let mut provider = ScriptedProvider::new(engine);
    harness
        .run(
            &mut provider,
            &["current"],
            &[Task::new("a.tst"), Task::new("b.tst")],
            RunFilters::default(),
        )
        .expect("run");

    let result = harness.result().expect("result");
    assert_eq!(result.file_counts.failed, 1);
    assert_eq!(result.file_counts.passed, 1);
    assert_eq!(result.file_counts.total, 2);
}

#[test]
fn project_changes_open_new_projects() {
    let engine = ScriptedEngine::new()
        .file("a.tst", tree(vec![case("c", 10, Vec::new())]))
        .file("b.tst", tree(vec![case("c", 10, Vec::new())]))
        .file("c.tst", tree(vec![case("c", 10, Vec::new())]))
        .project("a.tst", "one/tsconfig.json")
        .project("b.tst", "one/tsconfig.json")
        .project("c.tst", "two/tsconfig.json");
    let mut harness = RunHarness::new();
    let mut provider = ScriptedProvider::new(engine);
    harness
        .run(
            &mut provider,
            &["current"],
            &[Task::new("a.tst"), Task::new("b.tst"), Task::new("c.tst")],
            RunFilters::default(),
        )
        .expect("run");

    let result = harness.result().expect("result");
    let projects = &result.targets[0].projects;
    assert_eq!(projects.len(), 2);
    assert_eq!(projects[0].tasks.len(), 2);
    assert_eq!(projects[1].tasks.len(), 1);
}

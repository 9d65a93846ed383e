//! Stage ordering and halt-policy invariants.

use std::cell::RefCell;

use warden::stage::{Pipeline, Stage, StageResult};

/// A stage that records its execution in `trace` and returns `outcome`.
fn traced<'a>(
    name: &'a str,
    required: bool,
    trace: &'a RefCell<Vec<&'a str>>,
    outcome: StageResult,
) -> Stage<'a> {
    Stage::new(name, required, move || {
        trace.borrow_mut().push(name);
        outcome.clone()
    })
}

#[test]
fn test_stages_execute_in_construction_order() {
    let trace = RefCell::new(Vec::new());
    let pipeline = Pipeline::new(
        "ordered",
        vec![
            traced("first", true, &trace, StageResult::Success),
            traced("second", false, &trace, StageResult::Success),
            traced("third", true, &trace, StageResult::Success),
        ],
    )
    .unwrap();

    let report = pipeline.run();
    assert!(report.succeeded());
    assert_eq!(trace.borrow().as_slice(), ["first", "second", "third"]);
}

#[test]
fn test_no_stage_after_a_required_failure_executes() {
    let trace = RefCell::new(Vec::new());
    let pipeline = Pipeline::new(
        "halting",
        vec![
            traced("ok", true, &trace, StageResult::Success),
            traced("fails", true, &trace, StageResult::failure("broken")),
            traced("after-one", true, &trace, StageResult::Success),
            traced("after-two", false, &trace, StageResult::Success),
        ],
    )
    .unwrap();

    let report = pipeline.run();
    assert!(!report.succeeded());
    assert_eq!(trace.borrow().as_slice(), ["ok", "fails"]);
    assert_eq!(report.not_run, vec!["after-one", "after-two"]);

    let halt = report.halted.unwrap();
    assert_eq!(halt.stage, "fails");
    assert_eq!(halt.reason, "broken");
}

#[test]
fn test_optional_failures_never_halt() {
    let trace = RefCell::new(Vec::new());
    let pipeline = Pipeline::new(
        "tolerant",
        vec![
            traced("soft-one", false, &trace, StageResult::failure("a")),
            traced("soft-two", false, &trace, StageResult::failure("b")),
            traced("end", true, &trace, StageResult::Success),
        ],
    )
    .unwrap();

    let report = pipeline.run();
    assert!(report.succeeded());
    assert_eq!(report.warning_count(), 2);
    assert_eq!(trace.borrow().len(), 3);
    assert!(report.not_run.is_empty());
}

#[test]
fn test_halt_is_first_required_failure_not_last() {
    let pipeline = Pipeline::new(
        "double-fault",
        vec![
            Stage::new("first-fault", true, || StageResult::failure("one")),
            Stage::new("second-fault", true, || StageResult::failure("two")),
        ],
    )
    .unwrap();

    let report = pipeline.run();
    let halt = report.halted.clone().unwrap();
    assert_eq!(halt.stage, "first-fault");
    assert_eq!(report.executed(), 1);
}

#[test]
fn test_duplicate_names_rejected_at_construction() {
    let err = Pipeline::new(
        "dup",
        vec![
            Stage::new("stage", true, || StageResult::Success),
            Stage::new("stage", true, || StageResult::Success),
        ],
    )
    .unwrap_err();
    assert!(err.to_string().contains("duplicate stage name"));
}

#[test]
fn test_records_preserve_required_flag_and_outcome() {
    let pipeline = Pipeline::new(
        "recorded",
        vec![
            Stage::new("good", true, || StageResult::Success),
            Stage::new("meh", false, || StageResult::failure("shrug")),
        ],
    )
    .unwrap();

    let report = pipeline.run();
    assert!(report.records[0].required);
    assert!(report.records[0].outcome.is_success());
    assert!(!report.records[1].required);
    assert_eq!(
        report.records[1].outcome,
        StageResult::Failure("shrug".to_string())
    );
}

#[test]
fn test_anyhow_error_context_reaches_the_reason() {
    let pipeline = Pipeline::new(
        "contextual",
        vec![Stage::new("wrapped", true, || {
            let result: anyhow::Result<()> =
                Err(anyhow::anyhow!("device busy").context("remount of /tmp failed"));
            result.into()
        })],
    )
    .unwrap();

    let halt = pipeline.run().halted.unwrap();
    assert!(halt.reason.contains("remount of /tmp failed"));
    assert!(halt.reason.contains("device busy"));
}

mod common;

use common::*;
use lightning_recovery::metrics::{RECOVERY_COMPLETED, RECOVERY_STARTED, ROLLBACK_STEP};
use lightning_recovery::providers::memory::BackupOperation;
use lightning_recovery::{
    procedure, CancellationFlag, DisasterType, Error, RecoveryConfig, RecoveryOptions,
    RecoveryPlan, RecoveryStatus, RecoveryStep, StepOutcome, StepPhase,
};
use parking_lot::Mutex;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[tokio::test]
async fn test_chain_completes_in_order() {
    let log = StepLog::new();
    let plan = chain_plan(
        DisasterType::ApplicationFailure,
        vec![ok_step("A", &log), ok_step("B", &log), ok_step("C", &log)],
    );
    let (engine, sink) = engine_for(vec![plan]);

    let outcome = engine
        .execute_recovery_plan(DisasterType::ApplicationFailure, RecoveryOptions::new())
        .await;

    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(outcome.execution.completed_steps, vec!["A", "B", "C"]);
    assert!(outcome.execution.failed_steps.is_empty());
    assert!(!outcome.execution.rollback_required);
    assert_eq!(outcome.execution.status, RecoveryStatus::Healthy);
    assert!(outcome.execution.end_time.is_some());
    assert_eq!(log.runs(), vec!["A", "B", "C"]);
    assert_eq!(engine.status(), RecoveryStatus::Healthy);

    let started = sink.named(RECOVERY_STARTED);
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].tags["plan_id"], "chain");
    assert_eq!(started[0].tags["disaster_type"], "application_failure");
    let completed = sink.named(RECOVERY_COMPLETED);
    assert_eq!(completed[0].tags["success"], "true");
}

#[tokio::test]
async fn test_reversible_failure_stops_and_rolls_back() {
    let log = StepLog::new();
    let plan = chain_plan(
        DisasterType::ApplicationFailure,
        vec![
            with_rollback(ok_step("A", &log), &log),
            with_rollback(failing_step("B", &log), &log),
            ok_step("C", &log),
        ],
    );
    let (engine, sink) = engine_for(vec![plan]);

    let outcome = engine
        .execute_recovery_plan(DisasterType::ApplicationFailure, RecoveryOptions::new())
        .await;

    assert!(!outcome.success);
    let exec = &outcome.execution;
    assert_eq!(exec.completed_steps, vec!["A"]);
    assert_eq!(exec.failed_steps.len(), 1);
    assert_eq!(exec.failed_steps[0].step_id, "B");
    assert!(exec.rollback_required);
    assert_eq!(exec.status, RecoveryStatus::Failed);

    // C never runs and only A is unwound; B's own rollback is not invoked.
    assert_eq!(log.runs(), vec!["A", "B"]);
    assert_eq!(log.rollbacks(), vec!["A"]);
    let report = exec.rollback.as_ref().unwrap();
    assert_eq!(report.visited, vec!["A"]);
    assert_eq!(report.rolled_back, vec!["A"]);
    assert_eq!(sink.named(ROLLBACK_STEP).len(), 1);
    assert_eq!(engine.status(), RecoveryStatus::Failed);
}

#[tokio::test]
async fn test_rollback_visits_in_reverse_completion_order() {
    let log = StepLog::new();
    let plan = RecoveryPlan::new("reverse", DisasterType::StorageFailure, 1)
        .step(with_rollback(ok_step("a", &log), &log))
        .step(ok_step("b", &log))
        .step(with_rollback(ok_step("c", &log), &log).depends_on(["a"]))
        .step(with_rollback(ok_step("d", &log), &log))
        .step(with_rollback(failing_step("e", &log), &log).depends_on(["d"]));
    let (engine, _) = engine_for(vec![plan]);

    let outcome = engine
        .execute_recovery_plan(DisasterType::StorageFailure, RecoveryOptions::new())
        .await;

    let report = outcome.execution.rollback.unwrap();
    assert_eq!(report.visited, vec!["d", "c", "b", "a"]);
    assert_eq!(report.irreversible, vec!["b"]);
    assert_eq!(log.rollbacks(), vec!["d", "c", "a"]);
}

#[tokio::test]
async fn test_skipped_step_cascades_to_dependents() {
    let log = StepLog::new();
    let plan = RecoveryPlan::new("cascade", DisasterType::ApplicationFailure, 1)
        .step(ok_step("A", &log))
        .step(ok_step("B", &log).depends_on(["A"]))
        .step(ok_step("C", &log).depends_on(["B"]))
        .step(ok_step("D", &log));
    let (engine, _) = engine_for(vec![plan]);

    let outcome = engine
        .execute_recovery_plan(
            DisasterType::ApplicationFailure,
            RecoveryOptions::new().skip("A"),
        )
        .await;

    let exec = &outcome.execution;
    assert_eq!(exec.completed_steps, vec!["D"]);
    assert!(exec.failed_steps.is_empty());
    for skipped in ["A", "B", "C"] {
        assert!(!exec.is_completed(skipped));
        assert!(!exec.is_failed(skipped));
    }
    assert_eq!(log.runs(), vec!["D"]);
    // Under-execution is not a failure.
    assert!(outcome.success);
}

#[tokio::test]
async fn test_dry_run_never_invokes_procedures() {
    let log = StepLog::new();
    let plan = chain_plan(
        DisasterType::ApplicationFailure,
        vec![
            with_rollback(ok_step("A", &log), &log),
            failing_step("B", &log),
            ok_step("C", &log),
        ],
    );
    let (engine, _) = engine_for(vec![plan]);

    let messages = Arc::new(Mutex::new(Vec::new()));
    let recorder = messages.clone();
    let outcome = engine
        .execute_recovery_plan(
            DisasterType::ApplicationFailure,
            RecoveryOptions::new()
                .dry_run(true)
                .on_progress(move |step, phase, message| {
                    if phase == StepPhase::Completed {
                        recorder.lock().push((step.to_string(), message.to_string()));
                    }
                }),
        )
        .await;

    assert!(outcome.success);
    assert!(outcome.execution.dry_run);
    assert_eq!(outcome.execution.completed_steps, vec!["A", "B", "C"]);
    assert!(log.entries().is_empty());
    assert!(messages.lock().iter().all(|(_, m)| m == "simulated"));
    assert_eq!(messages.lock().len(), 3);
}

#[tokio::test]
async fn test_concurrent_start_is_rejected() {
    let gate = Arc::new(Notify::new());
    let plan = RecoveryPlan::new("slow", DisasterType::DatabaseFailure, 1)
        .step(gated_step("wait", gate.clone()))
        .step(RecoveryStep::new(
            "after",
            "After",
            procedure(|| async { Ok(StepOutcome::ok("done")) }),
        ));
    let log = StepLog::new();
    let other =
        RecoveryPlan::new("other", DisasterType::StorageFailure, 1).step(ok_step("x", &log));
    let (engine, _) = engine_for(vec![plan, other]);

    let first = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .execute_recovery_plan(DisasterType::DatabaseFailure, RecoveryOptions::new())
                .await
        })
    };

    wait_for_recovery(&engine).await;
    assert_eq!(engine.status(), RecoveryStatus::Recovering);

    let err = engine
        .try_execute_recovery_plan(DisasterType::DatabaseFailure, RecoveryOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RecoveryInProgress { ref plan_id } if plan_id == "slow"));

    let rejected = engine
        .execute_recovery_plan(DisasterType::DatabaseFailure, RecoveryOptions::new())
        .await;
    assert!(!rejected.success);
    assert_eq!(rejected.execution.status, RecoveryStatus::Failed);

    // A rejected start is recorded against the plan it asked for.
    let rejected_other = engine
        .execute_recovery_plan(DisasterType::StorageFailure, RecoveryOptions::new())
        .await;
    assert!(!rejected_other.success);
    assert_eq!(rejected_other.execution.plan_id, "other");
    assert_eq!(rejected_other.execution.disaster_type, DisasterType::StorageFailure);
    assert!(rejected_other.message.contains("slow"), "{}", rejected_other.message);
    assert!(log.runs().is_empty());

    let snapshot = engine.get_recovery_status().unwrap();
    assert_eq!(snapshot.plan_id, "slow");
    assert_eq!(snapshot.status, RecoveryStatus::Recovering);
    assert!(snapshot.completed_steps.is_empty());

    gate.notify_one();
    let outcome = first.await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.execution.completed_steps, vec!["wait", "after"]);
    assert!(!engine.is_recovery_in_progress());

    let finished = engine.get_recovery_status().unwrap();
    assert_eq!(finished.execution_id, outcome.execution.execution_id);
    assert_eq!(finished.status, RecoveryStatus::Healthy);
}

#[tokio::test]
async fn test_panicking_step_fails_the_run() {
    let log = StepLog::new();
    let plan = RecoveryPlan::new("panics", DisasterType::ApplicationFailure, 1)
        .step(with_rollback(ok_step("A", &log), &log))
        .step(panicking_step("B").depends_on(["A"]))
        .step(ok_step("C", &log).depends_on(["B"]))
        .step(ok_step("D", &log));
    let (engine, sink) = engine_for(vec![plan]);

    let outcome = engine
        .execute_recovery_plan(DisasterType::ApplicationFailure, RecoveryOptions::new())
        .await;

    assert!(!outcome.success);
    let exec = &outcome.execution;
    assert_eq!(exec.failed_steps.len(), 1);
    assert_eq!(exec.failed_steps[0].step_id, "B");
    let error = &exec.failed_steps[0].error;
    assert!(error.starts_with("Step B failed: panicked"), "{}", error);
    assert_eq!(exec.completed_steps, vec!["A", "D"]);
    assert!(!exec.rollback_required);
    assert_eq!(log.runs(), vec!["A", "D"]);

    assert_eq!(engine.status(), RecoveryStatus::Failed);
    assert!(!engine.is_recovery_in_progress());
    let snapshot = engine.get_recovery_status().unwrap();
    assert_eq!(snapshot.status, RecoveryStatus::Failed);
    assert!(snapshot.end_time.is_some());
    assert_eq!(sink.named(RECOVERY_COMPLETED)[0].tags["success"], "false");
}

#[tokio::test]
async fn test_panicking_reversible_step_rolls_back() {
    let log = StepLog::new();
    let plan = chain_plan(
        DisasterType::ApplicationFailure,
        vec![
            with_rollback(ok_step("A", &log), &log),
            with_rollback(panicking_step("B"), &log),
            ok_step("C", &log),
        ],
    );
    let (engine, _) = engine_for(vec![plan]);

    let outcome = engine
        .execute_recovery_plan(DisasterType::ApplicationFailure, RecoveryOptions::new())
        .await;

    assert!(outcome.execution.rollback_required);
    assert_eq!(log.runs(), vec!["A"]);
    assert_eq!(log.rollbacks(), vec!["A"]);

    // The slot is free again.
    let again = engine
        .execute_recovery_plan(DisasterType::ApplicationFailure, RecoveryOptions::new())
        .await;
    assert_eq!(again.execution.failed_steps[0].step_id, "B");
}

#[tokio::test]
async fn test_cancellation_mid_run_stops_before_next_step() {
    let log = StepLog::new();
    let flag = CancellationFlag::new();
    let trip = flag.clone();
    let cancelling = RecoveryStep::new(
        "B",
        "Operator aborts",
        procedure(move || {
            let trip = trip.clone();
            async move {
                trip.cancel();
                Ok(StepOutcome::ok("abort requested"))
            }
        }),
    );
    let plan = chain_plan(
        DisasterType::ApplicationFailure,
        vec![with_rollback(ok_step("A", &log), &log), cancelling, ok_step("C", &log)],
    );
    let (engine, _) = engine_for(vec![plan]);

    let outcome = engine
        .execute_recovery_plan(
            DisasterType::ApplicationFailure,
            RecoveryOptions::new().with_cancellation(flag),
        )
        .await;

    assert!(!outcome.success);
    assert!(outcome.message.contains("cancelled before step C"), "{}", outcome.message);
    assert_eq!(outcome.execution.completed_steps, vec!["A", "B"]);
    assert_eq!(outcome.execution.status, RecoveryStatus::Failed);
    assert!(outcome.execution.rollback.is_none());
    assert_eq!(log.runs(), vec!["A"]);
    assert!(log.rollbacks().is_empty());
    assert_eq!(engine.status(), RecoveryStatus::Failed);
    assert!(!engine.is_recovery_in_progress());
}

#[tokio::test]
async fn test_failed_step_cascades_to_dependents() {
    let log = StepLog::new();
    let plan = RecoveryPlan::new("cascade", DisasterType::ApplicationFailure, 1)
        .step(failing_step("A", &log))
        .step(ok_step("B", &log).depends_on(["A"]))
        .step(ok_step("C", &log).depends_on(["B"]))
        .step(ok_step("D", &log));
    let (engine, _) = engine_for(vec![plan]);

    let outcome = engine
        .execute_recovery_plan(DisasterType::ApplicationFailure, RecoveryOptions::new())
        .await;

    let exec = &outcome.execution;
    assert!(!outcome.success);
    assert!(!exec.rollback_required);
    assert_eq!(exec.failed_steps.len(), 1);
    assert_eq!(exec.failed_steps[0].step_id, "A");
    assert_eq!(exec.completed_steps, vec!["D"]);
    for blocked in ["B", "C"] {
        assert!(!exec.is_completed(blocked));
        assert!(!exec.is_failed(blocked));
    }
    assert_eq!(log.runs(), vec!["A", "D"]);
}

#[tokio::test]
async fn test_unregistered_types_report_plan_not_found() {
    let fixture = catalog_fixture(fast_config());
    for disaster_type in [DisasterType::NetworkFailure, DisasterType::HumanError] {
        let err = fixture
            .engine
            .try_execute_recovery_plan(disaster_type, RecoveryOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PlanNotFound(t) if t == disaster_type));
        assert!(err.is_configuration_error());

        let outcome = fixture
            .engine
            .execute_recovery_plan(disaster_type, RecoveryOptions::new())
            .await;
        assert!(!outcome.success);
        assert!(outcome.message.contains(disaster_type.as_str()));
    }
    assert_eq!(fixture.engine.status(), RecoveryStatus::Healthy);
}

#[tokio::test]
async fn test_database_plan_restores_latest_backup() {
    let fixture = catalog_fixture(fast_config());

    let outcome = fixture
        .engine
        .execute_recovery_plan(DisasterType::DatabaseFailure, RecoveryOptions::new())
        .await;

    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(
        outcome.execution.completed_steps,
        fixture
            .engine
            .get_plan(DisasterType::DatabaseFailure)
            .unwrap()
            .step_ids()
    );
    assert_eq!(fixture.database.call_count(BackupOperation::Restore), 1);
    assert_eq!(fixture.database.call_count(BackupOperation::Create), 1);
    assert_eq!(fixture.database.backup_count(), 2);
}

#[tokio::test]
async fn test_database_restore_failure_rolls_back() {
    let fixture = catalog_fixture(fast_config());
    fixture.database.fail_on(BackupOperation::Restore);

    let outcome = fixture
        .engine
        .execute_recovery_plan(DisasterType::DatabaseFailure, RecoveryOptions::new())
        .await;

    assert!(!outcome.success);
    let exec = &outcome.execution;
    assert!(exec.rollback_required);
    assert_eq!(
        exec.completed_steps,
        vec!["assess_database", "snapshot_database", "verify_database_backup"]
    );
    assert_eq!(exec.failed_steps[0].step_id, "restore_database");
    assert!(!exec.is_completed("validate_database"));

    let report = exec.rollback.as_ref().unwrap();
    assert_eq!(
        report.visited,
        vec!["verify_database_backup", "snapshot_database", "assess_database"]
    );
    assert_eq!(report.irreversible.len(), 3);
    assert_eq!(fixture.engine.status(), RecoveryStatus::Failed);
}

#[tokio::test]
async fn test_drill_is_repeatable_and_side_effect_free() {
    let fixture = catalog_fixture(fast_config());

    let first = fixture
        .engine
        .test_recovery_plan(DisasterType::DatabaseFailure, RecoveryOptions::new())
        .await
        .unwrap();
    let second = fixture
        .engine
        .test_recovery_plan(DisasterType::DatabaseFailure, RecoveryOptions::new())
        .await
        .unwrap();

    assert!(first.success && second.success);
    assert_eq!(first.test_results, second.test_results);
    assert!(first.test_results.iter().all(|r| r.success && r.message == "simulated"));
    assert_ne!(first.execution.execution_id, second.execution.execution_id);
    assert!(first
        .recommendations
        .iter()
        .any(|r| r.contains("RPO of 60 minutes")));

    assert!(fixture.database.calls().is_empty());
    assert!(fixture.files.calls().is_empty());
    assert_eq!(fixture.engine.status(), RecoveryStatus::Healthy);
}

#[tokio::test]
async fn test_drill_reports_testing_status_while_running() {
    let fixture = catalog_fixture(RecoveryConfig {
        dry_run_step_delay_ms: 20,
        ..fast_config()
    });
    let engine = fixture.engine.clone();
    let drill = tokio::spawn(async move {
        engine
            .test_recovery_plan(DisasterType::SecurityBreach, RecoveryOptions::new())
            .await
    });

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(fixture.engine.status(), RecoveryStatus::Testing);

    let report = drill.await.unwrap().unwrap();
    assert!(report.success);
    assert!(report
        .recommendations
        .iter()
        .any(|r| r.contains("security team")));
    assert_eq!(fixture.engine.status(), RecoveryStatus::Healthy);
}

#[tokio::test]
async fn test_drill_with_skips_flags_unexercised_steps() {
    let fixture = catalog_fixture(fast_config());
    let report = fixture
        .engine
        .test_recovery_plan(
            DisasterType::StorageFailure,
            RecoveryOptions::new().skip("verify_file_backup"),
        )
        .await
        .unwrap();

    let ran: Vec<&str> = report.test_results.iter().map(|r| r.step_id.as_str()).collect();
    assert_eq!(ran, vec!["assess_storage"]);
    assert!(report
        .recommendations
        .iter()
        .any(|r| r.contains("not exercised")));
}

/// Random acyclic plan: each step depends on a subset of earlier steps
fn arb_dependencies() -> impl Strategy<Value = Vec<Vec<usize>>> {
    (1usize..8).prop_flat_map(|n| {
        (0..n)
            .map(|i| {
                if i == 0 {
                    Just(Vec::new()).boxed()
                } else {
                    proptest::collection::vec(0..i, 0..=i.min(3)).boxed()
                }
            })
            .collect::<Vec<_>>()
    })
}

fn build_plan(deps: &[Vec<usize>], fail_at: Option<usize>, log: &StepLog) -> RecoveryPlan {
    let mut plan = RecoveryPlan::new("random", DisasterType::DataCorruption, 1);
    for (i, step_deps) in deps.iter().enumerate() {
        let id = format!("s{}", i);
        let step = if Some(i) == fail_at {
            with_rollback(failing_step(&id, log), log)
        } else {
            ok_step(&id, log)
        };
        plan = plan.step(step.depends_on(step_deps.iter().map(|d| format!("s{}", d))));
    }
    plan
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_clean_run_completes_declared_order(deps in arb_dependencies()) {
        let log = StepLog::new();
        let plan = build_plan(&deps, None, &log);
        let expected = plan.step_ids();
        let (engine, _) = engine_for(vec![plan]);

        let outcome = runtime().block_on(
            engine.execute_recovery_plan(DisasterType::DataCorruption, RecoveryOptions::new()),
        );
        prop_assert!(outcome.success);
        prop_assert!(!outcome.execution.rollback_required);
        prop_assert_eq!(outcome.execution.completed_steps, expected);
    }

    #[test]
    fn prop_reversible_failure_stops_execution(
        (deps, fail_at) in arb_dependencies()
            .prop_flat_map(|deps| { let n = deps.len(); (Just(deps), 0..n) })
    ) {
        let log = StepLog::new();
        let plan = build_plan(&deps, Some(fail_at), &log);
        let (engine, _) = engine_for(vec![plan]);

        let outcome = runtime().block_on(
            engine.execute_recovery_plan(DisasterType::DataCorruption, RecoveryOptions::new()),
        );
        let exec = outcome.execution;
        prop_assert!(exec.rollback_required);
        prop_assert_eq!(exec.failed_steps.len(), 1);
        for id in &exec.completed_steps {
            let idx: usize = id[1..].parse().unwrap();
            prop_assert!(idx < fail_at);
        }

        let report = exec.rollback.unwrap();
        let mut reversed = exec.completed_steps.clone();
        reversed.reverse();
        prop_assert_eq!(report.visited, reversed);
    }
}

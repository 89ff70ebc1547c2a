#![allow(dead_code)]

use lightning_recovery::metrics::MemoryAlertSink;
use lightning_recovery::plan::catalog::{APPLICATION_SERVICE, DATABASE_SERVICE, STORAGE_SERVICE};
use lightning_recovery::providers::BackupDomain;
use lightning_recovery::{
    procedure, AutoApprove, CatalogProviders, DisasterRecoveryEngine, DisasterType,
    InMemoryBackupProvider, PlanRegistry, RecoveryConfig, RecoveryPlan, RecoveryStep,
    StaticHealthMonitor, StepOutcome,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Shared journal of procedure invocations: `run:<id>` and `rollback:<id>`
#[derive(Clone, Default)]
pub struct StepLog(Arc<Mutex<Vec<String>>>);

impl StepLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: String) {
        self.0.lock().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn runs(&self) -> Vec<String> {
        self.filtered("run:")
    }

    pub fn rollbacks(&self) -> Vec<String> {
        self.filtered("rollback:")
    }

    fn filtered(&self, prefix: &str) -> Vec<String> {
        self.0
            .lock()
            .iter()
            .filter_map(|e| e.strip_prefix(prefix).map(str::to_string))
            .collect()
    }
}

fn recorded(
    log: &StepLog,
    entry: String,
    success: bool,
) -> Arc<dyn lightning_recovery::StepProcedure> {
    let log = log.clone();
    procedure(move || {
        let log = log.clone();
        let entry = entry.clone();
        async move {
            log.record(entry.clone());
            Ok(if success {
                StepOutcome::ok(format!("{} ok", entry))
            } else {
                StepOutcome::fail(format!("{} failed", entry))
            })
        }
    })
}

/// Step whose procedure succeeds and is journaled
pub fn ok_step(id: &str, log: &StepLog) -> RecoveryStep {
    RecoveryStep::new(id, format!("Step {}", id), recorded(log, format!("run:{}", id), true))
}

/// Step whose procedure reports failure and is journaled
pub fn failing_step(id: &str, log: &StepLog) -> RecoveryStep {
    RecoveryStep::new(id, format!("Step {}", id), recorded(log, format!("run:{}", id), false))
}

/// Step whose procedure panics while running
pub fn panicking_step(id: &str) -> RecoveryStep {
    RecoveryStep::new(
        id,
        format!("Step {}", id),
        procedure(|| async {
            let members: Vec<u32> = Vec::new();
            let first = members[0];
            Ok(StepOutcome::ok(format!("first member {}", first)))
        }),
    )
}

/// Step that blocks until `gate` is notified
pub fn gated_step(id: &str, gate: Arc<Notify>) -> RecoveryStep {
    RecoveryStep::new(
        id,
        format!("Step {}", id),
        procedure(move || {
            let gate = gate.clone();
            async move {
                gate.notified().await;
                Ok(StepOutcome::ok("released"))
            }
        }),
    )
}

/// Poll until the engine reports a run in flight
pub async fn wait_for_recovery(engine: &DisasterRecoveryEngine) {
    for _ in 0..200 {
        if engine.is_recovery_in_progress() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("recovery never started");
}

/// Attach a journaled, successful rollback procedure
pub fn with_rollback(step: RecoveryStep, log: &StepLog) -> RecoveryStep {
    let entry = format!("rollback:{}", step.id);
    step.with_rollback(recorded(log, entry, true))
}

/// A -> B -> C chain from the end-to-end scenarios
pub fn chain_plan(disaster_type: DisasterType, steps: Vec<RecoveryStep>) -> RecoveryPlan {
    let mut plan = RecoveryPlan::new("chain", disaster_type, 1);
    let mut previous: Option<String> = None;
    for step in steps {
        let step = match &previous {
            Some(prev) => step.depends_on([prev.clone()]),
            None => step,
        };
        previous = Some(step.id.clone());
        plan = plan.step(step);
    }
    plan
}

pub fn fast_config() -> RecoveryConfig {
    RecoveryConfig {
        dry_run_step_delay_ms: 1,
        health_check_interval_ms: 10,
        ..Default::default()
    }
}

pub fn engine_for(
    plans: Vec<RecoveryPlan>,
) -> (Arc<DisasterRecoveryEngine>, Arc<MemoryAlertSink>) {
    let sink = Arc::new(MemoryAlertSink::new());
    let registry = PlanRegistry::new(plans).expect("valid plans");
    let engine = DisasterRecoveryEngine::new(fast_config(), registry, sink.clone())
        .expect("valid config");
    (Arc::new(engine), sink)
}

/// Standard catalog wired to in-memory collaborators
pub struct CatalogFixture {
    pub database: Arc<InMemoryBackupProvider>,
    pub files: Arc<InMemoryBackupProvider>,
    pub health: Arc<StaticHealthMonitor>,
    pub sink: Arc<MemoryAlertSink>,
    pub engine: Arc<DisasterRecoveryEngine>,
}

pub fn catalog_fixture(config: RecoveryConfig) -> CatalogFixture {
    let database = Arc::new(InMemoryBackupProvider::with_seed_backup(BackupDomain::Database));
    let files = Arc::new(InMemoryBackupProvider::with_seed_backup(BackupDomain::FileStorage));
    let health = Arc::new(StaticHealthMonitor::healthy(&[
        DATABASE_SERVICE,
        STORAGE_SERVICE,
        APPLICATION_SERVICE,
    ]));
    let sink = Arc::new(MemoryAlertSink::new());

    let providers = CatalogProviders {
        database: database.clone(),
        files: files.clone(),
        health: health.clone(),
        approval: Arc::new(AutoApprove),
        sink: sink.clone(),
    };
    let engine = Arc::new(
        DisasterRecoveryEngine::with_standard_plans(config, providers).expect("standard catalog"),
    );

    CatalogFixture {
        database,
        files,
        health,
        sink,
        engine,
    }
}

//! Disaster recovery engine
//!
//! Executes one recovery plan at a time. Steps run sequentially in
//! declared order and are gated on their dependencies; a failure is
//! recorded locally and may stop the run and trigger a reverse rollback.
//! Callers always get a structured [`RecoveryOutcome`] back.

use crate::config::RecoveryConfig;
use crate::log_step;
use crate::metrics::{
    AlertSink, RECOVERY_COMPLETED, RECOVERY_DURATION_MINUTES, RECOVERY_STARTED, STEP_FAILED,
};
use crate::plan::{
    standard_plans, CatalogProviders, PlanRegistry, RecoveryPlan, RecoveryStep, StepProcedure,
};
use crate::types::{
    DisasterType, FailedStep, RecoveryExecution, RecoveryOutcome, RecoveryStatus, StepPhase,
};
use crate::{Error, Result};
use futures::FutureExt;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

mod drill;
mod rollback;

pub use drill::recommendations;

/// Progress callback: `(step_id, phase, message)`. Runs on the executor's
/// call path and must return quickly.
pub type ProgressCallback = Arc<dyn Fn(&str, StepPhase, &str) + Send + Sync>;

/// Cooperative cancellation for an in-flight run, checked before each step
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-invocation options
#[derive(Clone, Default)]
pub struct RecoveryOptions {
    /// Step ids bypassed entirely. Skipped steps do not satisfy dependents.
    pub skip_steps: HashSet<String>,
    pub dry_run: bool,
    pub on_progress: Option<ProgressCallback>,
    pub cancellation: Option<CancellationFlag>,
}

impl RecoveryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip(mut self, step_id: impl Into<String>) -> Self {
        self.skip_steps.insert(step_id.into());
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, StepPhase, &str) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    pub fn with_cancellation(mut self, flag: CancellationFlag) -> Self {
        self.cancellation = Some(flag);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .map(CancellationFlag::is_cancelled)
            .unwrap_or(false)
    }
}

impl fmt::Debug for RecoveryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryOptions")
            .field("skip_steps", &self.skip_steps)
            .field("dry_run", &self.dry_run)
            .field("on_progress", &self.on_progress.is_some())
            .field("cancellation", &self.cancellation)
            .finish()
    }
}

/// Held for the duration of a run
struct ExecutionSlot<'a> {
    _guard: tokio::sync::MutexGuard<'a, ()>,
    in_flight: &'a AtomicBool,
}

impl Drop for ExecutionSlot<'_> {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::SeqCst);
    }
}

/// Who owns the global status while a run is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunMode {
    Recovery,
    Drill,
}

pub struct DisasterRecoveryEngine {
    config: RecoveryConfig,
    registry: PlanRegistry,
    sink: Arc<dyn AlertSink>,
    status: RwLock<RecoveryStatus>,
    /// Single-slot guard; held for the whole of a run
    running: tokio::sync::Mutex<()>,
    in_flight: AtomicBool,
    /// Snapshot of the latest execution, refreshed after every step
    current: RwLock<Option<RecoveryExecution>>,
    next_execution: AtomicU64,
}

impl DisasterRecoveryEngine {
    pub fn new(
        config: RecoveryConfig,
        registry: PlanRegistry,
        sink: Arc<dyn AlertSink>,
    ) -> Result<Self> {
        config.validate()?;
        info!(
            plans = registry.len(),
            rto_minutes = config.rto_minutes,
            rpo_minutes = config.rpo_minutes,
            "Disaster recovery engine initialized"
        );
        Ok(Self {
            config,
            registry,
            sink,
            status: RwLock::new(RecoveryStatus::Healthy),
            running: tokio::sync::Mutex::new(()),
            in_flight: AtomicBool::new(false),
            current: RwLock::new(None),
            next_execution: AtomicU64::new(1),
        })
    }

    /// Engine loaded with the standard plan catalog
    pub fn with_standard_plans(
        config: RecoveryConfig,
        providers: CatalogProviders,
    ) -> Result<Self> {
        let registry = PlanRegistry::new(standard_plans(&providers))?;
        Self::new(config, registry, providers.sink.clone())
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    pub fn registry(&self) -> &PlanRegistry {
        &self.registry
    }

    pub fn get_plan(&self, disaster_type: DisasterType) -> Result<Arc<RecoveryPlan>> {
        self.registry.get_plan(disaster_type)
    }

    pub(crate) fn sink(&self) -> &dyn AlertSink {
        self.sink.as_ref()
    }

    /// Current global status
    pub fn status(&self) -> RecoveryStatus {
        *self.status.read()
    }

    pub(crate) fn set_status(&self, status: RecoveryStatus) {
        let mut current = self.status.write();
        if *current != status {
            debug!(from = %*current, to = %status, "Recovery status changed");
            *current = status;
        }
    }

    /// Compare-and-set on the global status
    pub(crate) fn transition_status(&self, from: RecoveryStatus, to: RecoveryStatus) -> bool {
        let mut current = self.status.write();
        if *current == from {
            *current = to;
            true
        } else {
            false
        }
    }

    /// Snapshot of the latest (possibly in-flight) execution
    pub fn get_recovery_status(&self) -> Option<RecoveryExecution> {
        self.current.read().clone()
    }

    pub fn is_recovery_in_progress(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Execute the plan for `disaster_type`.
    ///
    /// Fails up front only when no plan is registered or another run holds
    /// the execution slot. Step failures are reported in the outcome.
    pub async fn try_execute_recovery_plan(
        &self,
        disaster_type: DisasterType,
        options: RecoveryOptions,
    ) -> Result<RecoveryOutcome> {
        let plan = self.registry.get_plan(disaster_type)?;
        let _slot = self.acquire_slot()?;
        Ok(self.run_plan(&plan, &options, RunMode::Recovery).await)
    }

    /// Like [`Self::try_execute_recovery_plan`], but every failure comes
    /// back as an unsuccessful outcome.
    pub async fn execute_recovery_plan(
        &self,
        disaster_type: DisasterType,
        options: RecoveryOptions,
    ) -> RecoveryOutcome {
        let dry_run = options.dry_run;
        match self.try_execute_recovery_plan(disaster_type, options).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    disaster_type = %disaster_type,
                    code = e.error_code(),
                    "Recovery could not start: {}",
                    e
                );
                let plan_id = self
                    .registry
                    .get_plan(disaster_type)
                    .map(|plan| plan.id.clone())
                    .unwrap_or_default();
                let mut execution = RecoveryExecution::new(
                    self.next_execution_id(disaster_type.as_str()),
                    plan_id,
                    disaster_type,
                    dry_run,
                );
                execution.abort();
                RecoveryOutcome {
                    success: false,
                    execution,
                    message: e.to_string(),
                }
            }
        }
    }

    fn acquire_slot(&self) -> Result<ExecutionSlot<'_>> {
        let guard = self.running.try_lock().map_err(|_| {
            let plan_id = self
                .current
                .read()
                .as_ref()
                .map(|e| e.plan_id.clone())
                .unwrap_or_default();
            Error::RecoveryInProgress { plan_id }
        })?;
        self.in_flight.store(true, Ordering::SeqCst);
        Ok(ExecutionSlot {
            _guard: guard,
            in_flight: &self.in_flight,
        })
    }

    fn next_execution_id(&self, plan_id: &str) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let seq = self.next_execution.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}-{}", plan_id, millis, seq)
    }

    fn publish(&self, execution: &RecoveryExecution) {
        *self.current.write() = Some(execution.clone());
    }

    fn report(
        &self,
        options: &RecoveryOptions,
        plan_id: &str,
        step_id: &str,
        phase: StepPhase,
        message: &str,
    ) {
        log_step!(plan_id, step_id, phase, message);
        if let Some(callback) = &options.on_progress {
            callback(step_id, phase, message);
        }
    }

    /// Body of a run. Caller holds the execution slot.
    async fn run_plan(
        &self,
        plan: &RecoveryPlan,
        options: &RecoveryOptions,
        mode: RunMode,
    ) -> RecoveryOutcome {
        let mut execution = RecoveryExecution::new(
            self.next_execution_id(&plan.id),
            plan.id.clone(),
            plan.disaster_type,
            options.dry_run,
        );
        if mode == RunMode::Recovery {
            self.set_status(RecoveryStatus::Recovering);
        }
        self.publish(&execution);

        info!(
            plan_id = %plan.id,
            disaster_type = %plan.disaster_type,
            execution_id = %execution.execution_id,
            dry_run = options.dry_run,
            "Starting recovery plan"
        );
        self.sink.submit_metric(
            RECOVERY_STARTED,
            1.0,
            &[
                ("disaster_type", plan.disaster_type.as_str()),
                ("plan_id", plan.id.as_str()),
            ],
        );

        let mut cancelled_at: Option<String> = None;

        for step in &plan.steps {
            if options.is_cancelled() {
                warn!(plan_id = %plan.id, step_id = %step.id, "Recovery cancelled");
                cancelled_at = Some(step.id.clone());
                break;
            }

            if options.skip_steps.contains(&step.id) {
                info!(plan_id = %plan.id, step_id = %step.id, "Skipping step on request");
                continue;
            }

            let unmet: Vec<&str> = step
                .dependencies
                .iter()
                .filter(|dep| !execution.is_completed(dep))
                .map(String::as_str)
                .collect();
            if !unmet.is_empty() {
                // Not recorded as failed; the run may under-execute.
                warn!(
                    plan_id = %plan.id,
                    step_id = %step.id,
                    unmet = ?unmet,
                    "Skipping step with unmet dependencies"
                );
                continue;
            }

            self.report(options, &plan.id, &step.id, StepPhase::Started, &step.description);

            if options.dry_run {
                tokio::time::sleep(self.config.dry_run_step_delay()).await;
                execution.completed_steps.push(step.id.clone());
                self.report(options, &plan.id, &step.id, StepPhase::Completed, "simulated");
                self.publish(&execution);
                continue;
            }

            match self.invoke(&step.id, step.procedure.as_ref()).await {
                Ok(message) => {
                    execution.completed_steps.push(step.id.clone());
                    self.report(options, &plan.id, &step.id, StepPhase::Completed, &message);
                }
                Err(message) => {
                    error!(
                        plan_id = %plan.id,
                        step_id = %step.id,
                        "Recovery step failed: {}",
                        message
                    );
                    execution.failed_steps.push(FailedStep {
                        step_id: step.id.clone(),
                        error: message.clone(),
                    });
                    self.report(options, &plan.id, &step.id, StepPhase::Failed, &message);
                    self.sink.submit_metric(
                        STEP_FAILED,
                        1.0,
                        &[("plan_id", plan.id.as_str()), ("step_id", step.id.as_str())],
                    );

                    if self.should_rollback(step, plan, &execution) {
                        execution.rollback_required = true;
                        self.publish(&execution);
                        break;
                    }
                }
            }
            self.publish(&execution);
        }

        if execution.rollback_required && !options.dry_run {
            let report = self.roll_back(plan, &execution.completed_steps).await;
            execution.rollback = Some(report);
        }

        let (success, message) = match &cancelled_at {
            Some(step_id) => {
                execution.abort();
                let cancelled = Error::Cancelled(format!(
                    "recovery plan {} cancelled before step {}",
                    plan.id, step_id
                ));
                (false, cancelled.to_string())
            }
            None => {
                let success = execution.finish();
                let message = if success {
                    format!(
                        "Recovery plan {} completed: {} steps",
                        plan.id,
                        execution.completed_steps.len()
                    )
                } else if execution.rollback_required {
                    format!(
                        "Recovery plan {} failed with {} failed steps, rollback performed",
                        plan.id,
                        execution.failed_steps.len()
                    )
                } else {
                    format!(
                        "Recovery plan {} finished with {} failed steps",
                        plan.id,
                        execution.failed_steps.len()
                    )
                };
                (success, message)
            }
        };

        if mode == RunMode::Recovery {
            self.set_status(execution.status);
        }
        self.publish(&execution);

        let duration = execution.actual_duration_minutes.unwrap_or_default();
        let success_tag = if success { "true" } else { "false" };
        let tags = [
            ("disaster_type", plan.disaster_type.as_str()),
            ("plan_id", plan.id.as_str()),
            ("success", success_tag),
        ];
        self.sink
            .submit_metric(RECOVERY_COMPLETED, if success { 1.0 } else { 0.0 }, &tags);
        self.sink.submit_metric(RECOVERY_DURATION_MINUTES, duration, &tags);

        if success {
            info!(plan_id = %plan.id, duration_minutes = duration, "{}", message);
        } else {
            error!(plan_id = %plan.id, duration_minutes = duration, "{}", message);
        }

        RecoveryOutcome {
            success,
            execution,
            message,
        }
    }

    /// Run a procedure under the configured step timeout. `Err` carries the
    /// failure message for the execution record. A panicking procedure
    /// counts as a failed step.
    pub(crate) async fn invoke(
        &self,
        step_id: &str,
        procedure: &dyn StepProcedure,
    ) -> std::result::Result<String, String> {
        let guarded = AssertUnwindSafe(procedure.run()).catch_unwind();
        let caught = match self.config.step_timeout() {
            Some(limit) => match tokio::time::timeout(limit, guarded).await {
                Ok(caught) => caught,
                Err(_) => Ok(Err(Error::Timeout(format!(
                    "step {} exceeded {} ms",
                    step_id,
                    limit.as_millis()
                )))),
            },
            None => guarded.await,
        };

        let result = caught.unwrap_or_else(|payload| {
            Err(Error::StepFailed {
                step_id: step_id.to_string(),
                message: format!("panicked: {}", panic_message(payload.as_ref())),
            })
        });

        match result {
            Ok(outcome) if outcome.success => Ok(outcome.message),
            Ok(outcome) => Err(outcome.message),
            Err(e) => Err(e.to_string()),
        }
    }

    /// A failed step stops the run when it can be undone, or when more
    /// than the configured share of the plan has failed.
    fn should_rollback(
        &self,
        step: &RecoveryStep,
        plan: &RecoveryPlan,
        execution: &RecoveryExecution,
    ) -> bool {
        if step.has_rollback() {
            return true;
        }
        let total = plan.steps.len().max(1) as f64;
        execution.failed_steps.len() as f64 / total > self.config.rollback_failure_ratio
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

//! Disaster recovery orchestration.
//!
//! Recovery plans are ordered, dependency-gated lists of steps registered
//! per [`DisasterType`]. The [`DisasterRecoveryEngine`] executes one plan at
//! a time, records partial failures, unwinds completed steps in reverse when
//! a failure is critical, and can dry-run a plan as a drill. The
//! [`HealthWatchdog`] polls a health monitor and starts recovery on its own
//! when automatic failover is enabled.
//!
//! Backups, health probes, operator confirmation and metric delivery are
//! collaborators behind the traits in [`providers`] and [`metrics`].

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod plan;
pub mod providers;
pub mod types;
pub mod watchdog;

pub use config::RecoveryConfig;
pub use engine::{CancellationFlag, DisasterRecoveryEngine, ProgressCallback, RecoveryOptions};
pub use error::{Error, Result};
pub use metrics::{AlertSink, MemoryAlertSink, NoopAlertSink, PrometheusAlertSink};
pub use plan::{
    procedure, standard_plans, CatalogProviders, PlanRegistry, PlanSummary, RecoveryPlan,
    RecoveryStep, StepOutcome, StepProcedure,
};
pub use providers::{
    AutoApprove, BackupProvider, HealthMonitor, HealthReport, InMemoryBackupProvider,
    OperatorApproval, ServiceState, StaticHealthMonitor,
};
pub use types::{
    DisasterType, FailedStep, RecoveryExecution, RecoveryOutcome, RecoveryStatus,
    RecoveryTestReport, RollbackReport, StepPhase, StepTestResult,
};
pub use watchdog::{classify_disaster, HealthWatchdog, TickOutcome, WatchdogHandle};

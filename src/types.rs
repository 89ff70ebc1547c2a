//! Core data model for disaster recovery
//!
//! Disaster classification, engine status, and the per-invocation
//! execution record shared by the executor, the drill runner and the
//! watchdog.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime};

/// Class of infrastructure failure. Drives plan selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisasterType {
    DatabaseFailure,
    StorageFailure,
    ApplicationFailure,
    NetworkFailure,
    DatacenterFailure,
    SecurityBreach,
    DataCorruption,
    HumanError,
}

impl DisasterType {
    pub const ALL: [DisasterType; 8] = [
        DisasterType::DatabaseFailure,
        DisasterType::StorageFailure,
        DisasterType::ApplicationFailure,
        DisasterType::NetworkFailure,
        DisasterType::DatacenterFailure,
        DisasterType::SecurityBreach,
        DisasterType::DataCorruption,
        DisasterType::HumanError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DisasterType::DatabaseFailure => "database_failure",
            DisasterType::StorageFailure => "storage_failure",
            DisasterType::ApplicationFailure => "application_failure",
            DisasterType::NetworkFailure => "network_failure",
            DisasterType::DatacenterFailure => "datacenter_failure",
            DisasterType::SecurityBreach => "security_breach",
            DisasterType::DataCorruption => "data_corruption",
            DisasterType::HumanError => "human_error",
        }
    }
}

impl fmt::Display for DisasterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DisasterType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        DisasterType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| format!("Unknown disaster type: {}", s))
    }
}

/// Global engine status. Exactly one value is current at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStatus {
    #[default]
    Healthy,
    Degraded,
    Failed,
    Recovering,
    Testing,
}

impl RecoveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryStatus::Healthy => "healthy",
            RecoveryStatus::Degraded => "degraded",
            RecoveryStatus::Failed => "failed",
            RecoveryStatus::Recovering => "recovering",
            RecoveryStatus::Testing => "testing",
        }
    }
}

impl fmt::Display for RecoveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase reported through the progress callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPhase {
    Started,
    Completed,
    Failed,
}

impl fmt::Display for StepPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepPhase::Started => f.write_str("started"),
            StepPhase::Completed => f.write_str("completed"),
            StepPhase::Failed => f.write_str("failed"),
        }
    }
}

/// A step that failed during execution or rollback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedStep {
    pub step_id: String,
    pub error: String,
}

/// Outcome of the reverse rollback sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackReport {
    /// Every completed step in the order the sweep visited it
    pub visited: Vec<String>,
    /// Steps whose rollback procedure succeeded, in visit order
    pub rolled_back: Vec<String>,
    /// Steps whose rollback procedure failed or reported failure
    pub failed: Vec<FailedStep>,
    /// Completed steps without a rollback procedure
    pub irreversible: Vec<String>,
}

impl RollbackReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Record of a single plan invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryExecution {
    pub execution_id: String,
    pub plan_id: String,
    pub disaster_type: DisasterType,
    pub start_time: SystemTime,
    pub end_time: Option<SystemTime>,
    pub status: RecoveryStatus,
    pub dry_run: bool,
    pub completed_steps: Vec<String>,
    pub failed_steps: Vec<FailedStep>,
    pub rollback_required: bool,
    pub rollback: Option<RollbackReport>,
    pub actual_duration_minutes: Option<f64>,
}

impl RecoveryExecution {
    pub fn new(
        execution_id: String,
        plan_id: String,
        disaster_type: DisasterType,
        dry_run: bool,
    ) -> Self {
        Self {
            execution_id,
            plan_id,
            disaster_type,
            start_time: SystemTime::now(),
            end_time: None,
            status: RecoveryStatus::Recovering,
            dry_run,
            completed_steps: Vec::new(),
            failed_steps: Vec::new(),
            rollback_required: false,
            rollback: None,
            actual_duration_minutes: None,
        }
    }

    pub fn is_completed(&self, step_id: &str) -> bool {
        self.completed_steps.iter().any(|s| s == step_id)
    }

    pub fn is_failed(&self, step_id: &str) -> bool {
        self.failed_steps.iter().any(|f| f.step_id == step_id)
    }

    /// Stamp end time, compute duration and settle the final status.
    pub fn finish(&mut self) -> bool {
        let end = SystemTime::now();
        let elapsed = end
            .duration_since(self.start_time)
            .unwrap_or(Duration::ZERO);
        self.end_time = Some(end);
        self.actual_duration_minutes = Some(elapsed.as_secs_f64() / 60.0);

        let success = self.failed_steps.is_empty() && !self.rollback_required;
        self.status = if success {
            RecoveryStatus::Healthy
        } else {
            RecoveryStatus::Failed
        };
        success
    }

    /// Mark as failed outside of step execution (lookup failure, cancellation).
    pub fn abort(&mut self) {
        self.finish();
        self.status = RecoveryStatus::Failed;
    }
}

/// Structured result returned to every caller of the executor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryOutcome {
    pub success: bool,
    pub execution: RecoveryExecution,
    pub message: String,
}

/// Per-step entry of a recovery drill report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepTestResult {
    pub step_id: String,
    pub step_name: String,
    pub success: bool,
    pub duration_minutes: u32,
    pub message: String,
}

/// Result of `test_recovery_plan`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryTestReport {
    pub disaster_type: DisasterType,
    pub plan_id: String,
    pub success: bool,
    pub test_results: Vec<StepTestResult>,
    pub recommendations: Vec<String>,
    pub execution: RecoveryExecution,
}

//! CLI error type and exit codes

use lightning_recovery::Error as RecoveryError;
use std::fmt;

/// Process exit codes by error category
pub mod exit_codes {
    pub const GENERAL_ERROR: i32 = 1;
    /// Invalid command line usage
    pub const USAGE_ERROR: i32 = 2;
    /// No plan registered for the disaster type
    pub const PLAN_NOT_FOUND: i32 = 3;
    pub const VALIDATION_ERROR: i32 = 5;
    pub const IO_ERROR: i32 = 7;
    pub const CONFIG_ERROR: i32 = 8;
    /// Another recovery holds the execution slot
    pub const RECOVERY_IN_PROGRESS: i32 = 9;
    /// A drill ran but did not succeed
    pub const DRILL_FAILED: i32 = 11;
    pub const INTERNAL_ERROR: i32 = 99;
}

#[derive(Debug)]
pub enum CliError {
    Usage(String),
    PlanNotFound(String),
    Validation(String),
    Io(String),
    Config(String),
    RecoveryInProgress(String),
    DrillFailed(String),
    Internal(String),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Usage(_) => exit_codes::USAGE_ERROR,
            CliError::PlanNotFound(_) => exit_codes::PLAN_NOT_FOUND,
            CliError::Validation(_) => exit_codes::VALIDATION_ERROR,
            CliError::Io(_) => exit_codes::IO_ERROR,
            CliError::Config(_) => exit_codes::CONFIG_ERROR,
            CliError::RecoveryInProgress(_) => exit_codes::RECOVERY_IN_PROGRESS,
            CliError::DrillFailed(_) => exit_codes::DRILL_FAILED,
            CliError::Internal(_) => exit_codes::INTERNAL_ERROR,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Usage(msg) => write!(f, "Usage error: {}", msg),
            CliError::PlanNotFound(msg) => {
                write!(f, "{}. Use 'plans' to list registered plans.", msg)
            }
            CliError::Validation(msg) => write!(f, "Validation error: {}", msg),
            CliError::Io(msg) => write!(f, "IO error: {}", msg),
            CliError::Config(msg) => write!(f, "{}", msg),
            CliError::RecoveryInProgress(msg) => write!(f, "{}", msg),
            CliError::DrillFailed(msg) => write!(f, "Drill failed: {}", msg),
            CliError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for CliError {}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io(err.to_string())
    }
}

impl From<RecoveryError> for CliError {
    fn from(err: RecoveryError) -> Self {
        CliError::from_recovery(&err)
    }
}

impl From<&str> for CliError {
    fn from(msg: &str) -> Self {
        CliError::Validation(msg.to_string())
    }
}

impl From<String> for CliError {
    fn from(msg: String) -> Self {
        CliError::Validation(msg)
    }
}

/// Exit code for any error surfaced by a command
pub fn exit_code_for(error: &(dyn std::error::Error + 'static)) -> i32 {
    if let Some(cli) = error.downcast_ref::<CliError>() {
        return cli.exit_code();
    }
    if let Some(recovery) = error.downcast_ref::<RecoveryError>() {
        return CliError::from_recovery(recovery).exit_code();
    }
    exit_codes::GENERAL_ERROR
}

/// Engine error code, when the failure came from the engine
pub fn engine_error_code(error: &(dyn std::error::Error + 'static)) -> Option<i32> {
    error.downcast_ref::<RecoveryError>().map(RecoveryError::error_code)
}

/// The command already wrote its own report for this failure
pub fn already_reported(error: &(dyn std::error::Error + 'static)) -> bool {
    matches!(error.downcast_ref::<CliError>(), Some(CliError::DrillFailed(_)))
}

impl CliError {
    fn from_recovery(err: &RecoveryError) -> Self {
        let msg = err.to_string();
        match err {
            RecoveryError::PlanNotFound(_) => CliError::PlanNotFound(msg),
            RecoveryError::RecoveryInProgress { .. } => CliError::RecoveryInProgress(msg),
            e if e.is_configuration_error() || matches!(e, RecoveryError::Json(_)) => {
                CliError::Config(msg)
            }
            RecoveryError::Io(_) => CliError::Io(msg),
            _ => CliError::Internal(msg),
        }
    }
}

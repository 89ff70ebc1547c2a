use crate::types::DisasterType;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No recovery plan registered for {0}")]
    PlanNotFound(DisasterType),

    #[error("Recovery already in progress (plan {plan_id})")]
    RecoveryInProgress { plan_id: String },

    #[error("Invalid recovery plan: {0}")]
    InvalidPlan(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Step {step_id} failed: {message}")]
    StepFailed { step_id: String, message: String },

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),
}

impl Error {
    pub fn error_code(&self) -> i32 {
        match self {
            Error::Io(_) => -1,
            Error::Json(_) => -2,
            Error::PlanNotFound(_) => -3,
            Error::RecoveryInProgress { .. } => -4,
            Error::InvalidPlan(_) => -5,
            Error::Config(_) => -6,
            Error::Provider(_) => -7,
            Error::StepFailed { .. } => -8,
            Error::Timeout(_) => -9,
            Error::Cancelled(_) => -10,
        }
    }

    /// Configuration errors are build-time defects and never retried.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Error::PlanNotFound(_) | Error::InvalidPlan(_) | Error::Config(_)
        )
    }
}

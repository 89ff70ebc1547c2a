//! Input validation for CLI arguments

use lightning_recovery::{DisasterType, RecoveryConfig, RecoveryPlan};
use std::path::Path;

use super::CliError;

pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Parse a disaster type argument (`database_failure`, `database-failure`, ...)
pub fn validate_disaster_type(value: &str) -> CliResult<DisasterType> {
    value.parse::<DisasterType>().map_err(|_| {
        let known: Vec<&str> = DisasterType::ALL.iter().map(|t| t.as_str()).collect();
        CliError::Validation(format!(
            "unknown disaster type '{}'; expected one of: {}",
            value,
            known.join(", ")
        ))
        .into()
    })
}

/// Every `--skip` id must name a step of the plan
pub fn validate_skip_steps(plan: &RecoveryPlan, skips: &[String]) -> CliResult<()> {
    let unknown: Vec<&str> = skips
        .iter()
        .filter(|id| plan.get_step(id).is_none())
        .map(String::as_str)
        .collect();
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(CliError::Validation(format!(
            "plan {} has no step(s): {}",
            plan.id,
            unknown.join(", ")
        ))
        .into())
    }
}

/// Load the effective configuration: file (if any), then environment
pub fn load_config(path: Option<&str>) -> CliResult<RecoveryConfig> {
    let config = match path {
        Some(path) => {
            if !Path::new(path).exists() {
                return Err(CliError::Validation(format!("config file not found: {}", path)).into());
            }
            RecoveryConfig::from_file(path).map_err(CliError::from)?
        }
        None => RecoveryConfig::default(),
    };
    let config = config.apply_env_overrides().map_err(CliError::from)?;
    config.validate().map_err(CliError::from)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lightning_recovery::{procedure, RecoveryStep, StepOutcome};

    #[test]
    fn test_validate_disaster_type() {
        assert_eq!(
            validate_disaster_type("security-breach").unwrap(),
            DisasterType::SecurityBreach
        );
        let err = validate_disaster_type("flood").unwrap_err();
        assert!(err.to_string().contains("database_failure"));
    }

    #[test]
    fn test_validate_skip_steps() {
        let plan = RecoveryPlan::new("p", DisasterType::DatabaseFailure, 1).step(RecoveryStep::new(
            "a",
            "a",
            procedure(|| async { Ok(StepOutcome::ok("done")) }),
        ));
        assert!(validate_skip_steps(&plan, &["a".to_string()]).is_ok());
        let err = validate_skip_steps(&plan, &["zz".to_string()]).unwrap_err();
        assert!(err.to_string().contains("zz"));
    }

    #[test]
    fn test_load_missing_config() {
        assert!(load_config(Some("/nonexistent/recovery.json")).is_err());
    }
}

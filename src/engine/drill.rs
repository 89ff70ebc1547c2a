//! Recovery drills: dry-run a plan and turn the execution into a report.

use super::{DisasterRecoveryEngine, RecoveryOptions, RunMode};
use crate::config::RecoveryConfig;
use crate::plan::RecoveryPlan;
use crate::types::{
    DisasterType, RecoveryExecution, RecoveryStatus, RecoveryTestReport, StepTestResult,
};
use crate::Result;
use tracing::info;

impl DisasterRecoveryEngine {
    /// Dry-run the plan for `disaster_type` with status `testing`, then
    /// report per-step results and recommendations. Status is `healthy`
    /// afterwards.
    pub async fn test_recovery_plan(
        &self,
        disaster_type: DisasterType,
        options: RecoveryOptions,
    ) -> Result<RecoveryTestReport> {
        let plan = self.registry.get_plan(disaster_type)?;
        let _slot = self.acquire_slot()?;

        info!(plan_id = %plan.id, disaster_type = %disaster_type, "Starting recovery drill");
        self.set_status(RecoveryStatus::Testing);
        let options = options.dry_run(true);
        let outcome = self.run_plan(&plan, &options, RunMode::Drill).await;
        self.set_status(RecoveryStatus::Healthy);

        let test_results = test_results(&plan, &outcome.execution);
        let recommendations = recommendations(&plan, &outcome.execution, &self.config);
        info!(
            plan_id = %plan.id,
            success = outcome.success,
            recommendations = recommendations.len(),
            "Recovery drill finished"
        );

        Ok(RecoveryTestReport {
            disaster_type,
            plan_id: plan.id.clone(),
            success: outcome.success,
            test_results,
            recommendations,
            execution: outcome.execution,
        })
    }
}

/// One entry per step that ran, in declared order
fn test_results(plan: &RecoveryPlan, execution: &RecoveryExecution) -> Vec<StepTestResult> {
    plan.steps
        .iter()
        .filter_map(|step| {
            let (success, message) = if execution.is_completed(&step.id) {
                let message = if execution.dry_run { "simulated" } else { "completed" };
                (true, message.to_string())
            } else {
                let failure = execution.failed_steps.iter().find(|f| f.step_id == step.id)?;
                (false, failure.error.clone())
            };
            Some(StepTestResult {
                step_id: step.id.clone(),
                step_name: step.name.clone(),
                success,
                duration_minutes: step.estimated_duration_minutes,
                message,
            })
        })
        .collect()
}

/// Rule-based follow-ups for a finished drill
pub fn recommendations(
    plan: &RecoveryPlan,
    execution: &RecoveryExecution,
    config: &RecoveryConfig,
) -> Vec<String> {
    let mut out = Vec::new();

    for failed in &execution.failed_steps {
        let name = plan
            .get_step(&failed.step_id)
            .map(|s| s.name.as_str())
            .unwrap_or(failed.step_id.as_str());
        out.push(format!("Step '{}' failed: fix before next test", name));
    }

    for step in &plan.steps {
        if !execution.is_completed(&step.id) && !execution.is_failed(&step.id) {
            out.push(format!(
                "Step '{}' was not exercised: check skipped steps and dependencies",
                step.name
            ));
        }
    }

    if let Some(actual) = execution.actual_duration_minutes {
        if actual > config.rto_minutes as f64 {
            out.push(format!(
                "Drill took {:.1} minutes, over the RTO of {} minutes: optimize procedures",
                actual, config.rto_minutes
            ));
        }
    }

    let estimated = plan.total_estimated_minutes() as u64;
    if estimated > config.rto_minutes {
        out.push(format!(
            "Estimated recovery time of {} minutes exceeds the RTO of {} minutes",
            estimated, config.rto_minutes
        ));
    }

    match plan.disaster_type {
        DisasterType::DatabaseFailure => out.push(format!(
            "Check that database backup frequency meets the RPO of {} minutes",
            config.rpo_minutes
        )),
        DisasterType::SecurityBreach => {
            out.push("Review incident response procedures with the security team".to_string())
        }
        DisasterType::DatacenterFailure => {
            out.push("Confirm the secondary site has capacity for a full failover".to_string())
        }
        DisasterType::DataCorruption => {
            out.push("Schedule regular integrity verification of database backups".to_string())
        }
        DisasterType::StorageFailure => {
            out.push("Confirm file storage backups are replicated off-site".to_string())
        }
        _ => {}
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{procedure, RecoveryStep, StepOutcome};
    use crate::types::FailedStep;

    fn plan(disaster_type: DisasterType, minutes: u32) -> RecoveryPlan {
        let ok = || procedure(|| async { Ok(StepOutcome::ok("done")) });
        RecoveryPlan::new("p", disaster_type, 1)
            .step(RecoveryStep::new("a", "Step A", ok()).estimated_minutes(minutes))
            .step(RecoveryStep::new("b", "Step B", ok()).depends_on(["a"]))
    }

    fn execution(disaster_type: DisasterType) -> RecoveryExecution {
        RecoveryExecution::new("e".into(), "p".into(), disaster_type, true)
    }

    #[test]
    fn test_failed_step_recommendation() {
        let plan = plan(DisasterType::ApplicationFailure, 5);
        let mut exec = execution(DisasterType::ApplicationFailure);
        exec.completed_steps.push("a".into());
        exec.failed_steps.push(FailedStep {
            step_id: "b".into(),
            error: "boom".into(),
        });
        exec.finish();

        let recs = recommendations(&plan, &exec, &RecoveryConfig::default());
        assert_eq!(recs, vec!["Step 'Step B' failed: fix before next test".to_string()]);

        let results = test_results(&plan, &exec);
        assert_eq!(results.len(), 2);
        assert!(results[0].success);
        assert_eq!(results[0].message, "simulated");
        assert_eq!(results[0].duration_minutes, 5);
        assert!(!results[1].success);
        assert_eq!(results[1].message, "boom");
    }

    #[test]
    fn test_rto_and_type_specific_recommendations() {
        let config = RecoveryConfig {
            rto_minutes: 10,
            rpo_minutes: 15,
            ..Default::default()
        };
        let plan = plan(DisasterType::DatabaseFailure, 30);
        let mut exec = execution(DisasterType::DatabaseFailure);
        exec.completed_steps = vec!["a".into(), "b".into()];
        exec.actual_duration_minutes = Some(12.0);

        let recs = recommendations(&plan, &exec, &config);
        assert!(recs.iter().any(|r| r.contains("optimize procedures")));
        assert!(recs.iter().any(|r| r.contains("exceeds the RTO of 10 minutes")));
        assert!(recs.iter().any(|r| r.contains("RPO of 15 minutes")));
    }

    #[test]
    fn test_unexercised_steps_reported() {
        let plan = plan(DisasterType::SecurityBreach, 1);
        let exec = execution(DisasterType::SecurityBreach);

        let recs = recommendations(&plan, &exec, &RecoveryConfig::default());
        assert_eq!(recs.iter().filter(|r| r.contains("not exercised")).count(), 2);
        assert!(recs.iter().any(|r| r.contains("security team")));
        assert!(test_results(&plan, &exec).is_empty());
    }
}

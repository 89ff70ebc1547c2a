//! Reverse, best-effort unwind of completed steps.
//!
//! Not transactional: a rollback procedure that fails is logged and the
//! sweep moves on, which can leave the system half-restored. Steps without
//! a rollback procedure are left as they are.

use super::DisasterRecoveryEngine;
use crate::metrics::ROLLBACK_STEP;
use crate::plan::RecoveryPlan;
use crate::types::{FailedStep, RollbackReport};
use tracing::{error, info, warn};

impl DisasterRecoveryEngine {
    pub(crate) async fn roll_back(
        &self,
        plan: &RecoveryPlan,
        completed_steps: &[String],
    ) -> RollbackReport {
        info!(
            plan_id = %plan.id,
            steps = completed_steps.len(),
            "Rolling back completed recovery steps"
        );

        let mut report = RollbackReport::default();
        for step_id in completed_steps.iter().rev() {
            report.visited.push(step_id.clone());

            let Some(rollback) = plan.get_step(step_id).and_then(|s| s.rollback.clone()) else {
                report.irreversible.push(step_id.clone());
                continue;
            };

            let (succeeded, outcome) = match self.invoke(step_id, rollback.as_ref()).await {
                Ok(message) => {
                    info!(plan_id = %plan.id, step_id = %step_id, "Rolled back step: {}", message);
                    report.rolled_back.push(step_id.clone());
                    (true, "true")
                }
                Err(message) => {
                    error!(plan_id = %plan.id, step_id = %step_id, "Rollback failed: {}", message);
                    report.failed.push(FailedStep {
                        step_id: step_id.clone(),
                        error: message,
                    });
                    (false, "false")
                }
            };

            self.sink().submit_metric(
                ROLLBACK_STEP,
                if succeeded { 1.0 } else { 0.0 },
                &[
                    ("plan_id", plan.id.as_str()),
                    ("step_id", step_id.as_str()),
                    ("success", outcome),
                ],
            );
        }

        if !report.is_clean() {
            warn!(
                plan_id = %plan.id,
                failed = report.failed.len(),
                "Rollback incomplete, manual intervention required"
            );
        }
        report
    }
}

//! Standard recovery plans
//!
//! Hand-authored plans for the disaster types the engine knows how to
//! answer. `network_failure` and `human_error` have no standard plan and
//! resolve to `PlanNotFound` unless the caller registers its own.

use super::{RecoveryPlan, RecoveryStep, StepOutcome, StepProcedure};
use crate::metrics::{AlertSink, INCIDENT_NOTIFICATION};
use crate::providers::{
    BackupFilter, BackupInfo, BackupOptions, BackupProvider, HealthMonitor, OperatorApproval,
    ServiceState,
};
use crate::types::DisasterType;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

pub const LABEL_PURPOSE: &str = "purpose";
pub const PURPOSE_PRE_RECOVERY: &str = "pre_recovery";
pub const PURPOSE_FORENSIC: &str = "forensic";

pub const DATABASE_SERVICE: &str = "database";
pub const STORAGE_SERVICE: &str = "storage";
pub const APPLICATION_SERVICE: &str = "application";

/// Collaborators the standard plans are wired to
#[derive(Clone)]
pub struct CatalogProviders {
    pub database: Arc<dyn BackupProvider>,
    pub files: Arc<dyn BackupProvider>,
    pub health: Arc<dyn HealthMonitor>,
    pub approval: Arc<dyn OperatorApproval>,
    pub sink: Arc<dyn AlertSink>,
}

/// Build every standard plan
pub fn standard_plans(providers: &CatalogProviders) -> Vec<RecoveryPlan> {
    vec![
        database_failure_plan(providers),
        storage_failure_plan(providers),
        application_failure_plan(providers),
        datacenter_failure_plan(providers),
        security_breach_plan(providers),
        data_corruption_plan(providers),
    ]
}

fn database_failure_plan(p: &CatalogProviders) -> RecoveryPlan {
    RecoveryPlan::new("db-recovery", DisasterType::DatabaseFailure, 1)
        .personnel(["database_admin", "sre_on_call"])
        .step(
            RecoveryStep::new(
                "assess_database",
                "Assess database damage",
                assess(p, &[DATABASE_SERVICE]),
            )
            .description("Poll service health and record which database components are down")
            .estimated_minutes(5),
        )
        .step(
            RecoveryStep::new(
                "snapshot_database",
                "Snapshot current database state",
                snapshot(&p.database, PURPOSE_PRE_RECOVERY),
            )
            .description("Take a full backup of the damaged database so the restore can be undone")
            .estimated_minutes(10)
            .depends_on(["assess_database"]),
        )
        .step(
            RecoveryStep::new(
                "verify_database_backup",
                "Verify latest database backup",
                verify_latest(&p.database),
            )
            .description("Verify integrity of the most recent database backup")
            .estimated_minutes(10)
            .depends_on(["assess_database"]),
        )
        .step(
            RecoveryStep::new(
                "restore_database",
                "Restore database from backup",
                restore_latest(&p.database),
            )
            .description("Restore the database from the most recent verified backup")
            .estimated_minutes(30)
            .depends_on(["snapshot_database", "verify_database_backup"])
            .with_rollback(restore_snapshot(&p.database, PURPOSE_PRE_RECOVERY)),
        )
        .step(
            RecoveryStep::new(
                "validate_database",
                "Validate database service",
                verify_services(p, &[DATABASE_SERVICE]),
            )
            .description("Confirm the database service reports healthy after the restore")
            .estimated_minutes(10)
            .depends_on(["restore_database"]),
        )
        .step(
            RecoveryStep::new(
                "notify_stakeholders",
                "Notify stakeholders",
                notify(p, DisasterType::DatabaseFailure, "stakeholders"),
            )
            .description("Announce database recovery completion")
            .estimated_minutes(5)
            .depends_on(["validate_database"]),
        )
}

fn storage_failure_plan(p: &CatalogProviders) -> RecoveryPlan {
    RecoveryPlan::new("storage-recovery", DisasterType::StorageFailure, 2)
        .personnel(["storage_admin", "sre_on_call"])
        .step(
            RecoveryStep::new(
                "assess_storage",
                "Assess storage damage",
                assess(p, &[STORAGE_SERVICE]),
            )
            .estimated_minutes(5),
        )
        .step(
            RecoveryStep::new(
                "verify_file_backup",
                "Verify latest file backup",
                verify_latest(&p.files),
            )
            .description("Verify integrity of the most recent file storage backup")
            .estimated_minutes(15)
            .depends_on(["assess_storage"]),
        )
        .step(
            RecoveryStep::new("restore_files", "Restore file storage", restore_latest(&p.files))
                .description("Restore file storage from the most recent verified backup")
                .estimated_minutes(60)
                .depends_on(["verify_file_backup"]),
        )
        .step(
            RecoveryStep::new(
                "validate_storage",
                "Validate storage service",
                verify_services(p, &[STORAGE_SERVICE]),
            )
            .estimated_minutes(10)
            .depends_on(["restore_files"]),
        )
        .step(
            RecoveryStep::new(
                "notify_stakeholders",
                "Notify stakeholders",
                notify(p, DisasterType::StorageFailure, "stakeholders"),
            )
            .estimated_minutes(5)
            .depends_on(["validate_storage"]),
        )
}

fn application_failure_plan(p: &CatalogProviders) -> RecoveryPlan {
    RecoveryPlan::new("app-recovery", DisasterType::ApplicationFailure, 3)
        .personnel(["sre_on_call"])
        .step(
            RecoveryStep::new(
                "assess_application",
                "Assess application failure",
                assess(p, &[APPLICATION_SERVICE]),
            )
            .estimated_minutes(5),
        )
        .step(
            RecoveryStep::new(
                "restart_application",
                "Restart application instances",
                gate(
                    p,
                    "restart_application",
                    "Restart all application instances and confirm they pass readiness",
                ),
            )
            .manual()
            .estimated_minutes(15)
            .depends_on(["assess_application"]),
        )
        .step(
            RecoveryStep::new(
                "validate_application",
                "Validate application service",
                verify_services(p, &[APPLICATION_SERVICE]),
            )
            .estimated_minutes(5)
            .depends_on(["restart_application"]),
        )
        .step(
            RecoveryStep::new(
                "notify_stakeholders",
                "Notify stakeholders",
                notify(p, DisasterType::ApplicationFailure, "stakeholders"),
            )
            .estimated_minutes(5)
            .depends_on(["validate_application"]),
        )
}

fn datacenter_failure_plan(p: &CatalogProviders) -> RecoveryPlan {
    RecoveryPlan::new("datacenter-failover", DisasterType::DatacenterFailure, 1)
        .personnel(["incident_commander", "database_admin", "storage_admin", "network_engineer"])
        .step(
            RecoveryStep::new(
                "declare_disaster",
                "Declare datacenter disaster",
                gate(
                    p,
                    "declare_disaster",
                    "Confirm the primary datacenter is lost and authorize failover",
                ),
            )
            .manual()
            .estimated_minutes(15),
        )
        .step(
            RecoveryStep::new(
                "notify_team",
                "Page recovery team",
                notify(p, DisasterType::DatacenterFailure, "recovery_team"),
            )
            .estimated_minutes(5)
            .depends_on(["declare_disaster"]),
        )
        .step(
            RecoveryStep::new(
                "restore_database",
                "Restore database in secondary site",
                restore_latest(&p.database),
            )
            .estimated_minutes(60)
            .depends_on(["declare_disaster"]),
        )
        .step(
            RecoveryStep::new(
                "restore_files",
                "Restore file storage in secondary site",
                restore_latest(&p.files),
            )
            .estimated_minutes(90)
            .depends_on(["declare_disaster"]),
        )
        .step(
            RecoveryStep::new(
                "redirect_traffic",
                "Redirect traffic to secondary site",
                gate(p, "redirect_traffic", "Switch DNS and load balancers to the secondary site"),
            )
            .manual()
            .estimated_minutes(20)
            .depends_on(["restore_database", "restore_files"]),
        )
        .step(
            RecoveryStep::new(
                "validate_services",
                "Validate all services",
                verify_services(p, &[DATABASE_SERVICE, STORAGE_SERVICE, APPLICATION_SERVICE]),
            )
            .estimated_minutes(15)
            .depends_on(["redirect_traffic"]),
        )
        .step(
            RecoveryStep::new(
                "notify_stakeholders",
                "Notify stakeholders",
                notify(p, DisasterType::DatacenterFailure, "stakeholders"),
            )
            .estimated_minutes(5)
            .depends_on(["validate_services"]),
        )
}

fn security_breach_plan(p: &CatalogProviders) -> RecoveryPlan {
    RecoveryPlan::new("security-incident", DisasterType::SecurityBreach, 1)
        .personnel(["security_lead", "incident_commander", "database_admin"])
        .step(
            RecoveryStep::new(
                "isolate_systems",
                "Isolate affected systems",
                gate(
                    p,
                    "isolate_systems",
                    "Cut network access to compromised hosts before any restore",
                ),
            )
            .manual()
            .estimated_minutes(15),
        )
        .step(
            RecoveryStep::new(
                "notify_security",
                "Notify security team",
                notify(p, DisasterType::SecurityBreach, "security_team"),
            )
            .estimated_minutes(5)
            .depends_on(["isolate_systems"]),
        )
        .step(
            RecoveryStep::new(
                "preserve_evidence",
                "Preserve forensic snapshot",
                snapshot(&p.database, PURPOSE_FORENSIC),
            )
            .description("Back up the compromised database for forensic analysis")
            .estimated_minutes(20)
            .depends_on(["isolate_systems"]),
        )
        .step(
            RecoveryStep::new(
                "verify_clean_backup",
                "Verify clean backup",
                verify_latest(&p.database),
            )
            .estimated_minutes(15)
            .depends_on(["isolate_systems"]),
        )
        .step(
            RecoveryStep::new(
                "restore_database",
                "Restore database from clean backup",
                restore_latest(&p.database),
            )
            .estimated_minutes(30)
            .depends_on(["preserve_evidence", "verify_clean_backup"])
            .with_rollback(restore_snapshot(&p.database, PURPOSE_FORENSIC)),
        )
        .step(
            RecoveryStep::new(
                "rotate_credentials",
                "Rotate credentials",
                gate(
                    p,
                    "rotate_credentials",
                    "Rotate every credential and key reachable from the compromised hosts",
                ),
            )
            .manual()
            .estimated_minutes(30)
            .depends_on(["restore_database"]),
        )
        .step(
            RecoveryStep::new(
                "validate_services",
                "Validate services",
                verify_services(p, &[DATABASE_SERVICE, APPLICATION_SERVICE]),
            )
            .estimated_minutes(10)
            .depends_on(["rotate_credentials"]),
        )
}

fn data_corruption_plan(p: &CatalogProviders) -> RecoveryPlan {
    RecoveryPlan::new("data-corruption-recovery", DisasterType::DataCorruption, 2)
        .personnel(["database_admin"])
        .step(
            RecoveryStep::new(
                "assess_corruption",
                "Assess corruption scope",
                assess(p, &[DATABASE_SERVICE]),
            )
            .estimated_minutes(10),
        )
        .step(
            RecoveryStep::new(
                "snapshot_database",
                "Snapshot corrupted state",
                snapshot(&p.database, PURPOSE_PRE_RECOVERY),
            )
            .estimated_minutes(10)
            .depends_on(["assess_corruption"]),
        )
        .step(
            RecoveryStep::new(
                "verify_database_backup",
                "Verify latest database backup",
                verify_latest(&p.database),
            )
            .estimated_minutes(10)
            .depends_on(["assess_corruption"]),
        )
        .step(
            RecoveryStep::new(
                "restore_database",
                "Restore database from backup",
                restore_latest(&p.database),
            )
            .estimated_minutes(30)
            .depends_on(["snapshot_database", "verify_database_backup"])
            .with_rollback(restore_snapshot(&p.database, PURPOSE_PRE_RECOVERY)),
        )
        .step(
            RecoveryStep::new(
                "validate_database",
                "Validate database service",
                verify_services(p, &[DATABASE_SERVICE]),
            )
            .estimated_minutes(10)
            .depends_on(["restore_database"]),
        )
}

fn assess(p: &CatalogProviders, services: &[&str]) -> Arc<dyn StepProcedure> {
    Arc::new(AssessHealth {
        health: p.health.clone(),
        services: services.iter().map(|s| s.to_string()).collect(),
    })
}

fn verify_services(p: &CatalogProviders, services: &[&str]) -> Arc<dyn StepProcedure> {
    Arc::new(VerifyServices {
        health: p.health.clone(),
        services: services.iter().map(|s| s.to_string()).collect(),
    })
}

fn snapshot(provider: &Arc<dyn BackupProvider>, purpose: &'static str) -> Arc<dyn StepProcedure> {
    Arc::new(SnapshotBackup {
        provider: provider.clone(),
        purpose,
    })
}

fn verify_latest(provider: &Arc<dyn BackupProvider>) -> Arc<dyn StepProcedure> {
    Arc::new(VerifyLatestBackup {
        provider: provider.clone(),
    })
}

fn restore_latest(provider: &Arc<dyn BackupProvider>) -> Arc<dyn StepProcedure> {
    Arc::new(RestoreLatestBackup {
        provider: provider.clone(),
    })
}

fn restore_snapshot(
    provider: &Arc<dyn BackupProvider>,
    purpose: &'static str,
) -> Arc<dyn StepProcedure> {
    Arc::new(RestoreSnapshot {
        provider: provider.clone(),
        purpose,
    })
}

fn gate(p: &CatalogProviders, step_id: &str, instructions: &str) -> Arc<dyn StepProcedure> {
    Arc::new(OperatorGate {
        approval: p.approval.clone(),
        step_id: step_id.to_string(),
        instructions: instructions.to_string(),
    })
}

fn notify(
    p: &CatalogProviders,
    disaster_type: DisasterType,
    audience: &'static str,
) -> Arc<dyn StepProcedure> {
    Arc::new(Notify {
        sink: p.sink.clone(),
        disaster_type,
        audience,
    })
}

fn is_snapshot(backup: &BackupInfo) -> bool {
    backup.labels.contains_key(LABEL_PURPOSE)
}

/// Newest backup that is a restore candidate (snapshots taken during
/// recovery are never candidates)
async fn latest_candidate(
    provider: &dyn BackupProvider,
    verified_only: bool,
) -> Result<Option<BackupInfo>> {
    let filter = BackupFilter {
        verified_only,
        ..Default::default()
    };
    let backups = provider.list_backups(&filter).await?;
    Ok(backups.into_iter().find(|b| !is_snapshot(b)))
}

struct AssessHealth {
    health: Arc<dyn HealthMonitor>,
    services: Vec<String>,
}

#[async_trait]
impl StepProcedure for AssessHealth {
    async fn run(&self) -> Result<StepOutcome> {
        let report = self.health.get_health_status().await?;
        let affected: Vec<&str> = self
            .services
            .iter()
            .filter(|s| report.service_state(s) != Some(ServiceState::Healthy))
            .map(String::as_str)
            .collect();
        Ok(StepOutcome::ok(format!(
            "overall status {}, affected services: {:?}, down overall: {:?}",
            report.status.as_str(),
            affected,
            report.down_services()
        )))
    }
}

struct VerifyServices {
    health: Arc<dyn HealthMonitor>,
    services: Vec<String>,
}

#[async_trait]
impl StepProcedure for VerifyServices {
    async fn run(&self) -> Result<StepOutcome> {
        let report = self.health.get_health_status().await?;
        let still_down: Vec<&str> = self
            .services
            .iter()
            .filter(|s| report.service_state(s) == Some(ServiceState::Down))
            .map(String::as_str)
            .collect();
        if still_down.is_empty() {
            Ok(StepOutcome::ok(format!("services up: {:?}", self.services)))
        } else {
            Ok(StepOutcome::fail(format!("services still down: {:?}", still_down)))
        }
    }
}

struct SnapshotBackup {
    provider: Arc<dyn BackupProvider>,
    purpose: &'static str,
}

#[async_trait]
impl StepProcedure for SnapshotBackup {
    async fn run(&self) -> Result<StepOutcome> {
        let mut options = BackupOptions::full(format!("{} snapshot", self.purpose));
        options
            .labels
            .insert(LABEL_PURPOSE.to_string(), self.purpose.to_string());

        let result = self.provider.create_backup(&options).await?;
        match (result.success, result.metadata) {
            (true, Some(meta)) => {
                info!(
                    domain = %self.provider.domain(),
                    backup_id = %meta.id,
                    "{} snapshot created",
                    self.purpose
                );
                Ok(StepOutcome::ok(format!("created {} snapshot {}", self.purpose, meta.id)))
            }
            (true, None) => Ok(StepOutcome::ok(format!("created {} snapshot", self.purpose))),
            (false, _) => Ok(StepOutcome::fail(
                result
                    .error
                    .unwrap_or_else(|| "backup creation failed".to_string()),
            )),
        }
    }
}

struct VerifyLatestBackup {
    provider: Arc<dyn BackupProvider>,
}

#[async_trait]
impl StepProcedure for VerifyLatestBackup {
    async fn run(&self) -> Result<StepOutcome> {
        let Some(backup) = latest_candidate(self.provider.as_ref(), false).await? else {
            return Ok(StepOutcome::fail(format!(
                "no {} backups available",
                self.provider.domain()
            )));
        };
        let result = self.provider.verify_backup(&backup.id).await?;
        if result.valid {
            Ok(StepOutcome::ok(format!("backup {} verified", backup.id)))
        } else {
            Ok(StepOutcome::fail(format!(
                "backup {} failed verification: {}",
                backup.id,
                result.issues.join("; ")
            )))
        }
    }
}

struct RestoreLatestBackup {
    provider: Arc<dyn BackupProvider>,
}

#[async_trait]
impl StepProcedure for RestoreLatestBackup {
    async fn run(&self) -> Result<StepOutcome> {
        let Some(backup) = latest_candidate(self.provider.as_ref(), true).await? else {
            return Ok(StepOutcome::fail(format!(
                "no verified {} backup to restore",
                self.provider.domain()
            )));
        };
        let result = self.provider.restore_from_backup(&backup.id).await?;
        if result.success {
            Ok(StepOutcome::ok(format!("restored from {}", backup.id)))
        } else {
            Ok(StepOutcome::fail(
                result
                    .error
                    .unwrap_or_else(|| format!("restore from {} failed", backup.id)),
            ))
        }
    }
}

struct RestoreSnapshot {
    provider: Arc<dyn BackupProvider>,
    purpose: &'static str,
}

#[async_trait]
impl StepProcedure for RestoreSnapshot {
    async fn run(&self) -> Result<StepOutcome> {
        let backups = self.provider.list_backups(&BackupFilter::default()).await?;
        let Some(snapshot) = backups
            .into_iter()
            .find(|b| b.labels.get(LABEL_PURPOSE).map(String::as_str) == Some(self.purpose))
        else {
            return Ok(StepOutcome::fail(format!("no {} snapshot to roll back to", self.purpose)));
        };
        let result = self.provider.restore_from_backup(&snapshot.id).await?;
        if result.success {
            Ok(StepOutcome::ok(format!("rolled back to snapshot {}", snapshot.id)))
        } else {
            Ok(StepOutcome::fail(
                result
                    .error
                    .unwrap_or_else(|| format!("restore of snapshot {} failed", snapshot.id)),
            ))
        }
    }
}

struct OperatorGate {
    approval: Arc<dyn OperatorApproval>,
    step_id: String,
    instructions: String,
}

#[async_trait]
impl StepProcedure for OperatorGate {
    async fn run(&self) -> Result<StepOutcome> {
        debug!(step_id = %self.step_id, "waiting for operator confirmation");
        if self
            .approval
            .await_confirmation(&self.step_id, &self.instructions)
            .await?
        {
            Ok(StepOutcome::ok("confirmed by operator"))
        } else {
            Ok(StepOutcome::fail("operator declined"))
        }
    }
}

struct Notify {
    sink: Arc<dyn AlertSink>,
    disaster_type: DisasterType,
    audience: &'static str,
}

#[async_trait]
impl StepProcedure for Notify {
    async fn run(&self) -> Result<StepOutcome> {
        self.sink.submit_metric(
            INCIDENT_NOTIFICATION,
            1.0,
            &[
                ("audience", self.audience),
                ("disaster_type", self.disaster_type.as_str()),
            ],
        );
        Ok(StepOutcome::ok(format!("notified {}", self.audience)))
    }
}

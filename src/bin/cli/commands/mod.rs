//! CLI command modules
//!
//! - plans: plan catalog (plans, show)
//! - drill: dry-run a plan and report recommendations
//! - config: show and validate the effective configuration
//! - health: classify a health report the way the watchdog would

pub mod config;
pub mod drill;
pub mod health;
pub mod plans;

use lightning_recovery::{
    AutoApprove, CatalogProviders, DisasterRecoveryEngine, InMemoryBackupProvider,
    NoopAlertSink, RecoveryConfig, StaticHealthMonitor,
};
use lightning_recovery::plan::catalog::{APPLICATION_SERVICE, DATABASE_SERVICE, STORAGE_SERVICE};
use lightning_recovery::providers::BackupDomain;
use std::sync::Arc;

use super::utils::{CliError, CliResult};

/// Engine wired to in-memory collaborators. Drills never invoke step
/// procedures, so the catalog only needs well-formed providers.
pub fn reference_engine(config: RecoveryConfig) -> CliResult<DisasterRecoveryEngine> {
    let providers = CatalogProviders {
        database: Arc::new(InMemoryBackupProvider::with_seed_backup(BackupDomain::Database)),
        files: Arc::new(InMemoryBackupProvider::with_seed_backup(BackupDomain::FileStorage)),
        health: Arc::new(StaticHealthMonitor::healthy(&[
            DATABASE_SERVICE,
            STORAGE_SERVICE,
            APPLICATION_SERVICE,
        ])),
        approval: Arc::new(AutoApprove),
        sink: Arc::new(NoopAlertSink),
    };
    DisasterRecoveryEngine::with_standard_plans(config, providers)
        .map_err(|e| CliError::from(e).into())
}

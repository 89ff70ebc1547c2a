//! In-memory collaborators for drills, the CLI and tests
//!
//! `InMemoryBackupProvider` keeps backup metadata in memory and supports
//! failure injection per operation. `StaticHealthMonitor` returns whatever
//! report was last set.

use super::{
    BackupDomain, BackupFilter, BackupInfo, BackupKind, BackupOptions, BackupProvider,
    CreateBackupResult, HealthMonitor, HealthReport, OperatorApproval, RestoreResult,
    ServiceHealth, ServiceState, VerifyResult,
};
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::SystemTime;
use tracing::debug;

/// Operation of the backup contract, used for failure injection and call logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackupOperation {
    List,
    Create,
    Restore,
    Verify,
}

pub struct InMemoryBackupProvider {
    domain: BackupDomain,
    backups: RwLock<Vec<BackupInfo>>,
    failing: Mutex<Vec<BackupOperation>>,
    calls: Mutex<Vec<(BackupOperation, String)>>,
    next_id: AtomicU64,
}

impl InMemoryBackupProvider {
    pub fn new(domain: BackupDomain) -> Self {
        Self {
            domain,
            backups: RwLock::new(Vec::new()),
            failing: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Provider pre-seeded with one verified full backup
    pub fn with_seed_backup(domain: BackupDomain) -> Self {
        let provider = Self::new(domain);
        provider.insert(BackupKind::Full, 64 * 1024 * 1024, true);
        provider
    }

    pub fn insert(&self, kind: BackupKind, size_bytes: u64, verified: bool) -> BackupInfo {
        self.insert_labeled(kind, size_bytes, verified, BTreeMap::new())
    }

    fn insert_labeled(
        &self,
        kind: BackupKind,
        size_bytes: u64,
        verified: bool,
        labels: BTreeMap<String, String>,
    ) -> BackupInfo {
        let id = format!("{}-{:06}", self.domain, self.next_id.fetch_add(1, Ordering::Relaxed));
        let info = BackupInfo {
            id,
            timestamp: SystemTime::now(),
            size_bytes,
            kind,
            verified,
            labels,
        };
        self.backups.write().push(info.clone());
        info
    }

    /// Make every subsequent call of `op` report failure
    pub fn fail_on(&self, op: BackupOperation) {
        let mut failing = self.failing.lock();
        if !failing.contains(&op) {
            failing.push(op);
        }
    }

    pub fn heal(&self, op: BackupOperation) {
        self.failing.lock().retain(|o| *o != op);
    }

    pub fn calls(&self) -> Vec<(BackupOperation, String)> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, op: BackupOperation) -> usize {
        self.calls.lock().iter().filter(|(o, _)| *o == op).count()
    }

    pub fn backup_count(&self) -> usize {
        self.backups.read().len()
    }

    fn record(&self, op: BackupOperation, arg: &str) -> bool {
        debug!(domain = %self.domain, ?op, arg, "backup provider call");
        self.calls.lock().push((op, arg.to_string()));
        self.failing.lock().contains(&op)
    }
}

#[async_trait]
impl BackupProvider for InMemoryBackupProvider {
    fn domain(&self) -> BackupDomain {
        self.domain
    }

    async fn list_backups(&self, filter: &BackupFilter) -> Result<Vec<BackupInfo>> {
        if self.record(BackupOperation::List, "") {
            return Err(Error::Provider(format!("{} backup catalog unavailable", self.domain)));
        }
        let mut matching: Vec<BackupInfo> = self
            .backups
            .read()
            .iter()
            .filter(|b| filter.matches(b))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
        if let Some(limit) = filter.limit {
            matching.truncate(limit);
        }
        Ok(matching)
    }

    async fn create_backup(&self, options: &BackupOptions) -> Result<CreateBackupResult> {
        if self.record(BackupOperation::Create, &options.reason) {
            return Ok(CreateBackupResult {
                success: false,
                metadata: None,
                error: Some(format!("{} backup creation failed", self.domain)),
            });
        }
        let labels = options.labels.clone();
        let info = self.insert_labeled(options.kind, 32 * 1024 * 1024, false, labels);
        Ok(CreateBackupResult {
            success: true,
            metadata: Some(info),
            error: None,
        })
    }

    async fn restore_from_backup(&self, backup_id: &str) -> Result<RestoreResult> {
        if self.record(BackupOperation::Restore, backup_id) {
            return Ok(RestoreResult {
                success: false,
                error: Some(format!("restore of {} failed", backup_id)),
            });
        }
        let exists = self.backups.read().iter().any(|b| b.id == backup_id);
        Ok(RestoreResult {
            success: exists,
            error: (!exists).then(|| format!("backup {} not found", backup_id)),
        })
    }

    async fn verify_backup(&self, backup_id: &str) -> Result<VerifyResult> {
        if self.record(BackupOperation::Verify, backup_id) {
            return Ok(VerifyResult {
                valid: false,
                issues: vec![format!("checksum mismatch in {}", backup_id)],
            });
        }
        let mut backups = self.backups.write();
        match backups.iter_mut().find(|b| b.id == backup_id) {
            Some(backup) => {
                backup.verified = true;
                Ok(VerifyResult {
                    valid: true,
                    issues: Vec::new(),
                })
            }
            None => Ok(VerifyResult {
                valid: false,
                issues: vec![format!("backup {} not found", backup_id)],
            }),
        }
    }
}

/// Health monitor returning a report set by the caller
pub struct StaticHealthMonitor {
    report: RwLock<HealthReport>,
    unavailable: AtomicBool,
    polls: AtomicU64,
}

impl StaticHealthMonitor {
    pub fn new(report: HealthReport) -> Self {
        Self {
            report: RwLock::new(report),
            unavailable: AtomicBool::new(false),
            polls: AtomicU64::new(0),
        }
    }

    /// All named services healthy
    pub fn healthy(services: &[&str]) -> Self {
        let services = services
            .iter()
            .map(|name| (name.to_string(), ServiceHealth::new(ServiceState::Healthy)))
            .collect();
        Self::new(HealthReport::from_services(services))
    }

    pub fn set_report(&self, report: HealthReport) {
        *self.report.write() = report;
    }

    /// Change one service and recompute the overall status
    pub fn set_service(&self, name: &str, status: ServiceState) {
        let mut report = self.report.write();
        report
            .services
            .insert(name.to_string(), ServiceHealth::new(status));
        *report = HealthReport::from_services(std::mem::take(&mut report.services));
    }

    /// Make polls fail until called again with `false`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn poll_count(&self) -> u64 {
        self.polls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl HealthMonitor for StaticHealthMonitor {
    async fn get_health_status(&self) -> Result<HealthReport> {
        self.polls.fetch_add(1, Ordering::Relaxed);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::Provider("health monitor unreachable".into()));
        }
        Ok(self.report.read().clone())
    }
}

/// Confirms every manual step immediately. Meant for drills.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoApprove;

#[async_trait]
impl OperatorApproval for AutoApprove {
    async fn await_confirmation(&self, step_id: &str, instructions: &str) -> Result<bool> {
        debug!(step_id, instructions, "auto-approving manual step");
        Ok(true)
    }
}

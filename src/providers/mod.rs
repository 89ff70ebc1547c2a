//! External collaborators consumed by the recovery engine
//!
//! The engine never performs backups or health probes itself. It talks to
//! these narrow traits:
//! - `BackupProvider` for a storage domain (database, file storage)
//! - `HealthMonitor` for per-service up/down/degraded state
//! - `OperatorApproval` for manual steps that wait on a human

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::SystemTime;

pub mod memory;

pub use memory::{AutoApprove, InMemoryBackupProvider, StaticHealthMonitor};

/// Storage domain a provider is responsible for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupDomain {
    Database,
    FileStorage,
}

impl std::fmt::Display for BackupDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackupDomain::Database => f.write_str("database"),
            BackupDomain::FileStorage => f.write_str("file_storage"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupKind {
    Full,
    Incremental,
}

/// Backup listing entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupInfo {
    pub id: String,
    pub timestamp: SystemTime,
    pub size_bytes: u64,
    pub kind: BackupKind,
    pub verified: bool,
    pub labels: BTreeMap<String, String>,
}

/// Filter for `list_backups`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupFilter {
    pub since: Option<SystemTime>,
    pub kind: Option<BackupKind>,
    pub verified_only: bool,
    pub limit: Option<usize>,
}

impl BackupFilter {
    pub fn latest_verified() -> Self {
        Self {
            verified_only: true,
            limit: Some(1),
            ..Default::default()
        }
    }

    pub fn matches(&self, backup: &BackupInfo) -> bool {
        if let Some(since) = self.since {
            if backup.timestamp < since {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if backup.kind != kind {
                return false;
            }
        }
        !self.verified_only || backup.verified
    }
}

/// Options for `create_backup`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupOptions {
    pub kind: BackupKind,
    pub reason: String,
    pub labels: BTreeMap<String, String>,
}

impl BackupOptions {
    pub fn full(reason: impl Into<String>) -> Self {
        Self {
            kind: BackupKind::Full,
            reason: reason.into(),
            labels: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateBackupResult {
    pub success: bool,
    pub metadata: Option<BackupInfo>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreResult {
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyResult {
    pub valid: bool,
    pub issues: Vec<String>,
}

/// Backup/restore mechanics for one storage domain
#[async_trait]
pub trait BackupProvider: Send + Sync {
    fn domain(&self) -> BackupDomain;

    /// Newest first
    async fn list_backups(&self, filter: &BackupFilter) -> Result<Vec<BackupInfo>>;

    async fn create_backup(&self, options: &BackupOptions) -> Result<CreateBackupResult>;

    async fn restore_from_backup(&self, backup_id: &str) -> Result<RestoreResult>;

    async fn verify_backup(&self, backup_id: &str) -> Result<VerifyResult>;
}

/// Service state as reported by the health monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Healthy,
    Degraded,
    Down,
}

impl ServiceState {
    /// Gauge value: 1.0 healthy, 0.5 degraded, 0.0 down
    pub fn as_gauge(&self) -> f64 {
        match self {
            ServiceState::Healthy => 1.0,
            ServiceState::Degraded => 0.5,
            ServiceState::Down => 0.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::Healthy => "healthy",
            ServiceState::Degraded => "degraded",
            ServiceState::Down => "down",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: ServiceState,
    pub response_time_ms: Option<u64>,
    pub error: Option<String>,
}

impl ServiceHealth {
    pub fn new(status: ServiceState) -> Self {
        Self {
            status,
            response_time_ms: None,
            error: None,
        }
    }
}

/// Snapshot returned by `HealthMonitor::get_health_status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: ServiceState,
    pub services: BTreeMap<String, ServiceHealth>,
}

impl HealthReport {
    /// Build a report whose overall status is derived from its services
    pub fn from_services(services: BTreeMap<String, ServiceHealth>) -> Self {
        let status = if services.values().any(|s| s.status == ServiceState::Down) {
            ServiceState::Down
        } else if services.values().any(|s| s.status == ServiceState::Degraded) {
            ServiceState::Degraded
        } else {
            ServiceState::Healthy
        };
        Self { status, services }
    }

    pub fn service_state(&self, name: &str) -> Option<ServiceState> {
        self.services.get(name).map(|s| s.status)
    }

    pub fn down_services(&self) -> Vec<&str> {
        self.services
            .iter()
            .filter(|(_, s)| s.status == ServiceState::Down)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Pollable source of service health
#[async_trait]
pub trait HealthMonitor: Send + Sync {
    async fn get_health_status(&self) -> Result<HealthReport>;
}

/// Human gate for manual recovery steps
#[async_trait]
pub trait OperatorApproval: Send + Sync {
    /// Block until an operator confirms (`true`) or refuses (`false`)
    async fn await_confirmation(&self, step_id: &str, instructions: &str) -> Result<bool>;
}

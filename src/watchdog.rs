//! Health watchdog
//!
//! Polls the health monitor on a fixed interval, publishes a health gauge
//! each tick and, when automatic failover is enabled and the system is
//! down, starts the matching recovery plan in a background task. The
//! polling loop never waits on a recovery and never stops because one
//! failed: failover errors go to a channel that a logging task drains.

use crate::engine::{DisasterRecoveryEngine, RecoveryOptions};
use crate::metrics::{FAILOVER_TRIGGERED, HEALTH_STATUS};
use crate::plan::catalog::DATABASE_SERVICE;
use crate::providers::{HealthMonitor, HealthReport, ServiceState};
use crate::types::{DisasterType, RecoveryStatus};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Map a down report to a disaster type.
///
/// Every monitored service down means the datacenter is gone, even when
/// the database is among them. A down database on its own is a database
/// failure. Anything else falls back to an application failure.
pub fn classify_disaster(report: &HealthReport) -> DisasterType {
    let all_down = !report.services.is_empty()
        && report
            .services
            .values()
            .all(|s| s.status == ServiceState::Down);
    if all_down {
        DisasterType::DatacenterFailure
    } else if report.service_state(DATABASE_SERVICE) == Some(ServiceState::Down) {
        DisasterType::DatabaseFailure
    } else {
        DisasterType::ApplicationFailure
    }
}

/// A triggered recovery that did not succeed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailoverError {
    pub disaster_type: DisasterType,
    pub message: String,
}

/// What a single watchdog tick did
#[derive(Debug)]
pub enum TickOutcome {
    /// The health monitor could not be polled
    MonitorUnavailable(String),
    Observed(ServiceState),
    FailoverTriggered {
        disaster_type: DisasterType,
        task: JoinHandle<()>,
    },
}

pub struct HealthWatchdog {
    engine: Arc<DisasterRecoveryEngine>,
    monitor: Arc<dyn HealthMonitor>,
    interval: Duration,
    automatic_failover: bool,
    error_tx: mpsc::UnboundedSender<FailoverError>,
    error_rx: Mutex<Option<mpsc::UnboundedReceiver<FailoverError>>>,
}

impl HealthWatchdog {
    pub fn new(engine: Arc<DisasterRecoveryEngine>, monitor: Arc<dyn HealthMonitor>) -> Self {
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        let config = engine.config();
        Self {
            interval: config.health_check_interval(),
            automatic_failover: config.automatic_failover,
            engine,
            monitor,
            error_tx,
            error_rx: Mutex::new(Some(error_rx)),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_automatic_failover(mut self, enabled: bool) -> Self {
        self.automatic_failover = enabled;
        self
    }

    pub fn engine(&self) -> &Arc<DisasterRecoveryEngine> {
        &self.engine
    }

    /// Take the failover error stream instead of letting `start` log it
    pub fn take_failover_errors(&self) -> Option<mpsc::UnboundedReceiver<FailoverError>> {
        self.error_rx.lock().take()
    }

    /// Run one poll
    pub async fn check_once(&self) -> TickOutcome {
        let report = match self.monitor.get_health_status().await {
            Ok(report) => report,
            Err(e) => {
                warn!("Health check failed: {}", e);
                return TickOutcome::MonitorUnavailable(e.to_string());
            }
        };

        let sink = self.engine.sink();
        sink.submit_metric(HEALTH_STATUS, report.status.as_gauge(), &[]);
        debug!(
            status = report.status.as_str(),
            services = report.services.len(),
            "Health tick"
        );

        match report.status {
            ServiceState::Down
                if self.automatic_failover && self.engine.is_recovery_in_progress() =>
            {
                debug!(
                    down = ?report.down_services(),
                    "System down, recovery already in progress"
                );
                TickOutcome::Observed(report.status)
            }
            ServiceState::Down if self.automatic_failover => {
                let disaster_type = classify_disaster(&report);
                warn!(
                    disaster_type = %disaster_type,
                    down = ?report.down_services(),
                    "System down, triggering automatic failover"
                );
                sink.submit_metric(
                    FAILOVER_TRIGGERED,
                    1.0,
                    &[("disaster_type", disaster_type.as_str())],
                );
                let task = self.spawn_failover(disaster_type);
                TickOutcome::FailoverTriggered {
                    disaster_type,
                    task,
                }
            }
            ServiceState::Down | ServiceState::Degraded => {
                if report.status == ServiceState::Down {
                    warn!(
                        down = ?report.down_services(),
                        "System down, automatic failover disabled"
                    );
                }
                if self
                    .engine
                    .transition_status(RecoveryStatus::Healthy, RecoveryStatus::Degraded)
                {
                    info!("Recovery status degraded");
                }
                TickOutcome::Observed(report.status)
            }
            ServiceState::Healthy => {
                if self
                    .engine
                    .transition_status(RecoveryStatus::Degraded, RecoveryStatus::Healthy)
                {
                    info!("Recovery status back to healthy");
                }
                TickOutcome::Observed(report.status)
            }
        }
    }

    fn spawn_failover(&self, disaster_type: DisasterType) -> JoinHandle<()> {
        let engine = self.engine.clone();
        let errors = self.error_tx.clone();
        tokio::spawn(async move {
            let recovery = tokio::spawn({
                let engine = engine.clone();
                async move {
                    engine
                        .try_execute_recovery_plan(disaster_type, RecoveryOptions::new())
                        .await
                }
            });
            let message = match recovery.await {
                Ok(Ok(outcome)) if outcome.success => {
                    info!(disaster_type = %disaster_type, "Automatic failover completed");
                    return;
                }
                Ok(Ok(outcome)) => outcome.message,
                Ok(Err(e)) => e.to_string(),
                Err(e) => {
                    let (from, to) = (RecoveryStatus::Recovering, RecoveryStatus::Failed);
                    if engine.transition_status(from, to) {
                        warn!(disaster_type = %disaster_type, "Recovery status forced to failed");
                    }
                    format!("recovery task panicked: {}", e)
                }
            };
            // Receiver gone means nobody is listening; nothing else to do.
            let _ = errors.send(FailoverError {
                disaster_type,
                message,
            });
        })
    }

    /// Start the polling loop and the failover error logger
    pub fn start(self: Arc<Self>) -> WatchdogHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let error_logger = self.take_failover_errors().map(|mut rx| {
            tokio::spawn(async move {
                while let Some(failure) = rx.recv().await {
                    error!(
                        disaster_type = %failure.disaster_type,
                        "Automatic failover failed: {}", failure.message
                    );
                }
            })
        });

        info!(
            interval_ms = self.interval.as_millis() as u64,
            automatic_failover = self.automatic_failover,
            "Starting health watchdog"
        );

        let watchdog = self.clone();
        let poller = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(watchdog.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        watchdog.check_once().await;
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Health watchdog stopped");
                        break;
                    }
                }
            }
        });

        WatchdogHandle {
            shutdown_tx,
            poller,
            error_logger,
        }
    }
}

/// Running watchdog. Dropping it leaves the loop running.
pub struct WatchdogHandle {
    shutdown_tx: mpsc::Sender<()>,
    poller: JoinHandle<()>,
    error_logger: Option<JoinHandle<()>>,
}

impl WatchdogHandle {
    pub fn is_running(&self) -> bool {
        !self.poller.is_finished()
    }

    /// Stop polling and wait for the loop to exit. In-flight recoveries
    /// are not cancelled.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.poller.await {
            error!("Health watchdog task failed: {}", e);
        }
        if let Some(logger) = self.error_logger {
            logger.abort();
        }
    }
}

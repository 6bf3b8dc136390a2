//! SA reconciliation loop.
//!
//! # Responsibilities
//! - Wait for the daemon to come up, then check SAs at a fixed interval
//! - Compare the daemon's SAs against every other host in the cluster
//! - Initiate the CHILD_SA for each host without a live SA
//!
//! # Design Decisions
//! - Level-triggered: each tick recomputes expected vs actual from scratch
//! - Nothing is reconciled while the owning service is not active
//! - The daemon session is opened per tick and dropped at its end
//! - One host's initiate failure never stops the others; failures are
//!   returned in the tick report

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::MonitorConfig;
use crate::metadata::{Host, MetadataSource};
use crate::monitor::daemon::DaemonConnector;
use crate::observability::metrics;
use crate::resilience::{retry, RetryPolicy};

/// Why a tick did not reconcile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Metadata(String),
    ServiceInactive(String),
    DaemonUnavailable(String),
    ListFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiateFailure {
    pub host: String,
    pub child: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Hosts other than self.
    pub expected: usize,
    /// Expected hosts with a live SA.
    pub found: usize,
    /// CHILD_SAs initiated successfully.
    pub initiated: Vec<String>,
    pub failures: Vec<InitiateFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Skipped(SkipReason),
    Reconciled(ReconcileReport),
}

impl TickOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            TickOutcome::Skipped(SkipReason::ServiceInactive(_)) => "inactive",
            TickOutcome::Skipped(SkipReason::DaemonUnavailable(_)) => "daemon_unavailable",
            TickOutcome::Skipped(_) => "error",
            TickOutcome::Reconciled(report) if report.failures.is_empty() => "reconciled",
            TickOutcome::Reconciled(_) => "partial",
        }
    }
}

/// The CHILD_SA name used for the tunnel to `host_ip`.
pub fn child_sa_name(host_ip: &str) -> String {
    format!("child-{host_ip}")
}

/// Every host except self, keyed by agent IP, all not yet found.
pub fn expected_hosts(hosts: &[Host], self_host: &Host) -> BTreeMap<String, bool> {
    hosts
        .iter()
        .filter(|h| h.uuid != self_host.uuid)
        .map(|h| (h.agent_ip.clone(), false))
        .collect()
}

pub struct SaMonitor {
    metadata: Arc<dyn MetadataSource>,
    daemon: Arc<dyn DaemonConnector>,
    config: MonitorConfig,
}

impl SaMonitor {
    pub fn new(metadata: Arc<dyn MetadataSource>, daemon: Arc<dyn DaemonConnector>, config: MonitorConfig) -> Self {
        Self {
            metadata,
            daemon,
            config,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("SA monitor disabled");
            return;
        }

        tracing::info!(delay = ?self.config.start_delay(), "SA monitor sleeping before first check");
        tokio::select! {
            _ = time::sleep(self.config.start_delay()) => {}
            _ = shutdown.recv() => {
                tracing::info!("SA monitor received shutdown signal before start");
                return;
            }
        }

        tracing::info!(interval = ?self.config.interval(), "SA monitor started");
        loop {
            tokio::select! {
                _ = time::sleep(self.config.interval()) => {
                    self.tick().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("SA monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// One reconciliation pass.
    pub async fn tick(&self) -> TickOutcome {
        let outcome = self.reconcile().await;
        match &outcome {
            TickOutcome::Skipped(reason) => tracing::debug!(reason = ?reason, "SA check skipped"),
            TickOutcome::Reconciled(report) => tracing::debug!(
                expected = report.expected,
                found = report.found,
                initiated = report.initiated.len(),
                failed = report.failures.len(),
                "SA check complete"
            ),
        }
        metrics::record_tick(outcome.label());
        outcome
    }

    async fn reconcile(&self) -> TickOutcome {
        let self_service = match self.metadata.get_self_service().await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Error fetching self service");
                return TickOutcome::Skipped(SkipReason::Metadata(e.to_string()));
            }
        };
        if !self_service.is_active() {
            tracing::info!(state = %self_service.state, "Skipping SA check, service is not active");
            return TickOutcome::Skipped(SkipReason::ServiceInactive(self_service.state));
        }

        let hosts = match self.metadata.get_hosts().await {
            Ok(h) => h,
            Err(e) => {
                tracing::error!(error = %e, "Error fetching hosts");
                return TickOutcome::Skipped(SkipReason::Metadata(e.to_string()));
            }
        };
        let self_host = match self.metadata.get_self_host().await {
            Ok(h) => h,
            Err(e) => {
                tracing::error!(error = %e, "Error fetching self host");
                return TickOutcome::Skipped(SkipReason::Metadata(e.to_string()));
            }
        };

        let mut expected = expected_hosts(&hosts, &self_host);
        tracing::debug!(hosts = ?expected.keys().collect::<Vec<_>>(), "Expected SA peers");

        let policy = RetryPolicy::new(self.config.connect_attempts, self.config.connect_retry_delay());
        let mut session = match retry(policy, "daemon connect", || self.daemon.connect()).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Error connecting to tunnel daemon");
                return TickOutcome::Skipped(SkipReason::DaemonUnavailable(e.to_string()));
            }
        };

        let sas = match session.list_sas().await {
            Ok(sas) => sas,
            Err(e) => {
                tracing::error!(error = %e, "Error listing SAs");
                return TickOutcome::Skipped(SkipReason::ListFailed(e.to_string()));
            }
        };
        for sa in &sas {
            tracing::debug!(name = %sa.name, remote = %sa.remote_host, state = %sa.state, "Live SA");
            if let Some(found) = expected.get_mut(&sa.remote_host) {
                *found = true;
            }
        }

        let mut report = ReconcileReport {
            expected: expected.len(),
            found: expected.values().filter(|found| **found).count(),
            ..ReconcileReport::default()
        };

        for host in expected.iter().filter(|(_, found)| !**found).map(|(host, _)| host) {
            let child = child_sa_name(host);
            tracing::info!(host = %host, "Expected SA for host, but not found");
            match session.initiate(&child).await {
                Ok(()) => {
                    metrics::record_sa_initiate(true);
                    report.initiated.push(child);
                }
                Err(e) => {
                    tracing::error!(child = %child, error = %e, "Error initiating missing SA");
                    metrics::record_sa_initiate(false);
                    report.failures.push(InitiateFailure {
                        host: host.clone(),
                        child,
                        error: e.to_string(),
                    });
                }
            }
        }

        TickOutcome::Reconciled(report)
    }
}

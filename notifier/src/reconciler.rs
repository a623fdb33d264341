use crate::fanout::{Delivery, FanoutEngine};
use crate::metrics_defs::{RECONCILE_FAILED, RECONCILE_UNCHANGED, RECONCILE_UPDATED, SWEEP_DURATION};
use serde::Deserialize;
use shared::{counter, histogram};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{AcquireError, Semaphore, SemaphorePermit, mpsc, oneshot};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracker::{LedgerError, Project, ProjectRegistry, RegistryError, UpdateDecision};

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Seconds between two scheduled sweeps.
    pub interval_secs: u64,
    /// Projects reconciled at the same time during a sweep.
    pub max_concurrent: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        ReconcilerConfig {
            interval_secs: 600,
            max_concurrent: 8,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ReconcileError {
    #[error("project {0} is not cached")]
    UnknownProject(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("sweep lock closed")]
    SweepLockClosed(#[from] AcquireError),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ReconcileOutcome {
    Updated {
        version_id: String,
        deliveries: Vec<Delivery>,
    },
    NoChange,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub projects: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

#[derive(Debug)]
pub enum Command {
    // Run a sweep now instead of waiting for the next interval.
    // The worker replies once the sweep finishes.
    Sweep(oneshot::Sender<Result<SweepSummary, ReconcileError>>),
    // Stop the worker after the current sweep.
    Shutdown,
}

struct ReconcilerInner {
    registry: ProjectRegistry,
    fanout: FanoutEngine,
    config: ReconcilerConfig,
    sweep_lock: Semaphore,
    // Set once the worker has started. Used by the readiness probe.
    ready: AtomicBool,
}

/// Pulls the latest upstream state of cached projects and fans out every new version.
#[derive(Clone)]
pub struct Reconciler {
    inner: Arc<ReconcilerInner>,
}

impl Reconciler {
    pub fn new(registry: ProjectRegistry, fanout: FanoutEngine, config: ReconcilerConfig) -> Self {
        Reconciler {
            inner: Arc::new(ReconcilerInner {
                registry,
                fanout,
                config,
                sweep_lock: Semaphore::new(1),
                ready: AtomicBool::new(false),
            }),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::Relaxed)
    }

    pub async fn reconcile_project(
        &self,
        project_id: &str,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let project = self
            .inner
            .registry
            .get(project_id)
            .await?
            .ok_or_else(|| ReconcileError::UnknownProject(project_id.to_string()))?;
        self.reconcile(project).await
    }

    async fn reconcile(&self, project: Project) -> Result<ReconcileOutcome, ReconcileError> {
        let platform = project.platform;
        let latest = self
            .inner
            .registry
            .platforms()
            .fetch_latest_version(platform, &project.id)
            .await
            .map_err(RegistryError::from)?;

        match self.inner.registry.reconcile(&project, latest).await? {
            UpdateDecision::NoChange => {
                counter!(RECONCILE_UNCHANGED, "platform" => platform.as_str()).increment(1);
                Ok(ReconcileOutcome::NoChange)
            }
            UpdateDecision::Updated { project, version } => {
                counter!(RECONCILE_UPDATED, "platform" => platform.as_str()).increment(1);
                let deliveries = self.inner.fanout.notify(&project, &version).await?;
                Ok(ReconcileOutcome::Updated {
                    version_id: version.id,
                    deliveries,
                })
            }
        }
    }

    /// Reconciles every cached project. Projects are independent: one failing or hanging
    /// does not stop the others. Sweeps never overlap.
    pub async fn reconcile_all(&self) -> Result<SweepSummary, ReconcileError> {
        let _permit = self.get_permit().await?;
        let started = Instant::now();

        let projects = self.inner.registry.all().await?;
        let mut summary = SweepSummary {
            projects: projects.len(),
            ..SweepSummary::default()
        };

        let limit = Arc::new(Semaphore::new(self.inner.config.max_concurrent.max(1)));
        let mut join_set = JoinSet::new();
        for project in projects {
            let reconciler = self.clone();
            let limit = limit.clone();
            join_set.spawn(async move {
                let _slot = limit.acquire_owned().await;
                let project_id = project.id.clone();
                let platform = project.platform;
                let result = reconciler.reconcile(project).await;
                (project_id, platform, result)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((_, _, Ok(ReconcileOutcome::Updated { .. }))) => summary.updated += 1,
                Ok((_, _, Ok(ReconcileOutcome::NoChange))) => summary.unchanged += 1,
                Ok((project_id, platform, Err(e))) => {
                    summary.failed += 1;
                    counter!(RECONCILE_FAILED, "platform" => platform.as_str()).increment(1);
                    match &e {
                        ReconcileError::Registry(RegistryError::Unavailable(_)) => {
                            tracing::warn!(%project_id, %platform, "Upstream unavailable: {e}")
                        }
                        _ => tracing::error!(%project_id, %platform, "Reconciliation failed: {e}"),
                    }
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!("Task panicked: {}", e);
                }
            }
        }

        let elapsed = started.elapsed();
        histogram!(SWEEP_DURATION).record(elapsed.as_secs_f64());
        tracing::info!(
            projects = summary.projects,
            updated = summary.updated,
            unchanged = summary.unchanged,
            failed = summary.failed,
            elapsed_ms = elapsed.as_millis() as u64,
            "Finished sweep"
        );
        Ok(summary)
    }

    /// Sweeps on start, then every `interval_secs` or on demand when the Sweep command is
    /// received. Runs until the Shutdown command is received or every sender is dropped.
    pub async fn start(&self, mut rx: mpsc::Receiver<Command>) {
        self.inner.ready.store(true, Ordering::Relaxed);

        let mut interval =
            tokio::time::interval(Duration::from_secs(self.inner.config.interval_secs.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.reconcile_all().await {
                        tracing::error!("Scheduled sweep failed: {e}");
                    }
                }
                cmd = rx.recv() => {
                    match cmd {
                        Some(Command::Sweep(reply)) => {
                            let result = self.reconcile_all().await;
                            if reply.send(result).is_err() {
                                tracing::debug!("Sweep requester went away");
                            }
                        }
                        Some(Command::Shutdown) | None => {
                            tracing::info!("Reconciler shutting down");
                            break;
                        }
                    }
                }
            }
        }

        self.inner.ready.store(false, Ordering::Relaxed);
    }

    /// Guard that ensures only one sweep is in progress at a time.
    async fn get_permit(&self) -> Result<SemaphorePermit<'_>, AcquireError> {
        self.inner.sweep_lock.acquire().await
    }
}

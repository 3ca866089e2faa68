//! Background completion monitor for ephemeral exec-job work units.
//!
//! One supervised task per submitted bundle watches the embedded batch Job's
//! feedback values and deletes the work unit once it succeeds, fails, or the
//! overall deadline passes. The registry keeps a cancellation token and the
//! join handles so shutdown can drain every in-flight monitor instead of
//! orphaning them.

use crate::crds::ManifestWork;
use crate::work::WorkStore;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const POLL_INTERVAL: Duration = Duration::from_secs(30);
const MONITOR_DEADLINE: Duration = Duration::from_secs(600);

/// Succeeded/failed pod counts reported for the embedded batch Job.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct JobFeedback {
    pub succeeded: i64,
    pub failed: i64,
}

/// Extract the embedded batch Job's feedback from a work unit's status.
/// `None` until the agent has reported status for a batch/jobs manifest.
pub fn job_feedback(work: &ManifestWork) -> Option<JobFeedback> {
    let status = work.status.as_ref()?;
    let manifest = status
        .resource_status
        .manifests
        .iter()
        .find(|m| m.resource_meta.group == "batch" && m.resource_meta.resource == "jobs")?;

    let mut feedback = JobFeedback::default();
    for value in &manifest.status_feedbacks.values {
        match value.name.as_str() {
            "JobSucceeded" => feedback.succeeded = value.value.integer.unwrap_or(0),
            "JobFailed" => feedback.failed = value.value.integer.unwrap_or(0),
            _ => {}
        }
    }
    Some(feedback)
}

/// Owns every in-flight completion monitor.
pub struct MonitorRegistry {
    token: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Default for MonitorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorRegistry {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Launch a monitor for one work unit. The task is detached from the
    /// caller but supervised by this registry.
    pub fn spawn(&self, store: Arc<dyn WorkStore>, cluster: String, name: String) {
        let token = self.token.child_token();
        let handle = tokio::spawn(async move {
            monitor_work_unit(store.as_ref(), &cluster, &name, token).await;
        });
        self.tasks.lock().unwrap().push(handle);
    }

    /// Cancel and drain every monitor; called during graceful termination.
    pub async fn shutdown(&self) {
        self.token.cancel();
        let handles = std::mem::take(&mut *self.tasks.lock().unwrap());
        for handle in handles {
            if let Err(e) = handle.await {
                error!("monitor task panicked during shutdown: {e}");
            }
        }
    }
}

/// Poll one work unit until its embedded Job finishes or the deadline
/// passes, then delete it. Deletion failures are logged, never retried.
pub(crate) async fn monitor_work_unit(
    store: &dyn WorkStore,
    cluster: &str,
    name: &str,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    let deadline = tokio::time::sleep(MONITOR_DEADLINE);
    tokio::pin!(deadline);

    // interval fires immediately on the first tick; swallow it so the first
    // status read happens one full interval after submission
    ticker.tick().await;

    loop {
        tokio::select! {
            () = token.cancelled() => {
                info!("monitor for {cluster}/{name} cancelled");
                return;
            }
            () = &mut deadline => {
                warn!("timeout reached while waiting for work unit {cluster}/{name} to complete");
                delete_work_unit(store, cluster, name).await;
                return;
            }
            _ = ticker.tick() => {
                let work = match store.get(cluster, name).await {
                    Ok(work) => work,
                    Err(e) => {
                        warn!("error retrieving work unit {cluster}/{name}: {e}");
                        continue;
                    }
                };
                match job_feedback(&work) {
                    Some(feedback) if feedback.succeeded > 0 => {
                        info!("work unit {cluster}/{name} succeeded");
                        delete_work_unit(store, cluster, name).await;
                        return;
                    }
                    Some(feedback) if feedback.failed > 0 => {
                        warn!("work unit {cluster}/{name} failed");
                        delete_work_unit(store, cluster, name).await;
                        return;
                    }
                    _ => {
                        info!("work unit {cluster}/{name} is still running");
                    }
                }
            }
        }
    }
}

async fn delete_work_unit(store: &dyn WorkStore, cluster: &str, name: &str) {
    if let Err(e) = store.delete(cluster, name).await {
        error!("error deleting work unit {cluster}/{name}: {e}");
    }
}

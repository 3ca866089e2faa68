//! Top-level job execution: dispatch by job type and remediation subtype,
//! submit work units, wait for applied status and fold the result back into
//! the job's resource record.
//!
//! Error policy: every remote-call failure marks the job Degraded, appends a
//! Degraded condition and returns the error — the caller decides whether to
//! keep processing sibling jobs (the HTTP boundary always does).

use crate::crds::Condition;
use crate::jobs::manifests::{
    annotate_applied_manifests, generate_manifest_work, instruction_manifests, namespace_manifest,
    DecodedManifest,
};
use crate::jobs::monitor::MonitorRegistry;
use crate::jobs::poller::wait_for_applied;
use crate::jobs::secure::generate_secure_work;
use crate::jobs::state::update_job_resource;
use crate::jobs::types::{
    Error, Job, JobState, JobType, RemediationStatus, RemediationType, Result,
};
use crate::jobs::mutators;
use crate::work::WorkStore;
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// How long a create waits for the work agent to report a first condition
const CREATE_POLL_DEADLINE: Duration = Duration::from_secs(5);

pub struct Dispatcher {
    store: Arc<dyn WorkStore>,
    monitors: Arc<MonitorRegistry>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn WorkStore>, monitors: Arc<MonitorRegistry>) -> Self {
        Self { store, monitors }
    }

    /// Execute one job against its target cluster, mutating it in place.
    /// On failure the job carries its Degraded state and the error describes
    /// the cause; an unsupported job type leaves the job untouched.
    #[instrument(skip(self, job), fields(job_id = %job.id, job_type = %job.job_type))]
    pub async fn execute(&self, job: &mut Job) -> Result<()> {
        info!("executing job");
        match job.job_type {
            JobType::CreateDeployment => self.create_deployment(job).await,
            JobType::UpdateDeployment => self.update_deployment(job).await,
            JobType::DeleteDeployment => self.delete_deployment(job).await,
            other => Err(Error::UnsupportedJobType(other.to_string())),
        }
    }

    async fn create_deployment(&self, job: &mut Job) -> Result<()> {
        validate_target(job)?;
        let cluster = job.target.cluster_name.clone();

        let work = generate_manifest_work(job)?;
        let created = match self.store.create(&cluster, work).await {
            Ok(created) => created,
            Err(e) => return Err(self.degrade(job, "error creating work unit", e)),
        };

        let name = created.name_any();
        if created.uid().is_none() {
            // Nothing to track yet; leave the promoted resource record as-is
            warn!("created work unit {name} has no UID, skipping status poll");
            return Ok(());
        }

        let applied =
            match wait_for_applied(self.store.as_ref(), &cluster, &name, CREATE_POLL_DEADLINE)
                .await
            {
                Ok(applied) => applied,
                Err(e) => return Err(self.degrade(job, "error obtaining applied status", e)),
            };
        update_job_resource(job, Some(&applied));

        // Second pass: stamp the work UID onto every non-Namespace manifest
        // and push the fully annotated set back
        let annotated = annotate_applied_manifests(&applied);
        let patched = match self.store.patch_manifests(&cluster, &name, annotated).await {
            Ok(patched) => patched,
            Err(e) => return Err(self.degrade(job, "error patching work unit", e)),
        };
        update_job_resource(job, Some(&patched));
        Ok(())
    }

    async fn update_deployment(&self, job: &mut Job) -> Result<()> {
        match job.sub_type {
            Some(
                sub @ (RemediationType::ScaleUp
                | RemediationType::ScaleDown
                | RemediationType::ScaleOut
                | RemediationType::ScaleIn),
            ) => self.scale_deployment(job, sub).await,
            Some(RemediationType::Reallocate) => self.delete_deployment(job).await,
            Some(RemediationType::Patch) => self.patch_deployment(job).await,
            Some(RemediationType::Replace) => self.replace_deployment(job).await,
            Some(RemediationType::Secure) => self.secure_deployment(job).await,
            other => {
                let err = Error::UnsupportedSubType(other);
                Err(self.degrade(job, "job sub type does not exist", err))
            }
        }
    }

    async fn delete_deployment(&self, job: &mut Job) -> Result<()> {
        let (cluster, name) = resource_coordinates(job)?;
        info!("deleting work unit {name} for job {}", job.id);

        if let Err(e) = self.store.delete(&cluster, &name).await {
            return Err(self.degrade(job, "error deleting work unit", e));
        }

        update_job_resource(job, None);
        info!("successfully deleted work unit for job {}", job.id);
        Ok(())
    }

    /// Stateful remediation: fetch the live manifest list, run every
    /// manifest through the matching mutator and patch the result back.
    async fn scale_deployment(&self, job: &mut Job, sub_type: RemediationType) -> Result<()> {
        let (cluster, name) = resource_coordinates(job)?;

        let work = match self.store.get(&cluster, &name).await {
            Ok(work) => work,
            Err(e) => return Err(self.degrade(job, "error obtaining work unit", e)),
        };

        let mut updated = Vec::with_capacity(work.spec.workload.manifests.len());
        for manifest in &work.spec.workload.manifests {
            let mut decoded = match DecodedManifest::from_value(manifest.clone()) {
                Ok(decoded) => decoded,
                Err(e) => {
                    warn!("skipping undecodable manifest during {sub_type:?}: {e}");
                    updated.push(manifest.clone());
                    continue;
                }
            };
            let changed = mutators::apply(&mut decoded, sub_type)?;
            if changed {
                updated.push(decoded.into_value()?);
            } else {
                updated.push(manifest.clone());
            }
        }

        let patched = match self.store.patch_manifests(&cluster, &name, updated).await {
            Ok(patched) => patched,
            Err(e) => return Err(self.degrade(job, "error patching work unit", e)),
        };
        update_job_resource(job, Some(&patched));
        Ok(())
    }

    /// Regenerate the namespace and instruction manifests with current
    /// annotations and merge-patch them onto the existing work unit.
    async fn patch_deployment(&self, job: &mut Job) -> Result<()> {
        let (cluster, name) = resource_coordinates(job)?;

        if let Err(e) = self.store.get(&cluster, &name).await {
            return Err(self.degrade(job, "error obtaining work unit", e));
        }

        let mut manifests = match namespace_manifest(&job.namespace) {
            Ok(manifest) => vec![manifest],
            Err(e) => return Err(self.degrade(job, "error generating namespace manifest", e)),
        };
        manifests.extend(instruction_manifests(job));

        let patched = match self.store.patch_manifests(&cluster, &name, manifests).await {
            Ok(patched) => patched,
            Err(e) => return Err(self.degrade(job, "error patching work unit", e)),
        };
        update_job_resource(job, Some(&patched));
        Ok(())
    }

    /// Blue/green swap: overwrite the live manifest list with the freshly
    /// decoded instruction contents and replace the whole work unit.
    async fn replace_deployment(&self, job: &mut Job) -> Result<()> {
        let (cluster, name) = resource_coordinates(job)?;
        info!("replacing work unit {name} for job {}", job.id);

        let mut work = match self.store.get(&cluster, &name).await {
            Ok(work) => work,
            Err(e) => return Err(self.degrade(job, "error obtaining work unit", e)),
        };

        work.spec.workload.manifests = instruction_manifests(job);

        let updated = match self.store.update(&cluster, &work).await {
            Ok(updated) => updated,
            Err(e) => return Err(self.degrade(job, "error updating work unit", e)),
        };
        update_job_resource(job, Some(&updated));
        Ok(())
    }

    /// Submit the ephemeral exec-job bundle and hand it to the completion
    /// monitor. The synchronous path does not wait for the job to finish.
    async fn secure_deployment(&self, job: &mut Job) -> Result<()> {
        validate_target(job)?;
        let cluster = job.target.cluster_name.clone();

        let (work, exec_job_name) = match generate_secure_work(job) {
            Ok(generated) => generated,
            Err(e) => {
                set_last_remediation_status(job, RemediationStatus::Failed);
                return Err(self.degrade(job, "error generating exec-job bundle", e));
            }
        };

        let created = match self.store.create(&cluster, work).await {
            Ok(created) => created,
            Err(e) => {
                set_last_remediation_status(job, RemediationStatus::Failed);
                return Err(self.degrade(job, "error creating work unit", e));
            }
        };

        info!(
            "submitted exec-job bundle {} (embedded job {exec_job_name})",
            created.name_any()
        );
        self.monitors
            .spawn(self.store.clone(), cluster, created.name_any());

        set_last_remediation_status(job, RemediationStatus::Applied);
        Ok(())
    }

    /// Mark the job Degraded, record a Degraded condition and pass the
    /// error back to the caller.
    fn degrade(&self, job: &mut Job, context: &str, err: Error) -> Error {
        error!(job_id = %job.id, "{context}: {err}");
        job.state = JobState::Degraded;
        if let Some(resource) = job.resource.as_mut() {
            resource.conditions.push(Condition::now(
                "Degraded",
                "True",
                "ExecutionError",
                &format!("{context}: {err}"),
            ));
        }
        err
    }
}

/// Input validation: these run before any remote call.
fn validate_target(job: &Job) -> Result<()> {
    if job.target.cluster_name.is_empty() {
        return Err(Error::InvalidJob("job has no target cluster".to_string()));
    }
    Ok(())
}

fn resource_coordinates(job: &Job) -> Result<(String, String)> {
    validate_target(job)?;
    let name = job
        .resource
        .as_ref()
        .map(|r| r.resource_name.clone())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| Error::InvalidJob("job has no tracked resource name".to_string()))?;
    Ok((job.target.cluster_name.clone(), name))
}

fn set_last_remediation_status(job: &mut Job, status: RemediationStatus) {
    if let Some(remediation) = job
        .resource
        .as_mut()
        .and_then(|resource| resource.remediations.last_mut())
    {
        remediation.status = status;
    }
}

//! Deterministic mapping from work-unit conditions to job states.
//!
//! Only the tail of the condition sequence matters: conditions are
//! append-only, so the last entry is the remote truth. The mapper never
//! fails; anything it does not recognize counts as still progressing.

use crate::crds::{Condition, ManifestWork};
use crate::jobs::types::{Job, JobState, Resource};
use kube::ResourceExt;

/// Map the latest condition to a job state. An empty sequence means the
/// agent has not reported yet, which is still progressing.
pub fn map_state(conditions: &[Condition]) -> JobState {
    let Some(last) = conditions.last() else {
        return JobState::Progressing;
    };
    match last.condition_type.as_str() {
        "Progressing" => JobState::Progressing,
        "Available" | "Applied" => JobState::Finished,
        "Degraded" => JobState::Degraded,
        _ => JobState::Progressing,
    }
}

/// Fold a fetched work unit back into the job's resource record: copy the
/// remote identifiers, append the reported conditions and derive the state.
/// `None` records a deletion instead.
pub fn update_job_resource(job: &mut Job, work: Option<&ManifestWork>) {
    let resource = job.resource.get_or_insert_with(Resource::default);
    match work {
        Some(work) => {
            let conditions = work
                .status
                .as_ref()
                .map(|status| status.conditions.as_slice())
                .unwrap_or_default();
            job.state = map_state(conditions);
            resource.resource_uid = work.uid().unwrap_or_default();
            resource.resource_name = work.name_any();
            resource.conditions.extend_from_slice(conditions);
        }
        None => {
            resource.resource_name = String::new();
            resource.conditions.push(Condition::now(
                "Deleted",
                "True",
                "Deleted",
                "Resource has been deleted",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::ManifestWorkStatus;
    use crate::jobs::types::{JobType, Target};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn condition(condition_type: &str) -> Condition {
        Condition::now(condition_type, "True", condition_type, "")
    }

    fn job_with_resource(name: &str) -> Job {
        Job {
            id: "job-1".to_string(),
            job_group_id: None,
            owner_id: None,
            job_type: JobType::CreateDeployment,
            sub_type: None,
            state: JobState::Created,
            target: Target::default(),
            instruction: None,
            resource: Some(Resource {
                resource_name: name.to_string(),
                ..Resource::default()
            }),
            namespace: String::new(),
        }
    }

    #[test]
    fn empty_sequence_is_progressing() {
        assert_eq!(map_state(&[]), JobState::Progressing);
    }

    #[test]
    fn maps_the_tail_not_the_best_entry() {
        let conditions = vec![condition("Available"), condition("Progressing")];
        assert_eq!(map_state(&conditions), JobState::Progressing);
    }

    #[test]
    fn applied_and_available_both_finish() {
        assert_eq!(map_state(&[condition("Applied")]), JobState::Finished);
        assert_eq!(map_state(&[condition("Available")]), JobState::Finished);
    }

    #[test]
    fn degraded_maps_to_degraded() {
        let conditions = vec![condition("Progressing"), condition("Degraded")];
        assert_eq!(map_state(&conditions), JobState::Degraded);
    }

    #[test]
    fn unknown_type_defaults_to_progressing() {
        assert_eq!(map_state(&[condition("Bizarre")]), JobState::Progressing);
    }

    #[test]
    fn folding_a_work_unit_copies_identity_and_appends() {
        let mut job = job_with_resource("old-name");
        let work = ManifestWork {
            metadata: ObjectMeta {
                name: Some("web-00001".to_string()),
                uid: Some("uid-00001".to_string()),
                ..ObjectMeta::default()
            },
            spec: Default::default(),
            status: Some(ManifestWorkStatus {
                conditions: vec![condition("Progressing"), condition("Available")],
                ..Default::default()
            }),
        };

        update_job_resource(&mut job, Some(&work));
        assert_eq!(job.state, JobState::Finished);
        let resource = job.resource.as_ref().unwrap();
        assert_eq!(resource.resource_name, "web-00001");
        assert_eq!(resource.resource_uid, "uid-00001");
        assert_eq!(resource.conditions.len(), 2);
    }

    #[test]
    fn recording_a_deletion_clears_the_name() {
        let mut job = job_with_resource("web-00001");
        update_job_resource(&mut job, None);
        let resource = job.resource.as_ref().unwrap();
        assert!(resource.resource_name.is_empty());
        assert_eq!(resource.conditions.last().unwrap().condition_type, "Deleted");
    }

    #[test]
    fn appending_conditions_never_regresses_on_its_own() {
        let mut conditions = vec![condition("Progressing")];
        assert_eq!(map_state(&conditions), JobState::Progressing);
        // Re-invoking without new remote truth yields the same answer
        assert_eq!(map_state(&conditions), JobState::Progressing);
        conditions.push(condition("Available"));
        assert_eq!(map_state(&conditions), JobState::Finished);
    }
}

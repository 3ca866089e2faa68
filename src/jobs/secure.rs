//! Ephemeral exec-job bundle for "secure" remediation actions.
//!
//! The bundle carries its own RBAC scaffolding: a ServiceAccount, a Role
//! allowing pod lookup and exec, a RoleBinding, and a batch Job that runs
//! `kubectl exec` against the remediation target. The embedded Job requests
//! well-known status feedback so the completion monitor can observe
//! succeeded/failed counts.

use crate::crds::{
    FeedbackRule, ManifestConfigOption, ManifestWork, ManifestWorkSpec, ManifestsTemplate,
    ResourceIdentifier, UpdateStrategy, FEEDBACK_WELL_KNOWN_STATUS,
    UPDATE_STRATEGY_SERVER_SIDE_APPLY,
};
use crate::jobs::manifests::render_yaml_manifest;
use crate::jobs::types::{Error, Job, RemediationTarget, Result};
use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::{json, Value};

const SERVICE_ACCOUNT_TEMPLATE: &str = "\
apiVersion: v1
kind: ServiceAccount
metadata:
  name: {{name}}
  namespace: {{namespace}}
";

const ROLE_TEMPLATE: &str = "\
apiVersion: rbac.authorization.k8s.io/v1
kind: Role
metadata:
  name: {{name}}
  namespace: {{namespace}}
rules:
- apiGroups: [\"\"]
  resources: [\"pods\"]
  verbs: [\"get\", \"list\"]
- apiGroups: [\"\"]
  resources: [\"pods/exec\"]
  verbs: [\"create\", \"get\"]
";

const ROLE_BINDING_TEMPLATE: &str = "\
apiVersion: rbac.authorization.k8s.io/v1
kind: RoleBinding
metadata:
  name: {{name}}
  namespace: {{namespace}}
subjects:
- kind: ServiceAccount
  name: {{service_account}}
  namespace: {{namespace}}
roleRef:
  kind: Role
  name: {{role}}
  apiGroup: rbac.authorization.k8s.io
";

const EXEC_JOB_TEMPLATE: &str = "\
apiVersion: batch/v1
kind: Job
metadata:
  name: {{name}}
  namespace: {{namespace}}
spec:
  backoffLimit: 4
  template:
    spec:
      serviceAccountName: {{service_account}}
      containers:
      - name: kubectl
        image: bitnami/kubectl:latest
      restartPolicy: Never
";

/// Build the four-manifest bundle for the most recently appended
/// remediation. Returns the work unit and the embedded Job's name.
pub fn generate_secure_work(job: &Job) -> Result<(ManifestWork, String)> {
    let resource = job
        .resource
        .as_ref()
        .ok_or_else(|| Error::InvalidJob("job has no resource record".to_string()))?;
    let remediation = resource.remediations.last().ok_or(Error::NoRemediations)?;
    let target = remediation
        .target
        .as_ref()
        .ok_or_else(|| Error::InvalidJob("remediation has no target".to_string()))?;

    let namespace = &job.namespace;
    let resource_name = &resource.resource_name;
    let job_name = format!("{resource_name}-job-{}", Utc::now().timestamp());
    let sa_name = format!("{resource_name}-job-sa");
    let role_name = format!("{resource_name}-job-role");
    let role_binding_name = format!("{resource_name}-job-rolebinding");

    let service_account = render_yaml_manifest(
        "service_account",
        SERVICE_ACCOUNT_TEMPLATE,
        &json!({ "name": sa_name, "namespace": namespace }),
    )?;
    let role = render_yaml_manifest(
        "role",
        ROLE_TEMPLATE,
        &json!({ "name": role_name, "namespace": namespace }),
    )?;
    let role_binding = render_yaml_manifest(
        "role_binding",
        ROLE_BINDING_TEMPLATE,
        &json!({
            "name": role_binding_name,
            "namespace": namespace,
            "service_account": sa_name,
            "role": role_name,
        }),
    )?;
    let exec_job = exec_job_manifest(&job_name, namespace, &sa_name, target)?;

    let work = ManifestWork {
        metadata: ObjectMeta {
            generate_name: Some(format!("{resource_name}-job-")),
            namespace: Some(job.target.cluster_name.clone()),
            ..ObjectMeta::default()
        },
        spec: ManifestWorkSpec {
            workload: ManifestsTemplate {
                manifests: vec![service_account, role, role_binding, exec_job],
            },
            manifest_configs: vec![ManifestConfigOption {
                resource_identifier: ResourceIdentifier {
                    group: "batch".to_string(),
                    resource: "jobs".to_string(),
                    namespace: namespace.clone(),
                    name: job_name.clone(),
                },
                feedback_rules: vec![FeedbackRule {
                    rule_type: FEEDBACK_WELL_KNOWN_STATUS.to_string(),
                }],
                update_strategy: Some(UpdateStrategy {
                    strategy_type: UPDATE_STRATEGY_SERVER_SIDE_APPLY.to_string(),
                }),
            }],
        },
        status: None,
    };

    Ok((work, job_name))
}

/// Render the batch Job and splice in the exec command: the static
/// `kubectl exec <pod> -c <container> --` prefix followed by the shell-safe
/// tokens of the remediation command.
fn exec_job_manifest(
    job_name: &str,
    namespace: &str,
    sa_name: &str,
    target: &RemediationTarget,
) -> Result<Value> {
    let tokens = shlex::split(&target.command)
        .ok_or_else(|| Error::CommandParse(target.command.clone()))?;

    let mut manifest = render_yaml_manifest(
        "exec_job",
        EXEC_JOB_TEMPLATE,
        &json!({
            "name": job_name,
            "namespace": namespace,
            "service_account": sa_name,
        }),
    )?;

    let mut command = vec![
        "kubectl".to_string(),
        "exec".to_string(),
        target.pod.clone(),
        "-c".to_string(),
        target.container.clone(),
        "--".to_string(),
    ];
    command.extend(tokens);
    manifest["spec"]["template"]["spec"]["containers"][0]["command"] = json!(command);

    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::types::{
        JobState, JobType, Remediation, RemediationStatus, RemediationType, Resource, Target,
    };

    fn secure_job(command: &str) -> Job {
        Job {
            id: "job-1".to_string(),
            job_group_id: None,
            owner_id: None,
            job_type: JobType::UpdateDeployment,
            sub_type: Some(RemediationType::Secure),
            state: JobState::Created,
            target: Target {
                cluster_name: "cluster1".to_string(),
                node_name: None,
            },
            instruction: None,
            resource: Some(Resource {
                resource_name: "nginx".to_string(),
                remediations: vec![Remediation {
                    id: String::new(),
                    remediation_type: RemediationType::Secure,
                    status: RemediationStatus::Pending,
                    target: Some(RemediationTarget {
                        pod: "p1".to_string(),
                        container: "c1".to_string(),
                        command: command.to_string(),
                        ..RemediationTarget::default()
                    }),
                }],
                ..Resource::default()
            }),
            namespace: "team-a".to_string(),
        }
    }

    #[test]
    fn bundle_has_exactly_four_manifests_in_order() {
        let (work, job_name) = generate_secure_work(&secure_job("cat /etc/passwd")).unwrap();
        let manifests = &work.spec.workload.manifests;
        assert_eq!(manifests.len(), 4);
        assert_eq!(manifests[0]["kind"], "ServiceAccount");
        assert_eq!(manifests[1]["kind"], "Role");
        assert_eq!(manifests[2]["kind"], "RoleBinding");
        assert_eq!(manifests[3]["kind"], "Job");
        assert_eq!(manifests[3]["metadata"]["name"], job_name.as_str());
    }

    #[test]
    fn exec_command_ends_with_tokenized_target_command() {
        let (work, _) = generate_secure_work(&secure_job("cat /etc/passwd")).unwrap();
        let command: Vec<String> = serde_json::from_value(
            work.spec.workload.manifests[3]["spec"]["template"]["spec"]["containers"][0]["command"]
                .clone(),
        )
        .unwrap();
        assert_eq!(&command[..6], &["kubectl", "exec", "p1", "-c", "c1", "--"]);
        assert_eq!(&command[6..], &["cat", "/etc/passwd"]);
    }

    #[test]
    fn quoted_arguments_stay_single_tokens() {
        let (work, _) = generate_secure_work(&secure_job("sh -c 'echo hi there'")).unwrap();
        let command: Vec<String> = serde_json::from_value(
            work.spec.workload.manifests[3]["spec"]["template"]["spec"]["containers"][0]["command"]
                .clone(),
        )
        .unwrap();
        assert_eq!(&command[6..], &["sh", "-c", "echo hi there"]);
    }

    #[test]
    fn unparseable_command_is_an_error() {
        let err = generate_secure_work(&secure_job("cat \"unterminated")).unwrap_err();
        assert!(matches!(err, Error::CommandParse(_)));
    }

    #[test]
    fn feedback_rule_targets_the_embedded_job() {
        let (work, job_name) = generate_secure_work(&secure_job("ls")).unwrap();
        let config = &work.spec.manifest_configs[0];
        assert_eq!(config.resource_identifier.group, "batch");
        assert_eq!(config.resource_identifier.resource, "jobs");
        assert_eq!(config.resource_identifier.name, job_name);
        assert_eq!(
            config.feedback_rules[0].rule_type,
            FEEDBACK_WELL_KNOWN_STATUS
        );
    }

    #[test]
    fn no_remediations_is_an_error() {
        let mut job = secure_job("ls");
        job.resource.as_mut().unwrap().remediations.clear();
        assert!(matches!(
            generate_secure_work(&job).unwrap_err(),
            Error::NoRemediations
        ));
    }
}

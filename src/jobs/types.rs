//! Job data model shared with the upstream job-manager service.
//!
//! Field names mirror the job manager's wire format; the engine never invents
//! jobs, it only executes and annotates the ones it is handed.

use crate::crds::Condition;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A desired workload change against one target cluster.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Job {
    pub id: String,

    #[serde(default, rename = "job_group_id", skip_serializing_if = "Option::is_none")]
    pub job_group_id: Option<String>,

    #[serde(default, rename = "owner_id", skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,

    #[serde(rename = "type")]
    pub job_type: JobType,

    #[serde(default, rename = "sub_type", skip_serializing_if = "Option::is_none")]
    pub sub_type: Option<RemediationType>,

    pub state: JobState,

    /// Wire name is plural for historical reasons; exactly one target
    #[serde(rename = "targets")]
    pub target: Target,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<Instruction>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Resource>,

    #[serde(default)]
    pub namespace: String,
}

/// The desired manifests for a job: a named component plus ordered contents.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct Instruction {
    #[serde(default)]
    pub id: String,

    #[serde(default, rename = "componentName")]
    pub component_name: String,

    #[serde(default)]
    pub contents: Vec<Content>,
}

/// One raw resource definition inside an instruction.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct Content {
    #[serde(default)]
    pub id: u32,

    #[serde(default)]
    pub name: String,

    pub yaml: String,
}

/// The engine's live view of what was submitted for a job. `resource_name`
/// always names exactly one work unit in the target cluster's namespace; it
/// is the join key for every follow-up operation. Conditions are append-only.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct Resource {
    #[serde(default, rename = "resource_uuid")]
    pub resource_uid: String,

    #[serde(default, rename = "job_id")]
    pub job_id: String,

    #[serde(default, rename = "resource_name")]
    pub resource_name: String,

    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remediations: Vec<Remediation>,
}

/// Target cluster (namespace scope on the hub) and optional node.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct Target {
    #[serde(rename = "cluster_name")]
    pub cluster_name: String,

    #[serde(default, rename = "node_name", skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
}

/// A requested corrective action against an already-deployed resource.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Remediation {
    #[serde(default)]
    pub id: String,

    #[serde(rename = "remediationType")]
    pub remediation_type: RemediationType,

    #[serde(rename = "remediationStatus")]
    pub status: RemediationStatus,

    #[serde(
        default,
        rename = "remediationTarget",
        skip_serializing_if = "Option::is_none"
    )]
    pub target: Option<RemediationTarget>,
}

/// Pod/container/command a remediation acts on.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct RemediationTarget {
    #[serde(default)]
    pub container: String,

    #[serde(default, rename = "pod_uid")]
    pub pod_uid: String,

    #[serde(default)]
    pub pod: String,

    #[serde(default)]
    pub node: String,

    #[serde(default)]
    pub namespace: String,

    #[serde(default)]
    pub command: String,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobType {
    CreateDeployment,
    UpdateDeployment,
    DeleteDeployment,
    ReplaceDeployment,
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobType::CreateDeployment => "CreateDeployment",
            JobType::UpdateDeployment => "UpdateDeployment",
            JobType::DeleteDeployment => "DeleteDeployment",
            JobType::ReplaceDeployment => "ReplaceDeployment",
        };
        f.write_str(name)
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    Created,
    Progressing,
    Finished,
    Degraded,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemediationType {
    #[serde(rename = "scale-up")]
    ScaleUp,
    #[serde(rename = "scale-down")]
    ScaleDown,
    #[serde(rename = "scale-out")]
    ScaleOut,
    #[serde(rename = "scale-in")]
    ScaleIn,
    #[serde(rename = "patch")]
    Patch,
    #[serde(rename = "reallocate")]
    Reallocate,
    #[serde(rename = "replace")]
    Replace,
    #[serde(rename = "secure")]
    Secure,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemediationStatus {
    Pending,
    Applied,
    Failed,
}

/// Engine error taxonomy. Remote and timeout errors degrade the job they
/// belong to but never abort a batch; validation errors are rejected before
/// any remote call.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("job type not supported: {0}")]
    UnsupportedJobType(String),

    #[error("job sub type does not exist: {0:?}")]
    UnsupportedSubType(Option<RemediationType>),

    #[error("invalid job input: {0}")]
    InvalidJob(String),

    #[error("manifest error: {0}")]
    ManifestError(String),

    #[error("template error: {0}")]
    TemplateError(String),

    #[error("timed out waiting for applied work unit {name} in {namespace}")]
    PollTimeout { namespace: String, name: String },

    #[error("no remediations found on job resource")]
    NoRemediations,

    #[error("failed to parse remediation command: {0}")]
    CommandParse(String),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("job manager error: {0}")]
    JobManagerError(#[from] reqwest::Error),
}

impl Error {
    /// True when the underlying Kubernetes API call failed with 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::KubeError(kube::Error::Api(ae)) if ae.code == 404)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

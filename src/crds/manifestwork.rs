//! `ManifestWork` custom resource: a named bundle of manifests bound to one
//! managed cluster's namespace on the hub. The work agent applies the bundle
//! asynchronously and reports convergence through status conditions and
//! per-resource feedback values.

use chrono::Utc;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Spec of a `ManifestWork`: the workload to distribute plus optional
/// per-resource feedback configuration.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "work.open-cluster-management.io",
    version = "v1",
    kind = "ManifestWork"
)]
#[kube(namespaced)]
#[kube(status = "ManifestWorkStatus")]
pub struct ManifestWorkSpec {
    /// Manifests to apply on the managed cluster
    #[serde(default)]
    pub workload: ManifestsTemplate,

    /// Per-resource options (feedback rules, update strategy)
    #[serde(
        default,
        rename = "manifestConfigs",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub manifest_configs: Vec<ManifestConfigOption>,
}

/// Ordered list of raw resource manifests
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct ManifestsTemplate {
    #[serde(default)]
    pub manifests: Vec<Value>,
}

/// Feedback and update options for one embedded resource
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct ManifestConfigOption {
    #[serde(rename = "resourceIdentifier")]
    pub resource_identifier: ResourceIdentifier,

    #[serde(default, rename = "feedbackRules", skip_serializing_if = "Vec::is_empty")]
    pub feedback_rules: Vec<FeedbackRule>,

    #[serde(
        default,
        rename = "updateStrategy",
        skip_serializing_if = "Option::is_none"
    )]
    pub update_strategy: Option<UpdateStrategy>,
}

/// Identifies one resource inside the work bundle
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct ResourceIdentifier {
    #[serde(default)]
    pub group: String,
    pub resource: String,
    pub namespace: String,
    pub name: String,
}

/// Requests structured status feedback for a resource
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct FeedbackRule {
    #[serde(rename = "type")]
    pub rule_type: String,
}

/// Well-known feedback rule type: the agent reports the fields Kubernetes
/// itself considers significant for the resource kind (e.g. Job succeeded).
pub const FEEDBACK_WELL_KNOWN_STATUS: &str = "WellKnownStatus";

/// Update strategy for a resource inside the bundle
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct UpdateStrategy {
    #[serde(rename = "type")]
    pub strategy_type: String,
}

/// Server-side apply update strategy
pub const UPDATE_STRATEGY_SERVER_SIDE_APPLY: &str = "ServerSideApply";

/// Status reported by the work agent as the bundle converges
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct ManifestWorkStatus {
    /// Append-only history; the last entry is authoritative
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Per-manifest status, including requested feedback values
    #[serde(default, rename = "resourceStatus")]
    pub resource_status: ManifestResourceStatus,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct ManifestResourceStatus {
    #[serde(default)]
    pub manifests: Vec<ManifestCondition>,
}

/// Status of one manifest inside the bundle
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct ManifestCondition {
    #[serde(default, rename = "resourceMeta")]
    pub resource_meta: ManifestResourceMeta,

    #[serde(default, rename = "statusFeedbacks")]
    pub status_feedbacks: StatusFeedbackResult,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct ManifestResourceMeta {
    #[serde(default)]
    pub ordinal: i32,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct StatusFeedbackResult {
    #[serde(default)]
    pub values: Vec<FeedbackValue>,
}

/// A structured field the agent reports back for an embedded resource
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct FeedbackValue {
    pub name: String,
    #[serde(default)]
    pub value: FieldValue,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct FieldValue {
    #[serde(default, rename = "type")]
    pub value_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integer: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boolean: Option<bool>,
}

/// Timestamped status record (type, status, reason, message); mirrors the
/// Kubernetes meta/v1 condition shape on the wire.
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,

    /// True, False, or Unknown
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(
        default,
        rename = "observedGeneration",
        skip_serializing_if = "Option::is_none"
    )]
    pub observed_generation: Option<i64>,

    /// RFC3339 timestamp of the last transition
    #[serde(
        default,
        rename = "lastTransitionTime",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_transition_time: Option<String>,
}

impl Condition {
    /// Build a condition stamped with the current time.
    pub fn now(condition_type: &str, status: &str, reason: &str, message: &str) -> Self {
        Self {
            condition_type: condition_type.to_string(),
            status: status.to_string(),
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
            observed_generation: Some(0),
            last_transition_time: Some(Utc::now().to_rfc3339()),
        }
    }
}

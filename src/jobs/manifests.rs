//! Manifest generation and decoding.
//!
//! Instruction contents arrive as raw YAML. Each one is decoded into a
//! [`DecodedManifest`] — a typed variant for the kinds the engine understands
//! and an opaque JSON fallback for everything else — so namespace and
//! annotation mutation work uniformly without an exhaustive type switch.

use crate::crds::{Condition, ManifestWork, ManifestWorkSpec, ManifestsTemplate};
use crate::jobs::types::{Error, Job, Resource, Result};
use handlebars::Handlebars;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::Job as BatchJob;
use k8s_openapi::api::core::v1::{Namespace, ServiceAccount};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::warn;

/// Annotation tracking which component a manifest belongs to
pub const ANNOTATION_COMPONENT: &str = "app.cognifog.eu/component";
/// Annotation tracking the job-group instance
pub const ANNOTATION_INSTANCE: &str = "app.cognifog.eu/instance";
/// Annotation carrying the work unit UID, stamped after the first apply
pub const ANNOTATION_MANIFEST: &str = "jobmanager.cognifog.eu/manifest";

const NAMESPACE_TEMPLATE: &str = "\
apiVersion: v1
kind: Namespace
metadata:
  name: {{name}}
";

/// A decoded resource manifest with generic metadata access.
#[derive(Clone, Debug)]
pub enum DecodedManifest {
    Deployment(Box<Deployment>),
    StatefulSet(Box<StatefulSet>),
    BatchJob(Box<BatchJob>),
    ServiceAccount(Box<ServiceAccount>),
    Role(Box<Role>),
    RoleBinding(Box<RoleBinding>),
    Namespace(Box<Namespace>),
    /// Unrecognized kind, kept as raw JSON; metadata mutation still works
    Opaque(Value),
}

impl DecodedManifest {
    /// Decode a raw YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(yaml)?;
        Self::from_value(value)
    }

    /// Decode a manifest already held as JSON (e.g. read back from a
    /// submitted work unit).
    pub fn from_value(value: Value) -> Result<Self> {
        let kind = value
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::ManifestError("manifest has no kind".to_string()))?;

        let decoded = match kind {
            "Deployment" => Self::Deployment(Box::new(serde_json::from_value(value)?)),
            "StatefulSet" => Self::StatefulSet(Box::new(serde_json::from_value(value)?)),
            "Job" => Self::BatchJob(Box::new(serde_json::from_value(value)?)),
            "ServiceAccount" => Self::ServiceAccount(Box::new(serde_json::from_value(value)?)),
            "Role" => Self::Role(Box::new(serde_json::from_value(value)?)),
            "RoleBinding" => Self::RoleBinding(Box::new(serde_json::from_value(value)?)),
            "Namespace" => Self::Namespace(Box::new(serde_json::from_value(value)?)),
            _ => Self::Opaque(value),
        };
        Ok(decoded)
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::Deployment(_) => "Deployment",
            Self::StatefulSet(_) => "StatefulSet",
            Self::BatchJob(_) => "Job",
            Self::ServiceAccount(_) => "ServiceAccount",
            Self::Role(_) => "Role",
            Self::RoleBinding(_) => "RoleBinding",
            Self::Namespace(_) => "Namespace",
            Self::Opaque(value) => value.get("kind").and_then(Value::as_str).unwrap_or(""),
        }
    }

    pub fn set_namespace(&mut self, namespace: &str) {
        match self.meta_mut() {
            MetaMut::Typed(meta) => meta.namespace = Some(namespace.to_string()),
            MetaMut::Raw(value) => {
                ensure_object(value, "metadata")["namespace"] = json!(namespace);
            }
        }
    }

    pub fn set_annotation(&mut self, key: &str, value: &str) {
        match self.meta_mut() {
            MetaMut::Typed(meta) => {
                meta.annotations
                    .get_or_insert_with(BTreeMap::new)
                    .insert(key.to_string(), value.to_string());
            }
            MetaMut::Raw(raw) => {
                let metadata = ensure_object(raw, "metadata");
                ensure_object(metadata, "annotations")[key] = json!(value);
            }
        }
    }

    /// Re-encode into the raw JSON form carried inside a work unit.
    pub fn into_value(self) -> Result<Value> {
        let value = match self {
            Self::Deployment(obj) => serde_json::to_value(*obj)?,
            Self::StatefulSet(obj) => serde_json::to_value(*obj)?,
            Self::BatchJob(obj) => serde_json::to_value(*obj)?,
            Self::ServiceAccount(obj) => serde_json::to_value(*obj)?,
            Self::Role(obj) => serde_json::to_value(*obj)?,
            Self::RoleBinding(obj) => serde_json::to_value(*obj)?,
            Self::Namespace(obj) => serde_json::to_value(*obj)?,
            Self::Opaque(value) => value,
        };
        Ok(value)
    }

    fn meta_mut(&mut self) -> MetaMut<'_> {
        match self {
            Self::Deployment(obj) => MetaMut::Typed(&mut obj.metadata),
            Self::StatefulSet(obj) => MetaMut::Typed(&mut obj.metadata),
            Self::BatchJob(obj) => MetaMut::Typed(&mut obj.metadata),
            Self::ServiceAccount(obj) => MetaMut::Typed(&mut obj.metadata),
            Self::Role(obj) => MetaMut::Typed(&mut obj.metadata),
            Self::RoleBinding(obj) => MetaMut::Typed(&mut obj.metadata),
            Self::Namespace(obj) => MetaMut::Typed(&mut obj.metadata),
            Self::Opaque(value) => MetaMut::Raw(value),
        }
    }
}

enum MetaMut<'a> {
    Typed(&'a mut ObjectMeta),
    Raw(&'a mut Value),
}

fn ensure_object<'a>(value: &'a mut Value, key: &str) -> &'a mut Value {
    if !value.is_object() {
        *value = json!({});
    }
    let map = value.as_object_mut().unwrap();
    map.entry(key.to_string()).or_insert_with(|| json!({}));
    map.get_mut(key).unwrap()
}

/// Render a fixed YAML template into a raw manifest.
pub fn render_yaml_manifest(name: &str, template: &str, context: &Value) -> Result<Value> {
    let mut handlebars = Handlebars::new();
    handlebars.set_strict_mode(false);
    handlebars
        .register_template_string(name, template)
        .map_err(|e| Error::TemplateError(format!("failed to register {name} template: {e}")))?;
    let rendered = handlebars
        .render(name, context)
        .map_err(|e| Error::TemplateError(format!("failed to render {name} template: {e}")))?;
    Ok(serde_yaml::from_str(&rendered)?)
}

/// Namespace manifest for the job's application namespace.
pub fn namespace_manifest(namespace: &str) -> Result<Value> {
    render_yaml_manifest("namespace", NAMESPACE_TEMPLATE, &json!({ "name": namespace }))
}

/// Decode every instruction content, force the job namespace and stamp the
/// tracking annotations. Contents that fail to decode are skipped, never
/// replaced.
pub fn instruction_manifests(job: &Job) -> Vec<Value> {
    let component = job
        .resource
        .as_ref()
        .map(|r| r.resource_name.clone())
        .unwrap_or_default();
    let instance = job.job_group_id.clone().unwrap_or_default();

    let contents = job
        .instruction
        .as_ref()
        .map(|i| i.contents.as_slice())
        .unwrap_or_default();

    let mut manifests = Vec::with_capacity(contents.len());
    for content in contents {
        let mut decoded = match DecodedManifest::from_yaml(&content.yaml) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(job_id = %job.id, content = %content.name, "skipping undecodable manifest: {e}");
                continue;
            }
        };
        decoded.set_namespace(&job.namespace);
        decoded.set_annotation(ANNOTATION_COMPONENT, &component);
        decoded.set_annotation(ANNOTATION_INSTANCE, &instance);
        match decoded.into_value() {
            Ok(value) => manifests.push(value),
            Err(e) => {
                warn!(job_id = %job.id, content = %content.name, "skipping unencodable manifest: {e}");
            }
        }
    }
    manifests
}

/// Build the initial work unit for a create job: the namespace manifest
/// first, then one manifest per decodable instruction content. Also seeds the
/// job's resource record with a synthetic Progressing condition.
pub fn generate_manifest_work(job: &mut Job) -> Result<ManifestWork> {
    let instruction = job
        .instruction
        .as_ref()
        .ok_or_else(|| Error::InvalidJob("job has no instruction".to_string()))?;

    job.resource = Some(Resource {
        job_id: job.id.clone(),
        resource_name: instruction.component_name.clone(),
        conditions: vec![Condition::now(
            "Progressing",
            "True",
            "JobPromoted",
            "Job promoted for execution",
        )],
        ..Resource::default()
    });

    let mut manifests = vec![namespace_manifest(&job.namespace)?];
    manifests.extend(instruction_manifests(job));

    let resource_name = &job.resource.as_ref().unwrap().resource_name;
    Ok(ManifestWork {
        metadata: ObjectMeta {
            generate_name: Some(format!("{resource_name}-")),
            namespace: Some(job.target.cluster_name.clone()),
            ..ObjectMeta::default()
        },
        spec: ManifestWorkSpec {
            workload: ManifestsTemplate { manifests },
            manifest_configs: Vec::new(),
        },
        status: None,
    })
}

/// Stamp the work unit UID onto every applied manifest except the Namespace
/// one, which stays untouched.
pub fn annotate_applied_manifests(work: &ManifestWork) -> Vec<Value> {
    let uid = work.uid().unwrap_or_default();
    let mut updated = Vec::with_capacity(work.spec.workload.manifests.len());

    for manifest in &work.spec.workload.manifests {
        let mut decoded = match DecodedManifest::from_value(manifest.clone()) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("skipping undecodable applied manifest: {e}");
                continue;
            }
        };
        if decoded.kind() == "Namespace" {
            updated.push(manifest.clone());
            continue;
        }
        decoded.set_annotation(ANNOTATION_MANIFEST, &uid);
        match decoded.into_value() {
            Ok(value) => updated.push(value),
            Err(_) => updated.push(manifest.clone()),
        }
    }
    updated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::types::{Content, Instruction, JobState, JobType, Target};

    const DEPLOYMENT_YAML: &str = r"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: nginx
spec:
  replicas: 2
  selector:
    matchLabels:
      app: nginx
  template:
    metadata:
      labels:
        app: nginx
    spec:
      containers:
      - name: nginx
        image: nginx:1.25
";

    fn sample_job() -> Job {
        Job {
            id: "job-1".to_string(),
            job_group_id: Some("group-1".to_string()),
            owner_id: None,
            job_type: JobType::CreateDeployment,
            sub_type: None,
            state: JobState::Created,
            target: Target {
                cluster_name: "cluster1".to_string(),
                node_name: None,
            },
            instruction: Some(Instruction {
                id: String::new(),
                component_name: "nginx".to_string(),
                contents: vec![Content {
                    id: 1,
                    name: "nginx.yaml".to_string(),
                    yaml: DEPLOYMENT_YAML.to_string(),
                }],
            }),
            resource: None,
            namespace: "team-a".to_string(),
        }
    }

    #[test]
    fn decodes_known_kinds_into_typed_variants() {
        let decoded = DecodedManifest::from_yaml(DEPLOYMENT_YAML).unwrap();
        assert!(matches!(decoded, DecodedManifest::Deployment(_)));
        assert_eq!(decoded.kind(), "Deployment");
    }

    #[test]
    fn unknown_kind_falls_back_to_opaque_and_still_mutates() {
        let mut decoded =
            DecodedManifest::from_yaml("apiVersion: v1\nkind: FancyGadget\nmetadata:\n  name: g\n")
                .unwrap();
        assert!(matches!(decoded, DecodedManifest::Opaque(_)));
        decoded.set_namespace("team-a");
        decoded.set_annotation(ANNOTATION_COMPONENT, "nginx");
        let value = decoded.into_value().unwrap();
        assert_eq!(value["metadata"]["namespace"], "team-a");
        assert_eq!(value["metadata"]["annotations"][ANNOTATION_COMPONENT], "nginx");
    }

    #[test]
    fn missing_kind_is_an_error() {
        assert!(DecodedManifest::from_yaml("metadata:\n  name: x\n").is_err());
    }

    #[test]
    fn namespace_manifest_comes_first() {
        let mut job = sample_job();
        let work = generate_manifest_work(&mut job).unwrap();
        let manifests = &work.spec.workload.manifests;
        assert_eq!(manifests.len(), 2);
        assert_eq!(manifests[0]["kind"], "Namespace");
        assert_eq!(manifests[0]["metadata"]["name"], "team-a");
        assert_eq!(manifests[1]["kind"], "Deployment");
        assert_eq!(manifests[1]["metadata"]["namespace"], "team-a");
        assert_eq!(
            manifests[1]["metadata"]["annotations"][ANNOTATION_COMPONENT],
            "nginx"
        );
        assert_eq!(
            manifests[1]["metadata"]["annotations"][ANNOTATION_INSTANCE],
            "group-1"
        );
        // Promoted resource record seeded with a Progressing condition
        let resource = job.resource.as_ref().unwrap();
        assert_eq!(resource.resource_name, "nginx");
        assert_eq!(resource.conditions[0].condition_type, "Progressing");
    }

    #[test]
    fn undecodable_content_is_omitted_not_replaced() {
        let mut job = sample_job();
        job.instruction.as_mut().unwrap().contents.push(Content {
            id: 2,
            name: "broken.yaml".to_string(),
            yaml: "not: a: manifest: [".to_string(),
        });
        let work = generate_manifest_work(&mut job).unwrap();
        // namespace + the one decodable content
        assert_eq!(work.spec.workload.manifests.len(), 2);
    }

    #[test]
    fn applied_annotation_pass_skips_namespace_kind() {
        let mut job = sample_job();
        let mut work = generate_manifest_work(&mut job).unwrap();
        work.metadata.uid = Some("uid-123".to_string());
        let updated = annotate_applied_manifests(&work);
        assert_eq!(updated.len(), 2);
        assert!(updated[0]["metadata"]["annotations"].is_null());
        assert_eq!(
            updated[1]["metadata"]["annotations"][ANNOTATION_MANIFEST],
            "uid-123"
        );
    }
}

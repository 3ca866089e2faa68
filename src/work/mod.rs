//! Client for the hub's resource-distribution API.
//!
//! All operations are scoped by the managed cluster's namespace on the hub.
//! The trait seam exists so the dispatcher and monitors can run against an
//! in-memory store in tests; the process constructs exactly one `WorkClient`
//! at startup and hands it to every component.

#[cfg(test)]
pub mod memory;

use crate::crds::ManifestWork;
use crate::jobs::types::Result;
use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use serde_json::{json, Value};

#[async_trait]
pub trait WorkStore: Send + Sync {
    /// Submit a new work unit; the hub assigns the final name when
    /// `generate_name` is set.
    async fn create(&self, cluster: &str, work: ManifestWork) -> Result<ManifestWork>;

    async fn get(&self, cluster: &str, name: &str) -> Result<ManifestWork>;

    /// Full replace of an existing work unit (blue/green swap path).
    async fn update(&self, cluster: &str, work: &ManifestWork) -> Result<ManifestWork>;

    /// Merge-patch only the manifest list of an existing work unit.
    async fn patch_manifests(
        &self,
        cluster: &str,
        name: &str,
        manifests: Vec<Value>,
    ) -> Result<ManifestWork>;

    /// Delete with zero grace period.
    async fn delete(&self, cluster: &str, name: &str) -> Result<()>;

    async fn list(&self, cluster: &str) -> Result<Vec<ManifestWork>>;
}

/// Kubernetes-backed implementation over the hub cluster.
#[derive(Clone)]
pub struct WorkClient {
    client: Client,
}

impl WorkClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, cluster: &str) -> Api<ManifestWork> {
        Api::namespaced(self.client.clone(), cluster)
    }
}

#[async_trait]
impl WorkStore for WorkClient {
    async fn create(&self, cluster: &str, work: ManifestWork) -> Result<ManifestWork> {
        Ok(self.api(cluster).create(&PostParams::default(), &work).await?)
    }

    async fn get(&self, cluster: &str, name: &str) -> Result<ManifestWork> {
        Ok(self.api(cluster).get(name).await?)
    }

    async fn update(&self, cluster: &str, work: &ManifestWork) -> Result<ManifestWork> {
        let name = work
            .metadata
            .name
            .as_deref()
            .unwrap_or_default()
            .to_string();
        Ok(self
            .api(cluster)
            .replace(&name, &PostParams::default(), work)
            .await?)
    }

    async fn patch_manifests(
        &self,
        cluster: &str,
        name: &str,
        manifests: Vec<Value>,
    ) -> Result<ManifestWork> {
        let patch = json!({
            "spec": {
                "workload": {
                    "manifests": manifests,
                }
            }
        });
        Ok(self
            .api(cluster)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?)
    }

    async fn delete(&self, cluster: &str, name: &str) -> Result<()> {
        self.api(cluster)
            .delete(name, &DeleteParams::default().grace_period(0))
            .await?;
        Ok(())
    }

    async fn list(&self, cluster: &str) -> Result<Vec<ManifestWork>> {
        let list = self.api(cluster).list(&ListParams::default()).await?;
        Ok(list.items)
    }
}

//! In-memory `WorkStore` used by unit tests in place of the hub API.

use crate::crds::{ManifestWork, ManifestWorkStatus};
use crate::jobs::types::{Error, Result};
use crate::work::WorkStore;
use async_trait::async_trait;
use kube::core::ErrorResponse;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct InMemoryWorkStore {
    works: Mutex<HashMap<(String, String), ManifestWork>>,
    counter: AtomicU64,
    status_on_create: Mutex<Option<ManifestWorkStatus>>,
}

impl InMemoryWorkStore {
    pub fn insert(&self, cluster: &str, work: ManifestWork) {
        let name = work.metadata.name.clone().unwrap_or_default();
        self.works
            .lock()
            .unwrap()
            .insert((cluster.to_string(), name), work);
    }

    pub fn contains(&self, cluster: &str, name: &str) -> bool {
        self.works
            .lock()
            .unwrap()
            .contains_key(&(cluster.to_string(), name.to_string()))
    }

    /// Status every subsequently created work unit is born with, simulating
    /// an agent that converges before the first poll.
    pub fn set_status_on_create(&self, status: ManifestWorkStatus) {
        *self.status_on_create.lock().unwrap() = Some(status);
    }

    pub fn set_status(&self, cluster: &str, name: &str, status: ManifestWorkStatus) {
        if let Some(work) = self
            .works
            .lock()
            .unwrap()
            .get_mut(&(cluster.to_string(), name.to_string()))
        {
            work.status = Some(status);
        }
    }

    fn not_found(name: &str) -> Error {
        Error::KubeError(kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("manifestworks.work.open-cluster-management.io \"{name}\" not found"),
            reason: "NotFound".to_string(),
            code: 404,
        }))
    }
}

#[async_trait]
impl WorkStore for InMemoryWorkStore {
    async fn create(&self, cluster: &str, mut work: ManifestWork) -> Result<ManifestWork> {
        let serial = self.counter.fetch_add(1, Ordering::SeqCst);
        if work.metadata.name.is_none() {
            let prefix = work.metadata.generate_name.clone().unwrap_or_default();
            work.metadata.name = Some(format!("{prefix}{serial:05}"));
        }
        work.metadata.uid = Some(format!("uid-{serial:05}"));
        if work.status.is_none() {
            work.status = self.status_on_create.lock().unwrap().clone();
        }
        self.insert(cluster, work.clone());
        Ok(work)
    }

    async fn get(&self, cluster: &str, name: &str) -> Result<ManifestWork> {
        self.works
            .lock()
            .unwrap()
            .get(&(cluster.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| Self::not_found(name))
    }

    async fn update(&self, cluster: &str, work: &ManifestWork) -> Result<ManifestWork> {
        let name = work.metadata.name.clone().unwrap_or_default();
        let key = (cluster.to_string(), name.clone());
        let mut works = self.works.lock().unwrap();
        if !works.contains_key(&key) {
            return Err(Self::not_found(&name));
        }
        works.insert(key, work.clone());
        Ok(work.clone())
    }

    async fn patch_manifests(
        &self,
        cluster: &str,
        name: &str,
        manifests: Vec<Value>,
    ) -> Result<ManifestWork> {
        let mut works = self.works.lock().unwrap();
        let work = works
            .get_mut(&(cluster.to_string(), name.to_string()))
            .ok_or_else(|| Self::not_found(name))?;
        work.spec.workload.manifests = manifests;
        Ok(work.clone())
    }

    async fn delete(&self, cluster: &str, name: &str) -> Result<()> {
        self.works
            .lock()
            .unwrap()
            .remove(&(cluster.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or_else(|| Self::not_found(name))
    }

    async fn list(&self, cluster: &str) -> Result<Vec<ManifestWork>> {
        Ok(self
            .works
            .lock()
            .unwrap()
            .iter()
            .filter(|((c, _), _)| c == cluster)
            .map(|(_, work)| work.clone())
            .collect())
    }
}

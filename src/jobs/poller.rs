//! Bounded-time polling for applied work units.

use crate::crds::ManifestWork;
use crate::jobs::types::{Error, Result};
use crate::work::WorkStore;
use std::time::Duration;
use tracing::debug;

/// Fixed interval between status fetches
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Wait until the named work unit exists and carries at least one status
/// condition, or fail with a timeout when `deadline` elapses first. This is
/// the only suspension point on the synchronous dispatch path.
pub async fn wait_for_applied(
    store: &dyn WorkStore,
    namespace: &str,
    name: &str,
    deadline: Duration,
) -> Result<ManifestWork> {
    let attempt = async {
        loop {
            match store.get(namespace, name).await {
                Ok(work) => {
                    let has_conditions = work
                        .status
                        .as_ref()
                        .is_some_and(|status| !status.conditions.is_empty());
                    if has_conditions {
                        return Ok(work);
                    }
                }
                Err(e) => {
                    debug!("error fetching work unit {namespace}/{name}: {e}");
                }
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    };

    match tokio::time::timeout(deadline, attempt).await {
        Ok(result) => result,
        Err(_) => Err(Error::PollTimeout {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::{Condition, ManifestWorkStatus};
    use crate::work::memory::InMemoryWorkStore;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn named_work(name: &str, conditions: Vec<Condition>) -> ManifestWork {
        ManifestWork {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..ObjectMeta::default()
            },
            spec: Default::default(),
            status: Some(ManifestWorkStatus {
                conditions,
                ..Default::default()
            }),
        }
    }

    #[tokio::test]
    async fn returns_once_conditions_are_reported() {
        let store = InMemoryWorkStore::default();
        store.insert(
            "cluster1",
            named_work(
                "nginx-abc",
                vec![Condition::now("Applied", "True", "Applied", "")],
            ),
        );
        let work = wait_for_applied(&store, "cluster1", "nginx-abc", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(work.metadata.name.as_deref(), Some("nginx-abc"));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_no_condition_appears() {
        let store = InMemoryWorkStore::default();
        store.insert("cluster1", named_work("nginx-abc", Vec::new()));
        let err = wait_for_applied(&store, "cluster1", "nginx-abc", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PollTimeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_work_unit_keeps_polling_until_deadline() {
        let store = InMemoryWorkStore::default();
        let err = wait_for_applied(&store, "cluster1", "ghost", Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PollTimeout { .. }));
    }
}

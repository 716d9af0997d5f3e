//! [`ClusterApi`] over a live API server.

use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use serde_json::json;

use kubegame_core::cluster::kind_of;
use kubegame_core::{BoxFuture, ClusterApi, ClusterError, ClusterObject, CreateOutcome, Lookup};

/// Cluster access through a kube [`Client`].
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K: ClusterObject>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

impl ClusterApi for KubeCluster {
    fn get<'a, K: ClusterObject>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, Lookup<K>> {
        Box::pin(async move {
            Lookup::from_result(
                self.api::<K>(namespace)
                    .get_opt(name)
                    .await
                    .map_err(cluster_error),
            )
        })
    }

    fn create<'a, K: ClusterObject>(
        &'a self,
        object: &'a K,
    ) -> BoxFuture<'a, Result<CreateOutcome<K>, ClusterError>> {
        Box::pin(async move {
            let namespace = object.namespace().ok_or_else(|| {
                ClusterError::Invalid(format!(
                    "{} {} has no namespace",
                    kind_of::<K>(),
                    object.name_any()
                ))
            })?;
            match self
                .api::<K>(&namespace)
                .create(&PostParams::default(), object)
                .await
            {
                Ok(created) => Ok(CreateOutcome::Created(created)),
                Err(kube::Error::Api(response)) if response.code == 409 => {
                    Ok(CreateOutcome::AlreadyExists)
                }
                Err(e) => Err(cluster_error(e)),
            }
        })
    }

    fn update_status<'a, K: ClusterObject>(
        &'a self,
        object: &'a K,
    ) -> BoxFuture<'a, Result<K, ClusterError>> {
        Box::pin(async move {
            let namespace = object.namespace().unwrap_or_default();
            let value =
                serde_json::to_value(object).map_err(|e| ClusterError::Codec(e.to_string()))?;
            let patch = json!({ "status": value.get("status").cloned().unwrap_or_default() });

            self.api::<K>(&namespace)
                .patch_status(&object.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
                .await
                .map_err(cluster_error)
        })
    }
}

fn cluster_error(error: kube::Error) -> ClusterError {
    match error {
        kube::Error::Api(response) => match response.code {
            404 => ClusterError::NotFound(response.message),
            409 => ClusterError::Conflict(response.message),
            400 | 422 => ClusterError::Invalid(response.message),
            _ => ClusterError::Transport(format!("{} ({})", response.message, response.code)),
        },
        kube::Error::SerdeError(e) => ClusterError::Codec(e.to_string()),
        other => ClusterError::Transport(other.to_string()),
    }
}

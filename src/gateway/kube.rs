//! Kubernetes-backed gateway implementation

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ResourceQuota;
use k8s_openapi::api::rbac::v1::RoleBinding;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::Client;
use tracing::debug;

use super::{BackendGateway, BackendStatus};
use crate::Result;

/// Production [`BackendGateway`] backed by a `kube::Client`.
///
/// The client is constructed by the process entry point and injected here;
/// one `KubeGateway` is shared by every reconciler. API-responded failures
/// (403, 409, ...) become [`BackendStatus`] values so reconcilers can
/// aggregate them; only transport failures become errors.
#[derive(Clone)]
pub struct KubeGateway {
    client: Client,
}

impl KubeGateway {
    /// Wrap an already-configured Kubernetes client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn quotas(&self, project: &str) -> Api<ResourceQuota> {
        Api::namespaced(self.client.clone(), project)
    }

    fn role_bindings(&self, project: &str) -> Api<RoleBinding> {
        Api::namespaced(self.client.clone(), project)
    }
}

/// Convert a mutation result into a status, letting only transport errors
/// escape as `Err`.
fn mutation_status<T>(result: kube::Result<T>, success_code: u16) -> Result<BackendStatus> {
    match result {
        Ok(_) => Ok(BackendStatus::ok(success_code)),
        Err(kube::Error::Api(e)) => Ok(BackendStatus::failed(e.code, e.message)),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl BackendGateway for KubeGateway {
    async fn list_quotas(&self, project: &str) -> Result<Vec<ResourceQuota>> {
        let list = self.quotas(project).list(&ListParams::default()).await?;
        Ok(list.items)
    }

    async fn get_quota(&self, project: &str, name: &str) -> Result<Option<ResourceQuota>> {
        match self.quotas(project).get(name).await {
            Ok(quota) => Ok(Some(quota)),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_quota(&self, project: &str, quota: &ResourceQuota) -> Result<BackendStatus> {
        debug!(
            project = %project,
            name = quota.metadata.name.as_deref().unwrap_or(""),
            "creating quota object"
        );
        mutation_status(
            self.quotas(project)
                .create(&PostParams::default(), quota)
                .await,
            201,
        )
    }

    async fn delete_quota(&self, project: &str, name: &str) -> Result<BackendStatus> {
        debug!(project = %project, name = %name, "deleting quota object");
        mutation_status(
            self.quotas(project)
                .delete(name, &DeleteParams::default())
                .await,
            200,
        )
    }

    async fn get_role_binding(&self, project: &str, name: &str) -> Result<Option<RoleBinding>> {
        match self.role_bindings(project).get(name).await {
            Ok(binding) => Ok(Some(binding)),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_role_binding(
        &self,
        project: &str,
        binding: &RoleBinding,
    ) -> Result<BackendStatus> {
        debug!(
            project = %project,
            name = binding.metadata.name.as_deref().unwrap_or(""),
            "creating role binding"
        );
        mutation_status(
            self.role_bindings(project)
                .create(&PostParams::default(), binding)
                .await,
            201,
        )
    }

    async fn replace_role_binding(
        &self,
        project: &str,
        name: &str,
        binding: &RoleBinding,
    ) -> Result<BackendStatus> {
        debug!(project = %project, name = %name, "replacing role binding subjects");
        mutation_status(
            self.role_bindings(project)
                .replace(name, &PostParams::default(), binding)
                .await,
            200,
        )
    }
}

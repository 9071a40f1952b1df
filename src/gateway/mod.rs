//! Backend gateway abstraction
//!
//! The remote platform only offers primitive create/read/update/delete calls
//! on namespaced resources. This module defines the [`BackendGateway`] trait
//! the reconcilers are written against, plus the production implementation
//! backed by `kube::Client` ([`KubeGateway`]).
//!
//! Backend API generations differ only in wire details, so a different
//! generation is a different implementation of this trait, selected once at
//! process startup and injected into the reconcilers. Reconcilers never
//! construct their own client.

mod kube;

pub use self::kube::KubeGateway;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ResourceQuota;
use k8s_openapi::api::rbac::v1::RoleBinding;

#[cfg(test)]
use mockall::automock;

use crate::Result;

/// Status of a single backend mutation.
///
/// `code` is the backend's numeric status (2xx success, 4xx/5xx failure).
/// A gateway returns `BackendStatus` whenever the backend actually answered,
/// even with a failure code; transport-level failures (connection refused,
/// TLS errors) surface as `Err` instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendStatus {
    /// Numeric status code from the backend
    pub code: u16,
    /// Message accompanying the status, empty on success
    pub message: String,
}

impl BackendStatus {
    /// A success status with no message
    pub fn ok(code: u16) -> Self {
        Self {
            code,
            message: String::new(),
        }
    }

    /// A failure status with the backend's message
    pub fn failed(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Whether the status code is in the success range
    pub fn is_success(&self) -> bool {
        matches!(self.code, 200..=299)
    }
}

/// Primitive resource operations against the remote platform.
///
/// Absence is a distinguished outcome: `get_*` return `Ok(None)` when the
/// resource does not exist, never a failure status. Mutations return the
/// backend's status so multi-step callers can aggregate worst-code-wins.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BackendGateway: Send + Sync {
    /// List every quota object in a project
    async fn list_quotas(&self, project: &str) -> Result<Vec<ResourceQuota>>;

    /// Fetch one quota object, `None` when absent
    async fn get_quota(&self, project: &str, name: &str) -> Result<Option<ResourceQuota>>;

    /// Create a quota object in a project
    async fn create_quota(&self, project: &str, quota: &ResourceQuota) -> Result<BackendStatus>;

    /// Delete one quota object by name
    async fn delete_quota(&self, project: &str, name: &str) -> Result<BackendStatus>;

    /// Fetch the role binding named after a role, `None` when absent
    async fn get_role_binding(&self, project: &str, name: &str) -> Result<Option<RoleBinding>>;

    /// Create a role binding in a project
    async fn create_role_binding(
        &self,
        project: &str,
        binding: &RoleBinding,
    ) -> Result<BackendStatus>;

    /// Replace a role binding wholesale.
    ///
    /// The write is unconditional: the backend offers no compare-and-swap,
    /// so concurrent writers are last-write-wins. Should the platform ever
    /// grow an optimistic-concurrency token, it belongs in the
    /// implementation behind this method, not in the reconcilers.
    async fn replace_role_binding(
        &self,
        project: &str,
        name: &str,
        binding: &RoleBinding,
    ) -> Result<BackendStatus>;
}

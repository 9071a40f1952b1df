//! Quota reconciliation against the backend
//!
//! Implements the read/delete/replace/patch operations over a project's
//! scoped quota objects. The backend owns all state: every operation
//! re-reads before mutating, and multi-step sequences report one aggregated
//! outcome (worst status code, concatenated messages).
//!
//! Replace and patch share one shape: resolve the request, delete every
//! existing quota object, then create one object per scope that resolved at
//! least one value. A created object that itself constrains the number of
//! quota objects in the project triggers the settle barrier: a bounded
//! poll until the backend reports computed usage for that constraint,
//! before the next scope's object is created. Creating without the barrier
//! risks a spurious quota violation because the backend has not yet counted
//! the object that was just created.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::{ResourceQuota, ResourceQuotaSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::codec::{self, QuotaScope};
use super::definitions::{QuotaDefinitionSource, QuotaDefinitions, QuotaValue};
use super::resolver::{self, QuotaRequest};
use super::QUOTA_OBJECT_COUNT_RESOURCE;
use crate::gateway::BackendGateway;
use crate::outcome::ReconciliationOutcome;
use crate::wait::poll_until;
use crate::Result;

/// Schema version tag on the quota read wire object
pub const MOC_QUOTA_VERSION: &str = "0.9";
/// Schema kind tag on the quota read wire object
pub const MOC_QUOTA_KIND: &str = "MocQuota";

/// Wire shape of a project's resolved quota, as returned by
/// [`QuotaReconciler::read`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MocQuota {
    /// Schema version, always [`MOC_QUOTA_VERSION`]
    #[serde(rename = "Version")]
    pub version: String,
    /// Schema kind, always [`MOC_QUOTA_KIND`]
    #[serde(rename = "Kind")]
    pub kind: String,
    /// Project the quota belongs to
    #[serde(rename = "ProjectName")]
    pub project_name: String,
    /// Resolved values keyed by mangled quota name, `None` where unset
    #[serde(rename = "Quota")]
    pub quota: BTreeMap<String, Option<QuotaValue>>,
}

impl MocQuota {
    fn new(project: &str, quota: BTreeMap<String, Option<QuotaValue>>) -> Self {
        Self {
            version: MOC_QUOTA_VERSION.to_string(),
            kind: MOC_QUOTA_KIND.to_string(),
            project_name: project.to_string(),
            quota,
        }
    }
}

/// Settle-barrier tuning.
///
/// The poll interval is fixed (no backoff); the deadline bounds the total
/// wait so a backend that never computes usage cannot hang a reconciliation.
#[derive(Debug, Clone)]
pub struct SettleConfig {
    /// Fixed sleep between usage polls
    pub poll_interval: Duration,
    /// Hard bound on the total wait
    pub deadline: Duration,
}

impl Default for SettleConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            deadline: Duration::from_secs(30),
        }
    }
}

/// Reconciles a project's scoped quota objects against a declarative
/// quota specification.
pub struct QuotaReconciler {
    gateway: Arc<dyn BackendGateway>,
    definitions: Arc<dyn QuotaDefinitionSource>,
    settle: SettleConfig,
}

/// Whether resolution merges with the currently-effective quota
enum ResolveMode {
    Replace,
    Patch,
}

impl QuotaReconciler {
    /// Reconciler over the given gateway and definitions store
    pub fn new(
        gateway: Arc<dyn BackendGateway>,
        definitions: Arc<dyn QuotaDefinitionSource>,
    ) -> Self {
        Self {
            gateway,
            definitions,
            settle: SettleConfig::default(),
        }
    }

    /// Override the settle-barrier tuning
    pub fn with_settle_config(mut self, settle: SettleConfig) -> Self {
        self.settle = settle;
        self
    }

    /// Read the project's resolved quota.
    ///
    /// Every definition key appears in the result; keys with no backing
    /// quota object resolve to `None`. A project with zero quota objects
    /// therefore yields an all-`None` quota.
    #[instrument(skip(self))]
    pub async fn read(&self, project: &str) -> Result<MocQuota> {
        let definitions = self.definitions.load().await?;
        let mut quota: BTreeMap<String, Option<QuotaValue>> =
            definitions.keys().map(|k| (k.clone(), None)).collect();
        for (name, value) in self.effective_quota(project).await? {
            quota.insert(name, Some(value));
        }
        Ok(MocQuota::new(project, quota))
    }

    /// Delete every quota object in the project.
    ///
    /// Deleting when none exist is a no-op success. Per-object failures do
    /// not stop the sweep; the aggregate carries the worst status code.
    #[instrument(skip(self))]
    pub async fn delete(&self, project: &str) -> Result<ReconciliationOutcome> {
        let objects = self.gateway.list_quotas(project).await?;
        let mut steps = Vec::new();
        for object in &objects {
            let Some(name) = object.metadata.name.as_deref() else {
                continue;
            };
            let step = match self.gateway.delete_quota(project, name).await {
                Ok(status) if status.is_success() => ReconciliationOutcome::step(
                    status.code,
                    format!("quota {project}/{name} deleted"),
                ),
                Ok(status) => ReconciliationOutcome::step(
                    status.code,
                    format!("quota {project}/{name} deletion failed: {}", status.message),
                ),
                Err(e) => ReconciliationOutcome::step(
                    e.code(),
                    format!("quota {project}/{name} deletion failed: {e}"),
                ),
            };
            steps.push(step);
        }
        let outcome = ReconciliationOutcome::fold(steps);
        if outcome.is_success() {
            Ok(ReconciliationOutcome::success(format!(
                "all quota objects in {project} deleted"
            )))
        } else {
            Ok(outcome)
        }
    }

    /// Replace the project's quota with the resolved request.
    ///
    /// Existing quota objects are deleted first; only keys named by the
    /// request (or derived from the multiplier) survive.
    #[instrument(skip(self, request))]
    pub async fn replace(
        &self,
        project: &str,
        request: &QuotaRequest,
    ) -> Result<ReconciliationOutcome> {
        self.apply(project, request, ResolveMode::Replace).await
    }

    /// Patch the project's quota: like [`replace`](Self::replace), but keys
    /// the request does not name keep their currently-effective values.
    #[instrument(skip(self, request))]
    pub async fn patch(
        &self,
        project: &str,
        request: &QuotaRequest,
    ) -> Result<ReconciliationOutcome> {
        self.apply(project, request, ResolveMode::Patch).await
    }

    async fn apply(
        &self,
        project: &str,
        request: &QuotaRequest,
        mode: ResolveMode,
    ) -> Result<ReconciliationOutcome> {
        let definitions = self.definitions.load().await?;
        let effective = match mode {
            ResolveMode::Patch => Some(self.effective_quota(project).await?),
            ResolveMode::Replace => None,
        };
        let resolved = resolver::resolve(definitions, request, effective.as_ref());

        let deleted = self.delete(project).await?;
        if !deleted.is_success() {
            return Ok(ReconciliationOutcome::step(
                deleted.code,
                format!(
                    "unable to delete current quota objects in {project}:\n{}",
                    deleted.message
                ),
            ));
        }

        self.create_scoped_quotas(project, &resolved).await
    }

    /// Invert the project's existing quota objects back into the flat
    /// mangled-name map. When two objects cover the same (scope, resource)
    /// pair the first listed wins.
    async fn effective_quota(&self, project: &str) -> Result<BTreeMap<String, QuotaValue>> {
        let mut effective = BTreeMap::new();
        for object in self.gateway.list_quotas(project).await? {
            let Some(spec) = object.spec else { continue };
            let scopes: Vec<QuotaScope> = match &spec.scopes {
                Some(labels) => labels.iter().map(|l| QuotaScope::from_label(l)).collect(),
                None => vec![QuotaScope::Project],
            };
            let Some(hard) = spec.hard else { continue };
            for (resource, quantity) in &hard {
                for scope in &scopes {
                    effective
                        .entry(codec::encode(scope, resource))
                        .or_insert_with(|| QuotaValue::from(quantity.clone()));
                }
            }
        }
        Ok(effective)
    }

    /// Create one quota object per scope group with at least one resolved
    /// value. All scopes are attempted even when one fails.
    async fn create_scoped_quotas(
        &self,
        project: &str,
        resolved: &QuotaDefinitions,
    ) -> Result<ReconciliationOutcome> {
        let mut values: BTreeMap<String, QuotaValue> = BTreeMap::new();
        for (name, definition) in resolved {
            if let Some(value) = &definition.value {
                values.insert(name.clone(), value.clone());
            }
        }
        let grouped = codec::group_by_scope(&values)?;

        let mut steps = Vec::new();
        for (scope, hard) in &grouped {
            let quota = scoped_quota(project, scope, hard);
            let name = scoped_quota_name(project, scope);
            let step = match self.gateway.create_quota(project, &quota).await {
                Ok(status) if status.is_success() => {
                    match self.wait_for_quota_to_settle(project, &quota).await {
                        Ok(()) => ReconciliationOutcome::step(
                            status.code,
                            format!("quota {project}/{name} created"),
                        ),
                        Err(e) => ReconciliationOutcome::step(
                            504,
                            format!("quota {project}/{name} created but {e}"),
                        ),
                    }
                }
                Ok(status) => ReconciliationOutcome::step(
                    status.code,
                    format!("quota {project}/{name} creation failed: {}", status.message),
                ),
                Err(e) => ReconciliationOutcome::step(
                    e.code(),
                    format!("quota {project}/{name} creation failed: {e}"),
                ),
            };
            steps.push(step);
        }

        let outcome = ReconciliationOutcome::fold(steps);
        if outcome.is_success() {
            Ok(ReconciliationOutcome::success(format!(
                "all quota objects for {project} created"
            )))
        } else {
            Ok(outcome)
        }
    }

    /// Block until the backend reports computed usage for a freshly created
    /// quota object that constrains the quota-object count itself.
    ///
    /// Without this wait, the next create in the loop can be rejected as a
    /// quota violation because the backend has not yet counted the object
    /// created a moment ago. Objects that do not constrain
    /// `resourcequotas` need no barrier.
    async fn wait_for_quota_to_settle(&self, project: &str, quota: &ResourceQuota) -> Result<()> {
        let constrains_object_count = quota
            .spec
            .as_ref()
            .and_then(|s| s.hard.as_ref())
            .is_some_and(|h| h.contains_key(QUOTA_OBJECT_COUNT_RESOURCE));
        if !constrains_object_count {
            return Ok(());
        }
        let Some(name) = quota.metadata.name.clone() else {
            return Ok(());
        };

        info!(project = %project, quota = %name, "waiting for quota usage to settle");

        let gateway = Arc::clone(&self.gateway);
        let project_owned = project.to_string();
        let name_owned = name.clone();
        poll_until(
            self.settle.deadline,
            self.settle.poll_interval,
            format!("timed out waiting for usage of quota {project}/{name} to settle"),
            || {
                let gateway = Arc::clone(&gateway);
                let project = project_owned.clone();
                let name = name_owned.clone();
                async move {
                    let Some(object) = gateway.get_quota(&project, &name).await? else {
                        return Ok(false);
                    };
                    Ok(object
                        .status
                        .and_then(|s| s.used)
                        .is_some_and(|used| used.contains_key(QUOTA_OBJECT_COUNT_RESOURCE)))
                }
            },
        )
        .await
    }
}

/// Deterministic name of the quota object for a (project, scope) pair
fn scoped_quota_name(project: &str, scope: &QuotaScope) -> String {
    format!(
        "{}-{}",
        project.to_lowercase(),
        scope.to_string().to_lowercase()
    )
}

/// Build the platform quota object for one scope group
fn scoped_quota(
    project: &str,
    scope: &QuotaScope,
    hard: &BTreeMap<String, QuotaValue>,
) -> ResourceQuota {
    ResourceQuota {
        metadata: ObjectMeta {
            name: Some(scoped_quota_name(project, scope)),
            namespace: Some(project.to_string()),
            ..Default::default()
        },
        spec: Some(ResourceQuotaSpec {
            hard: Some(
                hard.iter()
                    .map(|(resource, value)| (resource.clone(), value.to_quantity()))
                    .collect(),
            ),
            scopes: match scope {
                QuotaScope::Project => None,
                QuotaScope::Scoped(label) => Some(vec![label.clone()]),
            },
            scope_selector: None,
        }),
        status: None,
    }
}

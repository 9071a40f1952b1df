//! Role-membership reconciliation
//!
//! Grants and revokes a user's membership in a per-(project, role) binding
//! by read-modify-write against the backend: fetch the binding, edit its
//! subject list, write the full replacement back. The backend offers no
//! compare-and-swap, so two concurrent edits of the same binding can lose
//! one write; that hazard is a platform limitation and is left visible
//! rather than papered over (see DESIGN.md).
//!
//! The binding object is created on the first grant and never deleted;
//! revoking the last member leaves an empty subject list behind.

use std::sync::Arc;

use k8s_openapi::api::rbac::v1::{RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::{info, instrument, warn};

use crate::gateway::BackendGateway;
use crate::outcome::ReconciliationOutcome;
use crate::{Error, Result};

/// Role names a binding may be reconciled under
pub const RECOGNIZED_ROLES: [&str; 3] = ["admin", "edit", "view"];

const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";
const USER_KIND: &str = "User";

/// Reconciles a single user's membership in per-role subject lists.
pub struct RoleBindingReconciler {
    gateway: Arc<dyn BackendGateway>,
}

impl RoleBindingReconciler {
    /// Reconciler over the given gateway
    pub fn new(gateway: Arc<dyn BackendGateway>) -> Self {
        Self { gateway }
    }

    /// Grant `role` to `user` on `project`.
    ///
    /// Creates the binding when it does not exist yet; otherwise appends the
    /// user to the subject list. Fails with [`Error::Conflict`] when the
    /// user is already a member, leaving the binding untouched.
    #[instrument(skip(self))]
    pub async fn add(
        &self,
        project: &str,
        user: &str,
        role: &str,
    ) -> Result<ReconciliationOutcome> {
        validate_role(role)?;

        match self.gateway.get_role_binding(project, role).await? {
            None => {
                info!(project = %project, role = %role, "creating role binding");
                let binding = binding_with_subjects(project, role, vec![user_subject(user)]);
                let status = self.gateway.create_role_binding(project, &binding).await?;
                if status.is_success() {
                    Ok(ReconciliationOutcome::success(format!(
                        "rolebinding created ({user},{project},{role})"
                    )))
                } else {
                    Err(Error::backend(format!(
                        "unable to create rolebinding ({user},{project},{role}): {}",
                        status.message
                    )))
                }
            }
            Some(existing) => {
                if has_user(&existing, user) {
                    return Err(Error::conflict(format!(
                        "rolebinding already exists - unable to add ({user},{project},{role})"
                    )));
                }
                let mut subjects = existing.subjects.clone().unwrap_or_default();
                subjects.push(user_subject(user));
                let status = self
                    .gateway
                    .replace_role_binding(project, role, &replacement(&existing, subjects))
                    .await?;
                if status.is_success() {
                    Ok(ReconciliationOutcome::success(format!(
                        "added role {role} to user {user} on project {project}"
                    )))
                } else {
                    Err(Error::backend(format!(
                        "unable to add role to user on project ({user},{project},{role}): {}",
                        status.message
                    )))
                }
            }
        }
    }

    /// Revoke `role` from `user` on `project`.
    ///
    /// Writes back the subject list without the user; the binding object
    /// survives even when the list becomes empty. Fails with
    /// [`Error::NotFound`] when the binding is absent or the user is not a
    /// member.
    #[instrument(skip(self))]
    pub async fn remove(
        &self,
        project: &str,
        user: &str,
        role: &str,
    ) -> Result<ReconciliationOutcome> {
        validate_role(role)?;

        match self.gateway.get_role_binding(project, role).await? {
            None => {
                // Normal flow never gets here: add() creates the binding
                // before any remove can target it.
                warn!(
                    project = %project,
                    role = %role,
                    "remove targeted a project with no binding"
                );
                Err(Error::not_found(format!(
                    "rolebinding does not exist - unable to delete ({user},{project},{role})"
                )))
            }
            Some(existing) => {
                if !has_user(&existing, user) {
                    return Err(Error::not_found(format!(
                        "rolebinding does not exist - unable to delete ({user},{project},{role})"
                    )));
                }
                let subjects: Vec<Subject> = existing
                    .subjects
                    .clone()
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|s| !(s.kind == USER_KIND && s.name == user))
                    .collect();
                let status = self
                    .gateway
                    .replace_role_binding(project, role, &replacement(&existing, subjects))
                    .await?;
                if status.is_success() {
                    Ok(ReconciliationOutcome::success(format!(
                        "removed role {role} from user {user} on project {project}"
                    )))
                } else {
                    Err(Error::backend(format!(
                        "unable to remove role from user on project ({user},{project},{role}): {}",
                        status.message
                    )))
                }
            }
        }
    }

    /// Whether `user` is a member of `role` on `project`.
    ///
    /// An unrecognized role is simply not a membership, not an error.
    pub async fn exists(&self, project: &str, user: &str, role: &str) -> Result<bool> {
        if !RECOGNIZED_ROLES.contains(&role) {
            return Ok(false);
        }
        match self.gateway.get_role_binding(project, role).await? {
            Some(binding) => Ok(has_user(&binding, user)),
            None => Ok(false),
        }
    }

    /// Every recognized role the user holds on the project.
    pub async fn roles_for(&self, project: &str, user: &str) -> Result<Vec<&'static str>> {
        let mut roles = Vec::new();
        for role in RECOGNIZED_ROLES {
            if self.exists(project, user, role).await? {
                roles.push(role);
            }
        }
        Ok(roles)
    }
}

fn validate_role(role: &str) -> Result<()> {
    if RECOGNIZED_ROLES.contains(&role) {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "invalid role, {role} is not one of 'admin', 'edit' or 'view'"
        )))
    }
}

fn user_subject(user: &str) -> Subject {
    Subject {
        api_group: Some(RBAC_API_GROUP.to_string()),
        kind: USER_KIND.to_string(),
        name: user.to_string(),
        namespace: None,
    }
}

fn has_user(binding: &RoleBinding, user: &str) -> bool {
    binding
        .subjects
        .as_deref()
        .unwrap_or_default()
        .iter()
        .any(|s| s.kind == USER_KIND && s.name == user)
}

/// A fresh binding named after its role, bound to the role's cluster role.
fn binding_with_subjects(project: &str, role: &str, subjects: Vec<Subject>) -> RoleBinding {
    RoleBinding {
        metadata: ObjectMeta {
            name: Some(role.to_string()),
            namespace: Some(project.to_string()),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: RBAC_API_GROUP.to_string(),
            kind: "ClusterRole".to_string(),
            name: role.to_string(),
        },
        subjects: Some(subjects),
    }
}

/// Rebuild a binding around a new subject list.
///
/// Only name and namespace are carried over from the existing metadata;
/// resourceVersion in particular is left unset, so the write is
/// unconditional (last-writer-wins: the backend has no compare-and-swap).
fn replacement(existing: &RoleBinding, subjects: Vec<Subject>) -> RoleBinding {
    RoleBinding {
        metadata: ObjectMeta {
            name: existing.metadata.name.clone(),
            namespace: existing.metadata.namespace.clone(),
            ..Default::default()
        },
        role_ref: existing.role_ref.clone(),
        subjects: Some(subjects),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::fake::FakeBackend;
    use crate::gateway::{BackendStatus, MockBackendGateway};

    const PROJECT: &str = "moc-test";
    const USER: &str = "alice";

    fn reconciler_over(gateway: Arc<dyn BackendGateway>) -> RoleBindingReconciler {
        RoleBindingReconciler::new(gateway)
    }

    fn user_names(binding: &RoleBinding) -> Vec<String> {
        binding
            .subjects
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter(|s| s.kind == USER_KIND)
            .map(|s| s.name.clone())
            .collect()
    }

    /// Story: a role outside the recognized set is rejected before any
    /// backend traffic: the mock has no expectations, so a single call
    /// would fail the test.
    #[tokio::test]
    async fn story_unrecognized_roles_never_reach_the_backend() {
        let reconciler = reconciler_over(Arc::new(MockBackendGateway::new()));

        let err = reconciler
            .add(PROJECT, USER, "superuser")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = reconciler
            .remove(PROJECT, USER, "cluster-admin")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    /// Story: the first grant on a project creates the binding with the
    /// user as its only subject.
    #[tokio::test]
    async fn story_first_grant_creates_the_binding() {
        let backend = Arc::new(FakeBackend::new());
        let reconciler = reconciler_over(backend.clone());

        let outcome = reconciler.add(PROJECT, USER, "admin").await.unwrap();
        assert!(outcome.is_success());

        let binding = backend.binding(PROJECT, "admin").expect("binding created");
        assert_eq!(user_names(&binding), vec![USER]);
        assert_eq!(binding.role_ref.name, "admin");
    }

    /// Story: granting the same role twice is a conflict and leaves the
    /// subject list untouched.
    #[tokio::test]
    async fn story_repeated_grant_is_a_conflict() {
        let backend = Arc::new(FakeBackend::new());
        let reconciler = reconciler_over(backend.clone());

        reconciler.add(PROJECT, USER, "edit").await.unwrap();
        let err = reconciler.add(PROJECT, USER, "edit").await.unwrap_err();

        assert!(matches!(err, Error::Conflict(_)));
        let binding = backend.binding(PROJECT, "edit").unwrap();
        assert_eq!(user_names(&binding).len(), 1);
    }

    /// Story: a second user joins an existing binding without disturbing
    /// the first.
    #[tokio::test]
    async fn story_second_user_appends_to_the_subject_list() {
        let backend = Arc::new(FakeBackend::new());
        let reconciler = reconciler_over(backend.clone());

        reconciler.add(PROJECT, USER, "view").await.unwrap();
        reconciler.add(PROJECT, "bob", "view").await.unwrap();

        let binding = backend.binding(PROJECT, "view").unwrap();
        assert_eq!(user_names(&binding), vec![USER, "bob"]);
    }

    /// Story: revoking the last member empties the subject list but keeps
    /// the binding object; a second revoke finds nothing to remove.
    #[tokio::test]
    async fn story_revoking_the_last_member_keeps_the_binding() {
        let backend = Arc::new(FakeBackend::new());
        let reconciler = reconciler_over(backend.clone());

        reconciler.add(PROJECT, USER, "admin").await.unwrap();
        let outcome = reconciler.remove(PROJECT, USER, "admin").await.unwrap();
        assert!(outcome.is_success());

        let binding = backend.binding(PROJECT, "admin").expect("binding survives");
        assert!(user_names(&binding).is_empty());

        let err = reconciler.remove(PROJECT, USER, "admin").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    /// Story: revoking on a project where the binding never existed is the
    /// defensive path: NotFound, nothing created.
    #[tokio::test]
    async fn story_revoking_without_a_binding_is_not_found() {
        let backend = Arc::new(FakeBackend::new());
        let reconciler = reconciler_over(backend.clone());

        let err = reconciler.remove(PROJECT, USER, "view").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(backend.binding(PROJECT, "view").is_none());
    }

    /// Story: non-user subjects (groups, service accounts) ride along
    /// untouched through both grant and revoke.
    #[tokio::test]
    async fn story_other_subject_kinds_are_preserved() {
        let backend = Arc::new(FakeBackend::new());
        let mut seeded = binding_with_subjects(PROJECT, "edit", vec![user_subject(USER)]);
        seeded.subjects.as_mut().unwrap().push(Subject {
            api_group: Some(RBAC_API_GROUP.to_string()),
            kind: "Group".to_string(),
            name: "platform-team".to_string(),
            namespace: None,
        });
        backend.seed_binding(PROJECT, seeded);

        let reconciler = reconciler_over(backend.clone());
        reconciler.add(PROJECT, "bob", "edit").await.unwrap();
        reconciler.remove(PROJECT, USER, "edit").await.unwrap();

        let binding = backend.binding(PROJECT, "edit").unwrap();
        assert_eq!(user_names(&binding), vec!["bob"]);
        assert!(binding
            .subjects
            .as_deref()
            .unwrap()
            .iter()
            .any(|s| s.kind == "Group" && s.name == "platform-team"));
    }

    /// Story: the replacement write drops stale metadata so it is
    /// unconditional: a resourceVersion from the read never makes it into
    /// the write.
    #[tokio::test]
    async fn story_replacement_writes_are_unconditional() {
        let backend = Arc::new(FakeBackend::new());
        let mut seeded = binding_with_subjects(PROJECT, "admin", vec![user_subject(USER)]);
        seeded.metadata.resource_version = Some("42".to_string());
        backend.seed_binding(PROJECT, seeded);

        let reconciler = reconciler_over(backend.clone());
        reconciler.add(PROJECT, "bob", "admin").await.unwrap();

        let binding = backend.binding(PROJECT, "admin").unwrap();
        assert!(binding.metadata.resource_version.is_none());
    }

    /// Story: a backend that refuses the create surfaces as a backend
    /// error, not a silent success.
    #[tokio::test]
    async fn story_rejected_create_is_a_backend_error() {
        let mut mock = MockBackendGateway::new();
        mock.expect_get_role_binding().returning(|_, _| Ok(None));
        mock.expect_create_role_binding()
            .returning(|_, _| Ok(BackendStatus::failed(403, "forbidden")));

        let reconciler = reconciler_over(Arc::new(mock));
        let err = reconciler.add(PROJECT, USER, "admin").await.unwrap_err();

        match err {
            Error::Backend(msg) => assert!(msg.contains("forbidden")),
            other => panic!("expected backend error, got {other:?}"),
        }
    }

    /// Story: membership queries sweep the recognized roles and report the
    /// ones the user actually holds.
    #[tokio::test]
    async fn story_roles_for_reports_current_memberships() {
        let backend = Arc::new(FakeBackend::new());
        let reconciler = reconciler_over(backend.clone());

        reconciler.add(PROJECT, USER, "admin").await.unwrap();
        reconciler.add(PROJECT, USER, "view").await.unwrap();
        reconciler.add(PROJECT, "bob", "edit").await.unwrap();

        assert_eq!(reconciler.roles_for(PROJECT, USER).await.unwrap(), vec!["admin", "view"]);
        assert!(reconciler.exists(PROJECT, "bob", "edit").await.unwrap());
        assert!(!reconciler.exists(PROJECT, "bob", "admin").await.unwrap());
        // unrecognized roles are not memberships
        assert!(!reconciler
            .exists(PROJECT, USER, "superuser")
            .await
            .unwrap());
    }
}

//! Declarative quota and role-membership reconciliation for multi-tenant
//! Kubernetes/OpenShift projects
//!
//! The remote platform only offers primitive create/read/update/delete calls
//! on namespaced resources. This crate layers declarative operations on top:
//! "set this project's quota to multiplier 2", "grant edit to alice on
//! project p". All state lives in the platform, so every operation re-reads
//! before mutating, and there are no transactions: multi-step sequences
//! report one aggregated outcome instead.
//!
//! # Modules
//!
//! - [`gateway`] - the backend trait and its `kube::Client` implementation
//! - [`quota`] - quota codec, definitions store, resolver, and reconciler
//! - [`rolebinding`] - per-role subject-list reconciliation
//! - [`outcome`] - worst-status aggregation across multi-step operations
//! - [`wait`] - bounded polling (the quota settle barrier)
//! - [`error`] - error taxonomy
//!
//! # Wiring
//!
//! The process entry point (an HTTP service, typically) owns the client
//! lifecycle and injects one gateway into the reconcilers:
//!
//! ```ignore
//! let client = kube::Client::try_default().await?;
//! let gateway = Arc::new(KubeGateway::new(client));
//! let definitions = Arc::new(FileDefinitionSource::new("/etc/acct-mgt/quotas.json"));
//!
//! let quotas = QuotaReconciler::new(gateway.clone(), definitions);
//! let roles = RoleBindingReconciler::new(gateway);
//! ```

#![deny(missing_docs)]

pub mod error;
pub mod gateway;
pub mod outcome;
pub mod quota;
pub mod rolebinding;
pub mod wait;

pub use error::Error;
pub use gateway::{BackendGateway, BackendStatus, KubeGateway};
pub use outcome::ReconciliationOutcome;
pub use quota::{QuotaReconciler, QuotaRequest};
pub use rolebinding::RoleBindingReconciler;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

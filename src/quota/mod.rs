//! Declarative quota reconciliation
//!
//! A project's quota arrives as a flat map of *mangled names*
//! (`scope:resourceName`) to values, or as a single multiplier feeding each
//! definition's linear formula. The platform stores the same data as one
//! quota object per scope. The submodules cover the translation and the
//! reconciliation:
//!
//! - [`codec`] - mangled-name encoding/decoding and per-scope grouping
//! - [`definitions`] - the externally-stored definition table
//! - [`resolver`] - request-to-value resolution (multiplier, literal, patch)
//! - [`reconciler`] - read/delete/replace/patch against the backend

pub mod codec;
pub mod definitions;
pub mod reconciler;
pub mod resolver;

pub use codec::QuotaScope;
pub use definitions::{
    FileDefinitionSource, QuotaDefinition, QuotaDefinitionSource, QuotaDefinitions, QuotaValue,
    StaticDefinitions,
};
pub use reconciler::{MocQuota, QuotaReconciler, SettleConfig, MOC_QUOTA_KIND, MOC_QUOTA_VERSION};
pub use resolver::{QuotaRequest, QUOTA_MULTIPLIER_KEY};

/// Resource name under which the platform counts quota objects themselves.
///
/// A quota object whose `hard` map contains this key is self-referential:
/// creating it changes the very usage it constrains, which is what the
/// settle barrier waits on.
pub const QUOTA_OBJECT_COUNT_RESOURCE: &str = "resourcequotas";

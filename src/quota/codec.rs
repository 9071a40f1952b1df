//! Mangled quota name codec
//!
//! A quota specification arrives as a flat map keyed by *mangled names* of
//! the form `scope:resourceName`, where an empty scope part means the
//! default project-wide scope. The platform wants the same data partitioned
//! into one quota object per scope. This module is the pure translation
//! between the two shapes.

use std::collections::BTreeMap;
use std::fmt;

use crate::{Error, Result};

/// Label the default scope carries in mangled-name form and object names
const PROJECT_SCOPE_LABEL: &str = "Project";

/// Applicability class of a quota value.
///
/// The default scope covers every resource in the project; named scopes
/// restrict the quota to a platform resource class (e.g. `Terminating`,
/// `BestEffort`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QuotaScope {
    /// The default, project-wide scope
    Project,
    /// A named platform scope class
    Scoped(String),
}

impl QuotaScope {
    /// Scope from its platform label; `"Project"` maps to the default scope
    pub fn from_label(label: &str) -> Self {
        if label == PROJECT_SCOPE_LABEL {
            Self::Project
        } else {
            Self::Scoped(label.to_string())
        }
    }
}

impl fmt::Display for QuotaScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Project => f.write_str(PROJECT_SCOPE_LABEL),
            Self::Scoped(label) => f.write_str(label),
        }
    }
}

/// Split a mangled name into its scope and resource name.
///
/// The split is on the first `:`; an empty left part is the default scope.
/// Fails when the separator is missing or the resource part is empty.
pub fn decode(mangled: &str) -> Result<(QuotaScope, String)> {
    let Some((scope_part, resource)) = mangled.split_once(':') else {
        return Err(Error::validation(format!(
            "quota name {mangled:?} is missing the scope separator ':'"
        )));
    };
    if resource.is_empty() {
        return Err(Error::validation(format!(
            "quota name {mangled:?} has an empty resource name"
        )));
    }
    let scope = if scope_part.is_empty() {
        QuotaScope::Project
    } else {
        QuotaScope::Scoped(scope_part.to_string())
    };
    Ok((scope, resource.to_string()))
}

/// Build a mangled name from a scope and resource name.
///
/// Inverse of [`decode`] for scope labels and resource names containing no
/// `:`; the default scope encodes to an empty left part.
pub fn encode(scope: &QuotaScope, resource: &str) -> String {
    match scope {
        QuotaScope::Project => format!(":{resource}"),
        QuotaScope::Scoped(label) => format!("{label}:{resource}"),
    }
}

/// Partition a flat mangled-name map into per-scope resource maps.
pub fn group_by_scope<V>(
    quota: &BTreeMap<String, V>,
) -> Result<BTreeMap<QuotaScope, BTreeMap<String, V>>>
where
    V: Clone,
{
    let mut grouped: BTreeMap<QuotaScope, BTreeMap<String, V>> = BTreeMap::new();
    for (mangled, value) in quota {
        let (scope, resource) = decode(mangled)?;
        grouped
            .entry(scope)
            .or_default()
            .insert(resource, value.clone());
    }
    Ok(grouped)
}

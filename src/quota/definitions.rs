//! Quota definitions store
//!
//! The definition table is the only configuration artifact this layer owns:
//! an external JSON document mapping mangled quota names to the parameters
//! of the linear value formula, e.g.
//!
//! ```json
//! {
//!     ":configmaps": { "base": 2, "coefficient": 2 },
//!     ":requests.storage": { "base": 2, "coefficient": 2, "units": "Gi" }
//! }
//! ```
//!
//! Definitions are reloaded on every resolution, so edits to the file take
//! effect without a restart and no cache invalidation is needed.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

/// A concrete quota value: numeric, or a string once units are attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuotaValue {
    /// Plain numeric value
    Number(f64),
    /// String value, e.g. a unit-suffixed quantity like `"4Gi"`
    Text(String),
}

impl QuotaValue {
    /// Render as the platform's quantity string
    pub fn to_quantity(&self) -> Quantity {
        Quantity(self.to_string())
    }
}

impl fmt::Display for QuotaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // f64 renders whole values without a trailing ".0", so a base
            // of 2 with multiplier 1 prints as "4", not "4.0".
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<Quantity> for QuotaValue {
    fn from(quantity: Quantity) -> Self {
        Self::Text(quantity.0)
    }
}

/// Parameters deriving one quota resource's value, keyed by mangled name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaDefinition {
    /// Constant term of the linear formula
    pub base: f64,
    /// Per-multiplier term of the linear formula
    pub coefficient: f64,
    /// Unit suffix appended after multiplier resolution (e.g. `"Gi"`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    /// Resolved value; `None` until a resolver pass assigns one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<QuotaValue>,
}

/// Full definition table, keyed by mangled quota name
pub type QuotaDefinitions = BTreeMap<String, QuotaDefinition>;

/// Source of the quota definition table.
///
/// Loaded once per resolution; implementations must return every definition
/// with `value` reset to `None`.
#[async_trait]
pub trait QuotaDefinitionSource: Send + Sync {
    /// Load the full definition table
    async fn load(&self) -> Result<QuotaDefinitions>;
}

/// Definition table read from a JSON file on each load.
pub struct FileDefinitionSource {
    path: PathBuf,
}

impl FileDefinitionSource {
    /// Source reading from the given file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl QuotaDefinitionSource for FileDefinitionSource {
    async fn load(&self) -> Result<QuotaDefinitions> {
        debug!(path = %self.path.display(), "reading quota definitions");
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            Error::backend(format!(
                "failed to read quota definitions {}: {e}",
                self.path.display()
            ))
        })?;
        let mut definitions: QuotaDefinitions = serde_json::from_str(&raw).map_err(|e| {
            Error::validation(format!(
                "malformed quota definitions {}: {e}",
                self.path.display()
            ))
        })?;
        // The file holds only formula parameters; a stray "value" field must
        // not leak into resolution.
        for definition in definitions.values_mut() {
            definition.value = None;
        }
        Ok(definitions)
    }
}

/// Fixed in-memory definition table, for embedders and tests.
pub struct StaticDefinitions {
    definitions: QuotaDefinitions,
}

impl StaticDefinitions {
    /// Source serving a clone of the given table on every load
    pub fn new(definitions: QuotaDefinitions) -> Self {
        Self { definitions }
    }
}

#[async_trait]
impl QuotaDefinitionSource for StaticDefinitions {
    async fn load(&self) -> Result<QuotaDefinitions> {
        let mut definitions = self.definitions.clone();
        for definition in definitions.values_mut() {
            definition.value = None;
        }
        Ok(definitions)
    }
}

//! Quota value resolution
//!
//! Turns a declarative quota request into a fully resolved definition table.
//! Two modes drive the values: a single scalar multiplier feeding every
//! definition's linear formula, or literal per-key overrides. Patch-style
//! operations additionally seed the table with the currently-effective
//! values so unspecified keys keep what the project already has.

use std::collections::BTreeMap;

use tracing::warn;

use super::definitions::{QuotaDefinitions, QuotaValue};
use crate::{Error, Result};

/// Distinguished wire key selecting multiplier-driven resolution
pub const QUOTA_MULTIPLIER_KEY: &str = "QuotaMultiplier";

/// A declarative quota request.
///
/// When `multiplier` is present it drives every value and `quota` is
/// ignored; otherwise `quota` holds literal per-mangled-name overrides
/// (`None` clears a value).
#[derive(Debug, Clone, Default)]
pub struct QuotaRequest {
    /// Literal overrides keyed by mangled quota name
    pub quota: BTreeMap<String, Option<QuotaValue>>,
    /// Scalar feeding the `base + coefficient * multiplier` formula
    pub multiplier: Option<f64>,
}

impl QuotaRequest {
    /// A multiplier-driven request
    pub fn with_multiplier(multiplier: f64) -> Self {
        Self {
            quota: BTreeMap::new(),
            multiplier: Some(multiplier),
        }
    }

    /// A literal-override request
    pub fn with_overrides(quota: BTreeMap<String, Option<QuotaValue>>) -> Self {
        Self {
            quota,
            multiplier: None,
        }
    }

    /// Build a request from the wire-shape `Quota` map, in which the
    /// multiplier travels as the distinguished `QuotaMultiplier` key.
    ///
    /// Fails with a validation error when `QuotaMultiplier` is present but
    /// not numeric.
    pub fn from_wire(mut quota: BTreeMap<String, Option<QuotaValue>>) -> Result<Self> {
        match quota.remove(QUOTA_MULTIPLIER_KEY) {
            None => Ok(Self {
                quota,
                multiplier: None,
            }),
            Some(Some(QuotaValue::Number(multiplier))) => Ok(Self {
                quota,
                multiplier: Some(multiplier),
            }),
            Some(other) => Err(Error::validation(format!(
                "{QUOTA_MULTIPLIER_KEY} must be a number, got {other:?}"
            ))),
        }
    }
}

/// Resolve concrete values into the definition table.
///
/// `effective` carries the currently-effective resolved quota for
/// patch-style merging; pass `None` for replace semantics. The multiplier
/// branch recomputes every key and ignores `effective` entirely.
///
/// Keys not present in the definition table (whether from the request or
/// from `effective`) are dropped, with a warning. Dropping rather than
/// failing is load-bearing behavior for existing callers; see DESIGN.md.
pub fn resolve(
    mut definitions: QuotaDefinitions,
    request: &QuotaRequest,
    effective: Option<&BTreeMap<String, QuotaValue>>,
) -> QuotaDefinitions {
    if let Some(multiplier) = request.multiplier {
        for definition in definitions.values_mut() {
            let value = definition.base + definition.coefficient * multiplier;
            definition.value = Some(match &definition.units {
                Some(units) => QuotaValue::Text(format!("{value}{units}")),
                None => QuotaValue::Number(value),
            });
        }
        return definitions;
    }

    if let Some(effective) = effective {
        for (name, value) in effective {
            match definitions.get_mut(name) {
                Some(definition) => definition.value = Some(value.clone()),
                None => {
                    warn!(quota = %name, "effective quota has no definition, dropping");
                }
            }
        }
    }

    for (name, value) in &request.quota {
        match definitions.get_mut(name) {
            Some(definition) => definition.value = value.clone(),
            None => {
                warn!(quota = %name, "requested quota has no definition, dropping");
            }
        }
    }

    definitions
}

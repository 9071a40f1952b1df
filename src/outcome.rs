//! Aggregated outcome of a reconciliation operation
//!
//! Multi-step operations (deleting every quota object in a project, creating
//! one quota object per scope) report a single summary: the worst status code
//! observed across the steps, with the per-step messages concatenated. The
//! aggregation is an explicit fold over an ordered list of step outcomes
//! rather than ad hoc accumulator mutation, so it can be tested on its own.

use crate::{Error, Result};

/// Summary of a reconciliation operation.
///
/// `code` lives in the backend's numeric status space: 2xx is success,
/// 4xx/5xx is failure. For multi-step operations it is the maximum (most
/// severe) code among the sub-operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationOutcome {
    /// Status code; the maximum across sub-operations for multi-step work
    pub code: u16,
    /// Human-readable summary; concatenated per-step messages on failure
    pub message: String,
}

impl ReconciliationOutcome {
    /// A successful outcome with the given message
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            code: 200,
            message: message.into(),
        }
    }

    /// A single step outcome with an explicit status code
    pub fn step(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Whether the (aggregate) status code is in the success range
    pub fn is_success(&self) -> bool {
        matches!(self.code, 200..=299)
    }

    /// Merge another step into this outcome: worst code wins, messages
    /// concatenate in step order.
    pub fn merge(mut self, other: Self) -> Self {
        self.code = self.code.max(other.code);
        if self.message.is_empty() {
            self.message = other.message;
        } else if !other.message.is_empty() {
            self.message.push('\n');
            self.message.push_str(&other.message);
        }
        self
    }

    /// Fold an ordered list of step outcomes into one aggregate.
    ///
    /// An empty list folds to a bare success (code 200, empty message); the
    /// caller supplies the summary wording for that case.
    pub fn fold(steps: impl IntoIterator<Item = Self>) -> Self {
        steps
            .into_iter()
            .fold(Self::success(""), ReconciliationOutcome::merge)
    }

    /// Convert a failed aggregate into [`Error::PartialFailure`], for
    /// callers that want `Result` semantics instead of inspecting the code.
    pub fn ensure_success(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::PartialFailure {
                code: self.code,
                message: self.message,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worst_code_wins() {
        let agg = ReconciliationOutcome::fold([
            ReconciliationOutcome::step(200, "quota moc-test/moc-test-project deleted"),
            ReconciliationOutcome::step(403, "quota moc-test/moc-test-besteffort deletion failed"),
            ReconciliationOutcome::step(200, "quota moc-test/moc-test-terminating deleted"),
        ]);
        assert_eq!(agg.code, 403);
        assert!(!agg.is_success());
    }

    #[test]
    fn messages_concatenate_in_step_order() {
        let agg = ReconciliationOutcome::fold([
            ReconciliationOutcome::step(200, "first"),
            ReconciliationOutcome::step(500, "second"),
        ]);
        assert_eq!(agg.message, "first\nsecond");
        assert_eq!(agg.code, 500);
    }

    #[test]
    fn empty_fold_is_success() {
        let agg = ReconciliationOutcome::fold([]);
        assert!(agg.is_success());
        assert!(agg.message.is_empty());
    }

    #[test]
    fn created_201_still_counts_as_success() {
        let agg = ReconciliationOutcome::fold([
            ReconciliationOutcome::step(201, "created"),
            ReconciliationOutcome::step(200, "created"),
        ]);
        assert_eq!(agg.code, 201);
        assert!(agg.is_success());
    }

    #[test]
    fn ensure_success_converts_failures() {
        let ok = ReconciliationOutcome::success("done").ensure_success();
        assert!(ok.is_ok());

        let err = ReconciliationOutcome::step(504, "usage never settled")
            .ensure_success()
            .unwrap_err();
        match err {
            Error::PartialFailure { code, message } => {
                assert_eq!(code, 504);
                assert_eq!(message, "usage never settled");
            }
            other => panic!("expected PartialFailure, got {other:?}"),
        }
    }
}

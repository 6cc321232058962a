//! Error taxonomy of the duplication engine.
//!
//! Nothing here is retried automatically: a failed duplication rolls back
//! whole, and the caller decides whether to re-issue the request or run
//! diagnostics first. Mismatch findings are reports, not errors.

use thiserror::Error;

use crate::capacity::CapacityKind;

/// Failures surfaced by a store backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{entity} `{id}` not found")]
    Missing { entity: &'static str, id: String },

    #[error("identifier `{id}` already exists in the {table} table")]
    Conflict { table: &'static str, id: String },

    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Everything that can abort a duplication request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DuplicationError {
    #[error("node `{0}` not found")]
    NotFound(String),

    #[error("repeater `{0}` declares no template nodes to duplicate")]
    EmptyTemplateSet(String),

    #[error("invalid suffix `{0}`: expected a positive integer")]
    InvalidSuffix(String),

    #[error("identifier `{0}` already exists; duplication aborted")]
    IdentifierCollision(String),

    #[error("failed to copy {kind} capacity `{capacity_id}`: {reason}")]
    CapacityCopyFailure {
        kind: CapacityKind,
        capacity_id: String,
        reason: String,
    },

    #[error("repeater `{repeater_node_id}` already has {existing} instances (max {max})")]
    InstanceLimit {
        repeater_node_id: String,
        existing: u32,
        max: u32,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DuplicationError {
    /// HTTP-equivalent status the request handler maps this to.
    pub fn status(&self) -> u16 {
        match self {
            DuplicationError::NotFound(_) => 404,
            DuplicationError::EmptyTemplateSet(_)
            | DuplicationError::InvalidSuffix(_)
            | DuplicationError::InstanceLimit { .. } => 422,
            DuplicationError::IdentifierCollision(_) => 409,
            DuplicationError::CapacityCopyFailure { .. } | DuplicationError::Store(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(DuplicationError::NotFound("r".into()).status(), 404);
        assert_eq!(DuplicationError::EmptyTemplateSet("r".into()).status(), 422);
        assert_eq!(DuplicationError::InvalidSuffix("x".into()).status(), 422);
        assert_eq!(
            DuplicationError::IdentifierCollision("n-1".into()).status(),
            409
        );
        assert_eq!(
            DuplicationError::Store(StoreError::Backend("io".into())).status(),
            500
        );
    }

    #[test]
    fn capacity_failure_names_the_capacity() {
        let err = DuplicationError::CapacityCopyFailure {
            kind: CapacityKind::Table,
            capacity_id: "t-9".into(),
            reason: "row missing".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("table"));
        assert!(msg.contains("t-9"));
    }
}

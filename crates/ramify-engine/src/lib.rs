pub mod analyzer;
pub mod blueprint;
pub mod executor;
pub mod plan;
pub mod registry;
pub mod suffix;
pub mod traits;

#[cfg(test)]
pub mod test_store;

pub use analyzer::{analyze, fix, Finding, Mismatch, Remediation};
pub use blueprint::{build, Blueprint, BlueprintCapacity, BlueprintVariable};
pub use executor::{execute, CopyKind, CopyOperation, ExecutionReport};
pub use plan::{plan, InstantiationPlan, NodeCopyOp, VariableCopyOp};
pub use registry::{RepeatScopeRegistry, ScopeEvent, ScopeId, ScopeSnapshot};
pub use traits::{NodeStore, WriteBatch, WriteOp};

// Re-export common types
pub use ramify_common::{DuplicationError, StoreError};

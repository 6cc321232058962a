pub mod memory;
pub mod session;

pub use memory::MemoryBackend;
pub use session::{DuplicationSession, PlanOutcome, RepeatRequest, SessionConfig};

// Re-export the engine surface callers need alongside a session
pub use ramify_engine::{
    Blueprint, CopyKind, CopyOperation, DuplicationError, ExecutionReport, InstantiationPlan,
    Mismatch, NodeStore, RepeatScopeRegistry, ScopeId, ScopeSnapshot, StoreError, WriteBatch,
    WriteOp,
};

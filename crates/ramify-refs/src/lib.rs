pub mod extract;
pub mod rewrite;
mod scan;

pub use extract::{extract_condition, extract_formula, extract_payload, extract_table, TypedRef};
pub use rewrite::{
    rewrite_condition_set, rewrite_payload, rewrite_ref_target, rewrite_str, rewrite_table,
    rewrite_tokens, rewrite_value, IdMap,
};

// Re-export common types
pub use ramify_common::{CapacityKind, CapacityPayload, Condition, Formula, Table};

//! Suffix allocation for a whole template group.
//!
//! The group takes one suffix: the maximum observed across *all* of its
//! templates plus one. Per-template allocation is how "mixed suffix"
//! instances happen — field A at `-4`, field B at `-1` inside the same
//! instance — so it is deliberately not offered. Callers must hold the
//! repeater's advisory lock across allocation and execution.

use ramify_common::{id, DuplicationError};

use crate::traits::NodeStore;

/// Next free suffix for the template group: global max + 1.
pub fn allocate(
    store: &dyn NodeStore,
    template_ids: &[String],
) -> Result<u32, DuplicationError> {
    let mut max = 0u32;
    for template_id in template_ids {
        max = max.max(store.max_copy_suffix(template_id)?);
    }
    Ok(max + 1)
}

/// Validate an administratively-supplied suffix.
///
/// The scan is skipped and the suffix used verbatim, but it fails closed:
/// if any template already has a copy under this suffix the whole request
/// is rejected. Falling back to max+1 here would hide the corruption that
/// produced the collision.
pub fn verify_explicit(
    store: &dyn NodeStore,
    template_ids: &[String],
    suffix: u32,
) -> Result<(), DuplicationError> {
    for template_id in template_ids {
        let base = id::strip_copy_suffix(template_id);
        let candidate = id::with_suffix(base, suffix);
        if store.node_exists(&candidate)? {
            return Err(DuplicationError::IdentifierCollision(candidate));
        }
    }
    Ok(())
}

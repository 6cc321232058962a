//! Identifier shapes and the canonical copy-suffix predicate.
//!
//! Every piece of suffix logic in the workspace goes through this module.
//! The historic failure mode this guards against: a blanket `-\d+$` check
//! fires on the trailing hex segment of a UUID, or on generated ids like
//! `node_1699999999` that merely end in digits. A trailing `-N` group is a
//! copy suffix only when the remaining stem is itself a well-formed
//! identifier.

use once_cell::sync::Lazy;
use regex::Regex;

/// Full 8-4-4-4-12 hex shape. Anchored: UUID *segments* never match.
static UUID_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("uuid shape regex")
});

const GENERATED_PREFIX: &str = "node_";
const SHARED_REF_PREFIX: &str = "shared-ref-";

/// The recognized identifier families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdShape {
    /// Random UUID minted by the store.
    Uuid,
    /// Editor-generated id of the form `node_<alnum>`.
    Generated,
    /// Globally reusable shared-reference id, `shared-ref-<alnum>`.
    SharedRef,
    /// Anything else (foreign keys, free text, corrupt data).
    Other,
}

pub fn shape_of(id: &str) -> IdShape {
    if UUID_SHAPE.is_match(id) {
        IdShape::Uuid
    } else if is_generated(id) {
        IdShape::Generated
    } else if is_shared_ref(id) {
        IdShape::SharedRef
    } else {
        IdShape::Other
    }
}

pub fn is_shared_ref(id: &str) -> bool {
    id.len() > SHARED_REF_PREFIX.len() && id.starts_with(SHARED_REF_PREFIX)
}

fn is_generated(id: &str) -> bool {
    id.len() > GENERATED_PREFIX.len() && id.starts_with(GENERATED_PREFIX)
}

/// Whether `id` on its own is a well-formed identifier stem.
pub fn has_known_shape(id: &str) -> bool {
    shape_of(id) != IdShape::Other
}

/// Render the copy id for `base` under `suffix`.
pub fn with_suffix(base: &str, suffix: u32) -> String {
    format!("{base}-{suffix}")
}

/// The canonical "is this a suffixed copy of base X" predicate.
///
/// Returns `Some(n)` iff `candidate` is exactly `base` followed by `-` and
/// a decimal suffix. Requires the caller to know the base; this is what
/// store queries for `<base>-<digits>` are built on.
pub fn copy_suffix_of(candidate: &str, base: &str) -> Option<u32> {
    let rest = candidate.strip_prefix(base)?;
    let digits = rest.strip_prefix('-')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Shape-aware split of an id into its template stem and copy suffix.
///
/// Trailing `-N` groups are peeled off only while doing so leaves a stem of
/// a recognized shape, so `uuid-1-2` resolves to `(uuid, 1)` while a bare
/// UUID or `node_1699999999` is returned untouched. The suffix reported is
/// the first group after the stem (the suffix the first cloning minted).
pub fn split_copy_suffix(id: &str) -> (&str, Option<u32>) {
    let mut end = id.len();
    loop {
        let Some(dash) = id[..end].rfind('-') else {
            break;
        };
        let group = &id[dash + 1..end];
        if group.is_empty() || !group.bytes().all(|b| b.is_ascii_digit()) {
            break;
        }
        let stem = &id[..dash];
        if has_known_shape(stem) {
            let first = id[dash + 1..].split('-').next().unwrap_or(group);
            return (stem, first.parse().ok());
        }
        end = dash;
    }
    (id, None)
}

/// The template stem of an id: `split_copy_suffix` without the suffix.
pub fn strip_copy_suffix(id: &str) -> &str {
    split_copy_suffix(id).0
}

/// True when the id carries at least one copy suffix.
pub fn is_suffixed(id: &str) -> bool {
    split_copy_suffix(id).1.is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    const UUID: &str = "8f14e45f-ceea-4672-a1d5-9c167ffeba5d";

    #[test]
    fn copy_suffix_requires_exact_base() {
        assert_eq!(copy_suffix_of("field-3", "field"), Some(3));
        assert_eq!(copy_suffix_of(&format!("{UUID}-12"), UUID), Some(12));
        assert_eq!(copy_suffix_of(UUID, UUID), None);
        assert_eq!(copy_suffix_of("field-3a", "field"), None);
        assert_eq!(copy_suffix_of("field-", "field"), None);
        assert_eq!(copy_suffix_of("other-3", "field"), None);
    }

    #[test]
    fn split_peels_stacked_suffixes_down_to_a_shaped_stem() {
        let doubled = format!("{UUID}-1-2");
        assert_eq!(split_copy_suffix(&doubled), (UUID, Some(1)));
        let single = format!("{UUID}-4");
        assert_eq!(split_copy_suffix(&single), (UUID, Some(4)));
    }

    #[test]
    fn split_never_eats_uuid_segments() {
        // Last segment is twelve decimal digits: still part of the UUID.
        let tricky = "aaaaaaaa-bbbb-4ccc-8ddd-123456789012";
        assert_eq!(split_copy_suffix(tricky), (tricky, None));
    }

    #[test]
    fn split_ignores_generated_ids_that_end_in_digits() {
        assert_eq!(split_copy_suffix("node_1699999999"), ("node_1699999999", None));
        assert_eq!(split_copy_suffix("node_calc_total-2"), ("node_calc_total", Some(2)));
    }

    #[test]
    fn shared_ref_bodies_are_not_suffixes() {
        // `shared-ref-42` is a shared id whose body happens to be digits.
        assert_eq!(split_copy_suffix("shared-ref-42"), ("shared-ref-42", None));
        assert_eq!(
            split_copy_suffix("shared-ref-vat-rate-1"),
            ("shared-ref-vat-rate", Some(1))
        );
    }

    #[test]
    fn shape_classification() {
        assert_eq!(shape_of(UUID), IdShape::Uuid);
        assert_eq!(shape_of("node_x1"), IdShape::Generated);
        assert_eq!(shape_of("shared-ref-vat"), IdShape::SharedRef);
        assert_eq!(shape_of("just-a-label"), IdShape::Other);
        assert_eq!(shape_of("node_"), IdShape::Other);
    }
}

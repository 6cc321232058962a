//! Shared regex passes over serialized payload text.
//!
//! The passes run most-specific first: `@value.`-wrapped capacity
//! pointers, then generic `@value.` ids, then standalone pointers, then
//! bare identifiers. Bare-id matches are dropped when the preceding
//! character shows they are the tail of a longer token (a pointer body, a
//! dotted wrapper, or a hyphenated composite id).

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use ramify_common::CapacityKind;

pub(crate) const POINTER_PREFIXES: [(&str, CapacityKind); 6] = [
    ("node-formula:", CapacityKind::Formula),
    ("node-condition:", CapacityKind::Condition),
    ("node-table:", CapacityKind::Table),
    ("formula:", CapacityKind::Formula),
    ("condition:", CapacityKind::Condition),
    ("table:", CapacityKind::Table),
];

/// Map the regex-captured pointer word to its capacity family.
pub(crate) fn pointer_kind(word: &str) -> CapacityKind {
    match word {
        "formula" => CapacityKind::Formula,
        "condition" => CapacityKind::Condition,
        _ => CapacityKind::Table,
    }
}

/// Whether a `@value.` body is itself a capacity pointer (handled by the
/// prefixed passes, not the generic id pass).
pub(crate) fn has_pointer_prefix(body: &str) -> bool {
    POINTER_PREFIXES.iter().any(|(p, _)| body.starts_with(p)) || body.starts_with("node-")
}

pub(crate) static VALUE_PREFIXED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"@value\.(node-)?(formula|condition|table):([A-Za-z0-9_-]+)").expect("regex")
});

pub(crate) static VALUE_GENERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@value\.([A-Za-z0-9_:-]+)").expect("regex"));

pub(crate) static TABLE_WRAPPED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@table\.([A-Za-z0-9_-]+)").expect("regex"));

pub(crate) static BARE_POINTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(node-)?(formula|condition|table):([A-Za-z0-9_-]+)").expect("regex")
});

pub(crate) static BARE_UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}(?:-[0-9]+)*\b",
    )
    .expect("regex")
});

pub(crate) static BARE_GENERATED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bnode_[A-Za-z0-9_-]*[A-Za-z0-9]").expect("regex"));

pub(crate) static BARE_SHARED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bshared-ref-[A-Za-z0-9_-]*[A-Za-z0-9]").expect("regex"));

/// True when a bare-id match at this position is really the tail of a
/// longer token and must be ignored.
pub(crate) fn glued_to_previous(prev: Option<char>) -> bool {
    matches!(prev, Some(':') | Some('.') | Some('-') | Some('_'))
}

/// `Regex::replace_all` with access to the character preceding each match.
/// The callback returns `None` to keep the match untouched.
pub(crate) fn replace_positional(
    text: &str,
    re: &Regex,
    mut replace: impl FnMut(&Captures<'_>, Option<char>) -> Option<String>,
) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in re.captures_iter(text) {
        let whole = caps.get(0).expect("capture 0");
        out.push_str(&text[last..whole.start()]);
        let prev = text[..whole.start()].chars().next_back();
        match replace(&caps, prev) {
            Some(replacement) => out.push_str(&replacement),
            None => out.push_str(whole.as_str()),
        }
        last = whole.end();
    }
    out.push_str(&text[last..]);
    out
}

/// Visit every match of `re` with its preceding character.
pub(crate) fn visit_positional(
    text: &str,
    re: &Regex,
    mut visit: impl FnMut(&Captures<'_>, Option<char>),
) {
    for caps in re.captures_iter(text) {
        let whole = caps.get(0).expect("capture 0");
        let prev = text[..whole.start()].chars().next_back();
        visit(&caps, prev);
    }
}

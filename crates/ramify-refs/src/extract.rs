//! Reference extraction: find every identifier embedded in a capacity
//! payload and tag it by kind.
//!
//! Two passes cooperate. The structural pass walks the payload's typed
//! shape (`Ref` tokens, condition leaves, lookup selectors) so pointer
//! kinds are never guessed from text. The string pass scans the
//! serialized payload and catches identifiers buried in free-form fields.
//! Both passes demand a full identifier shape before classifying a bare
//! match; a trailing-digits heuristic on its own never fires.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use ramify_common::{
    id, CapacityKind, CapacityPayload, Condition, ConditionAction, ConditionExpr, Formula,
    FormulaToken, SourceRef, Table,
};

use crate::scan;

/// A reference found in a payload, tagged by what it points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum TypedRef {
    /// A node whose runtime value is read (`@value.<id>` or a bare id).
    NodeValue(String),
    /// A shared reference: external, stable, never cloned.
    Shared(String),
    Formula(String),
    Condition(String),
    Table(String),
}

impl TypedRef {
    pub fn id(&self) -> &str {
        match self {
            TypedRef::NodeValue(id)
            | TypedRef::Shared(id)
            | TypedRef::Formula(id)
            | TypedRef::Condition(id)
            | TypedRef::Table(id) => id,
        }
    }

    fn for_capacity(kind: CapacityKind, id: impl Into<String>) -> Self {
        match kind {
            CapacityKind::Formula => TypedRef::Formula(id.into()),
            CapacityKind::Condition => TypedRef::Condition(id.into()),
            CapacityKind::Table => TypedRef::Table(id.into()),
        }
    }
}

/// Classify one raw reference string from a structural position.
///
/// A shared-shaped id classifies as both a node-value read and a shared
/// reference; anything without a recognized shape or pointer prefix is
/// not a reference at all.
pub(crate) fn classify_target(raw: &str) -> Vec<TypedRef> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }
    let body = raw.strip_prefix("@value.").unwrap_or(raw);
    if let Some(pointer) = SourceRef::parse(body) {
        return vec![TypedRef::for_capacity(pointer.kind(), pointer.id())];
    }
    let (stem, _) = id::split_copy_suffix(body);
    if id::is_shared_ref(stem) {
        vec![
            TypedRef::NodeValue(body.to_string()),
            TypedRef::Shared(body.to_string()),
        ]
    } else if id::has_known_shape(stem) {
        vec![TypedRef::NodeValue(body.to_string())]
    } else {
        Vec::new()
    }
}

struct Collector {
    seen: FxHashSet<TypedRef>,
    out: Vec<TypedRef>,
}

impl Collector {
    fn new() -> Self {
        Collector {
            seen: FxHashSet::default(),
            out: Vec::new(),
        }
    }

    fn push(&mut self, r: TypedRef) {
        if self.seen.insert(r.clone()) {
            self.out.push(r);
        }
    }

    fn push_all(&mut self, refs: Vec<TypedRef>) {
        for r in refs {
            self.push(r);
        }
    }

    fn scan_text(&mut self, text: &str) {
        scan::visit_positional(text, &scan::VALUE_PREFIXED, |caps, _| {
            let kind = scan::pointer_kind(&caps[2]);
            self.push(TypedRef::for_capacity(kind, &caps[3]));
        });
        scan::visit_positional(text, &scan::VALUE_GENERIC, |caps, _| {
            let body = &caps[1];
            if scan::has_pointer_prefix(body) {
                return;
            }
            self.push_all(classify_target(body));
        });
        scan::visit_positional(text, &scan::TABLE_WRAPPED, |caps, _| {
            self.push(TypedRef::Table(caps[1].to_string()));
        });
        scan::visit_positional(text, &scan::BARE_POINTER, |caps, _| {
            let kind = scan::pointer_kind(&caps[2]);
            self.push(TypedRef::for_capacity(kind, &caps[3]));
        });
        for re in [&scan::BARE_UUID, &scan::BARE_GENERATED, &scan::BARE_SHARED] {
            scan::visit_positional(text, re, |caps, prev| {
                if scan::glued_to_previous(prev) {
                    return;
                }
                self.push_all(classify_target(&caps[0]));
            });
        }
    }

    fn finish(self) -> Vec<TypedRef> {
        self.out
    }
}

/// Every reference embedded in a formula's token sequence.
pub fn extract_formula(formula: &Formula) -> Vec<TypedRef> {
    let mut c = Collector::new();
    for token in &formula.tokens {
        if let FormulaToken::Ref { target } = token {
            c.push_all(classify_target(target));
        }
    }
    if let Ok(serialized) = serde_json::to_string(&formula.tokens) {
        c.scan_text(&serialized);
    }
    c.finish()
}

fn walk_expr(expr: &ConditionExpr, c: &mut Collector) {
    match expr {
        ConditionExpr::Ref { target } => c.push_all(classify_target(target)),
        ConditionExpr::Literal { .. } => {}
        ConditionExpr::Compare { left, right, .. } => {
            walk_expr(left, c);
            walk_expr(right, c);
        }
    }
}

fn walk_actions(actions: &[ConditionAction], c: &mut Collector) {
    for action in actions {
        for raw in &action.node_ids {
            c.push_all(classify_target(raw));
        }
    }
}

/// Every reference embedded in a condition's nested condition-set.
pub fn extract_condition(condition: &Condition) -> Vec<TypedRef> {
    let mut c = Collector::new();
    for branch in &condition.set.branches {
        walk_expr(&branch.when, &mut c);
        walk_actions(&branch.actions, &mut c);
    }
    if let Some(fallback) = &condition.set.fallback {
        walk_actions(&fallback.actions, &mut c);
    }
    if let Ok(serialized) = serde_json::to_string(&condition.set) {
        c.scan_text(&serialized);
    }
    c.finish()
}

/// Every reference embedded in a table's lookup config, columns and rows.
pub fn extract_table(table: &Table) -> Vec<TypedRef> {
    let mut c = Collector::new();
    if let Some(lookup) = &table.meta.lookup {
        for raw in lookup.selectors.iter().chain(lookup.filters.iter()) {
            c.push_all(classify_target(raw));
        }
    }
    // Columns, rows and metadata all scanned as text: cell values are
    // free-form JSON.
    for part in [
        serde_json::to_string(&table.columns),
        serde_json::to_string(&table.rows),
        serde_json::to_string(&table.meta),
    ]
    .into_iter()
    .flatten()
    {
        c.scan_text(&part);
    }
    c.finish()
}

/// Dispatch over the three capacity families.
pub fn extract_payload(payload: &CapacityPayload) -> Vec<TypedRef> {
    match payload {
        CapacityPayload::Formula(f) => extract_formula(f),
        CapacityPayload::Condition(c) => extract_condition(c),
        CapacityPayload::Table(t) => extract_table(t),
    }
}

//! Kind-aware, idempotent reference rewriting.
//!
//! The rewriting rule is deliberately narrow: a reference changes only
//! when its (suffix-stripped) identifier is present in the [`IdMap`].
//! Shared references never change, and identifiers pointing outside the
//! cloned subtree never change — rewriting them would corrupt an
//! unrelated node. Because candidates are stripped with the shape-aware
//! predicate before lookup, and the map is keyed by both bare and
//! suffixed forms, re-running a rewrite is always a no-op.

use rustc_hash::FxHashMap;
use serde_json::Value;

use ramify_common::{
    id, CapacityKind, CapacityPayload, Condition, ConditionAction, ConditionExpr, ConditionSet,
    Formula, FormulaToken, Table,
};

use crate::scan;

/// Old-id to new-id correspondence for one duplication, kept per kind so
/// a formula id and a node id that happen to collide never cross-map.
#[derive(Debug, Clone, Default)]
pub struct IdMap {
    suffix: u32,
    nodes: FxHashMap<String, String>,
    formulas: FxHashMap<String, String>,
    conditions: FxHashMap<String, String>,
    tables: FxHashMap<String, String>,
}

impl IdMap {
    pub fn new(suffix: u32) -> Self {
        IdMap {
            suffix,
            ..IdMap::default()
        }
    }

    pub fn suffix(&self) -> u32 {
        self.suffix
    }

    /// Key the map by the template id and by the copy id itself, so a
    /// re-entrant rewrite that sees the already-suffixed form resolves to
    /// the same target instead of growing a second suffix.
    fn insert_into(map: &mut FxHashMap<String, String>, template_id: &str, copy_id: String) {
        map.insert(template_id.to_string(), copy_id.clone());
        map.insert(copy_id.clone(), copy_id);
    }

    pub fn insert_node(&mut self, template_id: &str) -> String {
        let copy = id::with_suffix(template_id, self.suffix);
        Self::insert_into(&mut self.nodes, template_id, copy.clone());
        copy
    }

    pub fn insert_formula(&mut self, template_id: &str) -> String {
        let copy = id::with_suffix(template_id, self.suffix);
        Self::insert_into(&mut self.formulas, template_id, copy.clone());
        copy
    }

    pub fn insert_condition(&mut self, template_id: &str) -> String {
        let copy = id::with_suffix(template_id, self.suffix);
        Self::insert_into(&mut self.conditions, template_id, copy.clone());
        copy
    }

    pub fn insert_table(&mut self, template_id: &str) -> String {
        let copy = id::with_suffix(template_id, self.suffix);
        Self::insert_into(&mut self.tables, template_id, copy.clone());
        copy
    }

    pub fn insert_capacity(&mut self, kind: CapacityKind, template_id: &str) -> String {
        match kind {
            CapacityKind::Formula => self.insert_formula(template_id),
            CapacityKind::Condition => self.insert_condition(template_id),
            CapacityKind::Table => self.insert_table(template_id),
        }
    }

    fn lookup<'a>(map: &'a FxHashMap<String, String>, raw: &str) -> Option<&'a str> {
        map.get(raw)
            .or_else(|| map.get(id::strip_copy_suffix(raw)))
            .map(String::as_str)
    }

    /// Resolve a node reference that may already carry a copy suffix.
    pub fn node_target(&self, raw: &str) -> Option<&str> {
        Self::lookup(&self.nodes, raw)
    }

    pub fn capacity_target(&self, kind: CapacityKind, raw: &str) -> Option<&str> {
        match kind {
            CapacityKind::Formula => Self::lookup(&self.formulas, raw),
            CapacityKind::Condition => Self::lookup(&self.conditions, raw),
            CapacityKind::Table => Self::lookup(&self.tables, raw),
        }
    }
}

fn rewrite_pointer_or_id(body: &str, map: &IdMap) -> String {
    for (prefix, kind) in scan::POINTER_PREFIXES {
        if let Some(id_part) = body.strip_prefix(prefix) {
            let target = map.capacity_target(kind, id_part).unwrap_or(id_part);
            return format!("{prefix}{target}");
        }
    }
    let (stem, _) = id::split_copy_suffix(body);
    if id::is_shared_ref(stem) {
        return body.to_string();
    }
    match map.node_target(body) {
        Some(target) => target.to_string(),
        None => body.to_string(),
    }
}

/// Rewrite one raw reference string from a structural position, keeping
/// whatever wrapper (`@value.`, `@table.`, legacy pointer prefix) it came
/// in with.
pub fn rewrite_ref_target(target: &str, map: &IdMap) -> String {
    if let Some(body) = target.strip_prefix("@value.") {
        return format!("@value.{}", rewrite_pointer_or_id(body, map));
    }
    if let Some(body) = target.strip_prefix("@table.") {
        let mapped = map
            .capacity_target(CapacityKind::Table, body)
            .unwrap_or(body);
        return format!("@table.{mapped}");
    }
    rewrite_pointer_or_id(target, map)
}

/// Rewrite every recognizable reference inside free-form text.
pub fn rewrite_str(text: &str, map: &IdMap) -> String {
    let mut out = scan::replace_positional(text, &scan::VALUE_PREFIXED, |caps, _| {
        let legacy = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let kind_word = &caps[2];
        let target = map.capacity_target(scan::pointer_kind(kind_word), &caps[3])?;
        Some(format!("@value.{legacy}{kind_word}:{target}"))
    });
    out = scan::replace_positional(&out, &scan::VALUE_GENERIC, |caps, _| {
        let body = &caps[1];
        if scan::has_pointer_prefix(body) {
            return None;
        }
        if id::is_shared_ref(id::strip_copy_suffix(body)) {
            return None;
        }
        let target = map.node_target(body)?;
        Some(format!("@value.{target}"))
    });
    out = scan::replace_positional(&out, &scan::TABLE_WRAPPED, |caps, _| {
        let target = map.capacity_target(CapacityKind::Table, &caps[1])?;
        Some(format!("@table.{target}"))
    });
    out = scan::replace_positional(&out, &scan::BARE_POINTER, |caps, _| {
        let legacy = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let kind_word = &caps[2];
        let target = map.capacity_target(scan::pointer_kind(kind_word), &caps[3])?;
        Some(format!("{legacy}{kind_word}:{target}"))
    });
    for re in [&scan::BARE_UUID, &scan::BARE_GENERATED] {
        out = scan::replace_positional(&out, re, |caps, prev| {
            if scan::glued_to_previous(prev) {
                return None;
            }
            map.node_target(&caps[0]).map(str::to_string)
        });
    }
    // Shared references are left exactly as written.
    out
}

/// Rewrite strings nested anywhere inside a JSON value. Object keys are
/// left alone; only values are reference positions.
pub fn rewrite_value(value: &Value, map: &IdMap) -> Value {
    match value {
        Value::String(s) => Value::String(rewrite_str(s, map)),
        Value::Array(items) => Value::Array(items.iter().map(|v| rewrite_value(v, map)).collect()),
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), rewrite_value(v, map)))
                .collect(),
        ),
        other => other.clone(),
    }
}

pub fn rewrite_tokens(tokens: &[FormulaToken], map: &IdMap) -> Vec<FormulaToken> {
    tokens
        .iter()
        .map(|token| match token {
            FormulaToken::Ref { target } => FormulaToken::Ref {
                target: rewrite_ref_target(target, map),
            },
            FormulaToken::Text { value } => FormulaToken::Text {
                value: rewrite_str(value, map),
            },
            other => other.clone(),
        })
        .collect()
}

fn rewrite_expr(expr: &ConditionExpr, map: &IdMap) -> ConditionExpr {
    match expr {
        ConditionExpr::Ref { target } => ConditionExpr::Ref {
            target: rewrite_ref_target(target, map),
        },
        ConditionExpr::Literal { value } => ConditionExpr::Literal {
            value: rewrite_value(value, map),
        },
        ConditionExpr::Compare { op, left, right } => ConditionExpr::Compare {
            op: *op,
            left: Box::new(rewrite_expr(left, map)),
            right: Box::new(rewrite_expr(right, map)),
        },
    }
}

fn rewrite_actions(actions: &[ConditionAction], map: &IdMap) -> Vec<ConditionAction> {
    actions
        .iter()
        .map(|action| ConditionAction {
            kind: action.kind.clone(),
            node_ids: action
                .node_ids
                .iter()
                .map(|raw| rewrite_ref_target(raw, map))
                .collect(),
        })
        .collect()
}

pub fn rewrite_condition_set(set: &ConditionSet, map: &IdMap) -> ConditionSet {
    ConditionSet {
        branches: set
            .branches
            .iter()
            .map(|branch| ramify_common::ConditionBranch {
                when: rewrite_expr(&branch.when, map),
                actions: rewrite_actions(&branch.actions, map),
            })
            .collect(),
        fallback: set
            .fallback
            .as_ref()
            .map(|fb| ramify_common::ConditionFallback {
                actions: rewrite_actions(&fb.actions, map),
            }),
    }
}

pub fn rewrite_table(table: &Table, map: &IdMap) -> Table {
    let mut rewritten = table.clone();
    for column in &mut rewritten.columns {
        column.label = rewrite_str(&column.label, map);
    }
    for row in &mut rewritten.rows {
        for cell in row.cells.values_mut() {
            *cell = rewrite_value(cell, map);
        }
    }
    if let Some(lookup) = &mut rewritten.meta.lookup {
        for selector in lookup.selectors.iter_mut().chain(lookup.filters.iter_mut()) {
            *selector = rewrite_ref_target(selector, map);
        }
    }
    rewritten.meta.extra = match rewrite_value(&Value::Object(rewritten.meta.extra.clone()), map) {
        Value::Object(extra) => extra,
        _ => unreachable!("object rewrites to object"),
    };
    rewritten
}

/// Rewrite a capacity payload's innards. Identity fields (`id`,
/// `node_id`) are the executor's business and stay untouched here.
pub fn rewrite_payload(payload: &CapacityPayload, map: &IdMap) -> CapacityPayload {
    match payload {
        CapacityPayload::Formula(f) => CapacityPayload::Formula(Formula {
            id: f.id.clone(),
            node_id: f.node_id.clone(),
            name: f.name.clone(),
            tokens: rewrite_tokens(&f.tokens, map),
        }),
        CapacityPayload::Condition(c) => CapacityPayload::Condition(Condition {
            id: c.id.clone(),
            node_id: c.node_id.clone(),
            name: c.name.clone(),
            set: rewrite_condition_set(&c.set, map),
        }),
        CapacityPayload::Table(t) => CapacityPayload::Table(rewrite_table(t, map)),
    }
}

//! Capacity payloads: the static definitions of formulas, conditions and
//! lookup tables attached to nodes.
//!
//! These are the structures the duplication engine clones and rewrites.
//! Evaluation is someone else's job; nothing here executes.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The three capacity families a node can own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapacityKind {
    Formula,
    Condition,
    Table,
}

impl fmt::Display for CapacityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CapacityKind::Formula => "formula",
            CapacityKind::Condition => "condition",
            CapacityKind::Table => "table",
        })
    }
}

/// One token of a formula's ordered token sequence.
///
/// `Ref` targets carry raw reference strings (`@value.<id>`,
/// `formula:<id>`, or a bare id); `Text` tokens are free-form and may
/// still embed identifiers, which is why extraction always runs a string
/// scan on top of the structural walk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FormulaToken {
    Op { symbol: String },
    Number { value: f64 },
    Text { value: String },
    Ref { target: String },
}

impl FormulaToken {
    pub fn op(symbol: impl Into<String>) -> Self {
        FormulaToken::Op {
            symbol: symbol.into(),
        }
    }

    pub fn number(value: f64) -> Self {
        FormulaToken::Number { value }
    }

    pub fn text(value: impl Into<String>) -> Self {
        FormulaToken::Text {
            value: value.into(),
        }
    }

    pub fn reference(target: impl Into<String>) -> Self {
        FormulaToken::Ref {
            target: target.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Formula {
    pub id: String,
    pub node_id: String,
    pub name: String,
    pub tokens: Vec<FormulaToken>,
}

/// A leaf or comparison inside a condition branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionExpr {
    /// A reference leaf: `@value.<id>`, `formula:<id>`, `condition:<id>`.
    Ref { target: String },
    /// A constant leaf.
    Literal { value: Value },
    /// `when { left, op, right }`.
    Compare {
        op: CompareOp,
        left: Box<ConditionExpr>,
        right: Box<ConditionExpr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    IsEmpty,
    NotEmpty,
}

/// What a branch does when its `when` holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionAction {
    pub kind: String,
    #[serde(default)]
    pub node_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionBranch {
    pub when: ConditionExpr,
    #[serde(default)]
    pub actions: Vec<ConditionAction>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConditionFallback {
    #[serde(default)]
    pub actions: Vec<ConditionAction>,
}

/// The nested condition-set a condition capacity stores.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConditionSet {
    #[serde(default)]
    pub branches: Vec<ConditionBranch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<ConditionFallback>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub id: String,
    pub node_id: String,
    pub name: String,
    pub set: ConditionSet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableColumn {
    pub key: String,
    pub label: String,
}

/// One table row: column key to cell value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableRow {
    #[serde(default)]
    pub cells: serde_json::Map<String, Value>,
}

/// Lookup configuration a table may declare: which nodes drive the row
/// selection and which column carries the result.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LookupConfig {
    #[serde(default)]
    pub selectors: Vec<String>,
    #[serde(default)]
    pub filters: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_column: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup: Option<LookupConfig>,
    #[serde(default)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub id: String,
    pub node_id: String,
    pub name: String,
    #[serde(default)]
    pub columns: Vec<TableColumn>,
    #[serde(default)]
    pub rows: Vec<TableRow>,
    #[serde(default)]
    pub meta: TableMeta,
}

/// A capacity row of any kind, used wherever the engine handles the three
/// families uniformly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CapacityPayload {
    Formula(Formula),
    Condition(Condition),
    Table(Table),
}

impl CapacityPayload {
    pub fn kind(&self) -> CapacityKind {
        match self {
            CapacityPayload::Formula(_) => CapacityKind::Formula,
            CapacityPayload::Condition(_) => CapacityKind::Condition,
            CapacityPayload::Table(_) => CapacityKind::Table,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            CapacityPayload::Formula(f) => &f.id,
            CapacityPayload::Condition(c) => &c.id,
            CapacityPayload::Table(t) => &t.id,
        }
    }

    pub fn node_id(&self) -> &str {
        match self {
            CapacityPayload::Formula(f) => &f.node_id,
            CapacityPayload::Condition(c) => &c.node_id,
            CapacityPayload::Table(t) => &t.node_id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            CapacityPayload::Formula(f) => &f.name,
            CapacityPayload::Condition(c) => &c.name,
            CapacityPayload::Table(t) => &t.name,
        }
    }
}

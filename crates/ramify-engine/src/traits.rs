//! The store boundary the engine runs against.
//!
//! The engine never talks to a database directly: it reads through
//! [`NodeStore`] and writes exactly once per duplication, through
//! [`NodeStore::apply`], which backends must make all-or-nothing.

use ramify_common::{
    id, CapacityKind, CapacityPayload, Condition, Formula, Node, StoreError, Table, Variable,
};

/// One mutation inside a write batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    InsertNode(Node),
    InsertVariable(Variable),
    InsertFormula(Formula),
    InsertCondition(Condition),
    InsertTable(Table),
    /// Re-derive a node's capacity flags and link lists.
    UpdateNodeLinks {
        node_id: String,
        has_formula: bool,
        has_condition: bool,
        has_table: bool,
        linked_variable_ids: Vec<String>,
        linked_table_ids: Vec<String>,
    },
    UpdateNodeMetadata {
        node_id: String,
        metadata: serde_json::Map<String, serde_json::Value>,
    },
    /// Remove a node together with every variable and capacity it owns,
    /// keeping deletion symmetric with creation.
    DeleteNodeCascade { node_id: String },
}

/// An ordered, atomically-applied set of mutations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    pub ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        WriteBatch::default()
    }

    #[inline]
    pub fn push(&mut self, op: WriteOp) {
        self.ops.push(op);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ops.len()
    }
}

/// Typed CRUD over the configuration model plus the suffix query the
/// allocator needs.
pub trait NodeStore: Send + Sync {
    fn node(&self, id: &str) -> Result<Option<Node>, StoreError>;
    fn children_of(&self, parent_id: &str) -> Result<Vec<Node>, StoreError>;

    fn variable(&self, id: &str) -> Result<Option<Variable>, StoreError>;
    fn variables_of_node(&self, node_id: &str) -> Result<Vec<Variable>, StoreError>;

    fn formula(&self, id: &str) -> Result<Option<Formula>, StoreError>;
    fn condition(&self, id: &str) -> Result<Option<Condition>, StoreError>;
    fn table(&self, id: &str) -> Result<Option<Table>, StoreError>;

    fn formulas_of_node(&self, node_id: &str) -> Result<Vec<Formula>, StoreError>;
    fn conditions_of_node(&self, node_id: &str) -> Result<Vec<Condition>, StoreError>;
    fn tables_of_node(&self, node_id: &str) -> Result<Vec<Table>, StoreError>;

    /// Every copy suffix in use for `base_id`, across all entity tables.
    /// Matching goes through [`ramify_common::id::copy_suffix_of`]; a
    /// backend must not substitute its own trailing-digits heuristic.
    fn copy_suffixes_of(&self, base_id: &str) -> Result<Vec<u32>, StoreError>;

    /// Apply the batch atomically: either every op lands or none do.
    fn apply(&self, batch: WriteBatch) -> Result<(), StoreError>;

    fn capacity(
        &self,
        kind: CapacityKind,
        id: &str,
    ) -> Result<Option<CapacityPayload>, StoreError> {
        Ok(match kind {
            CapacityKind::Formula => self.formula(id)?.map(CapacityPayload::Formula),
            CapacityKind::Condition => self.condition(id)?.map(CapacityPayload::Condition),
            CapacityKind::Table => self.table(id)?.map(CapacityPayload::Table),
        })
    }

    fn node_exists(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.node(id)?.is_some())
    }

    fn variable_exists(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.variable(id)?.is_some())
    }

    fn capacity_exists(&self, kind: CapacityKind, id: &str) -> Result<bool, StoreError> {
        Ok(self.capacity(kind, id)?.is_some())
    }

    /// Convenience over [`NodeStore::copy_suffixes_of`]: the highest
    /// suffix in use for `base_id`, zero when it has no copies.
    fn max_copy_suffix(&self, base_id: &str) -> Result<u32, StoreError> {
        Ok(self
            .copy_suffixes_of(id::strip_copy_suffix(base_id))?
            .into_iter()
            .max()
            .unwrap_or(0))
    }
}

//! Minimal in-memory store for unit tests inside this crate. The real
//! backend lives in `ramify-store`; this one only knows enough to feed
//! the engine.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use ramify_common::{
    id, Condition, Formula, Node, StoreError, Table, Variable,
};

use crate::traits::{NodeStore, WriteBatch, WriteOp};

#[derive(Default)]
struct Tables {
    nodes: FxHashMap<String, Node>,
    variables: FxHashMap<String, Variable>,
    formulas: FxHashMap<String, Formula>,
    conditions: FxHashMap<String, Condition>,
    tables: FxHashMap<String, Table>,
}

#[derive(Default)]
pub struct TestStore {
    inner: RwLock<Tables>,
}

impl TestStore {
    pub fn new() -> Self {
        TestStore::default()
    }

    pub fn seed_node(&self, node: Node) {
        self.inner.write().nodes.insert(node.id.clone(), node);
    }

    pub fn seed_variable(&self, variable: Variable) {
        self.inner
            .write()
            .variables
            .insert(variable.id.clone(), variable);
    }

    pub fn seed_formula(&self, formula: Formula) {
        self.inner
            .write()
            .formulas
            .insert(formula.id.clone(), formula);
    }

    pub fn seed_condition(&self, condition: Condition) {
        self.inner
            .write()
            .conditions
            .insert(condition.id.clone(), condition);
    }

    pub fn seed_table(&self, table: Table) {
        self.inner.write().tables.insert(table.id.clone(), table);
    }
}

fn sorted_by_id<T>(mut rows: Vec<T>, key: impl Fn(&T) -> &str) -> Vec<T> {
    rows.sort_by(|a, b| key(a).cmp(key(b)));
    rows
}

impl NodeStore for TestStore {
    fn node(&self, node_id: &str) -> Result<Option<Node>, StoreError> {
        Ok(self.inner.read().nodes.get(node_id).cloned())
    }

    fn children_of(&self, parent_id: &str) -> Result<Vec<Node>, StoreError> {
        let rows = self
            .inner
            .read()
            .nodes
            .values()
            .filter(|n| n.parent_id.as_deref() == Some(parent_id))
            .cloned()
            .collect();
        Ok(sorted_by_id(rows, |n: &Node| &n.id))
    }

    fn variable(&self, variable_id: &str) -> Result<Option<Variable>, StoreError> {
        Ok(self.inner.read().variables.get(variable_id).cloned())
    }

    fn variables_of_node(&self, node_id: &str) -> Result<Vec<Variable>, StoreError> {
        let rows = self
            .inner
            .read()
            .variables
            .values()
            .filter(|v| v.node_id == node_id)
            .cloned()
            .collect();
        Ok(sorted_by_id(rows, |v: &Variable| &v.id))
    }

    fn formula(&self, formula_id: &str) -> Result<Option<Formula>, StoreError> {
        Ok(self.inner.read().formulas.get(formula_id).cloned())
    }

    fn condition(&self, condition_id: &str) -> Result<Option<Condition>, StoreError> {
        Ok(self.inner.read().conditions.get(condition_id).cloned())
    }

    fn table(&self, table_id: &str) -> Result<Option<Table>, StoreError> {
        Ok(self.inner.read().tables.get(table_id).cloned())
    }

    fn formulas_of_node(&self, node_id: &str) -> Result<Vec<Formula>, StoreError> {
        let rows = self
            .inner
            .read()
            .formulas
            .values()
            .filter(|f| f.node_id == node_id)
            .cloned()
            .collect();
        Ok(sorted_by_id(rows, |f: &Formula| &f.id))
    }

    fn conditions_of_node(&self, node_id: &str) -> Result<Vec<Condition>, StoreError> {
        let rows = self
            .inner
            .read()
            .conditions
            .values()
            .filter(|c| c.node_id == node_id)
            .cloned()
            .collect();
        Ok(sorted_by_id(rows, |c: &Condition| &c.id))
    }

    fn tables_of_node(&self, node_id: &str) -> Result<Vec<Table>, StoreError> {
        let rows = self
            .inner
            .read()
            .tables
            .values()
            .filter(|t| t.node_id == node_id)
            .cloned()
            .collect();
        Ok(sorted_by_id(rows, |t: &Table| &t.id))
    }

    fn copy_suffixes_of(&self, base_id: &str) -> Result<Vec<u32>, StoreError> {
        let inner = self.inner.read();
        let mut suffixes: Vec<u32> = inner
            .nodes
            .keys()
            .chain(inner.variables.keys())
            .chain(inner.formulas.keys())
            .chain(inner.conditions.keys())
            .chain(inner.tables.keys())
            .filter_map(|candidate| id::copy_suffix_of(candidate, base_id))
            .collect();
        suffixes.sort_unstable();
        suffixes.dedup();
        Ok(suffixes)
    }

    fn apply(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        // Validate before mutating so a failing batch leaves no trace.
        for op in &batch.ops {
            match op {
                WriteOp::InsertNode(node) if inner.nodes.contains_key(&node.id) => {
                    return Err(StoreError::Conflict {
                        table: "nodes",
                        id: node.id.clone(),
                    });
                }
                WriteOp::InsertVariable(v) if inner.variables.contains_key(&v.id) => {
                    return Err(StoreError::Conflict {
                        table: "variables",
                        id: v.id.clone(),
                    });
                }
                WriteOp::UpdateNodeLinks { node_id, .. }
                | WriteOp::UpdateNodeMetadata { node_id, .. }
                | WriteOp::DeleteNodeCascade { node_id }
                    if !inner.nodes.contains_key(node_id) =>
                {
                    return Err(StoreError::Missing {
                        entity: "node",
                        id: node_id.clone(),
                    });
                }
                _ => {}
            }
        }
        for op in batch.ops {
            match op {
                WriteOp::InsertNode(node) => {
                    inner.nodes.insert(node.id.clone(), node);
                }
                WriteOp::InsertVariable(v) => {
                    inner.variables.insert(v.id.clone(), v);
                }
                WriteOp::InsertFormula(f) => {
                    inner.formulas.insert(f.id.clone(), f);
                }
                WriteOp::InsertCondition(c) => {
                    inner.conditions.insert(c.id.clone(), c);
                }
                WriteOp::InsertTable(t) => {
                    inner.tables.insert(t.id.clone(), t);
                }
                WriteOp::UpdateNodeLinks {
                    node_id,
                    has_formula,
                    has_condition,
                    has_table,
                    linked_variable_ids,
                    linked_table_ids,
                } => {
                    if let Some(node) = inner.nodes.get_mut(&node_id) {
                        node.has_formula = has_formula;
                        node.has_condition = has_condition;
                        node.has_table = has_table;
                        node.linked_variable_ids = linked_variable_ids;
                        node.linked_table_ids = linked_table_ids;
                    }
                }
                WriteOp::UpdateNodeMetadata { node_id, metadata } => {
                    if let Some(node) = inner.nodes.get_mut(&node_id) {
                        node.metadata = metadata;
                    }
                }
                WriteOp::DeleteNodeCascade { node_id } => {
                    inner.nodes.remove(&node_id);
                    inner.variables.retain(|_, v| v.node_id != node_id);
                    inner.formulas.retain(|_, f| f.node_id != node_id);
                    inner.conditions.retain(|_, c| c.node_id != node_id);
                    inner.tables.retain(|_, t| t.node_id != node_id);
                }
            }
        }
        Ok(())
    }
}

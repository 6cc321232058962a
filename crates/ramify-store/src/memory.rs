//! In-memory `NodeStore` backend.
//!
//! Batches are staged against a copy of the tables and swapped in whole,
//! so a failing op anywhere in a batch leaves the store untouched —
//! readers never observe a partial duplication.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use ramify_common::{id, Condition, Formula, Node, StoreError, Table, Variable};
use ramify_engine::{NodeStore, WriteBatch, WriteOp};

#[derive(Debug, Default, Clone)]
struct Tables {
    nodes: FxHashMap<String, Node>,
    variables: FxHashMap<String, Variable>,
    formulas: FxHashMap<String, Formula>,
    conditions: FxHashMap<String, Condition>,
    tables: FxHashMap<String, Table>,
}

impl Tables {
    fn apply(&mut self, op: WriteOp) -> Result<(), StoreError> {
        match op {
            WriteOp::InsertNode(node) => {
                if self.nodes.contains_key(&node.id) {
                    return Err(StoreError::Conflict {
                        table: "nodes",
                        id: node.id,
                    });
                }
                self.nodes.insert(node.id.clone(), node);
            }
            WriteOp::InsertVariable(variable) => {
                if self.variables.contains_key(&variable.id) {
                    return Err(StoreError::Conflict {
                        table: "variables",
                        id: variable.id,
                    });
                }
                self.variables.insert(variable.id.clone(), variable);
            }
            WriteOp::InsertFormula(formula) => {
                if self.formulas.contains_key(&formula.id) {
                    return Err(StoreError::Conflict {
                        table: "formulas",
                        id: formula.id,
                    });
                }
                self.formulas.insert(formula.id.clone(), formula);
            }
            WriteOp::InsertCondition(condition) => {
                if self.conditions.contains_key(&condition.id) {
                    return Err(StoreError::Conflict {
                        table: "conditions",
                        id: condition.id,
                    });
                }
                self.conditions.insert(condition.id.clone(), condition);
            }
            WriteOp::InsertTable(table) => {
                if self.tables.contains_key(&table.id) {
                    return Err(StoreError::Conflict {
                        table: "tables",
                        id: table.id,
                    });
                }
                self.tables.insert(table.id.clone(), table);
            }
            WriteOp::UpdateNodeLinks {
                node_id,
                has_formula,
                has_condition,
                has_table,
                linked_variable_ids,
                linked_table_ids,
            } => {
                let node = self.nodes.get_mut(&node_id).ok_or(StoreError::Missing {
                    entity: "node",
                    id: node_id,
                })?;
                node.has_formula = has_formula;
                node.has_condition = has_condition;
                node.has_table = has_table;
                node.linked_variable_ids = linked_variable_ids;
                node.linked_table_ids = linked_table_ids;
            }
            WriteOp::UpdateNodeMetadata { node_id, metadata } => {
                let node = self.nodes.get_mut(&node_id).ok_or(StoreError::Missing {
                    entity: "node",
                    id: node_id,
                })?;
                node.metadata = metadata;
            }
            WriteOp::DeleteNodeCascade { node_id } => {
                if self.nodes.remove(&node_id).is_none() {
                    return Err(StoreError::Missing {
                        entity: "node",
                        id: node_id,
                    });
                }
                self.variables.retain(|_, v| v.node_id != node_id);
                self.formulas.retain(|_, f| f.node_id != node_id);
                self.conditions.retain(|_, c| c.node_id != node_id);
                self.tables.retain(|_, t| t.node_id != node_id);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    inner: RwLock<Tables>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend::default()
    }

    /// Seed a row directly, bypassing batch semantics. Intended for
    /// fixtures and imports; duplications go through `apply`.
    pub fn insert_node(&self, node: Node) {
        self.inner.write().nodes.insert(node.id.clone(), node);
    }

    pub fn insert_variable(&self, variable: Variable) {
        self.inner
            .write()
            .variables
            .insert(variable.id.clone(), variable);
    }

    pub fn insert_formula(&self, formula: Formula) {
        self.inner
            .write()
            .formulas
            .insert(formula.id.clone(), formula);
    }

    pub fn insert_condition(&self, condition: Condition) {
        self.inner
            .write()
            .conditions
            .insert(condition.id.clone(), condition);
    }

    pub fn insert_table(&self, table: Table) {
        self.inner.write().tables.insert(table.id.clone(), table);
    }

    pub fn node_count(&self) -> usize {
        self.inner.read().nodes.len()
    }
}

fn sorted<T>(mut rows: Vec<T>, key: impl Fn(&T) -> &str) -> Vec<T> {
    rows.sort_by(|a, b| key(a).cmp(key(b)));
    rows
}

impl NodeStore for MemoryBackend {
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
        Ok(sorted(rows, |n: &Node| &n.id))
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
        Ok(sorted(rows, |v: &Variable| &v.id))
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
        Ok(sorted(rows, |f: &Formula| &f.id))
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
        Ok(sorted(rows, |c: &Condition| &c.id))
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
        Ok(sorted(rows, |t: &Table| &t.id))
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
        let mut staged = inner.clone();
        for op in batch.ops {
            staged.apply(op)?;
        }
        *inner = staged;
        Ok(())
    }
}

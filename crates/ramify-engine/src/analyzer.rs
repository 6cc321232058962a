//! Post-hoc verification: do a node's capacity flags and link lists agree
//! with the rows it actually owns?
//!
//! Findings are reports, not errors. `fix` applies flag corrections and
//! prunes dead links; it never fabricates capacity rows, because
//! recreating lost computation logic is not an automatable decision.

use serde::{Deserialize, Serialize};
use tracing::debug;

use ramify_common::{id, CapacityKind, DuplicationError, Node};

use crate::traits::{NodeStore, WriteBatch, WriteOp};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Finding {
    /// Flag is set but the node owns zero rows of that kind.
    /// `template_rows` is the original template's row count, when the
    /// template could be resolved: zero there too means the flag was
    /// simply wrong, non-zero means the copy lost its capacities.
    FlagWithoutRows {
        kind: CapacityKind,
        template_rows: Option<usize>,
    },
    /// Rows exist but the flag is off.
    RowsWithoutFlag { kind: CapacityKind, rows: usize },
    /// Link list entry pointing at a variable row that does not exist.
    StaleVariableLink { variable_id: String },
    /// Link list entry pointing at a table row that does not exist.
    StaleTableLink { table_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Remediation {
    CorrectFlag { kind: CapacityKind, to: bool },
    /// Re-run the copier for this capacity kind; not applied by `fix`.
    RecopyCapacity { kind: CapacityKind },
    PruneLink,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mismatch {
    pub node_id: String,
    pub finding: Finding,
    pub remediation: Remediation,
}

fn load_node(store: &dyn NodeStore, node_id: &str) -> Result<Node, DuplicationError> {
    store
        .node(node_id)?
        .ok_or_else(|| DuplicationError::NotFound(node_id.to_string()))
}

/// The template a copy came from: copy metadata first, suffix math as the
/// fallback for rows written before metadata stamping existed.
fn template_of(node: &Node) -> Option<String> {
    if let Some(source) = node
        .metadata
        .get("source_template_id")
        .and_then(|v| v.as_str())
    {
        return Some(source.to_string());
    }
    let (stem, suffix) = id::split_copy_suffix(&node.id);
    suffix.map(|_| stem.to_string())
}

fn rows_of(
    store: &dyn NodeStore,
    node_id: &str,
    kind: CapacityKind,
) -> Result<usize, DuplicationError> {
    Ok(match kind {
        CapacityKind::Formula => store.formulas_of_node(node_id)?.len(),
        CapacityKind::Condition => store.conditions_of_node(node_id)?.len(),
        CapacityKind::Table => store.tables_of_node(node_id)?.len(),
    })
}

/// Compare `node_id`'s flags and link lists against its real rows.
pub fn analyze(
    store: &dyn NodeStore,
    node_id: &str,
) -> Result<Vec<Mismatch>, DuplicationError> {
    let node = load_node(store, node_id)?;
    let template_id = template_of(&node);
    let mut findings = Vec::new();

    let flags = [
        (CapacityKind::Formula, node.has_formula),
        (CapacityKind::Condition, node.has_condition),
        (CapacityKind::Table, node.has_table),
    ];
    for (kind, flag) in flags {
        let rows = rows_of(store, node_id, kind)?;
        if flag && rows == 0 {
            let template_rows = match &template_id {
                Some(template) => Some(rows_of(store, template, kind)?),
                None => None,
            };
            let remediation = if template_rows.unwrap_or(0) > 0 {
                Remediation::RecopyCapacity { kind }
            } else {
                Remediation::CorrectFlag { kind, to: false }
            };
            findings.push(Mismatch {
                node_id: node_id.to_string(),
                finding: Finding::FlagWithoutRows {
                    kind,
                    template_rows,
                },
                remediation,
            });
        } else if !flag && rows > 0 {
            findings.push(Mismatch {
                node_id: node_id.to_string(),
                finding: Finding::RowsWithoutFlag { kind, rows },
                remediation: Remediation::CorrectFlag { kind, to: true },
            });
        }
    }

    for variable_id in &node.linked_variable_ids {
        if store.variable(variable_id)?.is_none() {
            findings.push(Mismatch {
                node_id: node_id.to_string(),
                finding: Finding::StaleVariableLink {
                    variable_id: variable_id.clone(),
                },
                remediation: Remediation::PruneLink,
            });
        }
    }
    for table_id in &node.linked_table_ids {
        if store.table(table_id)?.is_none() {
            findings.push(Mismatch {
                node_id: node_id.to_string(),
                finding: Finding::StaleTableLink {
                    table_id: table_id.clone(),
                },
                remediation: Remediation::PruneLink,
            });
        }
    }

    Ok(findings)
}

/// Apply flag corrections and link pruning from `mismatches`. Returns the
/// number of findings applied; `RecopyCapacity` findings are skipped.
pub fn fix(
    store: &dyn NodeStore,
    node_id: &str,
    mismatches: &[Mismatch],
) -> Result<usize, DuplicationError> {
    let node = load_node(store, node_id)?;
    let mut has_formula = node.has_formula;
    let mut has_condition = node.has_condition;
    let mut has_table = node.has_table;
    let mut linked_variable_ids = node.linked_variable_ids.clone();
    let mut linked_table_ids = node.linked_table_ids.clone();
    let mut applied = 0usize;

    for mismatch in mismatches {
        if mismatch.node_id != node_id {
            continue;
        }
        match (&mismatch.remediation, &mismatch.finding) {
            (Remediation::CorrectFlag { kind, to }, _) => {
                match kind {
                    CapacityKind::Formula => has_formula = *to,
                    CapacityKind::Condition => has_condition = *to,
                    CapacityKind::Table => has_table = *to,
                }
                applied += 1;
            }
            (Remediation::PruneLink, Finding::StaleVariableLink { variable_id }) => {
                linked_variable_ids.retain(|v| v != variable_id);
                applied += 1;
            }
            (Remediation::PruneLink, Finding::StaleTableLink { table_id }) => {
                linked_table_ids.retain(|t| t != table_id);
                applied += 1;
            }
            (Remediation::RecopyCapacity { kind }, _) => {
                debug!(
                    node = node_id,
                    kind = %kind,
                    "recopy finding left for the copier; fix never fabricates rows"
                );
            }
            (Remediation::PruneLink, _) => {}
        }
    }

    if applied == 0 {
        return Ok(0);
    }

    let mut batch = WriteBatch::new();
    batch.push(WriteOp::UpdateNodeLinks {
        node_id: node_id.to_string(),
        has_formula,
        has_condition,
        has_table,
        linked_variable_ids,
        linked_table_ids,
    });
    store.apply(batch)?;
    Ok(applied)
}

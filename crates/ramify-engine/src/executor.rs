//! Plan execution: one atomic write batch per duplication.
//!
//! The executor turns a blueprint and its plan into concrete rows. It
//! owns the two rules history punished the original system for breaking:
//! capacity flags and link lists are recomputed from what is actually
//! being created, never copied verbatim from the template; and any
//! identifier collision aborts the whole batch instead of silently
//! re-suffixing.

use chrono::Utc;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use ramify_common::{
    id, CapacityKind, CapacityPayload, DuplicationError, Node, StoreError, Variable,
};
use ramify_refs::{rewrite_payload, rewrite_value, IdMap};

use crate::blueprint::Blueprint;
use crate::plan::InstantiationPlan;
use crate::registry::{RepeatScopeRegistry, ScopeEvent, ScopeId};
use crate::traits::{NodeStore, WriteBatch, WriteOp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CopyKind {
    NodeCopy,
    VariableCopy,
    CapacityCopy,
}

/// One line of the execution report: template row → copied row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopyOperation {
    #[serde(rename = "type")]
    pub kind: CopyKind,
    pub template_id: String,
    pub target_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub scope: ScopeId,
    pub suffix: u32,
    pub operations: Vec<CopyOperation>,
}

impl ExecutionReport {
    pub fn count_of(&self, kind: CopyKind) -> usize {
        self.operations.iter().filter(|op| op.kind == kind).count()
    }
}

fn mismatched_plan() -> DuplicationError {
    DuplicationError::Store(StoreError::Backend(
        "instantiation plan does not correspond to the blueprint".into(),
    ))
}

fn capacity_missing(kind: CapacityKind, capacity_id: &str, reason: &str) -> DuplicationError {
    DuplicationError::CapacityCopyFailure {
        kind,
        capacity_id: capacity_id.to_string(),
        reason: reason.to_string(),
    }
}

/// A capacity row scheduled for copying: the template payload and the id
/// of the copied node that will own it.
struct PlannedCapacity {
    payload: CapacityPayload,
    new_owner_id: String,
}

/// Execute `plan` against `store`, recording every minted id in
/// `registry` under the plan's scope. All-or-nothing: the store sees one
/// batch, and a failure before `apply` leaves it untouched.
pub fn execute(
    store: &dyn NodeStore,
    registry: &RepeatScopeRegistry,
    blueprint: &Blueprint,
    plan: &InstantiationPlan,
) -> Result<ExecutionReport, DuplicationError> {
    if plan.nodes.len() != blueprint.nodes.len()
        || plan.variables.len() != blueprint.variables.len()
    {
        return Err(mismatched_plan());
    }

    // Full id correspondence first: nodes, the capacities the templates
    // own, then the capacities variables reach outside the subtree.
    let mut map = IdMap::new(plan.suffix);
    for node in &blueprint.nodes {
        map.insert_node(&node.id);
    }
    for capacity in &blueprint.capacities {
        map.insert_capacity(capacity.payload.kind(), capacity.payload.id());
    }

    let mut planned: Vec<PlannedCapacity> = Vec::new();
    for capacity in &blueprint.capacities {
        let owner = capacity.payload.node_id();
        let new_owner_id = map
            .node_target(owner)
            .ok_or_else(|| {
                capacity_missing(
                    capacity.payload.kind(),
                    capacity.payload.id(),
                    "owner node is not part of the template snapshot",
                )
            })?
            .to_string();
        planned.push(PlannedCapacity {
            payload: capacity.payload.clone(),
            new_owner_id,
        });
    }

    // Variables may point at capacities owned outside the template set
    // (linked variables). Those rows are fetched and cloned under the
    // variable's new owner so the sourceRef invariant holds in the copy.
    for (entry, op) in blueprint.variables.iter().zip(&plan.variables) {
        if entry.variable.id != op.template_variable_id {
            return Err(mismatched_plan());
        }
        let Some(source_ref) = &entry.variable.source_ref else {
            continue;
        };
        let stem = id::strip_copy_suffix(source_ref.id());
        if map.capacity_target(source_ref.kind(), stem).is_some() {
            continue;
        }
        let payload = store.capacity(source_ref.kind(), stem)?.ok_or_else(|| {
            capacity_missing(
                source_ref.kind(),
                stem,
                "capacity row referenced by the template variable does not exist",
            )
        })?;
        map.insert_capacity(source_ref.kind(), stem);
        debug!(
            variable = entry.variable.id.as_str(),
            capacity = stem,
            "cloning out-of-subtree capacity for a linked variable"
        );
        planned.push(PlannedCapacity {
            payload,
            new_owner_id: op.target_node_id.clone(),
        });
    }

    // Fail closed before writing anything.
    for op in &plan.nodes {
        if store.node_exists(&op.new_id)? {
            return Err(DuplicationError::IdentifierCollision(op.new_id.clone()));
        }
    }
    for op in &plan.variables {
        if store.variable_exists(&op.new_id)? {
            return Err(DuplicationError::IdentifierCollision(op.new_id.clone()));
        }
    }
    for capacity in &planned {
        let kind = capacity.payload.kind();
        let new_id = map
            .capacity_target(kind, capacity.payload.id())
            .unwrap_or_default()
            .to_string();
        if store.capacity_exists(kind, &new_id)? {
            return Err(DuplicationError::IdentifierCollision(new_id));
        }
    }

    // Flags and link lists for each copied node, derived from the rows
    // this batch creates. A node copy links every variable copy it owns
    // and every variable copy its template declared a link to.
    let mut linked_variables: FxHashMap<String, Vec<String>> = FxHashMap::default();
    for (entry, op) in blueprint.variables.iter().zip(&plan.variables) {
        linked_variables
            .entry(op.target_node_id.clone())
            .or_default()
            .push(op.new_id.clone());
        for linking_template in &entry.linked_from_node_ids {
            let Some(linking_copy) = map.node_target(linking_template) else {
                continue;
            };
            let list = linked_variables.entry(linking_copy.to_string()).or_default();
            if !list.contains(&op.new_id) {
                list.push(op.new_id.clone());
            }
        }
    }
    let mut linked_tables: FxHashMap<String, Vec<String>> = FxHashMap::default();
    let mut flags: FxHashMap<String, (bool, bool, bool)> = FxHashMap::default();
    for capacity in &planned {
        let slot = flags.entry(capacity.new_owner_id.clone()).or_default();
        match capacity.payload.kind() {
            CapacityKind::Formula => slot.0 = true,
            CapacityKind::Condition => slot.1 = true,
            CapacityKind::Table => {
                slot.2 = true;
                let new_id = map
                    .capacity_target(CapacityKind::Table, capacity.payload.id())
                    .unwrap_or_default()
                    .to_string();
                linked_tables
                    .entry(capacity.new_owner_id.clone())
                    .or_default()
                    .push(new_id);
            }
        }
    }

    let stamped_at = Utc::now().to_rfc3339();
    let mut batch = WriteBatch::new();
    let mut operations = Vec::new();
    let mut events = Vec::new();

    for op in &plan.nodes {
        let template = blueprint.node(&op.template_id).ok_or_else(mismatched_plan)?;
        let mut node = copy_node(template, op.new_id.clone(), op.new_parent_id.clone(), &map);
        let (has_formula, has_condition, has_table) =
            flags.get(&op.new_id).copied().unwrap_or_default();
        node.has_formula = has_formula;
        node.has_condition = has_condition;
        node.has_table = has_table;
        node.linked_variable_ids = linked_variables.get(&op.new_id).cloned().unwrap_or_default();
        node.linked_table_ids = linked_tables.get(&op.new_id).cloned().unwrap_or_default();
        stamp_copy_metadata(&mut node, template, plan, &map, &stamped_at);

        events.push(ScopeEvent::NodeMinted {
            template_id: op.template_id.clone(),
            copy_id: op.new_id.clone(),
        });
        operations.push(CopyOperation {
            kind: CopyKind::NodeCopy,
            template_id: op.template_id.clone(),
            target_id: op.new_id.clone(),
        });
        batch.push(WriteOp::InsertNode(node));
    }

    for (entry, op) in blueprint.variables.iter().zip(&plan.variables) {
        let source_ref = match &entry.variable.source_ref {
            Some(source_ref) => {
                let stem = id::strip_copy_suffix(source_ref.id());
                let target = map.capacity_target(source_ref.kind(), stem).ok_or_else(|| {
                    capacity_missing(source_ref.kind(), stem, "capacity was not scheduled for copy")
                })?;
                Some(source_ref.retargeted(target))
            }
            None => None,
        };
        let variable = Variable {
            id: op.new_id.clone(),
            node_id: op.target_node_id.clone(),
            exposed_key: op.exposed_key.clone(),
            source_type: entry.variable.source_type,
            source_ref,
            display_name: entry.variable.display_name.clone(),
            display_format: entry.variable.display_format.clone(),
        };
        events.push(ScopeEvent::VariableMinted {
            template_id: entry.variable.id.clone(),
            copy_id: op.new_id.clone(),
            exposed_key: op.exposed_key.clone(),
        });
        operations.push(CopyOperation {
            kind: CopyKind::VariableCopy,
            template_id: entry.variable.id.clone(),
            target_id: op.new_id.clone(),
        });
        batch.push(WriteOp::InsertVariable(variable));
    }

    for capacity in &planned {
        let kind = capacity.payload.kind();
        let template_id = capacity.payload.id().to_string();
        let new_id = map
            .capacity_target(kind, &template_id)
            .unwrap_or_default()
            .to_string();
        let rewritten = rewrite_payload(&capacity.payload, &map);
        let write = match rewritten {
            CapacityPayload::Formula(mut formula) => {
                formula.id = new_id.clone();
                formula.node_id = capacity.new_owner_id.clone();
                WriteOp::InsertFormula(formula)
            }
            CapacityPayload::Condition(mut condition) => {
                condition.id = new_id.clone();
                condition.node_id = capacity.new_owner_id.clone();
                WriteOp::InsertCondition(condition)
            }
            CapacityPayload::Table(mut table) => {
                table.id = new_id.clone();
                table.node_id = capacity.new_owner_id.clone();
                WriteOp::InsertTable(table)
            }
        };
        events.push(ScopeEvent::CapacityMinted {
            kind,
            template_id: template_id.clone(),
            copy_id: new_id.clone(),
        });
        operations.push(CopyOperation {
            kind: CopyKind::CapacityCopy,
            template_id,
            target_id: new_id,
        });
        batch.push(write);
    }

    store.apply(batch)?;

    for event in events {
        registry.record(&plan.scope, event);
    }

    Ok(ExecutionReport {
        scope: plan.scope.clone(),
        suffix: plan.suffix,
        operations,
    })
}

fn copy_node(template: &Node, new_id: String, new_parent_id: Option<String>, map: &IdMap) -> Node {
    let mut node = template.clone();
    node.id = new_id;
    node.parent_id = new_parent_id;
    // A nested repeater's declaration follows the clone when its
    // templates were part of the subtree; otherwise it keeps pointing at
    // the shared originals.
    node.template_node_ids = template
        .template_node_ids
        .iter()
        .map(|tid| {
            map.node_target(tid)
                .map(str::to_string)
                .unwrap_or_else(|| tid.clone())
        })
        .collect();
    // Shared references are external constants; the list carries over.
    node.shared_reference_ids = template.shared_reference_ids.clone();
    node
}

fn stamp_copy_metadata(
    node: &mut Node,
    template: &Node,
    plan: &InstantiationPlan,
    map: &IdMap,
    at: &str,
) {
    let rewritten = rewrite_value(&Value::Object(template.metadata.clone()), map);
    let mut metadata = match rewritten {
        Value::Object(fields) => fields,
        _ => serde_json::Map::new(),
    };
    metadata.insert("source_template_id".into(), json!(template.id));
    metadata.insert("copied_from_node_id".into(), json!(template.id));
    metadata.insert(
        "duplicated_from_repeater".into(),
        json!(plan.scope.repeater_node_id),
    );
    metadata.insert("copy_suffix".into(), json!(plan.suffix));
    metadata.insert("repeat_scope_id".into(), json!(plan.scope.to_string()));
    metadata.insert("duplicated_at".into(), json!(at));
    node.metadata = metadata;
}

//! Instantiation planning: blueprint × suffix × target parent → ordered
//! copy operations with deterministic identifiers.
//!
//! `plan` is a pure function. Same inputs, same plan — which is what
//! makes duplicate detection trivial: two identical plans mean two
//! requests racing for the same suffix.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use ramify_common::id;

use crate::blueprint::Blueprint;
use crate::registry::ScopeId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeCopyOp {
    pub template_id: String,
    pub new_id: String,
    pub new_parent_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableCopyOp {
    pub template_variable_id: String,
    pub new_id: String,
    /// The copied node that receives the variable.
    pub target_node_id: String,
    pub exposed_key: String,
}

/// Ordered copy operations for one duplication. Capacity copies are not
/// pre-planned: the executor derives them, because a capacity's new
/// identity depends on which copied node ends up owning it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstantiationPlan {
    pub scope: ScopeId,
    pub suffix: u32,
    pub target_parent_id: Option<String>,
    pub nodes: Vec<NodeCopyOp>,
    pub variables: Vec<VariableCopyOp>,
}

/// Lay out the copy operations for `blueprint` under `suffix`.
pub fn plan(
    blueprint: &Blueprint,
    suffix: u32,
    target_parent_id: Option<&str>,
) -> InstantiationPlan {
    let in_subtree: FxHashSet<&str> = blueprint.nodes.iter().map(|n| n.id.as_str()).collect();
    let roots: FxHashSet<&str> = blueprint
        .template_node_ids
        .iter()
        .map(String::as_str)
        .collect();

    let nodes = blueprint
        .nodes
        .iter()
        .map(|node| {
            let new_parent_id = match &node.parent_id {
                // Intra-subtree edges survive the clone.
                Some(parent) if in_subtree.contains(parent.as_str()) => {
                    Some(id::with_suffix(parent, suffix))
                }
                _ if roots.contains(node.id.as_str()) => target_parent_id
                    .map(str::to_string)
                    .or_else(|| node.parent_id.clone()),
                other => other.clone(),
            };
            NodeCopyOp {
                template_id: node.id.clone(),
                new_id: id::with_suffix(&node.id, suffix),
                new_parent_id,
            }
        })
        .collect();

    let variables = blueprint
        .variables
        .iter()
        .map(|entry| VariableCopyOp {
            template_variable_id: entry.variable.id.clone(),
            new_id: id::with_suffix(&entry.variable.id, suffix),
            target_node_id: id::with_suffix(&entry.target_node_id, suffix),
            exposed_key: format!("{}-{}", entry.variable.exposed_key, suffix),
        })
        .collect();

    InstantiationPlan {
        scope: ScopeId::new(blueprint.repeater_node_id.clone(), suffix),
        suffix,
        target_parent_id: target_parent_id.map(str::to_string),
        nodes,
        variables,
    }
}

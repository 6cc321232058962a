//! Blueprint building: an immutable snapshot of everything a repeater
//! will clone.
//!
//! The blueprint carries plain values and no store handles, so planning
//! and collision reasoning stay deterministic and unit-testable against
//! hand-built snapshots.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use tracing::warn;

use ramify_common::{
    id, CapacityPayload, DuplicationError, Node, RepeaterConfig, Variable,
};
use ramify_refs::{extract_payload, TypedRef};

use crate::traits::NodeStore;

/// A variable to clone. Each template variable is copied exactly once per
/// duplication: `target_node_id` is the template node whose copy owns the
/// clone (the owner for directly-owned variables, the first linking node
/// otherwise), and `linked_from_node_ids` lists every template node whose
/// copy must link the clone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlueprintVariable {
    pub variable: Variable,
    pub target_node_id: String,
    #[serde(default)]
    pub linked_from_node_ids: Vec<String>,
}

/// A capacity to clone together with every cross-reference found in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlueprintCapacity {
    pub payload: CapacityPayload,
    pub refs: Vec<TypedRef>,
}

/// Immutable snapshot of a repeater's template subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
    pub repeater_node_id: String,
    pub tree_id: String,
    pub config: RepeaterConfig,
    /// Sanitized template roots, in declaration order.
    pub template_node_ids: Vec<String>,
    /// Full descendant closure of the roots, parent before child.
    pub nodes: Vec<Node>,
    pub variables: Vec<BlueprintVariable>,
    pub capacities: Vec<BlueprintCapacity>,
}

impl Blueprint {
    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == node_id)
    }
}

/// Resolve a repeater's declared template ids into live, un-suffixed
/// roots. Suffixed entries are a data-integrity defect: they are stripped
/// to their base and logged, never cloned as-is.
fn sanitize_template_ids(
    store: &dyn NodeStore,
    repeater_node_id: &str,
    declared: &[String],
) -> Result<Vec<String>, DuplicationError> {
    let mut seen = FxHashSet::default();
    let mut out = Vec::new();
    for raw in declared {
        if raw.is_empty() {
            continue;
        }
        let (stem, suffix) = id::split_copy_suffix(raw);
        if suffix.is_some() {
            warn!(
                repeater = repeater_node_id,
                declared = raw.as_str(),
                base = stem,
                "repeater declares a suffixed template id; using its base"
            );
        }
        if !seen.insert(stem.to_string()) {
            continue;
        }
        if store.node_exists(stem)? {
            out.push(stem.to_string());
        } else {
            warn!(
                repeater = repeater_node_id,
                template = stem,
                "declared template node does not exist; skipping"
            );
        }
    }
    Ok(out)
}

fn collect_subtree(
    store: &dyn NodeStore,
    root: Node,
    seen: &mut FxHashSet<String>,
    out: &mut Vec<Node>,
) -> Result<(), DuplicationError> {
    if !seen.insert(root.id.clone()) {
        return Ok(());
    }
    let root_id = root.id.clone();
    out.push(root);
    let mut children = store.children_of(&root_id)?;
    children.sort_by(|a, b| a.id.cmp(&b.id));
    for child in children {
        collect_subtree(store, child, seen, out)?;
    }
    Ok(())
}

/// Build the blueprint for one repeater.
pub fn build(
    store: &dyn NodeStore,
    repeater_node_id: &str,
) -> Result<Blueprint, DuplicationError> {
    let repeater = store
        .node(repeater_node_id)?
        .ok_or_else(|| DuplicationError::NotFound(repeater_node_id.to_string()))?;
    let config = RepeaterConfig::from_node(&repeater);

    let template_node_ids =
        sanitize_template_ids(store, repeater_node_id, &config.template_node_ids)?;
    if template_node_ids.is_empty() {
        return Err(DuplicationError::EmptyTemplateSet(
            repeater_node_id.to_string(),
        ));
    }

    let mut nodes = Vec::new();
    let mut seen = FxHashSet::default();
    for template_id in &template_node_ids {
        let Some(root) = store.node(template_id)? else {
            // Raced deletion between sanitize and collection.
            warn!(template = template_id.as_str(), "template vanished during snapshot");
            continue;
        };
        collect_subtree(store, root, &mut seen, &mut nodes)?;
    }

    let mut variables: Vec<BlueprintVariable> = Vec::new();
    let mut variable_index: FxHashMap<String, usize> = FxHashMap::default();
    for node in &nodes {
        for variable in store.variables_of_node(&node.id)? {
            variable_index.insert(variable.id.clone(), variables.len());
            variables.push(BlueprintVariable {
                variable,
                target_node_id: node.id.clone(),
                linked_from_node_ids: Vec::new(),
            });
        }
    }

    // Linked variables: template nodes may reference variables they do
    // not own (one shared variable feeding several fields). The first
    // linking node hosts the clone when nobody in the subtree owns it;
    // every linking node records its claim so the copies' link lists can
    // be rebuilt. Suffixed link entries resolve to their template
    // variable.
    for node in &nodes {
        for raw in &node.linked_variable_ids {
            let clean = id::strip_copy_suffix(raw);
            if let Some(&index) = variable_index.get(clean) {
                let entry = &mut variables[index];
                if entry.target_node_id != node.id
                    && !entry.linked_from_node_ids.contains(&node.id)
                {
                    entry.linked_from_node_ids.push(node.id.clone());
                }
                continue;
            }
            match store.variable(clean)? {
                Some(variable) => {
                    variable_index.insert(variable.id.clone(), variables.len());
                    variables.push(BlueprintVariable {
                        variable,
                        target_node_id: node.id.clone(),
                        linked_from_node_ids: vec![node.id.clone()],
                    });
                }
                None => warn!(
                    node = node.id.as_str(),
                    variable = clean,
                    "linked variable does not exist; dropping the link from the snapshot"
                ),
            }
        }
    }

    let mut capacities = Vec::new();
    for node in &nodes {
        for formula in store.formulas_of_node(&node.id)? {
            let payload = CapacityPayload::Formula(formula);
            let refs = extract_payload(&payload);
            capacities.push(BlueprintCapacity { payload, refs });
        }
        for condition in store.conditions_of_node(&node.id)? {
            let payload = CapacityPayload::Condition(condition);
            let refs = extract_payload(&payload);
            capacities.push(BlueprintCapacity { payload, refs });
        }
        for table in store.tables_of_node(&node.id)? {
            let payload = CapacityPayload::Table(table);
            let refs = extract_payload(&payload);
            capacities.push(BlueprintCapacity { payload, refs });
        }
    }

    Ok(Blueprint {
        repeater_node_id: repeater_node_id.to_string(),
        tree_id: repeater.tree_id,
        config,
        template_node_ids,
        nodes,
        variables,
        capacities,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_store::TestStore;
    use ramify_common::{Formula, FormulaToken, NodeKind, SourceRef, SourceType};

    fn repeater_with_templates(store: &TestStore, templates: &[&str]) -> Node {
        let mut repeater = Node::new("node_rep", "Panels", NodeKind::Repeater, "tree");
        repeater.template_node_ids = templates.iter().map(|s| s.to_string()).collect();
        store.seed_node(repeater.clone());
        repeater
    }

    #[test]
    fn missing_repeater_is_not_found() {
        let store = TestStore::new();
        let err = build(&store, "nope").unwrap_err();
        assert_eq!(err, DuplicationError::NotFound("nope".into()));
    }

    #[test]
    fn empty_declaration_is_rejected() {
        let store = TestStore::new();
        repeater_with_templates(&store, &[]);
        let err = build(&store, "node_rep").unwrap_err();
        assert_eq!(err, DuplicationError::EmptyTemplateSet("node_rep".into()));
    }

    #[test]
    fn subtree_is_collected_parent_first() {
        let store = TestStore::new();
        repeater_with_templates(&store, &["node_root"]);
        store.seed_node(Node::new("node_root", "Root", NodeKind::Section, "tree"));
        store.seed_node(
            Node::new("node_child_a", "A", NodeKind::Field, "tree").with_parent("node_root"),
        );
        store.seed_node(
            Node::new("node_child_b", "B", NodeKind::Field, "tree").with_parent("node_root"),
        );
        store.seed_node(
            Node::new("node_grandchild", "G", NodeKind::Display, "tree")
                .with_parent("node_child_a"),
        );

        let blueprint = build(&store, "node_rep").unwrap();
        let ids: Vec<&str> = blueprint.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["node_root", "node_child_a", "node_grandchild", "node_child_b"]
        );
    }

    #[test]
    fn suffixed_and_missing_template_ids_are_sanitized() {
        let store = TestStore::new();
        repeater_with_templates(&store, &["node_a-2", "node_gone", "node_a"]);
        store.seed_node(Node::new("node_a", "A", NodeKind::Field, "tree"));

        let blueprint = build(&store, "node_rep").unwrap();
        assert_eq!(blueprint.template_node_ids, vec!["node_a"]);
        assert_eq!(blueprint.nodes.len(), 1);
    }

    #[test]
    fn owned_and_linked_variables_are_captured() {
        let store = TestStore::new();
        repeater_with_templates(&store, &["node_a", "node_b"]);
        store.seed_node(Node::new("node_a", "A", NodeKind::Field, "tree"));
        let mut b = Node::new("node_b", "B", NodeKind::Field, "tree");
        // Linked under a stale suffixed id, as broken trees do.
        b.linked_variable_ids = vec!["node_var_shared-1".into()];
        store.seed_node(b);
        store.seed_variable(Variable {
            id: "node_var_a".into(),
            node_id: "node_a".into(),
            exposed_key: "a".into(),
            source_type: SourceType::Literal,
            source_ref: None,
            display_name: None,
            display_format: None,
        });
        store.seed_variable(Variable {
            id: "node_var_shared".into(),
            node_id: "node_elsewhere".into(),
            exposed_key: "shared".into(),
            source_type: SourceType::Literal,
            source_ref: None,
            display_name: None,
            display_format: None,
        });

        let blueprint = build(&store, "node_rep").unwrap();
        assert_eq!(blueprint.variables.len(), 2);
        assert_eq!(blueprint.variables[0].variable.id, "node_var_a");
        assert_eq!(blueprint.variables[0].target_node_id, "node_a");
        assert!(blueprint.variables[0].linked_from_node_ids.is_empty());
        // The out-of-subtree variable is hosted by its first linking node.
        assert_eq!(blueprint.variables[1].variable.id, "node_var_shared");
        assert_eq!(blueprint.variables[1].target_node_id, "node_b");
        assert_eq!(blueprint.variables[1].linked_from_node_ids, vec!["node_b"]);
    }

    #[test]
    fn a_variable_linked_by_two_nodes_is_captured_once() {
        let store = TestStore::new();
        repeater_with_templates(&store, &["node_a", "node_b"]);
        let mut a = Node::new("node_a", "A", NodeKind::Field, "tree");
        a.linked_variable_ids = vec!["node_var_shared".into()];
        store.seed_node(a);
        let mut b = Node::new("node_b", "B", NodeKind::Field, "tree");
        b.linked_variable_ids = vec!["node_var_shared".into()];
        store.seed_node(b);
        store.seed_variable(Variable {
            id: "node_var_shared".into(),
            node_id: "node_elsewhere".into(),
            exposed_key: "shared".into(),
            source_type: SourceType::Literal,
            source_ref: None,
            display_name: None,
            display_format: None,
        });

        let blueprint = build(&store, "node_rep").unwrap();
        assert_eq!(blueprint.variables.len(), 1);
        let entry = &blueprint.variables[0];
        assert_eq!(entry.target_node_id, "node_a");
        assert_eq!(entry.linked_from_node_ids, vec!["node_a", "node_b"]);
    }

    #[test]
    fn capacities_carry_extracted_refs() {
        let store = TestStore::new();
        repeater_with_templates(&store, &["node_a"]);
        store.seed_node(Node::new("node_a", "A", NodeKind::Field, "tree"));
        store.seed_formula(Formula {
            id: "node_f1".into(),
            node_id: "node_a".into(),
            name: "double".into(),
            tokens: vec![
                FormulaToken::reference("@value.node_a"),
                FormulaToken::op("*"),
                FormulaToken::number(2.0),
            ],
        });
        store.seed_variable(Variable {
            id: "node_var_a".into(),
            node_id: "node_a".into(),
            exposed_key: "a".into(),
            source_type: SourceType::Formula,
            source_ref: Some(SourceRef::Formula("node_f1".into())),
            display_name: None,
            display_format: None,
        });

        let blueprint = build(&store, "node_rep").unwrap();
        assert_eq!(blueprint.capacities.len(), 1);
        assert_eq!(blueprint.capacities[0].payload.id(), "node_f1");
        assert!(blueprint.capacities[0]
            .refs
            .contains(&TypedRef::NodeValue("node_a".into())));
    }
}

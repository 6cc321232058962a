//! Shared fixtures for the integration suites.
#![allow(dead_code)]

use ramify_common::{
    Formula, FormulaToken, Node, NodeKind, SourceRef, SourceType, Variable,
};
use ramify_store::MemoryBackend;

pub fn field(node_id: &str, label: &str) -> Node {
    Node::new(node_id, label, NodeKind::Field, "tree")
}

pub fn literal_variable(variable_id: &str, node_id: &str, key: &str) -> Variable {
    Variable {
        id: variable_id.into(),
        node_id: node_id.into(),
        exposed_key: key.into(),
        source_type: SourceType::Literal,
        source_ref: None,
        display_name: None,
        display_format: None,
    }
}

/// The canonical two-template repeater: a field `node_field` whose
/// formula references the field itself and a shared reference, plus a
/// display node `node_disp` linked to the field's variable.
pub fn seed_panel_repeater(store: &MemoryBackend) {
    let mut repeater = Node::new("node_rep", "Panels", NodeKind::Repeater, "tree");
    repeater.template_node_ids = vec!["node_field".into(), "node_disp".into()];
    store.insert_node(repeater);

    let mut power = field("node_field", "Power");
    power.has_formula = true;
    store.insert_node(power);

    let mut display = Node::new("node_disp", "Power (display)", NodeKind::Display, "tree");
    display.linked_variable_ids = vec!["node_var_power".into()];
    store.insert_node(display);

    store.insert_formula(Formula {
        id: "node_fml_power".into(),
        node_id: "node_field".into(),
        name: "power".into(),
        tokens: vec![
            FormulaToken::reference("@value.node_field"),
            FormulaToken::op("*"),
            FormulaToken::reference("@value.shared-ref-yield"),
        ],
    });
    store.insert_variable(Variable {
        id: "node_var_power".into(),
        node_id: "node_field".into(),
        exposed_key: "power".into(),
        source_type: SourceType::Formula,
        source_ref: Some(SourceRef::Formula("node_fml_power".into())),
        display_name: Some("Power".into()),
        display_format: None,
    });
}

/// True when `candidate` ends in two stacked numeric suffix groups.
pub fn has_double_suffix(candidate: &str) -> bool {
    let mut parts = candidate.rsplit('-');
    let last = parts.next().unwrap_or("");
    let before = parts.next().unwrap_or("");
    !last.is_empty()
        && !before.is_empty()
        && last.bytes().all(|b| b.is_ascii_digit())
        && before.bytes().all(|b| b.is_ascii_digit())
}

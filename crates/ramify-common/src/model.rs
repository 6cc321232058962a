//! The tree-structured configuration model: nodes, variables, and the
//! repeater declaration parsed from node metadata.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::source_ref::SourceRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Field,
    Section,
    Repeater,
    Display,
}

/// One node of the configuration tree.
///
/// Invariant: the capacity flags agree with the capacity rows the node
/// actually owns. Violations are what [`crate::error::DuplicationError`]
/// consumers run the mismatch analyzer for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub label: String,
    pub kind: NodeKind,
    pub parent_id: Option<String>,
    pub tree_id: String,
    #[serde(default)]
    pub has_formula: bool,
    #[serde(default)]
    pub has_condition: bool,
    #[serde(default)]
    pub has_table: bool,
    #[serde(default)]
    pub has_data: bool,
    #[serde(default)]
    pub linked_variable_ids: Vec<String>,
    #[serde(default)]
    pub linked_table_ids: Vec<String>,
    #[serde(default)]
    pub shared_reference_ids: Vec<String>,
    /// Repeater declaration: ordered template roots to clone on demand.
    /// Empty for non-repeater nodes. Must never contain suffixed ids.
    #[serde(default)]
    pub template_node_ids: Vec<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
}

impl Node {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        kind: NodeKind,
        tree_id: impl Into<String>,
    ) -> Self {
        Node {
            id: id.into(),
            label: label.into(),
            kind,
            parent_id: None,
            tree_id: tree_id.into(),
            has_formula: false,
            has_condition: false,
            has_table: false,
            has_data: false,
            linked_variable_ids: Vec::new(),
            linked_table_ids: Vec::new(),
            shared_reference_ids: Vec::new(),
            template_node_ids: Vec::new(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }
}

/// Where a variable's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Formula,
    Condition,
    Table,
    Literal,
}

/// An exposed form value owned by a node.
///
/// Invariant: when `source_ref` is set, the capacity it names exists and
/// is owned by `node_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub id: String,
    pub node_id: String,
    /// Stable external name; aggregation and exports address variables by
    /// this key, never by row id.
    pub exposed_key: String,
    pub source_type: SourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<SourceRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_format: Option<String>,
}

/// How a repeater-level total field folds the instances' values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Sum,
    Avg,
    Min,
    Max,
    Count,
}

/// Configuration of a repeater's optional total field, consumed by
/// downstream aggregation through the repeat scope registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TotalFieldConfig {
    pub aggregation: Aggregation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_display_node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_variable_id: Option<String>,
}

/// Parsed view over a repeater node's declaration.
///
/// The `repeater` metadata object is the source of truth when present;
/// the `template_node_ids` column is the fallback for trees written
/// before the metadata form existed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RepeaterConfig {
    #[serde(default)]
    pub template_node_ids: Vec<String>,
    #[serde(default)]
    pub min_items: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_button_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_field: Option<TotalFieldConfig>,
}

impl RepeaterConfig {
    pub fn from_node(node: &Node) -> Self {
        if let Some(meta) = node.metadata.get("repeater") {
            if let Ok(mut cfg) = serde_json::from_value::<RepeaterConfig>(meta.clone()) {
                if cfg.template_node_ids.is_empty() {
                    cfg.template_node_ids = node.template_node_ids.clone();
                }
                return cfg;
            }
        }
        RepeaterConfig {
            template_node_ids: node.template_node_ids.clone(),
            ..RepeaterConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeater_config_prefers_metadata_over_column() {
        let mut node = Node::new("r1", "Panels", NodeKind::Repeater, "tree");
        node.template_node_ids = vec!["legacy-a".into()];
        node.metadata.insert(
            "repeater".into(),
            serde_json::json!({
                "template_node_ids": ["t1", "t2"],
                "max_items": 5,
                "total_field": { "aggregation": "sum", "target_variable_id": "v-total" }
            }),
        );

        let cfg = RepeaterConfig::from_node(&node);
        assert_eq!(cfg.template_node_ids, vec!["t1", "t2"]);
        assert_eq!(cfg.max_items, Some(5));
        assert_eq!(
            cfg.total_field.unwrap().aggregation,
            Aggregation::Sum
        );
    }

    #[test]
    fn repeater_config_falls_back_to_the_column() {
        let mut node = Node::new("r1", "Panels", NodeKind::Repeater, "tree");
        node.template_node_ids = vec!["t1".into()];
        let cfg = RepeaterConfig::from_node(&node);
        assert_eq!(cfg.template_node_ids, vec!["t1"]);
        assert_eq!(cfg.max_items, None);
    }

    #[test]
    fn metadata_template_list_empty_falls_back_to_column() {
        let mut node = Node::new("r1", "Panels", NodeKind::Repeater, "tree");
        node.template_node_ids = vec!["t9".into()];
        node.metadata
            .insert("repeater".into(), serde_json::json!({ "min_items": 1 }));
        let cfg = RepeaterConfig::from_node(&node);
        assert_eq!(cfg.template_node_ids, vec!["t9"]);
        assert_eq!(cfg.min_items, 1);
    }
}

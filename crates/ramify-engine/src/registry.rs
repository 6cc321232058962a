//! The repeat scope registry: a ledger of every id minted during a
//! duplication, keyed by `(repeater, suffix)`.
//!
//! Downstream aggregation (a repeater-level total field summing one
//! variable across all instances) resolves its inputs from here instead
//! of re-deriving the suffix math. The registry is an owned handle passed
//! through the call chain, not a process-wide singleton, so tests and
//! parallel sessions get isolated instances.

use std::fmt;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use ramify_common::CapacityKind;

/// Identity of one duplication: which repeater, which suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeId {
    pub repeater_node_id: String,
    pub suffix: u32,
}

impl ScopeId {
    pub fn new(repeater_node_id: impl Into<String>, suffix: u32) -> Self {
        ScopeId {
            repeater_node_id: repeater_node_id.into(),
            suffix,
        }
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "repeat:{}:{}", self.repeater_node_id, self.suffix)
    }
}

/// One minting event inside a scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScopeEvent {
    NodeMinted {
        template_id: String,
        copy_id: String,
    },
    VariableMinted {
        template_id: String,
        copy_id: String,
        exposed_key: String,
    },
    CapacityMinted {
        kind: CapacityKind,
        template_id: String,
        copy_id: String,
    },
}

#[derive(Debug, Default, Clone)]
struct Ledger {
    events: Vec<ScopeEvent>,
}

/// Immutable view of everything one duplication produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeSnapshot {
    pub scope: ScopeId,
    pub node_ids: Vec<String>,
    pub variable_ids: Vec<String>,
    pub exposed_keys: Vec<String>,
    pub formula_ids: Vec<String>,
    pub condition_ids: Vec<String>,
    pub table_ids: Vec<String>,
}

impl ScopeSnapshot {
    fn from_ledger(scope: ScopeId, ledger: &Ledger) -> Self {
        let mut snapshot = ScopeSnapshot {
            scope,
            node_ids: Vec::new(),
            variable_ids: Vec::new(),
            exposed_keys: Vec::new(),
            formula_ids: Vec::new(),
            condition_ids: Vec::new(),
            table_ids: Vec::new(),
        };
        for event in &ledger.events {
            match event {
                ScopeEvent::NodeMinted { copy_id, .. } => snapshot.node_ids.push(copy_id.clone()),
                ScopeEvent::VariableMinted {
                    copy_id,
                    exposed_key,
                    ..
                } => {
                    snapshot.variable_ids.push(copy_id.clone());
                    snapshot.exposed_keys.push(exposed_key.clone());
                }
                ScopeEvent::CapacityMinted { kind, copy_id, .. } => match kind {
                    CapacityKind::Formula => snapshot.formula_ids.push(copy_id.clone()),
                    CapacityKind::Condition => snapshot.condition_ids.push(copy_id.clone()),
                    CapacityKind::Table => snapshot.table_ids.push(copy_id.clone()),
                },
            }
        }
        snapshot
    }
}

/// The ledger of scopes. Cheap to share by reference; interior mutability
/// keeps `record` usable from the executor without threading `&mut`.
#[derive(Debug, Default)]
pub struct RepeatScopeRegistry {
    scopes: Mutex<FxHashMap<ScopeId, Ledger>>,
}

impl RepeatScopeRegistry {
    pub fn new() -> Self {
        RepeatScopeRegistry::default()
    }

    pub fn record(&self, scope: &ScopeId, event: ScopeEvent) {
        self.scopes
            .lock()
            .entry(scope.clone())
            .or_default()
            .events
            .push(event);
    }

    pub fn capture(&self, scope: &ScopeId) -> Option<ScopeSnapshot> {
        let scopes = self.scopes.lock();
        let ledger = scopes.get(scope)?;
        Some(ScopeSnapshot::from_ledger(scope.clone(), ledger))
    }

    /// Every scope recorded for a repeater, ordered by suffix. This is
    /// what a total field walks to reach all instances.
    pub fn scopes_for_repeater(&self, repeater_node_id: &str) -> Vec<ScopeId> {
        let scopes = self.scopes.lock();
        let mut found: Vec<ScopeId> = scopes
            .keys()
            .filter(|s| s.repeater_node_id == repeater_node_id)
            .cloned()
            .collect();
        found.sort_by_key(|s| s.suffix);
        found
    }

    /// Clear one scope's entries, leaving every other scope intact.
    pub fn reset(&self, scope: &ScopeId) {
        self.scopes.lock().remove(scope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_event(n: u32) -> ScopeEvent {
        ScopeEvent::NodeMinted {
            template_id: "t".into(),
            copy_id: format!("t-{n}"),
        }
    }

    #[test]
    fn capture_reflects_recorded_events() {
        let registry = RepeatScopeRegistry::new();
        let scope = ScopeId::new("rep", 1);
        registry.record(&scope, node_event(1));
        registry.record(
            &scope,
            ScopeEvent::VariableMinted {
                template_id: "v".into(),
                copy_id: "v-1".into(),
                exposed_key: "total-1".into(),
            },
        );
        registry.record(
            &scope,
            ScopeEvent::CapacityMinted {
                kind: CapacityKind::Formula,
                template_id: "f".into(),
                copy_id: "f-1".into(),
            },
        );

        let snapshot = registry.capture(&scope).unwrap();
        assert_eq!(snapshot.node_ids, vec!["t-1"]);
        assert_eq!(snapshot.variable_ids, vec!["v-1"]);
        assert_eq!(snapshot.exposed_keys, vec!["total-1"]);
        assert_eq!(snapshot.formula_ids, vec!["f-1"]);
        assert!(snapshot.condition_ids.is_empty());
    }

    #[test]
    fn reset_clears_only_that_scope() {
        let registry = RepeatScopeRegistry::new();
        let first = ScopeId::new("rep", 1);
        let second = ScopeId::new("rep", 2);
        registry.record(&first, node_event(1));
        registry.record(&second, node_event(2));

        registry.reset(&first);
        assert!(registry.capture(&first).is_none());
        assert!(registry.capture(&second).is_some());
    }

    #[test]
    fn scopes_for_repeater_sorted_by_suffix() {
        let registry = RepeatScopeRegistry::new();
        registry.record(&ScopeId::new("rep", 3), node_event(3));
        registry.record(&ScopeId::new("rep", 1), node_event(1));
        registry.record(&ScopeId::new("other", 2), node_event(2));

        let scopes = registry.scopes_for_repeater("rep");
        assert_eq!(
            scopes,
            vec![ScopeId::new("rep", 1), ScopeId::new("rep", 3)]
        );
    }

    #[test]
    fn scope_id_renders_stably() {
        assert_eq!(ScopeId::new("rep", 4).to_string(), "repeat:rep:4");
    }
}

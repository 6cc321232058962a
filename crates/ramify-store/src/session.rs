//! The duplication session: what the surrounding request handler calls.
//!
//! One session owns a store handle, a repeat scope registry, and the
//! advisory locks that serialize duplications per repeater. Allocation,
//! planning and execution for one request run under one lock acquisition,
//! so two near-simultaneous "add instance" clicks cannot observe the same
//! maximum and mint the same suffix. Requests against different repeaters
//! do not contend.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use ramify_common::DuplicationError;
use ramify_engine::{
    analyzer, blueprint, executor, plan as planner, suffix, Blueprint, ExecutionReport,
    InstantiationPlan, Mismatch, NodeStore, RepeatScopeRegistry, ScopeId, ScopeSnapshot,
};

/// Session-level knobs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Honor a repeater's declared `max_items` when executing.
    pub enforce_instance_limit: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            enforce_instance_limit: true,
        }
    }
}

/// Caller-supplied options for one duplication request. The suffix
/// arrives as the raw string the request handler received; anything
/// non-numeric is rejected, never coerced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepeatRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_parent_id: Option<String>,
}

/// What `plan_repeat_duplication` hands back: enough for the caller to
/// inspect or to feed straight into execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanOutcome {
    pub suffix: u32,
    pub scope_id: String,
    pub blueprint: Blueprint,
    pub plan: InstantiationPlan,
}

pub struct DuplicationSession<S: NodeStore> {
    store: S,
    registry: RepeatScopeRegistry,
    config: SessionConfig,
    locks: Mutex<FxHashMap<String, Arc<Mutex<()>>>>,
}

impl<S: NodeStore> DuplicationSession<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, SessionConfig::default())
    }

    pub fn with_config(store: S, config: SessionConfig) -> Self {
        DuplicationSession {
            store,
            registry: RepeatScopeRegistry::new(),
            config,
            locks: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &RepeatScopeRegistry {
        &self.registry
    }

    fn lock_for(&self, repeater_node_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(repeater_node_id.to_string())
            .or_default()
            .clone()
    }

    fn parse_suffix(raw: &str) -> Result<u32, DuplicationError> {
        match raw.trim().parse::<u32>() {
            Ok(suffix) if suffix > 0 => Ok(suffix),
            _ => Err(DuplicationError::InvalidSuffix(raw.to_string())),
        }
    }

    /// Distinct suffixes already in use across the template group: how
    /// many instances exist today.
    fn existing_instances(&self, template_ids: &[String]) -> Result<u32, DuplicationError> {
        let mut suffixes = Vec::new();
        for template_id in template_ids {
            suffixes.extend(self.store.copy_suffixes_of(template_id)?);
        }
        suffixes.sort_unstable();
        suffixes.dedup();
        Ok(suffixes.len() as u32)
    }

    fn check_instance_limit(&self, bp: &Blueprint) -> Result<(), DuplicationError> {
        if !self.config.enforce_instance_limit {
            return Ok(());
        }
        let Some(max) = bp.config.max_items else {
            return Ok(());
        };
        let existing = self.existing_instances(&bp.template_node_ids)?;
        if existing >= max {
            return Err(DuplicationError::InstanceLimit {
                repeater_node_id: bp.repeater_node_id.clone(),
                existing,
                max,
            });
        }
        Ok(())
    }

    fn resolve_suffix(
        &self,
        bp: &Blueprint,
        request: &RepeatRequest,
    ) -> Result<u32, DuplicationError> {
        match &request.suffix {
            Some(raw) => {
                let explicit = Self::parse_suffix(raw)?;
                suffix::verify_explicit(&self.store, &bp.template_node_ids, explicit)?;
                Ok(explicit)
            }
            None => suffix::allocate(&self.store, &bp.template_node_ids),
        }
    }

    /// Build the blueprint and plan for one duplication without writing
    /// anything.
    pub fn plan_repeat_duplication(
        &self,
        repeater_node_id: &str,
        request: &RepeatRequest,
    ) -> Result<PlanOutcome, DuplicationError> {
        let lock = self.lock_for(repeater_node_id);
        let _guard = lock.lock();

        let bp = blueprint::build(&self.store, repeater_node_id)?;
        let suffix = self.resolve_suffix(&bp, request)?;
        let plan = planner::plan(&bp, suffix, request.target_parent_id.as_deref());
        Ok(PlanOutcome {
            suffix,
            scope_id: plan.scope.to_string(),
            blueprint: bp,
            plan,
        })
    }

    /// Run a full duplication: allocate, plan and execute under the
    /// repeater's advisory lock.
    pub fn execute_repeat_duplication(
        &self,
        repeater_node_id: &str,
        request: &RepeatRequest,
    ) -> Result<ExecutionReport, DuplicationError> {
        let lock = self.lock_for(repeater_node_id);
        let _guard = lock.lock();

        let bp = blueprint::build(&self.store, repeater_node_id)?;
        self.check_instance_limit(&bp)?;
        let suffix = self.resolve_suffix(&bp, request)?;
        let plan = planner::plan(&bp, suffix, request.target_parent_id.as_deref());
        debug!(
            repeater = repeater_node_id,
            suffix,
            nodes = plan.nodes.len(),
            variables = plan.variables.len(),
            "executing repeat duplication"
        );
        executor::execute(&self.store, &self.registry, &bp, &plan)
    }

    pub fn analyze_capacity_mismatches(
        &self,
        node_id: &str,
    ) -> Result<Vec<Mismatch>, DuplicationError> {
        analyzer::analyze(&self.store, node_id)
    }

    /// Apply flag corrections from `mismatches`. Wrapped in the node's
    /// own short write batch; capacity rows are never fabricated.
    pub fn fix_capacity_flags(
        &self,
        node_id: &str,
        mismatches: &[Mismatch],
    ) -> Result<usize, DuplicationError> {
        analyzer::fix(&self.store, node_id, mismatches)
    }

    pub fn capture_scope(&self, scope: &ScopeId) -> Option<ScopeSnapshot> {
        self.registry.capture(scope)
    }

    pub fn reset_scope(&self, scope: &ScopeId) {
        self.registry.reset(scope)
    }
}

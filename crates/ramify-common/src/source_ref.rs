//! Typed `sourceRef` pointers.
//!
//! A variable's `sourceRef` names the capacity that computes its value.
//! The wire form is a prefix-tagged string; the legacy prefixes
//! (`node-formula:`, `node-condition:`, `node-table:`, `@table.`) are
//! accepted on parse and normalized to the canonical form on output.

use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use crate::capacity::CapacityKind;

/// A typed pointer to the capacity row backing a variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceRef {
    Formula(String),
    Condition(String),
    Table(String),
}

impl SourceRef {
    pub fn new(kind: CapacityKind, id: impl Into<String>) -> Self {
        match kind {
            CapacityKind::Formula => SourceRef::Formula(id.into()),
            CapacityKind::Condition => SourceRef::Condition(id.into()),
            CapacityKind::Table => SourceRef::Table(id.into()),
        }
    }

    /// Parse a pointer string, accepting canonical and legacy prefixes.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        for (prefix, kind) in [
            ("formula:", CapacityKind::Formula),
            ("node-formula:", CapacityKind::Formula),
            ("condition:", CapacityKind::Condition),
            ("node-condition:", CapacityKind::Condition),
            ("table:", CapacityKind::Table),
            ("node-table:", CapacityKind::Table),
            ("@table.", CapacityKind::Table),
        ] {
            if let Some(id) = raw.strip_prefix(prefix) {
                if id.is_empty() {
                    return None;
                }
                return Some(SourceRef::new(kind, id));
            }
        }
        None
    }

    pub fn kind(&self) -> CapacityKind {
        match self {
            SourceRef::Formula(_) => CapacityKind::Formula,
            SourceRef::Condition(_) => CapacityKind::Condition,
            SourceRef::Table(_) => CapacityKind::Table,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            SourceRef::Formula(id) | SourceRef::Condition(id) | SourceRef::Table(id) => id,
        }
    }

    /// The same pointer re-targeted at another capacity id.
    pub fn retargeted(&self, id: impl Into<String>) -> Self {
        SourceRef::new(self.kind(), id)
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRef::Formula(id) => write!(f, "formula:{id}"),
            SourceRef::Condition(id) => write!(f, "condition:{id}"),
            SourceRef::Table(id) => write!(f, "table:{id}"),
        }
    }
}

impl Serialize for SourceRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SourceRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SourceRefVisitor;

        impl Visitor<'_> for SourceRefVisitor {
            type Value = SourceRef;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a `formula:`/`condition:`/`table:` pointer string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<SourceRef, E> {
                SourceRef::parse(v)
                    .ok_or_else(|| E::custom(format!("unrecognized sourceRef `{v}`")))
            }
        }

        deserializer.deserialize_str(SourceRefVisitor)
    }
}

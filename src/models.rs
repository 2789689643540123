//! Core data types: tuples, relation configs, and check requests.
//!
//! These mirror the persisted state layout: a `Tuple` is a row in the
//! `tuples` table, a `RelationConfig` is a row in `relation_configs`, and a
//! `ConditionDefinition` is a row in `condition_definitions`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// The reserved wildcard subject id: "every subject of `subjectType`".
pub const WILDCARD: &str = "*";

/// A relationship tuple: "(subject) has (relation) to (object)".
///
/// `subject_relation`, when present, makes this a userset tuple: the subject
/// position denotes every subject holding `subject_relation` on
/// `(subject_type, subject_id)` rather than a single concrete subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tuple {
    pub object_type: String,
    pub object_id: String,
    pub relation: String,
    pub subject_type: String,
    pub subject_id: String,
    pub subject_relation: Option<String>,
    pub condition_name: Option<String>,
    pub condition_context: Option<HashMap<String, Value>>,
}

impl Tuple {
    /// The natural uniqueness key: (object_type, object_id, relation,
    /// subject_type, subject_id, subject_relation-or-absent).
    pub fn natural_key(&self) -> String {
        format!(
            "{}:{}#{}@{}:{}#{}",
            self.object_type,
            self.object_id,
            self.relation,
            self.subject_type,
            self.subject_id,
            self.subject_relation.as_deref().unwrap_or("")
        )
    }

    pub fn is_userset(&self) -> bool {
        self.subject_relation.is_some()
    }

    pub fn is_wildcard(&self) -> bool {
        self.subject_id == WILDCARD
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}#{}@{}:{}{}",
            self.object_type,
            self.object_id,
            self.relation,
            self.subject_type,
            self.subject_id,
            self.subject_relation
                .as_ref()
                .map(|r| format!("#{}", r))
                .unwrap_or_default()
        )
    }
}

/// A single operand of an `intersection` relation definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntersectionOperand {
    ComputedUserset { relation: String },
    TupleToUserset { tupleset: String, computed_userset: String },
}

/// A tuple-to-userset rewrite: for each tuple on `tupleset`, delegate to
/// `computed_userset` on the linked object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TupleToUserset {
    pub tupleset: String,
    pub computed_userset: String,
}

/// Schema entry for one (object_type, relation) pair.
///
/// When `intersection` is non-empty it is authoritative: the relation is
/// defined purely as the conjunction of its operands, and every base-mode
/// field below (`implied_by`, `computed_userset`, `tuple_to_userset`,
/// `directly_assignable_types`) is bypassed. An empty intersection list is
/// treated the same as `None` ("not intersection-rooted"), matching
/// reference behavior.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationConfig {
    pub directly_assignable_types: Option<HashSet<String>>,
    #[serde(default)]
    pub allows_userset_subjects: bool,
    pub implied_by: Option<Vec<String>>,
    pub computed_userset: Option<String>,
    pub tuple_to_userset: Option<TupleToUserset>,
    pub excluded_by: Option<String>,
    pub intersection: Option<Vec<IntersectionOperand>>,
}

impl RelationConfig {
    /// Whether this config is intersection-rooted: the `intersection` list
    /// is present and carries at least one operand.
    pub fn is_intersection_rooted(&self) -> bool {
        matches!(&self.intersection, Some(ops) if !ops.is_empty())
    }
}

/// A named, reusable boolean predicate attached to conditional tuples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionDefinition {
    pub name: String,
    pub expression: String,
}

/// A `check` request: "does (subject_type, subject_id) hold `relation` on
/// (object_type, object_id)?"
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRequest {
    pub object_type: String,
    pub object_id: String,
    pub relation: String,
    pub subject_type: String,
    pub subject_id: String,
    #[serde(default)]
    pub context: Option<HashMap<String, Value>>,
}

impl CheckRequest {
    pub fn new(
        object_type: impl Into<String>,
        object_id: impl Into<String>,
        relation: impl Into<String>,
        subject_type: impl Into<String>,
        subject_id: impl Into<String>,
    ) -> Self {
        Self {
            object_type: object_type.into(),
            object_id: object_id.into(),
            relation: relation.into(),
            subject_type: subject_type.into(),
            subject_id: subject_id.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: HashMap<String, Value>) -> Self {
        self.context = Some(context);
        self
    }

    /// Rewrite to a different relation on the same object/subject, as used
    /// by implied-by, computed-userset, and exclusion checks.
    pub(crate) fn at_relation(&self, relation: &str) -> CheckRequest {
        CheckRequest {
            relation: relation.to_string(),
            ..self.clone()
        }
    }

    /// Rewrite to a new (object_type, object_id, relation) while keeping the
    /// same subject and context, as used by userset expansion and
    /// tuple-to-userset rewrites.
    pub(crate) fn at(&self, object_type: &str, object_id: &str, relation: &str) -> CheckRequest {
        CheckRequest {
            object_type: object_type.to_string(),
            object_id: object_id.to_string(),
            relation: relation.to_string(),
            subject_type: self.subject_type.clone(),
            subject_id: self.subject_id.clone(),
            context: self.context.clone(),
        }
    }
}

/// Depth bounding and other per-call knobs for `check`.
#[derive(Debug, Clone, Copy)]
pub struct CheckOptions {
    pub max_depth: u32,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self { max_depth: 10 }
    }
}

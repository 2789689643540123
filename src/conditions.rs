//! The conditional-tuple evaluator and the predicate-compiler contract it
//! depends on.
//!
//! The predicate compiler is treated as an opaque external collaborator: the
//! engine only ever touches it through [`PredicateCompiler`] and
//! [`CompiledPredicate`]. A concrete CEL-backed implementation lives in
//! [`cel`].

pub mod cel;

use crate::error::{AuthzError, Result};
use crate::models::Tuple;
use crate::store::{ensure_not_cancelled, TupleStore};
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Compiles a condition expression string into a reusable, concurrently
/// invokable predicate. Compilation is assumed deterministic and
/// side-effect free for a given expression string.
pub trait PredicateCompiler: Send + Sync {
    fn compile(&self, expression: &str) -> anyhow::Result<Arc<dyn CompiledPredicate>>;
}

/// A compiled predicate, invoked with a merged context map.
pub trait CompiledPredicate: Send + Sync {
    fn evaluate(&self, context: &HashMap<String, Value>) -> anyhow::Result<bool>;
}

/// Resolves a tuple's optional condition against the store, merges contexts,
/// and invokes the cached compiled predicate.
///
/// The compiled-predicate cache is process-wide and keyed by condition name;
/// entries are never evicted. Concurrent compile attempts for the same name
/// are tolerated — whichever finishes first wins, and a duplicate
/// compilation of the same expression is harmless since compilation is pure.
pub struct ConditionEvaluator {
    compiler: Arc<dyn PredicateCompiler>,
    cache: DashMap<String, Arc<dyn CompiledPredicate>>,
}

impl ConditionEvaluator {
    pub fn new(compiler: Arc<dyn PredicateCompiler>) -> Self {
        Self {
            compiler,
            cache: DashMap::new(),
        }
    }

    /// Whether `tuple`'s condition (if any) is satisfied for this request.
    /// A tuple with no `condition_name` is unconditionally satisfied.
    pub async fn evaluate(
        &self,
        store: &dyn TupleStore,
        tuple: &Tuple,
        request_context: Option<&HashMap<String, Value>>,
        cancellation: &CancellationToken,
    ) -> Result<bool> {
        let Some(name) = &tuple.condition_name else {
            return Ok(true);
        };

        ensure_not_cancelled(cancellation)?;

        let def = store
            .find_condition_definition(name, cancellation)
            .await?
            .ok_or_else(|| AuthzError::ConditionNotFound(name.clone()))?;

        let merged = merge_contexts(tuple.condition_context.as_ref(), request_context);

        let predicate = self.compiled_predicate(name, &def.expression)?;

        predicate
            .evaluate(&merged)
            .map_err(|source| AuthzError::ConditionEvaluationError {
                name: name.clone(),
                source,
            })
    }

    fn compiled_predicate(
        &self,
        name: &str,
        expression: &str,
    ) -> Result<Arc<dyn CompiledPredicate>> {
        if let Some(cached) = self.cache.get(name) {
            return Ok(cached.clone());
        }

        let compiled =
            self.compiler
                .compile(expression)
                .map_err(|source| AuthzError::ConditionEvaluationError {
                    name: name.to_string(),
                    source,
                })?;

        // Last-writer-wins: if another task raced us and already inserted,
        // keep whichever is in the map — both compiled the same expression.
        let entry = self.cache.entry(name.to_string()).or_insert(compiled);
        Ok(entry.clone())
    }
}

/// Shallow overlay: start with the tuple's own context, then let the
/// request context win key-by-key. Nested objects are replaced wholesale,
/// never deep-merged.
fn merge_contexts(
    tuple_context: Option<&HashMap<String, Value>>,
    request_context: Option<&HashMap<String, Value>>,
) -> HashMap<String, Value> {
    let mut merged = tuple_context.cloned().unwrap_or_default();
    if let Some(request_context) = request_context {
        for (key, value) in request_context {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

//! The engine facade: wires a [`TupleStore`], a [`ConditionEvaluator`], and
//! the [`CheckEvaluator`] behind a single entry point, and exposes the write
//! API.

use crate::check::CheckEvaluator;
use crate::conditions::ConditionEvaluator;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::models::{CheckOptions, CheckRequest, ConditionDefinition, RelationConfig, Tuple};
use crate::store::TupleStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// The top-level authorization engine. Cheap to clone (everything behind
/// `Arc`).
#[derive(Clone)]
pub struct AuthzEngine {
    store: Arc<dyn TupleStore>,
    conditions: Arc<ConditionEvaluator>,
    max_check_depth: u32,
}

impl AuthzEngine {
    pub fn new(store: Arc<dyn TupleStore>, conditions: Arc<ConditionEvaluator>) -> Self {
        Self {
            store,
            conditions,
            max_check_depth: EngineConfig::default().max_check_depth,
        }
    }

    pub fn with_config(mut self, config: &EngineConfig) -> Self {
        self.max_check_depth = config.max_check_depth;
        self
    }

    /// Answers a single check request.
    pub async fn check(&self, request: &CheckRequest, cancellation: &CancellationToken) -> Result<bool> {
        let evaluator = CheckEvaluator::new(self.store.as_ref(), self.conditions.as_ref());
        let options = CheckOptions { max_depth: self.max_check_depth };
        evaluator.check(request, options, cancellation).await
    }

    /// Answers many check requests independently. No batching optimization
    /// beyond running each request's own recursion; callers needing
    /// concurrency should run these themselves.
    pub async fn batch_check(
        &self,
        requests: &[CheckRequest],
        cancellation: &CancellationToken,
    ) -> Result<Vec<bool>> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            results.push(self.check(request, cancellation).await?);
        }
        Ok(results)
    }

    /// Writes a relationship tuple. Validated against the relation's config;
    /// re-adding an identical tuple is a no-op.
    pub async fn add_tuple(&self, tuple: Tuple, cancellation: &CancellationToken) -> Result<()> {
        info!(tuple = %tuple, "writing tuple");
        self.store.add_tuple(tuple, cancellation).await
    }

    pub async fn write_relation_config(
        &self,
        object_type: &str,
        relation: &str,
        config: RelationConfig,
        cancellation: &CancellationToken,
    ) -> Result<()> {
        self.store
            .write_relation_config(object_type, relation, config, cancellation)
            .await
    }

    pub async fn write_condition_definition(
        &self,
        def: ConditionDefinition,
        cancellation: &CancellationToken,
    ) -> Result<()> {
        self.store.write_condition_definition(def, cancellation).await
    }
}

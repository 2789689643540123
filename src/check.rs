//! The recursive check evaluator: the relation algebra — direct tuples,
//! wildcards, usersets, implied-by, computed usersets, tuple-to-userset,
//! intersection, and exclusion — with depth bounding.

use crate::conditions::ConditionEvaluator;
use crate::error::{AuthzError, Result};
use crate::models::{CheckOptions, CheckRequest, IntersectionOperand, RelationConfig};
use crate::store::{ensure_not_cancelled, TupleStore};
use std::future::Future;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Evaluates `check` requests against a store and condition evaluator.
/// Stateless beyond those two collaborators: every call starts a fresh
/// recursion at depth 0.
pub struct CheckEvaluator<'a> {
    store: &'a dyn TupleStore,
    conditions: &'a ConditionEvaluator,
}

impl<'a> CheckEvaluator<'a> {
    pub fn new(store: &'a dyn TupleStore, conditions: &'a ConditionEvaluator) -> Self {
        Self { store, conditions }
    }

    pub async fn check(
        &self,
        request: &CheckRequest,
        options: CheckOptions,
        cancellation: &CancellationToken,
    ) -> Result<bool> {
        self.check_at_depth(request, options, 0, cancellation).await
    }

    fn check_at_depth<'b>(
        &'b self,
        request: &'b CheckRequest,
        options: CheckOptions,
        depth: u32,
        cancellation: &'b CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + 'b>> {
        Box::pin(async move {
            ensure_not_cancelled(cancellation)?;

            if depth > options.max_depth {
                debug!(depth, "max depth exceeded, resolving to false");
                return Ok(false);
            }

            let config = self
                .store
                .find_relation_config(&request.object_type, &request.relation, cancellation)
                .await?;

            debug!(
                object = %format!("{}:{}", request.object_type, request.object_id),
                relation = %request.relation,
                subject = %format!("{}:{}", request.subject_type, request.subject_id),
                depth,
                "checking"
            );

            if let Some(config) = &config {
                if config.is_intersection_rooted() {
                    let operands = config.intersection.as_ref().unwrap();
                    return self
                        .check_intersection(request, operands, options, depth, cancellation)
                        .await;
                }
            }

            let base_result = self
                .check_base(request, config.as_ref(), options, depth, cancellation)
                .await?;

            if base_result {
                if let Some(excluded_by) = config.as_ref().and_then(|c| c.excluded_by.as_deref()) {
                    let exclusion_request = request.at_relation(excluded_by);
                    let excluded = self
                        .check_at_depth(&exclusion_request, options, depth + 1, cancellation)
                        .await?;
                    if excluded {
                        debug!(excluded_by, "subject excluded");
                        return Ok(false);
                    }
                }
            }

            Ok(base_result)
        })
    }

    /// Base evaluation: direct tuple, wildcard, userset expansion,
    /// implied-by, computed userset, tuple-to-userset — in that order,
    /// short-circuiting on the first true result.
    async fn check_base(
        &self,
        request: &CheckRequest,
        config: Option<&RelationConfig>,
        options: CheckOptions,
        depth: u32,
        cancellation: &CancellationToken,
    ) -> Result<bool> {
        // 1. Direct tuple.
        if let Some(tuple) = self
            .store
            .find_direct_tuple(
                &request.object_type,
                &request.object_id,
                &request.relation,
                &request.subject_type,
                &request.subject_id,
                cancellation,
            )
            .await?
        {
            if self
                .conditions
                .evaluate(self.store, &tuple, request.context.as_ref(), cancellation)
                .await?
            {
                return Ok(true);
            }
        }

        // 2. Wildcard.
        if request.subject_id != crate::models::WILDCARD {
            if let Some(tuple) = self
                .store
                .find_direct_tuple(
                    &request.object_type,
                    &request.object_id,
                    &request.relation,
                    &request.subject_type,
                    crate::models::WILDCARD,
                    cancellation,
                )
                .await?
            {
                if self
                    .conditions
                    .evaluate(self.store, &tuple, request.context.as_ref(), cancellation)
                    .await?
                {
                    return Ok(true);
                }
            }
        }

        // 3. Userset expansion.
        let usersets = self
            .store
            .find_userset_tuples(&request.object_type, &request.object_id, &request.relation, cancellation)
            .await?;
        for tuple in &usersets {
            if !self
                .conditions
                .evaluate(self.store, tuple, request.context.as_ref(), cancellation)
                .await?
            {
                continue;
            }
            let subject_relation = tuple
                .subject_relation
                .as_deref()
                .expect("find_userset_tuples only returns tuples with subject_relation set");
            let rewritten = request.at(&tuple.subject_type, &tuple.subject_id, subject_relation);
            if self
                .check_at_depth(&rewritten, options, depth + 1, cancellation)
                .await?
            {
                return Ok(true);
            }
        }

        let Some(config) = config else {
            return Ok(false);
        };

        // 4. Implied-by.
        if let Some(implied_by) = &config.implied_by {
            for relation in implied_by {
                let rewritten = request.at_relation(relation);
                if self
                    .check_at_depth(&rewritten, options, depth + 1, cancellation)
                    .await?
                {
                    return Ok(true);
                }
            }
        }

        // 5. Computed userset.
        if let Some(computed_userset) = &config.computed_userset {
            let rewritten = request.at_relation(computed_userset);
            if self
                .check_at_depth(&rewritten, options, depth + 1, cancellation)
                .await?
            {
                return Ok(true);
            }
        }

        // 6. Tuple-to-userset. Link-tuple conditions are intentionally not
        // evaluated — only terminal/direct/userset tuples gate on conditions.
        if let Some(ttu) = &config.tuple_to_userset {
            let links = self
                .store
                .find_tuples_by_relation(&request.object_type, &request.object_id, &ttu.tupleset, cancellation)
                .await?;
            for link in &links {
                let rewritten = request.at(&link.subject_type, &link.subject_id, &ttu.computed_userset);
                if self
                    .check_at_depth(&rewritten, options, depth + 1, cancellation)
                    .await?
                {
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }

    /// Intersection evaluation: every operand must hold, short-circuit on
    /// the first false.
    async fn check_intersection(
        &self,
        request: &CheckRequest,
        operands: &[IntersectionOperand],
        options: CheckOptions,
        depth: u32,
        cancellation: &CancellationToken,
    ) -> Result<bool> {
        for operand in operands {
            ensure_not_cancelled(cancellation)?;
            let satisfied = match operand {
                IntersectionOperand::ComputedUserset { relation } => {
                    let rewritten = request.at_relation(relation);
                    self.check_at_depth(&rewritten, options, depth + 1, cancellation).await?
                }
                IntersectionOperand::TupleToUserset { tupleset, computed_userset } => {
                    let links = self
                        .store
                        .find_tuples_by_relation(&request.object_type, &request.object_id, tupleset, cancellation)
                        .await?;
                    let mut any = false;
                    for link in &links {
                        let rewritten =
                            request.at(&link.subject_type, &link.subject_id, computed_userset);
                        if self
                            .check_at_depth(&rewritten, options, depth + 1, cancellation)
                            .await?
                        {
                            any = true;
                            break;
                        }
                    }
                    any
                }
            };
            if !satisfied {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

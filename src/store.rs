//! The tuple store contract.
//!
//! A `TupleStore` is the single abstraction the check evaluator and write API
//! depend on; any backend (in-memory, PostgreSQL, or otherwise) that
//! satisfies this trait can serve as the persistence layer. Every method is
//! an atomic read or write against the store's current snapshot — the
//! evaluator never assumes cross-call consistency beyond what a single
//! method call guarantees. Every method also takes a cancellation token
//! scoped to the caller's request; an implementation should abort
//! in-flight work and return `AuthzError::Cancelled` once it fires.

use crate::error::{AuthzError, Result};
use crate::models::{ConditionDefinition, RelationConfig, Tuple};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait TupleStore: Send + Sync {
    /// The unique direct (non-userset) tuple matching these five
    /// coordinates, if any. `subject_id` may be `"*"` for a wildcard lookup.
    async fn find_direct_tuple(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
        subject_type: &str,
        subject_id: &str,
        cancellation: &CancellationToken,
    ) -> Result<Option<Tuple>>;

    /// Every tuple on (object, relation) whose `subject_relation` is
    /// present. Order is unspecified.
    async fn find_userset_tuples(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
        cancellation: &CancellationToken,
    ) -> Result<Vec<Tuple>>;

    /// Every tuple on (object, relation), regardless of subject form. Used
    /// by tuple-to-userset rewrites.
    async fn find_tuples_by_relation(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
        cancellation: &CancellationToken,
    ) -> Result<Vec<Tuple>>;

    async fn find_relation_config(
        &self,
        object_type: &str,
        relation: &str,
        cancellation: &CancellationToken,
    ) -> Result<Option<RelationConfig>>;

    async fn find_condition_definition(
        &self,
        name: &str,
        cancellation: &CancellationToken,
    ) -> Result<Option<ConditionDefinition>>;

    /// Insert a tuple after validating it against its relation config.
    /// Re-adding an identical tuple is an idempotent no-op. Fails with
    /// [`AuthzError::RelationConfigNotFound`], [`AuthzError::InvalidSubjectType`],
    /// or [`AuthzError::UsersetNotAllowed`] per the write-side validation
    /// rules.
    async fn add_tuple(&self, tuple: Tuple, cancellation: &CancellationToken) -> Result<()>;

    /// Upsert by (object_type, relation).
    async fn write_relation_config(
        &self,
        object_type: &str,
        relation: &str,
        config: RelationConfig,
        cancellation: &CancellationToken,
    ) -> Result<()>;

    /// Upsert by name.
    async fn write_condition_definition(
        &self,
        def: ConditionDefinition,
        cancellation: &CancellationToken,
    ) -> Result<()>;
}

/// Fails with `AuthzError::Cancelled` if the ambient cancellation signal has
/// already fired. Called at the start of every store method and every
/// recursive check step, rather than relying on a compiled predicate to
/// notice cancellation on its own.
pub(crate) fn ensure_not_cancelled(cancellation: &CancellationToken) -> Result<()> {
    if cancellation.is_cancelled() {
        return Err(AuthzError::Cancelled);
    }
    Ok(())
}

/// Shared write-time tuple validation, usable by any `TupleStore`
/// implementation so the invariant isn't duplicated per backend.
pub(crate) fn validate_tuple_write(tuple: &Tuple, config: Option<&RelationConfig>) -> Result<()> {
    let config = config.ok_or_else(|| {
        AuthzError::RelationConfigNotFound(tuple.object_type.clone(), tuple.relation.clone())
    })?;

    match &tuple.subject_relation {
        None => {
            let allowed = config
                .directly_assignable_types
                .as_ref()
                .is_some_and(|types| types.contains(&tuple.subject_type));
            if !allowed {
                return Err(AuthzError::InvalidSubjectType(
                    tuple.subject_type.clone(),
                    tuple.relation.clone(),
                ));
            }
        }
        Some(_) => {
            if !config.allows_userset_subjects {
                return Err(AuthzError::UsersetNotAllowed(tuple.relation.clone()));
            }
        }
    }

    Ok(())
}

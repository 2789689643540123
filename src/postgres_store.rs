//! A PostgreSQL-backed [`TupleStore`] against the logical schema below:
//! `tuples`, `relation_configs`, `condition_definitions`.
//!
//! Schema (for reference; migrations are out of this crate's scope):
//!
//! ```sql
//! CREATE TABLE tuples (
//!     object_type       TEXT NOT NULL,
//!     object_id         TEXT NOT NULL,
//!     relation          TEXT NOT NULL,
//!     subject_type      TEXT NOT NULL,
//!     subject_id        TEXT NOT NULL,
//!     subject_relation  TEXT,
//!     condition_name    TEXT,
//!     condition_context JSONB,
//!     UNIQUE (object_type, object_id, relation, subject_type, subject_id,
//!             COALESCE(subject_relation, ''))
//! );
//!
//! CREATE TABLE relation_configs (
//!     object_type               TEXT NOT NULL,
//!     relation                  TEXT NOT NULL,
//!     directly_assignable_types TEXT[],
//!     allows_userset_subjects   BOOLEAN NOT NULL DEFAULT FALSE,
//!     implied_by                TEXT[],
//!     computed_userset          TEXT,
//!     tuple_to_userset          JSONB,
//!     excluded_by               TEXT,
//!     intersection              JSONB,
//!     PRIMARY KEY (object_type, relation)
//! );
//!
//! CREATE TABLE condition_definitions (
//!     name       TEXT PRIMARY KEY,
//!     expression TEXT NOT NULL
//! );
//! ```

use crate::error::{AuthzError, Result};
use crate::models::{ConditionDefinition, IntersectionOperand, RelationConfig, Tuple, TupleToUserset};
use crate::store::{validate_tuple_write, TupleStore};
use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use std::collections::HashSet;
use std::future::Future;
use tokio_util::sync::CancellationToken;

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_tuple(row: &PgRow) -> Result<Tuple> {
        let condition_context: Option<sqlx::types::Json<serde_json::Map<String, serde_json::Value>>> =
            row.try_get("condition_context")?;
        Ok(Tuple {
            object_type: row.try_get("object_type")?,
            object_id: row.try_get("object_id")?,
            relation: row.try_get("relation")?,
            subject_type: row.try_get("subject_type")?,
            subject_id: row.try_get("subject_id")?,
            subject_relation: row.try_get("subject_relation")?,
            condition_name: row.try_get("condition_name")?,
            condition_context: condition_context.map(|json| json.0.into_iter().collect()),
        })
    }
}

/// Races a query future against the cancellation signal, so an in-flight
/// statement is abandoned rather than awaited to completion once the caller
/// gives up.
async fn run_cancellable<T>(
    cancellation: &CancellationToken,
    query: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancellation.cancelled() => Err(AuthzError::Cancelled),
        result = query => result,
    }
}

#[async_trait]
impl TupleStore for PostgresStore {
    async fn find_direct_tuple(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
        subject_type: &str,
        subject_id: &str,
        cancellation: &CancellationToken,
    ) -> Result<Option<Tuple>> {
        run_cancellable(cancellation, async {
            let row = sqlx::query(
                r#"
                SELECT object_type, object_id, relation, subject_type, subject_id,
                       subject_relation, condition_name, condition_context
                FROM tuples
                WHERE object_type = $1 AND object_id = $2 AND relation = $3
                  AND subject_type = $4 AND subject_id = $5
                  AND subject_relation IS NULL
                "#,
            )
            .bind(object_type)
            .bind(object_id)
            .bind(relation)
            .bind(subject_type)
            .bind(subject_id)
            .fetch_optional(&self.pool)
            .await?;

            row.as_ref().map(Self::row_to_tuple).transpose()
        })
        .await
    }

    async fn find_userset_tuples(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
        cancellation: &CancellationToken,
    ) -> Result<Vec<Tuple>> {
        run_cancellable(cancellation, async {
            let rows = sqlx::query(
                r#"
                SELECT object_type, object_id, relation, subject_type, subject_id,
                       subject_relation, condition_name, condition_context
                FROM tuples
                WHERE object_type = $1 AND object_id = $2 AND relation = $3
                  AND subject_relation IS NOT NULL
                "#,
            )
            .bind(object_type)
            .bind(object_id)
            .bind(relation)
            .fetch_all(&self.pool)
            .await?;

            rows.iter().map(Self::row_to_tuple).collect()
        })
        .await
    }

    async fn find_tuples_by_relation(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
        cancellation: &CancellationToken,
    ) -> Result<Vec<Tuple>> {
        run_cancellable(cancellation, async {
            let rows = sqlx::query(
                r#"
                SELECT object_type, object_id, relation, subject_type, subject_id,
                       subject_relation, condition_name, condition_context
                FROM tuples
                WHERE object_type = $1 AND object_id = $2 AND relation = $3
                "#,
            )
            .bind(object_type)
            .bind(object_id)
            .bind(relation)
            .fetch_all(&self.pool)
            .await?;

            rows.iter().map(Self::row_to_tuple).collect()
        })
        .await
    }

    async fn find_relation_config(
        &self,
        object_type: &str,
        relation: &str,
        cancellation: &CancellationToken,
    ) -> Result<Option<RelationConfig>> {
        run_cancellable(cancellation, async {
            let row = sqlx::query(
                r#"
                SELECT directly_assignable_types, allows_userset_subjects, implied_by,
                       computed_userset, tuple_to_userset, excluded_by, intersection
                FROM relation_configs
                WHERE object_type = $1 AND relation = $2
                "#,
            )
            .bind(object_type)
            .bind(relation)
            .fetch_optional(&self.pool)
            .await?;

            let Some(row) = row else { return Ok(None) };

            let directly_assignable_types: Option<Vec<String>> = row.try_get("directly_assignable_types")?;
            let tuple_to_userset: Option<sqlx::types::Json<TupleToUserset>> = row.try_get("tuple_to_userset")?;
            let intersection: Option<sqlx::types::Json<Vec<IntersectionOperand>>> = row.try_get("intersection")?;

            Ok(Some(RelationConfig {
                directly_assignable_types: directly_assignable_types.map(|v| v.into_iter().collect::<HashSet<_>>()),
                allows_userset_subjects: row.try_get("allows_userset_subjects")?,
                implied_by: row.try_get("implied_by")?,
                computed_userset: row.try_get("computed_userset")?,
                tuple_to_userset: tuple_to_userset.map(|j| j.0),
                excluded_by: row.try_get("excluded_by")?,
                intersection: intersection.map(|j| j.0),
            }))
        })
        .await
    }

    async fn find_condition_definition(
        &self,
        name: &str,
        cancellation: &CancellationToken,
    ) -> Result<Option<ConditionDefinition>> {
        run_cancellable(cancellation, async {
            let row = sqlx::query("SELECT name, expression FROM condition_definitions WHERE name = $1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;

            Ok(match row {
                Some(row) => Some(ConditionDefinition {
                    name: row.try_get("name")?,
                    expression: row.try_get("expression")?,
                }),
                None => None,
            })
        })
        .await
    }

    async fn add_tuple(&self, tuple: Tuple, cancellation: &CancellationToken) -> Result<()> {
        let config = self
            .find_relation_config(&tuple.object_type, &tuple.relation, cancellation)
            .await?;
        validate_tuple_write(&tuple, config.as_ref())?;

        run_cancellable(cancellation, async {
            let condition_context = tuple
                .condition_context
                .as_ref()
                .map(|ctx| sqlx::types::Json(ctx.clone()));

            sqlx::query(
                r#"
                INSERT INTO tuples
                    (object_type, object_id, relation, subject_type, subject_id,
                     subject_relation, condition_name, condition_context)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (object_type, object_id, relation, subject_type, subject_id,
                             COALESCE(subject_relation, ''))
                DO NOTHING
                "#,
            )
            .bind(&tuple.object_type)
            .bind(&tuple.object_id)
            .bind(&tuple.relation)
            .bind(&tuple.subject_type)
            .bind(&tuple.subject_id)
            .bind(&tuple.subject_relation)
            .bind(&tuple.condition_name)
            .bind(condition_context)
            .execute(&self.pool)
            .await?;

            tracing::info!(tuple = %tuple, "wrote tuple");
            Ok(())
        })
        .await
    }

    async fn write_relation_config(
        &self,
        object_type: &str,
        relation: &str,
        config: RelationConfig,
        cancellation: &CancellationToken,
    ) -> Result<()> {
        run_cancellable(cancellation, async {
            let directly_assignable_types: Option<Vec<String>> = config
                .directly_assignable_types
                .map(|types| types.into_iter().collect());
            let tuple_to_userset = config.tuple_to_userset.map(sqlx::types::Json);
            let intersection = config.intersection.map(sqlx::types::Json);

            sqlx::query(
                r#"
                INSERT INTO relation_configs
                    (object_type, relation, directly_assignable_types, allows_userset_subjects,
                     implied_by, computed_userset, tuple_to_userset, excluded_by, intersection)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (object_type, relation) DO UPDATE SET
                    directly_assignable_types = EXCLUDED.directly_assignable_types,
                    allows_userset_subjects = EXCLUDED.allows_userset_subjects,
                    implied_by = EXCLUDED.implied_by,
                    computed_userset = EXCLUDED.computed_userset,
                    tuple_to_userset = EXCLUDED.tuple_to_userset,
                    excluded_by = EXCLUDED.excluded_by,
                    intersection = EXCLUDED.intersection
                "#,
            )
            .bind(object_type)
            .bind(relation)
            .bind(directly_assignable_types)
            .bind(config.allows_userset_subjects)
            .bind(config.implied_by)
            .bind(tuple_to_userset)
            .bind(config.excluded_by)
            .bind(intersection)
            .execute(&self.pool)
            .await?;

            Ok(())
        })
        .await
    }

    async fn write_condition_definition(
        &self,
        def: ConditionDefinition,
        cancellation: &CancellationToken,
    ) -> Result<()> {
        run_cancellable(cancellation, async {
            sqlx::query(
                r#"
                INSERT INTO condition_definitions (name, expression)
                VALUES ($1, $2)
                ON CONFLICT (name) DO UPDATE SET expression = EXCLUDED.expression
                "#,
            )
            .bind(&def.name)
            .bind(&def.expression)
            .execute(&self.pool)
            .await?;

            Ok(())
        })
        .await
    }
}

//! An in-process [`TupleStore`] backed by `dashmap`. Used by tests and
//! suitable for single-process deployments where durability across restarts
//! isn't required.

use crate::error::Result;
use crate::models::{ConditionDefinition, RelationConfig, Tuple};
use crate::store::{ensure_not_cancelled, validate_tuple_write, TupleStore};
use async_trait::async_trait;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct MemoryStore {
    tuples: DashMap<String, Tuple>,
    configs: DashMap<(String, String), RelationConfig>,
    conditions: DashMap<String, ConditionDefinition>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TupleStore for MemoryStore {
    async fn find_direct_tuple(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
        subject_type: &str,
        subject_id: &str,
        cancellation: &CancellationToken,
    ) -> Result<Option<Tuple>> {
        ensure_not_cancelled(cancellation)?;
        Ok(self.tuples.iter().find_map(|entry| {
            let t = entry.value();
            (t.subject_relation.is_none()
                && t.object_type == object_type
                && t.object_id == object_id
                && t.relation == relation
                && t.subject_type == subject_type
                && t.subject_id == subject_id)
                .then(|| t.clone())
        }))
    }

    async fn find_userset_tuples(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
        cancellation: &CancellationToken,
    ) -> Result<Vec<Tuple>> {
        ensure_not_cancelled(cancellation)?;
        Ok(self
            .tuples
            .iter()
            .filter(|entry| {
                let t = entry.value();
                t.subject_relation.is_some()
                    && t.object_type == object_type
                    && t.object_id == object_id
                    && t.relation == relation
            })
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn find_tuples_by_relation(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
        cancellation: &CancellationToken,
    ) -> Result<Vec<Tuple>> {
        ensure_not_cancelled(cancellation)?;
        Ok(self
            .tuples
            .iter()
            .filter(|entry| {
                let t = entry.value();
                t.object_type == object_type && t.object_id == object_id && t.relation == relation
            })
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn find_relation_config(
        &self,
        object_type: &str,
        relation: &str,
        cancellation: &CancellationToken,
    ) -> Result<Option<RelationConfig>> {
        ensure_not_cancelled(cancellation)?;
        Ok(self
            .configs
            .get(&(object_type.to_string(), relation.to_string()))
            .map(|entry| entry.value().clone()))
    }

    async fn find_condition_definition(
        &self,
        name: &str,
        cancellation: &CancellationToken,
    ) -> Result<Option<ConditionDefinition>> {
        ensure_not_cancelled(cancellation)?;
        Ok(self.conditions.get(name).map(|entry| entry.value().clone()))
    }

    async fn add_tuple(&self, tuple: Tuple, cancellation: &CancellationToken) -> Result<()> {
        ensure_not_cancelled(cancellation)?;
        let config = self
            .find_relation_config(&tuple.object_type, &tuple.relation, cancellation)
            .await?;
        validate_tuple_write(&tuple, config.as_ref())?;

        let key = tuple.natural_key();
        self.tuples.entry(key).or_insert(tuple);
        Ok(())
    }

    async fn write_relation_config(
        &self,
        object_type: &str,
        relation: &str,
        config: RelationConfig,
        cancellation: &CancellationToken,
    ) -> Result<()> {
        ensure_not_cancelled(cancellation)?;
        self.configs
            .insert((object_type.to_string(), relation.to_string()), config);
        Ok(())
    }

    async fn write_condition_definition(
        &self,
        def: ConditionDefinition,
        cancellation: &CancellationToken,
    ) -> Result<()> {
        ensure_not_cancelled(cancellation)?;
        self.conditions.insert(def.name.clone(), def);
        Ok(())
    }
}

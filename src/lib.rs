//! A Zanzibar-style relationship-based access control engine.
//!
//! This crate implements a decision engine for the relation algebra Google's
//! Zanzibar paper popularized: relationship tuples, usersets, computed
//! usersets, tuple-to-userset rewrites, intersection, exclusion, and
//! conditional tuples gated by an opaque predicate compiler.
//!
//! # Core concepts
//!
//! - **Tuple**: a relationship statement — "(subject) has (relation) to
//!   (object)".
//! - **RelationConfig**: the schema entry for one (object_type, relation)
//!   pair, describing how that relation is computed.
//! - **TupleStore**: the persistence abstraction; [`MemoryStore`] and
//!   [`PostgresStore`] are the two backends provided here.
//! - **AuthzEngine**: the facade tying a store, a condition evaluator, and
//!   the check evaluator together.
//!
//! # Example
//!
//! ```rust
//! use rebac_engine::conditions::ConditionEvaluator;
//! use rebac_engine::conditions::cel::CelPredicateCompiler;
//! use rebac_engine::{AuthzEngine, CheckRequest, MemoryStore, RelationConfig, Tuple, TupleStore};
//! use std::collections::HashSet;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> rebac_engine::error::Result<()> {
//! let store: Arc<dyn TupleStore> = Arc::new(MemoryStore::new());
//! let conditions = Arc::new(ConditionEvaluator::new(Arc::new(CelPredicateCompiler::new())));
//! let engine = AuthzEngine::new(store.clone(), conditions);
//! let cancellation = CancellationToken::new();
//!
//! store.write_relation_config(
//!     "document",
//!     "viewer",
//!     RelationConfig {
//!         directly_assignable_types: Some(["user".to_string()].into_iter().collect::<HashSet<_>>()),
//!         ..Default::default()
//!     },
//!     &cancellation,
//! ).await?;
//!
//! engine.add_tuple(Tuple {
//!     object_type: "document".into(),
//!     object_id: "doc1".into(),
//!     relation: "viewer".into(),
//!     subject_type: "user".into(),
//!     subject_id: "alice".into(),
//!     subject_relation: None,
//!     condition_name: None,
//!     condition_context: None,
//! }, &cancellation).await?;
//!
//! let allowed = engine.check(
//!     &CheckRequest::new("document", "doc1", "viewer", "user", "alice"),
//!     &cancellation,
//! ).await?;
//! assert!(allowed);
//! # Ok(())
//! # }
//! ```

pub mod check;
pub mod conditions;
pub mod config;
pub mod engine;
pub mod error;
pub mod memory_store;
pub mod models;
pub mod postgres_store;
pub mod store;

pub use config::{EngineConfig, PostgresStoreConfig};
pub use engine::AuthzEngine;
pub use error::{AuthzError, Result};
pub use memory_store::MemoryStore;
pub use models::*;
pub use postgres_store::PostgresStore;
pub use store::TupleStore;

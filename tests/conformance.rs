//! End-to-end conformance scenarios against `MemoryStore`.

use rebac_engine::conditions::cel::CelPredicateCompiler;
use rebac_engine::conditions::ConditionEvaluator;
use rebac_engine::{
    AuthzEngine, CheckRequest, ConditionDefinition, IntersectionOperand, MemoryStore,
    RelationConfig, Tuple, TupleToUserset,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn assignable(types: &[&str]) -> RelationConfig {
    RelationConfig {
        directly_assignable_types: Some(types.iter().map(|s| s.to_string()).collect::<HashSet<_>>()),
        ..Default::default()
    }
}

fn tuple(object_type: &str, object_id: &str, relation: &str, subject_type: &str, subject_id: &str) -> Tuple {
    Tuple {
        object_type: object_type.into(),
        object_id: object_id.into(),
        relation: relation.into(),
        subject_type: subject_type.into(),
        subject_id: subject_id.into(),
        subject_relation: None,
        condition_name: None,
        condition_context: None,
    }
}

fn userset(
    object_type: &str,
    object_id: &str,
    relation: &str,
    subject_type: &str,
    subject_id: &str,
    subject_relation: &str,
) -> Tuple {
    Tuple {
        subject_relation: Some(subject_relation.to_string()),
        ..tuple(object_type, object_id, relation, subject_type, subject_id)
    }
}

fn new_engine() -> AuthzEngine {
    let store = Arc::new(MemoryStore::new());
    let conditions = Arc::new(ConditionEvaluator::new(Arc::new(CelPredicateCompiler::new())));
    AuthzEngine::new(store, conditions)
}

#[tokio::test]
async fn scenario_1_blocklists() {
    let engine = new_engine();
    let token = CancellationToken::new();
    engine.write_relation_config("team", "member", assignable(&["user"]), &token).await.unwrap();
    engine.write_relation_config("document", "blocked", assignable(&["user"]), &token).await.unwrap();
    engine
        .write_relation_config(
            "document",
            "editor",
            RelationConfig {
                directly_assignable_types: Some(["user".to_string()].into_iter().collect()),
                allows_userset_subjects: true,
                excluded_by: Some("blocked".into()),
                ..Default::default()
            },
            &token,
        )
        .await
        .unwrap();

    engine.add_tuple(tuple("team", "eng", "member", "user", "becky"), &token).await.unwrap();
    engine.add_tuple(tuple("team", "eng", "member", "user", "carl"), &token).await.unwrap();
    engine
        .add_tuple(userset("document", "planning", "editor", "team", "eng", "member"), &token)
        .await
        .unwrap();
    engine.add_tuple(tuple("document", "planning", "blocked", "user", "carl"), &token).await.unwrap();

    let check = |relation: &'static str, subject: &'static str| {
        CheckRequest::new("document", "planning", relation, "user", subject)
    };

    assert!(engine.check(&check("editor", "becky"), &token).await.unwrap());
    assert!(!engine.check(&check("editor", "carl"), &token).await.unwrap());
    assert!(engine.check(&check("blocked", "carl"), &token).await.unwrap());
    assert!(!engine.check(&check("blocked", "becky"), &token).await.unwrap());
    assert!(!engine.check(&check("editor", "dave"), &token).await.unwrap());
}

#[tokio::test]
async fn scenario_2_roles_and_permissions() {
    let engine = new_engine();
    let token = CancellationToken::new();
    engine.write_relation_config("trip", "owner", assignable(&["user"]), &token).await.unwrap();
    engine.write_relation_config("trip", "viewer", assignable(&["user"]), &token).await.unwrap();
    engine
        .write_relation_config(
            "trip",
            "booking_adder",
            RelationConfig {
                computed_userset: Some("owner".into()),
                ..Default::default()
            },
            &token,
        )
        .await
        .unwrap();
    engine
        .write_relation_config(
            "trip",
            "booking_viewer",
            RelationConfig {
                implied_by: Some(vec!["viewer".into(), "owner".into()]),
                ..Default::default()
            },
            &token,
        )
        .await
        .unwrap();

    engine.add_tuple(tuple("trip", "europe", "viewer", "user", "bob"), &token).await.unwrap();
    engine.add_tuple(tuple("trip", "europe", "owner", "user", "alice"), &token).await.unwrap();

    let check = |relation: &'static str, subject: &'static str| {
        CheckRequest::new("trip", "europe", relation, "user", subject)
    };

    assert!(engine.check(&check("viewer", "bob"), &token).await.unwrap());
    assert!(engine.check(&check("owner", "alice"), &token).await.unwrap());
    assert!(engine.check(&check("booking_viewer", "bob"), &token).await.unwrap());
    assert!(!engine.check(&check("booking_adder", "bob"), &token).await.unwrap());
    assert!(engine.check(&check("booking_viewer", "alice"), &token).await.unwrap());
    assert!(engine.check(&check("booking_adder", "alice"), &token).await.unwrap());
}

#[tokio::test]
async fn scenario_3_recursive_tuple_to_userset_expenses() {
    let engine = new_engine();
    let token = CancellationToken::new();
    engine.write_relation_config("employee", "manager", assignable(&["employee"]), &token).await.unwrap();
    engine
        .write_relation_config(
            "employee",
            "can_manage",
            RelationConfig {
                implied_by: Some(vec!["manager".into()]),
                tuple_to_userset: Some(TupleToUserset {
                    tupleset: "manager".into(),
                    computed_userset: "can_manage".into(),
                }),
                ..Default::default()
            },
            &token,
        )
        .await
        .unwrap();
    engine.write_relation_config("report", "submitter", assignable(&["employee"]), &token).await.unwrap();
    engine
        .write_relation_config(
            "report",
            "can_approve",
            RelationConfig {
                tuple_to_userset: Some(TupleToUserset {
                    tupleset: "submitter".into(),
                    computed_userset: "can_manage".into(),
                }),
                ..Default::default()
            },
            &token,
        )
        .await
        .unwrap();

    // Chain: D reports to C, C to B, B to A.
    engine.add_tuple(tuple("employee", "d", "manager", "employee", "c"), &token).await.unwrap();
    engine.add_tuple(tuple("employee", "c", "manager", "employee", "b"), &token).await.unwrap();
    engine.add_tuple(tuple("employee", "b", "manager", "employee", "a"), &token).await.unwrap();
    engine.add_tuple(tuple("report", "expense_1", "submitter", "employee", "d"), &token).await.unwrap();

    assert!(engine
        .check(&CheckRequest::new("employee", "d", "can_manage", "employee", "a"), &token)
        .await
        .unwrap());
    assert!(engine
        .check(&CheckRequest::new("report", "expense_1", "can_approve", "employee", "a"), &token)
        .await
        .unwrap());
    assert!(!engine
        .check(&CheckRequest::new("report", "expense_1", "can_approve", "employee", "d"), &token)
        .await
        .unwrap());
    assert!(!engine
        .check(&CheckRequest::new("employee", "a", "can_manage", "employee", "d"), &token)
        .await
        .unwrap());
}

#[tokio::test]
async fn scenario_4_intersection() {
    let engine = new_engine();
    let token = CancellationToken::new();
    engine.write_relation_config("document", "writer", assignable(&["user"]), &token).await.unwrap();
    engine.write_relation_config("organization", "member", assignable(&["user"]), &token).await.unwrap();
    engine.write_relation_config("document", "owner", assignable(&["organization"]), &token).await.unwrap();
    engine
        .write_relation_config(
            "document",
            "can_delete",
            RelationConfig {
                intersection: Some(vec![
                    IntersectionOperand::ComputedUserset { relation: "writer".into() },
                    IntersectionOperand::TupleToUserset {
                        tupleset: "owner".into(),
                        computed_userset: "member".into(),
                    },
                ]),
                ..Default::default()
            },
            &token,
        )
        .await
        .unwrap();

    engine.add_tuple(tuple("document", "plan", "writer", "user", "becky"), &token).await.unwrap();
    engine.add_tuple(tuple("document", "plan", "writer", "user", "carl"), &token).await.unwrap();
    engine.add_tuple(tuple("document", "plan", "owner", "organization", "acme"), &token).await.unwrap();
    engine.add_tuple(tuple("organization", "acme", "member", "user", "becky"), &token).await.unwrap();

    assert!(engine
        .check(&CheckRequest::new("document", "plan", "can_delete", "user", "becky"), &token)
        .await
        .unwrap());
    assert!(!engine
        .check(&CheckRequest::new("document", "plan", "can_delete", "user", "carl"), &token)
        .await
        .unwrap());
}

#[tokio::test]
async fn scenario_5_conditional_tuple() {
    let engine = new_engine();
    let token = CancellationToken::new();
    engine.write_relation_config("document", "viewer", assignable(&["user"]), &token).await.unwrap();
    engine
        .write_condition_definition(
            ConditionDefinition {
                name: "region_is_eu".into(),
                expression: "region == \"EU\"".into(),
            },
            &token,
        )
        .await
        .unwrap();

    let mut conditional = tuple("document", "planning", "viewer", "user", "becky");
    conditional.condition_name = Some("region_is_eu".into());
    engine.add_tuple(conditional, &token).await.unwrap();

    let mut eu = HashMap::new();
    eu.insert("region".to_string(), serde_json::Value::String("EU".into()));
    let request = CheckRequest::new("document", "planning", "viewer", "user", "becky").with_context(eu);
    assert!(engine.check(&request, &token).await.unwrap());

    let mut us = HashMap::new();
    us.insert("region".to_string(), serde_json::Value::String("US".into()));
    let request = CheckRequest::new("document", "planning", "viewer", "user", "becky").with_context(us);
    assert!(!engine.check(&request, &token).await.unwrap());

    // No context and no default on the tuple: the condition cannot be
    // resolved. This surfaces as a propagated evaluation error rather than
    // a silent false.
    let request = CheckRequest::new("document", "planning", "viewer", "user", "becky");
    assert!(engine.check(&request, &token).await.is_err());
}

#[tokio::test]
async fn scenario_6_depth_cap() {
    let engine = new_engine();
    let token = CancellationToken::new();
    engine
        .write_relation_config(
            "self",
            "loops",
            RelationConfig {
                computed_userset: Some("loops".into()),
                ..Default::default()
            },
            &token,
        )
        .await
        .unwrap();

    let request = CheckRequest::new("self", "x", "loops", "user", "anyone");
    assert!(!engine.check(&request, &token).await.unwrap());
}

#[tokio::test]
async fn scenario_7_cancelled_request_fails_fast() {
    let engine = new_engine();
    let token = CancellationToken::new();
    engine.write_relation_config("document", "viewer", assignable(&["user"]), &token).await.unwrap();
    engine.add_tuple(tuple("document", "planning", "viewer", "user", "becky"), &token).await.unwrap();

    token.cancel();
    let request = CheckRequest::new("document", "planning", "viewer", "user", "becky");
    let err = engine.check(&request, &token).await.unwrap_err();
    assert!(matches!(err, rebac_engine::AuthzError::Cancelled));
}

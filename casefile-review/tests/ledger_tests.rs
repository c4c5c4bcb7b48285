//! Integration tests for the field verification ledger and resubmission drift

mod helpers;

use casefile_review::models::{FieldStatus, RecordStatus};
use casefile_review::workflow::PassRequest;
use casefile_review::WorkflowError;
use helpers::*;
use serde_json::json;

fn pass(notes: &str, sources: &[i64]) -> PassRequest {
    PassRequest {
        notes: Some(notes.to_string()),
        source_ids: sources.to_vec(),
    }
}

#[tokio::test]
async fn test_two_pass_field_verification() {
    let env = setup().await;
    let record_id = record_at(&env, RecordStatus::FirstReview).await;
    let ledger = &env.engine.ledger;

    let first = ledger
        .record_first_pass(
            record_id,
            "location",
            &analyst(FIRST_ANALYST),
            None,
            pass("Matches article", &[7]),
        )
        .await
        .unwrap();
    assert_eq!(first.verification_status, FieldStatus::FirstReview);
    assert_eq!(first.field_value, Some(json!("Springfield")));
    assert_eq!(first.first_verified_by(), Some(FIRST_ANALYST));
    assert_eq!(first.first_pass.as_ref().unwrap().source_ids, vec![7]);

    let second = ledger
        .record_second_pass(
            record_id,
            "location",
            &analyst(SECOND_ANALYST),
            pass("Confirmed", &[7, 9]),
        )
        .await
        .unwrap();
    assert_eq!(second.verification_status, FieldStatus::Verified);
    assert_eq!(second.second_verified_by(), Some(SECOND_ANALYST));
    assert_eq!(second.revision, 2);

    let summary = ledger.summarize(record_id, &editor(EDITOR)).await.unwrap();
    assert_eq!(summary.fields_verified, 1);
    assert_eq!(summary.fields_needing_review, 2);
}

#[tokio::test]
async fn test_second_pass_needs_distinct_reviewer() {
    let env = setup().await;
    let record_id = submit(&env, SUBMITTER).await;
    let ledger = &env.engine.ledger;
    let actor = analyst(FIRST_ANALYST);

    ledger
        .record_first_pass(record_id, "victim_name", &actor, None, PassRequest::default())
        .await
        .unwrap();

    match ledger
        .record_second_pass(record_id, "victim_name", &actor, PassRequest::default())
        .await
    {
        Err(WorkflowError::SameReviewer { prior_stage, .. }) => {
            assert_eq!(prior_stage, "first_pass")
        }
        other => panic!("expected SameReviewer, got {:?}", other),
    }

    // Admin is exempt
    let row = ledger
        .record_second_pass(record_id, "victim_name", &admin(FIRST_ANALYST), PassRequest::default())
        .await
        .unwrap();
    assert_eq!(row.verification_status, FieldStatus::Verified);
}

#[tokio::test]
async fn test_second_pass_without_first_pass() {
    let env = setup().await;
    let record_id = submit(&env, SUBMITTER).await;

    assert!(matches!(
        env.engine
            .ledger
            .record_second_pass(
                record_id,
                "location",
                &analyst(SECOND_ANALYST),
                PassRequest::default(),
            )
            .await,
        Err(WorkflowError::WrongState { .. })
    ));
}

#[tokio::test]
async fn test_field_writes_blocked_by_foreign_lock() {
    let env = setup().await;
    let record_id = submit(&env, SUBMITTER).await;

    env.engine
        .locks
        .acquire_or_extend(record_id, &analyst(FIRST_ANALYST), false)
        .await
        .unwrap();

    assert!(matches!(
        env.engine
            .ledger
            .record_first_pass(
                record_id,
                "location",
                &analyst(SECOND_ANALYST),
                None,
                PassRequest::default(),
            )
            .await,
        Err(WorkflowError::LockHeld { holder: FIRST_ANALYST, .. })
    ));

    // The holder may write
    env.engine
        .ledger
        .record_first_pass(
            record_id,
            "location",
            &analyst(FIRST_ANALYST),
            None,
            PassRequest::default(),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_changed_value_discards_second_pass() {
    let env = setup().await;
    let record_id = submit(&env, SUBMITTER).await;
    let ledger = &env.engine.ledger;

    ledger
        .record_first_pass(
            record_id,
            "location",
            &analyst(FIRST_ANALYST),
            None,
            PassRequest::default(),
        )
        .await
        .unwrap();
    ledger
        .record_second_pass(record_id, "location", &analyst(SECOND_ANALYST), PassRequest::default())
        .await
        .unwrap();

    let redone = ledger
        .record_first_pass(
            record_id,
            "location",
            &analyst(77),
            Some(json!("Shelbyville")),
            PassRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(redone.verification_status, FieldStatus::FirstReview);
    assert!(redone.second_pass.is_none());
    assert_eq!(redone.field_value, Some(json!("Shelbyville")));
}

#[tokio::test]
async fn test_resubmission_resets_drifted_fields() {
    let env = setup().await;
    let record_id = record_at(&env, RecordStatus::FirstReview).await;
    let ledger = &env.engine.ledger;

    for field in ["location", "victim_name"] {
        ledger
            .record_first_pass(
                record_id,
                field,
                &analyst(FIRST_ANALYST),
                None,
                PassRequest::default(),
            )
            .await
            .unwrap();
        ledger
            .record_second_pass(record_id, field, &analyst(SECOND_ANALYST), PassRequest::default())
            .await
            .unwrap();
    }

    let actor = analyst(FIRST_ANALYST);
    env.engine.locks.acquire_or_extend(record_id, &actor, false).await.unwrap();
    env.engine
        .machine
        .reject(record_id, &actor, "Location is wrong")
        .await
        .unwrap();

    let record = env
        .engine
        .submissions
        .resubmit(record_id, &user(SUBMITTER), details(json!({ "location": "Shelbyville" })))
        .await
        .unwrap();
    assert_eq!(record.status, RecordStatus::Pending);
    assert_eq!(record.review_cycle, 1);
    assert_eq!(record.details.get("location"), Some(&json!("Shelbyville")));
    assert_eq!(record.details.get("victim_name"), Some(&json!("Jane Doe")));
    assert!(record.first_verified.is_none());
    assert!(record.rejection.is_none());

    let fields = ledger.list(record_id, &editor(EDITOR)).await.unwrap();
    let location = fields.iter().find(|f| f.field_name == "location").unwrap();
    let victim = fields.iter().find(|f| f.field_name == "victim_name").unwrap();
    assert_eq!(location.verification_status, FieldStatus::Pending);
    assert!(location.second_pass.is_none());
    assert_eq!(victim.verification_status, FieldStatus::Verified);

    let history = env
        .engine
        .submissions
        .history(record_id, &editor(EDITOR))
        .await
        .unwrap();
    assert_eq!(history.iter().filter(|e| e.kind == "field_drift_reset").count(), 1);
    assert!(history.iter().any(|e| e.kind == "resubmitted"));
}

#[tokio::test]
async fn test_resubmit_rules() {
    let env = setup().await;
    let record_id = submit(&env, SUBMITTER).await;

    // Only rejected records can be resubmitted
    assert!(matches!(
        env.engine
            .submissions
            .resubmit(record_id, &user(SUBMITTER), sample_details())
            .await,
        Err(WorkflowError::WrongState { .. })
    ));

    let actor = analyst(FIRST_ANALYST);
    env.engine.locks.acquire_or_extend(record_id, &actor, false).await.unwrap();
    env.engine.machine.reject(record_id, &actor, "Incomplete").await.unwrap();

    // A different plain user may not resubmit someone else's record
    assert!(matches!(
        env.engine
            .submissions
            .resubmit(record_id, &user(555), sample_details())
            .await,
        Err(WorkflowError::Forbidden { .. })
    ));

    // Editors may
    let record = env
        .engine
        .submissions
        .resubmit(record_id, &editor(EDITOR), sample_details())
        .await
        .unwrap();
    assert_eq!(record.review_cycle, 1);
}

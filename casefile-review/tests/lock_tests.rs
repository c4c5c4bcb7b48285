//! Integration tests for record locks

mod helpers;

use casefile_common::time;
use casefile_review::WorkflowError;
use chrono::Duration;
use helpers::*;
use tokio::task::JoinSet;

#[tokio::test]
async fn test_lock_exclusivity() {
    let env = setup().await;
    let record_id = submit(&env, SUBMITTER).await;
    let locks = &env.engine.locks;

    let info = locks
        .acquire_or_extend(record_id, &analyst(FIRST_ANALYST), false)
        .await
        .unwrap();
    assert_eq!(info.locked_by, FIRST_ANALYST);
    assert_eq!(info.remaining_minutes, 30);

    let err = locks
        .acquire_or_extend(record_id, &analyst(SECOND_ANALYST), false)
        .await
        .unwrap_err();
    match err {
        WorkflowError::LockHeld {
            holder,
            remaining_minutes,
            ..
        } => {
            assert_eq!(holder, FIRST_ANALYST);
            assert!(remaining_minutes > 0 && remaining_minutes <= 30);
        }
        other => panic!("expected LockHeld, got {:?}", other),
    }

    // Holder is unchanged
    let status = locks
        .status(record_id, &editor(EDITOR))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.locked_by, FIRST_ANALYST);
}

#[tokio::test]
async fn test_lock_expires_after_thirty_minutes() {
    let env = setup().await;
    let record_id = submit(&env, SUBMITTER).await;
    let locks = &env.engine.locks;
    let t0 = time::now();

    locks
        .acquire_or_extend_at(record_id, &analyst(FIRST_ANALYST), false, t0)
        .await
        .unwrap();

    let before = t0 + Duration::minutes(29);
    assert!(matches!(
        locks
            .acquire_or_extend_at(record_id, &analyst(SECOND_ANALYST), false, before)
            .await,
        Err(WorkflowError::LockHeld { .. })
    ));

    let at_expiry = t0 + Duration::minutes(30);
    assert!(locks
        .status_at(record_id, &editor(EDITOR), at_expiry)
        .await
        .unwrap()
        .is_none());

    let info = locks
        .acquire_or_extend_at(record_id, &analyst(SECOND_ANALYST), false, at_expiry)
        .await
        .unwrap();
    assert_eq!(info.locked_by, SECOND_ANALYST);
    assert_eq!(info.expires_at, at_expiry + Duration::minutes(30));
}

#[tokio::test]
async fn test_extend_keeps_original_locked_at() {
    let env = setup().await;
    let record_id = submit(&env, SUBMITTER).await;
    let locks = &env.engine.locks;
    let actor = analyst(FIRST_ANALYST);
    let t0 = time::now();

    locks.acquire_or_extend_at(record_id, &actor, false, t0).await.unwrap();

    let t1 = t0 + Duration::minutes(20);
    let extended = locks.acquire_or_extend_at(record_id, &actor, true, t1).await.unwrap();
    assert_eq!(extended.locked_at, Some(t0));
    assert_eq!(extended.expires_at, t1 + Duration::minutes(30));

    let t2 = t0 + Duration::minutes(25);
    let reacquired = locks.acquire_or_extend_at(record_id, &actor, false, t2).await.unwrap();
    assert_eq!(reacquired.locked_at, Some(t2));
}

#[tokio::test]
async fn test_admin_takes_over_live_lock() {
    let env = setup().await;
    let record_id = submit(&env, SUBMITTER).await;
    let locks = &env.engine.locks;

    locks
        .acquire_or_extend(record_id, &analyst(FIRST_ANALYST), false)
        .await
        .unwrap();
    let info = locks
        .acquire_or_extend(record_id, &admin(ADMIN), false)
        .await
        .unwrap();
    assert_eq!(info.locked_by, ADMIN);

    // The previous holder is now the outsider
    assert!(matches!(
        locks
            .acquire_or_extend(record_id, &analyst(FIRST_ANALYST), false)
            .await,
        Err(WorkflowError::LockHeld { holder: ADMIN, .. })
    ));

    let history = env
        .engine
        .submissions
        .history(record_id, &editor(EDITOR))
        .await
        .unwrap();
    assert!(history.iter().any(|e| e.kind == "lock_taken_over"));
}

#[tokio::test]
async fn test_release_rules() {
    let env = setup().await;
    let record_id = submit(&env, SUBMITTER).await;
    let locks = &env.engine.locks;

    // Releasing an unlocked record is a no-op
    locks.release(record_id, &editor(EDITOR)).await.unwrap();

    locks
        .acquire_or_extend(record_id, &analyst(FIRST_ANALYST), false)
        .await
        .unwrap();

    assert!(matches!(
        locks.release(record_id, &analyst(SECOND_ANALYST)).await,
        Err(WorkflowError::NotLockOwner {
            holder: Some(FIRST_ANALYST),
            ..
        })
    ));

    locks.release(record_id, &admin(ADMIN)).await.unwrap();
    assert!(locks.status(record_id, &editor(EDITOR)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_lock_requires_editor_role() {
    let env = setup().await;
    let record_id = submit(&env, SUBMITTER).await;

    assert!(matches!(
        env.engine
            .locks
            .acquire_or_extend(record_id, &user(SUBMITTER), false)
            .await,
        Err(WorkflowError::Forbidden { .. })
    ));
}

#[tokio::test]
async fn test_lock_on_missing_record() {
    let env = setup().await;
    assert!(matches!(
        env.engine
            .locks
            .acquire_or_extend(4242, &editor(EDITOR), false)
            .await,
        Err(WorkflowError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_concurrent_acquire_has_single_winner() {
    let env = setup().await;
    let record_id = submit(&env, SUBMITTER).await;

    let mut join_set = JoinSet::new();
    for i in 0..8 {
        let locks = env.engine.locks.clone();
        join_set.spawn(async move {
            let actor = analyst(100 + i);
            (actor.user_id, locks.acquire_or_extend(record_id, &actor, false).await)
        });
    }

    let mut winners = Vec::new();
    let mut losers = 0;
    while let Some(joined) = join_set.join_next().await {
        let (user_id, result) = joined.unwrap();
        match result {
            Ok(info) => {
                assert_eq!(info.locked_by, user_id);
                winners.push(user_id);
            }
            Err(WorkflowError::LockHeld { holder, .. }) => {
                assert_ne!(holder, user_id);
                losers += 1;
            }
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!(winners.len(), 1, "exactly one acquisition must succeed");
    assert_eq!(losers, 7);

    let holder = env
        .engine
        .locks
        .status(record_id, &editor(EDITOR))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(holder.locked_by, winners[0]);
}

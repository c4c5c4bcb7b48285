//! Shared test fixtures
//!
//! Each test gets its own temporary database file. A file (rather than
//! `sqlite::memory:`) is required because the pool hands out several
//! connections and they must all see the same data.

#![allow(dead_code)]

use casefile_common::db::init_database;
use casefile_common::events::EventBus;
use casefile_common::{Actor, Role, UserId};
use casefile_review::models::{RecordDetails, RecordId, RecordStatus};
use casefile_review::{EngineSettings, WorkflowEngine};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::TempDir;

pub const SUBMITTER: UserId = 1;
pub const EDITOR: UserId = 10;
pub const FIRST_ANALYST: UserId = 20;
pub const SECOND_ANALYST: UserId = 30;
pub const VALIDATOR: UserId = 40;
pub const ADMIN: UserId = 99;

pub struct TestEnv {
    /// Keeps the database file alive for the test
    pub dir: TempDir,
    pub pool: SqlitePool,
    pub event_bus: EventBus,
    pub engine: WorkflowEngine,
}

pub async fn setup() -> TestEnv {
    setup_with(EngineSettings::default()).await
}

pub async fn setup_with(settings: EngineSettings) -> TestEnv {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let pool = init_database(&dir.path().join("casefile_test.db"))
        .await
        .expect("Failed to initialize test database");
    let event_bus = EventBus::new(64);
    let engine = WorkflowEngine::new(pool.clone(), event_bus.clone(), settings);

    TestEnv {
        dir,
        pool,
        event_bus,
        engine,
    }
}

pub fn user(id: UserId) -> Actor {
    Actor::new(id, Role::User)
}

pub fn editor(id: UserId) -> Actor {
    Actor::new(id, Role::Editor)
}

pub fn analyst(id: UserId) -> Actor {
    Actor::new(id, Role::Analyst)
}

pub fn validator(id: UserId) -> Actor {
    Actor::new(id, Role::Validator)
}

pub fn admin(id: UserId) -> Actor {
    Actor::new(id, Role::Admin)
}

pub fn details(value: Value) -> RecordDetails {
    serde_json::from_value(value).expect("details must be a JSON object")
}

pub fn sample_details() -> RecordDetails {
    details(json!({
        "victim_name": "Jane Doe",
        "location": "Springfield",
        "incident_date": "2024-03-01",
    }))
}

/// Submit a record as `submitter` (a plain user)
pub async fn submit(env: &TestEnv, submitter: UserId) -> RecordId {
    env.engine
        .submissions
        .submit(&user(submitter), sample_details())
        .await
        .expect("submit failed")
        .id
}

/// Lock, run one forward transition, unlock
pub async fn step(env: &TestEnv, record_id: RecordId, actor: &Actor) -> RecordStatus {
    env.engine
        .locks
        .acquire_or_extend(record_id, actor, false)
        .await
        .expect("lock failed");
    let record = env
        .engine
        .machine
        .advance(record_id, actor, None)
        .await
        .expect("advance failed");
    env.engine
        .locks
        .release(record_id, actor)
        .await
        .expect("release failed");
    record.status
}

/// Drive a freshly submitted record forward to `target` using distinct actors
pub async fn drive_to(env: &TestEnv, record_id: RecordId, target: RecordStatus) {
    let pipeline = [
        (RecordStatus::FirstReview, editor(EDITOR)),
        (RecordStatus::SecondReview, analyst(FIRST_ANALYST)),
        (RecordStatus::FirstValidation, analyst(SECOND_ANALYST)),
        (RecordStatus::Verified, validator(VALIDATOR)),
    ];

    if target == RecordStatus::Pending {
        return;
    }
    for (status, actor) in pipeline {
        assert_eq!(step(env, record_id, &actor).await, status);
        if status == target {
            return;
        }
    }
    panic!("cannot drive a record to {}", target);
}

/// Submit a record and drive it to `target`
pub async fn record_at(env: &TestEnv, target: RecordStatus) -> RecordId {
    let record_id = submit(env, SUBMITTER).await;
    drive_to(env, record_id, target).await;
    record_id
}

//! Verification & locking workflow engine
//!
//! Components share one [`RecordRepository`] and one [`EventBus`]. Every
//! mutating operation follows the same shape:
//!
//! 1. authorize against the policy table
//! 2. read the record and evaluate guards outside any transaction
//! 3. open a transaction whose first statement is the conditional write
//! 4. append the audit row, commit, then broadcast the event
//!
//! A conditional write that matches no row means the record changed between
//! read and write. The guards are re-evaluated against a fresh read so the
//! caller gets the specific violation; if none applies the result is
//! `Contended`. Nothing is retried internally.

pub mod ledger;
pub mod lock;
pub mod policy;
pub mod queue;
pub mod quotes;
pub mod state_machine;
pub mod submission;
pub mod tracker;

use casefile_common::config::{WorkflowConfig, MAX_LOCK_DURATION_MINUTES};
use casefile_common::events::EventBus;
use chrono::Duration;
use sqlx::SqlitePool;

use crate::db::RecordRepository;
use crate::error::{WorkflowError, WorkflowResult};
use crate::models::{Record, RecordId};

pub use ledger::{FieldLedger, PassRequest};
pub use lock::LockManager;
pub use policy::{authorize, Operation};
pub use queue::{QueueSelector, QueueStage, RecordSummary};
pub use quotes::{NewQuote, QuoteBook, QuoteUpdate};
pub use state_machine::ReviewStateMachine;
pub use submission::{RecordView, Submissions};
pub use tracker::{DisputeTracker, NewDispute, NewIssue};

/// Engine tuning derived from `[workflow]` config
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub lock_duration: Duration,
    pub require_distinct_approver: bool,
}

impl EngineSettings {
    /// Lock lifetime is clamped to the range config validation accepts
    pub fn from_config(config: &WorkflowConfig) -> Self {
        let minutes = config.lock_duration_minutes.clamp(1, MAX_LOCK_DURATION_MINUTES);
        Self {
            lock_duration: Duration::minutes(minutes),
            require_distinct_approver: config.require_distinct_approver,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&WorkflowConfig::default())
    }
}

/// All workflow components over one store
#[derive(Clone)]
pub struct WorkflowEngine {
    pub locks: LockManager,
    pub ledger: FieldLedger,
    pub machine: ReviewStateMachine,
    pub tracker: DisputeTracker,
    pub queue: QueueSelector,
    pub quotes: QuoteBook,
    pub submissions: Submissions,
}

impl WorkflowEngine {
    pub fn new(pool: SqlitePool, event_bus: EventBus, settings: EngineSettings) -> Self {
        let repo = RecordRepository::new(pool);
        let ledger = FieldLedger::new(repo.clone(), event_bus.clone());
        let tracker = DisputeTracker::new(repo.clone(), event_bus.clone());

        Self {
            locks: LockManager::new(repo.clone(), event_bus.clone(), settings),
            machine: ReviewStateMachine::new(repo.clone(), event_bus.clone(), settings),
            queue: QueueSelector::new(repo.clone(), ledger.clone()),
            quotes: QuoteBook::new(repo.clone()),
            submissions: Submissions::new(repo, event_bus, ledger.clone(), tracker.clone()),
            ledger,
            tracker,
        }
    }
}

/// Load a live (not soft-deleted) record or fail with `NotFound`
pub(crate) async fn require_record(
    repo: &RecordRepository,
    record_id: RecordId,
) -> WorkflowResult<Record> {
    repo.get(record_id)
        .await?
        .ok_or_else(|| WorkflowError::not_found("Record", record_id))
}

//! Workflow data model

pub mod blocker;
pub mod event;
pub mod field;
pub mod quote;
pub mod record;

pub use blocker::{DisputeStatus, OpenBlockers, ValidationIssue, VerificationDispute};
pub use event::{EventKind, RecordEvent};
pub use field::{FieldStatus, FieldVerification, LedgerSummary, VerificationPass};
pub use quote::Quote;
pub use record::{
    ActorStamp, LockInfo, LockState, Record, RecordDetails, RecordId, RecordStatus, Rejection,
};

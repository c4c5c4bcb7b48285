//! Authorization policy table
//!
//! Each engine operation consults this table exactly once, before touching
//! storage. A role may perform an operation when it is at or above the
//! operation's floor; admin clears every floor.

use casefile_common::{Actor, Role};
use serde::Serialize;
use std::fmt;
use tracing::warn;

use crate::error::{WorkflowError, WorkflowResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Submit,
    Resubmit,
    ViewRecord,
    ViewHistory,
    ViewLock,
    AcquireLock,
    ReleaseLock,
    ViewClaimQueue,
    ViewReviewQueue,
    SubmitForReview,
    AdvanceToSecondReview,
    AdvanceToValidation,
    Approve,
    Reject,
    ViewFields,
    RecordFieldPass,
    ViewBlockers,
    RaiseIssue,
    ResolveIssue,
    RaiseDispute,
    ResolveDispute,
    ViewQuotes,
    ManageQuotes,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Submit => "submit",
            Operation::Resubmit => "resubmit",
            Operation::ViewRecord => "view_record",
            Operation::ViewHistory => "view_history",
            Operation::ViewLock => "view_lock",
            Operation::AcquireLock => "acquire_lock",
            Operation::ReleaseLock => "release_lock",
            Operation::ViewClaimQueue => "view_claim_queue",
            Operation::ViewReviewQueue => "view_review_queue",
            Operation::SubmitForReview => "submit_for_review",
            Operation::AdvanceToSecondReview => "advance_to_second_review",
            Operation::AdvanceToValidation => "advance_to_validation",
            Operation::Approve => "approve",
            Operation::Reject => "reject",
            Operation::ViewFields => "view_fields",
            Operation::RecordFieldPass => "record_field_pass",
            Operation::ViewBlockers => "view_blockers",
            Operation::RaiseIssue => "raise_issue",
            Operation::ResolveIssue => "resolve_issue",
            Operation::RaiseDispute => "raise_dispute",
            Operation::ResolveDispute => "resolve_dispute",
            Operation::ViewQuotes => "view_quotes",
            Operation::ManageQuotes => "manage_quotes",
        }
    }

    /// Least privileged role allowed to perform the operation
    pub fn floor(&self) -> Role {
        match self {
            Operation::Submit => Role::Guest,
            Operation::Resubmit | Operation::RaiseDispute => Role::User,
            Operation::ViewRecord
            | Operation::ViewHistory
            | Operation::ViewLock
            | Operation::AcquireLock
            | Operation::ReleaseLock
            | Operation::ViewClaimQueue
            | Operation::SubmitForReview
            | Operation::ViewFields
            | Operation::ViewBlockers
            | Operation::ViewQuotes
            | Operation::ManageQuotes => Role::Editor,
            Operation::ViewReviewQueue
            | Operation::AdvanceToSecondReview
            | Operation::AdvanceToValidation
            | Operation::Reject
            | Operation::RecordFieldPass
            | Operation::RaiseIssue
            | Operation::ResolveIssue
            | Operation::ResolveDispute => Role::Analyst,
            Operation::Approve => Role::Validator,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn is_allowed(role: Role, operation: Operation) -> bool {
    role == Role::Admin || role >= operation.floor()
}

/// Fail with `Forbidden` unless `actor` may perform `operation`
pub fn authorize(actor: &Actor, operation: Operation) -> WorkflowResult<()> {
    if is_allowed(actor.role, operation) {
        Ok(())
    } else {
        warn!(
            user_id = actor.user_id,
            role = %actor.role,
            operation = %operation,
            "Operation forbidden for role"
        );
        Err(WorkflowError::Forbidden {
            role: actor.role,
            operation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_OPERATIONS: [Operation; 23] = [
        Operation::Submit,
        Operation::Resubmit,
        Operation::ViewRecord,
        Operation::ViewHistory,
        Operation::ViewLock,
        Operation::AcquireLock,
        Operation::ReleaseLock,
        Operation::ViewClaimQueue,
        Operation::ViewReviewQueue,
        Operation::SubmitForReview,
        Operation::AdvanceToSecondReview,
        Operation::AdvanceToValidation,
        Operation::Approve,
        Operation::Reject,
        Operation::ViewFields,
        Operation::RecordFieldPass,
        Operation::ViewBlockers,
        Operation::RaiseIssue,
        Operation::ResolveIssue,
        Operation::RaiseDispute,
        Operation::ResolveDispute,
        Operation::ViewQuotes,
        Operation::ManageQuotes,
    ];

    #[test]
    fn test_admin_may_do_everything() {
        for op in ALL_OPERATIONS {
            assert!(is_allowed(Role::Admin, op), "admin denied {}", op);
        }
    }

    #[test]
    fn test_lock_operations_need_editor() {
        for op in [Operation::ViewLock, Operation::AcquireLock, Operation::ReleaseLock] {
            assert!(!is_allowed(Role::User, op));
            assert!(is_allowed(Role::Editor, op));
        }
    }

    #[test]
    fn test_review_floor_is_analyst() {
        for op in [
            Operation::AdvanceToSecondReview,
            Operation::AdvanceToValidation,
            Operation::Reject,
            Operation::RecordFieldPass,
            Operation::ViewReviewQueue,
        ] {
            assert!(!is_allowed(Role::Editor, op));
            assert!(is_allowed(Role::Analyst, op));
            assert!(is_allowed(Role::Validator, op));
        }
    }

    #[test]
    fn test_approve_needs_validator() {
        assert!(!is_allowed(Role::Analyst, Operation::Approve));
        assert!(is_allowed(Role::Validator, Operation::Approve));
    }

    #[test]
    fn test_guests_may_only_submit() {
        for op in ALL_OPERATIONS {
            assert_eq!(is_allowed(Role::Guest, op), op == Operation::Submit, "{}", op);
        }
    }

    #[test]
    fn test_authorize_reports_operation() {
        let editor = Actor::new(5, Role::Editor);
        match authorize(&editor, Operation::Approve) {
            Err(WorkflowError::Forbidden { role, operation }) => {
                assert_eq!(role, Role::Editor);
                assert_eq!(operation, Operation::Approve);
            }
            other => panic!("expected Forbidden, got {:?}", other),
        }
        assert!(authorize(&editor, Operation::AcquireLock).is_ok());
    }
}

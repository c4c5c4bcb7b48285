//! HTTP API handlers for casefile-review

pub mod blockers;
pub mod body;
pub mod fields;
pub mod health;
pub mod identity;
pub mod locks;
pub mod queue;
pub mod quotes;
pub mod records;
pub mod sse;
pub mod transitions;

pub use blockers::{
    list_disputes, list_issues, raise_dispute, raise_issue, resolve_dispute, resolve_issue,
};
pub use body::OptionalJson;
pub use fields::{first_pass, list_fields, second_pass};
pub use health::health_routes;
pub use identity::{Caller, USER_ID_HEADER, USER_ROLE_HEADER};
pub use locks::{acquire_lock, lock_status, release_lock};
pub use queue::get_queue;
pub use quotes::{add_quote, delete_quote, list_quotes, update_quote};
pub use records::{get_record, record_history, resubmit_record, submit_record};
pub use sse::event_stream;
pub use transitions::{advance, approve, reject, submit_for_review};

//! Workflow event types and the event bus
//!
//! Every successful engine mutation is broadcast so connected dashboards can
//! refresh without polling. Delivery is best-effort: events are a
//! notification channel, the `record_events` table is the audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::identity::UserId;

/// Casefile workflow events
///
/// Statuses are carried as their wire names (`"first_review"`, ...) so this
/// crate stays independent of the engine's status type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkflowEvent {
    /// A new record entered the pipeline
    RecordSubmitted {
        record_id: i64,
        submitted_by: Option<UserId>,
        timestamp: DateTime<Utc>,
    },

    /// A rejected record was resubmitted and re-entered review
    RecordResubmitted {
        record_id: i64,
        review_cycle: i64,
        actor: UserId,
        timestamp: DateTime<Utc>,
    },

    /// A lock was acquired, extended or taken over
    LockAcquired {
        record_id: i64,
        holder: UserId,
        expires_at: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    /// A lock was released explicitly or as a side effect of rejection
    LockReleased {
        record_id: i64,
        actor: UserId,
        timestamp: DateTime<Utc>,
    },

    /// The state machine moved a record to a new status
    StatusChanged {
        record_id: i64,
        old_status: String,
        new_status: String,
        actor: UserId,
        timestamp: DateTime<Utc>,
    },

    /// A field verification pass was recorded
    FieldVerified {
        record_id: i64,
        field_name: String,
        pass: u8,
        field_status: String,
        actor: UserId,
        timestamp: DateTime<Utc>,
    },

    /// A validation issue or verification dispute was raised
    BlockerRaised {
        record_id: i64,
        blocker_kind: String,
        blocker_id: String,
        actor: UserId,
        timestamp: DateTime<Utc>,
    },

    /// A validation issue or verification dispute was resolved
    BlockerResolved {
        record_id: i64,
        blocker_kind: String,
        blocker_id: String,
        actor: UserId,
        timestamp: DateTime<Utc>,
    },
}

impl WorkflowEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            WorkflowEvent::RecordSubmitted { .. } => "RecordSubmitted",
            WorkflowEvent::RecordResubmitted { .. } => "RecordResubmitted",
            WorkflowEvent::LockAcquired { .. } => "LockAcquired",
            WorkflowEvent::LockReleased { .. } => "LockReleased",
            WorkflowEvent::StatusChanged { .. } => "StatusChanged",
            WorkflowEvent::FieldVerified { .. } => "FieldVerified",
            WorkflowEvent::BlockerRaised { .. } => "BlockerRaised",
            WorkflowEvent::BlockerResolved { .. } => "BlockerResolved",
        }
    }

    /// Record the event concerns
    pub fn record_id(&self) -> i64 {
        match self {
            WorkflowEvent::RecordSubmitted { record_id, .. }
            | WorkflowEvent::RecordResubmitted { record_id, .. }
            | WorkflowEvent::LockAcquired { record_id, .. }
            | WorkflowEvent::LockReleased { record_id, .. }
            | WorkflowEvent::StatusChanged { record_id, .. }
            | WorkflowEvent::FieldVerified { record_id, .. }
            | WorkflowEvent::BlockerRaised { record_id, .. }
            | WorkflowEvent::BlockerResolved { record_id, .. } => *record_id,
        }
    }
}

/// Broadcast channel for workflow events
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<WorkflowEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: WorkflowEvent,
    ) -> Result<usize, broadcast::error::SendError<WorkflowEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: WorkflowEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_changed() -> WorkflowEvent {
        WorkflowEvent::StatusChanged {
            record_id: 100,
            old_status: "first_review".to_string(),
            new_status: "second_review".to_string(),
            actor: 2,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_emit_without_subscribers_fails() {
        let bus = EventBus::new(8);
        assert!(bus.emit(status_changed()).is_err());
        // Lossy emit never panics
        bus.emit_lossy(status_changed());
        assert_eq!(bus.capacity(), 8);
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit(status_changed()).unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type(), "StatusChanged");
        assert_eq!(received.record_id(), 100);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let json = serde_json::to_value(status_changed()).unwrap();
        assert_eq!(json["type"], "StatusChanged");
        assert_eq!(json["new_status"], "second_review");
    }
}

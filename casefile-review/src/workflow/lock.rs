//! Time-boxed record locks
//!
//! The lock lives in the record row. Acquisition is a compare-and-swap on the
//! lock columns the caller observed, so two actors racing for a free record
//! cannot both win. Expiry is lazy: an expired lock is simply treated as
//! absent by the next reader or writer.

use casefile_common::events::{EventBus, WorkflowEvent};
use casefile_common::time::{self, to_db};
use casefile_common::Actor;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::policy::{authorize, Operation};
use super::{require_record, EngineSettings};
use crate::db::events::{append_event, NewEvent};
use crate::db::{LockSwap, RecordRepository};
use crate::error::{WorkflowError, WorkflowResult};
use crate::models::{EventKind, LockInfo, LockState, RecordId};

/// Build the `LockHeld` error for a foreign live lock
pub(crate) fn lock_held(
    record_id: RecordId,
    lock: &LockState,
    now: DateTime<Utc>,
) -> WorkflowError {
    WorkflowError::LockHeld {
        record_id,
        holder: lock.locked_by,
        expires_at: lock.expires_at,
        remaining_minutes: time::minutes_remaining(lock.expires_at, now),
    }
}

#[derive(Clone)]
pub struct LockManager {
    repo: RecordRepository,
    event_bus: EventBus,
    settings: EngineSettings,
}

impl LockManager {
    pub fn new(repo: RecordRepository, event_bus: EventBus, settings: EngineSettings) -> Self {
        Self {
            repo,
            event_bus,
            settings,
        }
    }

    /// Acquire a free or expired lock, refresh one the actor already holds,
    /// or (admin only) take over another actor's live lock
    ///
    /// With `extend` set, a refresh keeps the original `locked_at`.
    pub async fn acquire_or_extend(
        &self,
        record_id: RecordId,
        actor: &Actor,
        extend: bool,
    ) -> WorkflowResult<LockInfo> {
        self.acquire_or_extend_at(record_id, actor, extend, time::now()).await
    }

    pub async fn acquire_or_extend_at(
        &self,
        record_id: RecordId,
        actor: &Actor,
        extend: bool,
        now: DateTime<Utc>,
    ) -> WorkflowResult<LockInfo> {
        authorize(actor, Operation::AcquireLock)?;
        let record = require_record(&self.repo, record_id).await?;

        let live = record.live_lock(now).cloned();
        let (kind, locked_at) = match &live {
            Some(lock) if lock.locked_by == actor.user_id => {
                if extend {
                    (EventKind::LockExtended, lock.locked_at.unwrap_or(now))
                } else {
                    (EventKind::LockAcquired, now)
                }
            }
            Some(lock) if actor.is_admin() => {
                warn!(
                    record_id,
                    admin = actor.user_id,
                    previous_holder = lock.locked_by,
                    "Admin taking over record lock"
                );
                (EventKind::LockTakenOver, now)
            }
            Some(lock) => {
                debug!(
                    record_id,
                    actor = actor.user_id,
                    holder = lock.locked_by,
                    "Lock held by another user"
                );
                return Err(lock_held(record_id, lock, now));
            }
            None => (EventKind::LockAcquired, now),
        };

        let swap = LockSwap {
            record_id,
            observed: record.lock.clone(),
            holder: actor.user_id,
            locked_at,
            expires_at: now + self.settings.lock_duration,
            now,
        };

        let mut tx = self.repo.begin().await?;
        if !self.repo.compare_and_swap_lock(&mut tx, &swap).await? {
            tx.rollback().await?;
            return Err(self.acquire_conflict(record_id, actor, now).await);
        }

        let detail = match (kind, &live) {
            (EventKind::LockTakenOver, Some(previous)) => format!(
                "previous_holder={} expires_at={}",
                previous.locked_by,
                to_db(swap.expires_at)
            ),
            _ => format!("expires_at={}", to_db(swap.expires_at)),
        };
        let audit = NewEvent::new(record_id, kind, Some(actor.user_id), now).with_detail(detail);
        append_event(&mut *tx, &audit).await?;
        tx.commit().await?;

        info!(
            record_id,
            actor = actor.user_id,
            kind = kind.as_str(),
            expires_at = %swap.expires_at,
            "Record lock granted"
        );

        self.event_bus.emit_lossy(WorkflowEvent::LockAcquired {
            record_id,
            holder: actor.user_id,
            expires_at: swap.expires_at,
            timestamp: now,
        });

        let state = LockState {
            locked_by: actor.user_id,
            locked_at: Some(locked_at),
            expires_at: swap.expires_at,
        };
        Ok(LockInfo::from_state(record_id, &state, now))
    }

    /// Explain a lost acquisition race from a fresh read
    async fn acquire_conflict(
        &self,
        record_id: RecordId,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> WorkflowError {
        match self.repo.get(record_id).await {
            Ok(None) => WorkflowError::not_found("Record", record_id),
            Ok(Some(record)) => match record.foreign_lock(actor.user_id, now) {
                Some(lock) if !actor.is_admin() => lock_held(record_id, lock, now),
                _ => WorkflowError::Contended { record_id },
            },
            Err(e) => e.into(),
        }
    }

    /// Clear the lock
    ///
    /// Releasing an absent or expired lock succeeds without writing. Only the
    /// holder or an admin may release a live lock.
    pub async fn release(&self, record_id: RecordId, actor: &Actor) -> WorkflowResult<()> {
        self.release_at(record_id, actor, time::now()).await
    }

    pub async fn release_at(
        &self,
        record_id: RecordId,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> WorkflowResult<()> {
        authorize(actor, Operation::ReleaseLock)?;
        let record = require_record(&self.repo, record_id).await?;

        let Some(lock) = record.live_lock(now).cloned() else {
            debug!(record_id, actor = actor.user_id, "Release of unlocked record is a no-op");
            return Ok(());
        };

        if lock.locked_by != actor.user_id && !actor.is_admin() {
            warn!(
                record_id,
                actor = actor.user_id,
                holder = lock.locked_by,
                "Release refused: not lock owner"
            );
            return Err(WorkflowError::NotLockOwner {
                record_id,
                actor: actor.user_id,
                holder: Some(lock.locked_by),
            });
        }

        let mut tx = self.repo.begin().await?;
        if !self.repo.clear_lock(&mut tx, record_id, &lock, now).await? {
            tx.rollback().await?;
            return self.release_conflict(record_id, actor, now).await;
        }

        let mut audit = NewEvent::new(record_id, EventKind::LockReleased, Some(actor.user_id), now);
        if lock.locked_by != actor.user_id {
            audit = audit.with_detail(format!("released_for={}", lock.locked_by));
        }
        append_event(&mut *tx, &audit).await?;
        tx.commit().await?;

        info!(record_id, actor = actor.user_id, holder = lock.locked_by, "Record lock released");
        self.event_bus.emit_lossy(WorkflowEvent::LockReleased {
            record_id,
            actor: actor.user_id,
            timestamp: now,
        });

        Ok(())
    }

    async fn release_conflict(
        &self,
        record_id: RecordId,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> WorkflowResult<()> {
        let record = require_record(&self.repo, record_id).await?;
        match record.live_lock(now) {
            None => Ok(()),
            Some(lock) if lock.locked_by != actor.user_id && !actor.is_admin() => {
                Err(WorkflowError::NotLockOwner {
                    record_id,
                    actor: actor.user_id,
                    holder: Some(lock.locked_by),
                })
            }
            Some(_) => Err(WorkflowError::Contended { record_id }),
        }
    }

    /// Current live lock, if any
    pub async fn status(
        &self,
        record_id: RecordId,
        actor: &Actor,
    ) -> WorkflowResult<Option<LockInfo>> {
        self.status_at(record_id, actor, time::now()).await
    }

    pub async fn status_at(
        &self,
        record_id: RecordId,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> WorkflowResult<Option<LockInfo>> {
        authorize(actor, Operation::ViewLock)?;
        let record = require_record(&self.repo, record_id).await?;
        Ok(record
            .live_lock(now)
            .map(|lock| LockInfo::from_state(record_id, lock, now)))
    }
}

/// Delayed, cancellable background actions.
///
/// The lifecycle submits fire-and-forget jobs keyed by a stable `JobKey`
/// (account id + action): auto-unban after a ban period, the hard delete at
/// the end of the deletion grace period, reading reminders. Create-style
/// scheduling rejects a duplicate key; reschedule and cancel reject a
/// missing one. Due actions re-enter the state machine only through its
/// public operations (see `jobs::run_dispatcher`).
use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Payload of a delayed job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelayedAction {
    /// Lift an administrative ban once the ban period elapses
    Unban { account_id: Uuid },
    /// Hard-delete an account once the deletion grace period elapses
    PurgeAccount { account_id: Uuid },
    /// Nudge a reader about their reading list
    ReadingReminder { account_id: Uuid },
}

impl DelayedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DelayedAction::Unban { .. } => "unban",
            DelayedAction::PurgeAccount { .. } => "purge_account",
            DelayedAction::ReadingReminder { .. } => "reading_reminder",
        }
    }
}

/// Stable job identity derived from account id + action
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey(String);

impl JobKey {
    pub fn unban(account_id: Uuid) -> Self {
        Self(format!("unban:{}", account_id))
    }

    pub fn purge(account_id: Uuid) -> Self {
        Self(format!("purge:{}", account_id))
    }

    pub fn reading_reminder(account_id: Uuid) -> Self {
        Self(format!("reading-reminder:{}", account_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A scheduled job as visible to callers
#[derive(Debug, Clone)]
pub struct JobHandle {
    pub key: JobKey,
    pub action: DelayedAction,
    pub run_at: DateTime<Utc>,
}

/// A job that has come due and awaits dispatch
#[derive(Debug, Clone)]
pub struct DueAction {
    pub key: JobKey,
    pub action: DelayedAction,
}

#[async_trait]
pub trait DelayedActionScheduler: Send + Sync {
    /// Queue an action to run after `delay`. `Conflict` if a job with this
    /// key is already queued.
    async fn schedule(
        &self,
        key: JobKey,
        action: DelayedAction,
        delay: Duration,
    ) -> AppResult<JobHandle>;

    /// Look up a queued job by key
    async fn find(&self, key: &JobKey) -> Option<JobHandle>;

    /// Move an existing job to a new delay. `NotFound` if no job with this
    /// key is queued.
    async fn reschedule(&self, key: &JobKey, delay: Duration) -> AppResult<JobHandle>;

    /// Remove a queued job. `NotFound` if no job with this key is queued.
    async fn cancel(&self, key: &JobKey) -> AppResult<()>;
}

struct Entry {
    action: DelayedAction,
    run_at: DateTime<Utc>,
    task: JoinHandle<()>,
}

/// In-process scheduler backed by tokio timers.
///
/// Due actions are pushed onto an mpsc channel; the binary drains it with
/// `jobs::run_dispatcher`. Jobs do not survive a process restart.
pub struct TokioScheduler {
    jobs: Arc<Mutex<HashMap<JobKey, Entry>>>,
    tx: UnboundedSender<DueAction>,
    clock: Arc<dyn Clock>,
}

impl TokioScheduler {
    pub fn new(clock: Arc<dyn Clock>) -> (Self, UnboundedReceiver<DueAction>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                jobs: Arc::new(Mutex::new(HashMap::new())),
                tx,
                clock,
            },
            rx,
        )
    }

    fn spawn_timer(&self, key: JobKey, action: DelayedAction, delay: Duration) -> JoinHandle<()> {
        let jobs = Arc::clone(&self.jobs);
        let tx = self.tx.clone();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            // Deregister before dispatch so a re-schedule under the same key
            // is possible from the handler
            jobs.lock().unwrap().remove(&key);

            if tx.send(DueAction { key: key.clone(), action }).is_err() {
                tracing::warn!("No dispatcher running, dropping due job {}", key.as_str());
            }
        })
    }
}

#[async_trait]
impl DelayedActionScheduler for TokioScheduler {
    async fn schedule(
        &self,
        key: JobKey,
        action: DelayedAction,
        delay: Duration,
    ) -> AppResult<JobHandle> {
        let run_at = self.clock.now()
            + chrono::Duration::from_std(delay)
                .map_err(|e| AppError::Internal(format!("Delay out of range: {}", e)))?;

        {
            let jobs = self.jobs.lock().unwrap();
            if jobs.contains_key(&key) {
                return Err(AppError::Conflict(format!(
                    "Job {} is already scheduled",
                    key.as_str()
                )));
            }
        }

        let task = self.spawn_timer(key.clone(), action.clone(), delay);
        self.jobs.lock().unwrap().insert(
            key.clone(),
            Entry {
                action: action.clone(),
                run_at,
                task,
            },
        );

        tracing::debug!(
            "Scheduled {} to run at {}",
            key.as_str(),
            run_at.to_rfc3339()
        );

        Ok(JobHandle {
            key,
            action,
            run_at,
        })
    }

    async fn find(&self, key: &JobKey) -> Option<JobHandle> {
        self.jobs.lock().unwrap().get(key).map(|entry| JobHandle {
            key: key.clone(),
            action: entry.action.clone(),
            run_at: entry.run_at,
        })
    }

    async fn reschedule(&self, key: &JobKey, delay: Duration) -> AppResult<JobHandle> {
        let run_at = self.clock.now()
            + chrono::Duration::from_std(delay)
                .map_err(|e| AppError::Internal(format!("Delay out of range: {}", e)))?;

        let action = {
            let mut jobs = self.jobs.lock().unwrap();
            let entry = jobs.get_mut(key).ok_or_else(|| {
                AppError::NotFound(format!("Job {} is not scheduled", key.as_str()))
            })?;
            entry.task.abort();
            entry.action.clone()
        };

        let task = self.spawn_timer(key.clone(), action.clone(), delay);
        if let Some(entry) = self.jobs.lock().unwrap().get_mut(key) {
            entry.task = task;
            entry.run_at = run_at;
        }

        Ok(JobHandle {
            key: key.clone(),
            action,
            run_at,
        })
    }

    async fn cancel(&self, key: &JobKey) -> AppResult<()> {
        let entry = self.jobs.lock().unwrap().remove(key).ok_or_else(|| {
            AppError::NotFound(format!("Job {} is not scheduled", key.as_str()))
        })?;

        entry.task.abort();
        tracing::debug!("Cancelled job {}", key.as_str());
        Ok(())
    }
}

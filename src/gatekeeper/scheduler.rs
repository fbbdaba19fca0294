//! Cancellable single-fire delayed tasks, one per subject.
//!
//! Every subject has at most one live task. Scheduling again supersedes the
//! previous timer (last writer wins), and the registry entry is removed once
//! the callback settles, whether it returned `Ok`, `Err` or panicked.
//!
//! Cancellation only stops a timer that has not fired yet. A callback that is
//! already running keeps running; callers that need to act on fresh state
//! must re-check it themselves (the enforcement workflow does, after its
//! grace period).

use crate::platform::SubjectId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, warn};

const PENDING: u8 = 0;
const RUNNING: u8 = 1;
const CANCELLED: u8 = 2;

/// Registry entry for one subject's task.
struct ScheduledTask {
    generation: u64,
    state: Arc<AtomicU8>,
    timer: JoinHandle<()>,
}

impl ScheduledTask {
    /// Stop the timer if it has not fired. Returns false when the callback
    /// is already running.
    fn stop(self) -> bool {
        let stopped = self
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if stopped {
            self.timer.abort();
        }
        stopped
    }
}

/// What a cancel request found for a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Nothing was registered
    NotScheduled,
    /// The timer had not fired; the callback will never run
    Stopped,
    /// The callback was already running and keeps running
    AlreadyRunning,
}

/// Returned by [`DelayedTaskScheduler::schedule`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskHandle {
    pub subject: SubjectId,
    /// Install counter, allocated under the subject's entry lock: for one
    /// subject a higher generation supersedes a lower one.
    pub generation: u64,
    pub fire_at: Instant,
}

/// Per-subject timer registry.
///
/// Must be used from within a tokio runtime.
#[derive(Default)]
pub struct DelayedTaskScheduler {
    tasks: Arc<DashMap<SubjectId, ScheduledTask>>,
    next_generation: AtomicU64,
}

impl DelayedTaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `callback` once after `delay`, replacing any task the subject
    /// already has.
    ///
    /// The subject's map entry stays locked while the old timer is stopped
    /// and the new one registered, so concurrent calls for one subject
    /// serialize and only the last installed task can fire.
    pub fn schedule<F, Fut, E>(&self, subject: SubjectId, delay: Duration, callback: F) -> TaskHandle
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let entry = self.tasks.entry(subject.clone());
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let fire_at = Instant::now() + delay;
        let state = Arc::new(AtomicU8::new(PENDING));

        let timer = tokio::spawn(run_task(
            Arc::clone(&self.tasks),
            subject.clone(),
            generation,
            Arc::clone(&state),
            fire_at,
            callback,
        ));
        let task = ScheduledTask {
            generation,
            state,
            timer,
        };

        match entry {
            Entry::Occupied(mut occupied) => {
                let previous = occupied.insert(task);
                let stopped = previous.stop();
                debug!(subject = %subject, generation, stopped, "superseded scheduled task");
            }
            Entry::Vacant(vacant) => {
                vacant.insert(task);
            }
        }
        debug!(subject = %subject, generation, delay_ms = delay.as_millis() as u64, "task scheduled");

        TaskHandle {
            subject,
            generation,
            fire_at,
        }
    }

    /// Clear the subject's pending task. Returns whether one existed.
    pub fn cancel(&self, subject: &SubjectId) -> bool {
        self.cancel_with_outcome(subject) != CancelOutcome::NotScheduled
    }

    /// Clear the subject's registration and report whether the callback was
    /// actually prevented from running.
    pub fn cancel_with_outcome(&self, subject: &SubjectId) -> CancelOutcome {
        match self.tasks.remove(subject) {
            Some((_, task)) => {
                let generation = task.generation;
                let stopped = task.stop();
                debug!(subject = %subject, generation, stopped, "scheduled task cancelled");
                if stopped {
                    CancelOutcome::Stopped
                } else {
                    CancelOutcome::AlreadyRunning
                }
            }
            None => CancelOutcome::NotScheduled,
        }
    }

    /// Whether the subject has a pending or running task.
    pub fn has(&self, subject: &SubjectId) -> bool {
        self.tasks.contains_key(subject)
    }

    /// Number of registered tasks.
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Cancel every task. Returns how many entries were removed.
    pub fn cancel_all(&self) -> usize {
        let subjects: Vec<SubjectId> = self.tasks.iter().map(|e| e.key().clone()).collect();
        subjects.iter().filter(|s| self.cancel(s)).count()
    }
}

impl fmt::Debug for DelayedTaskScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelayedTaskScheduler")
            .field("pending", &self.tasks.len())
            .finish()
    }
}

async fn run_task<F, Fut, E>(
    tasks: Arc<DashMap<SubjectId, ScheduledTask>>,
    subject: SubjectId,
    generation: u64,
    state: Arc<AtomicU8>,
    fire_at: Instant,
    callback: F,
) where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    tokio::time::sleep_until(fire_at).await;

    if state
        .compare_exchange(PENDING, RUNNING, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return;
    }

    match AssertUnwindSafe(async move { callback().await })
        .catch_unwind()
        .await
    {
        Ok(Ok(())) => debug!(subject = %subject, generation, "scheduled task completed"),
        Ok(Err(e)) => warn!(subject = %subject, generation, error = %e, "scheduled task failed"),
        Err(_) => error!(subject = %subject, generation, "scheduled task panicked"),
    }

    tasks.remove_if(&subject, |_, task| task.generation == generation);
}

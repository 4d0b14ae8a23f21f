use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::{broadcast, oneshot};
use tokio_util::sync::CancellationToken;

use crate::config::SchedulerConfig;
use crate::error::TaskError;

use super::queue::{PendingQueue, QueueEntry};
use super::task::{TaskEvent, TaskId, TaskOptions, TaskRecord, TaskStatus};

type JobFuture = BoxFuture<'static, Result<(), String>>;
type Job = Box<dyn FnOnce(CancellationToken) -> JobFuture + Send>;
type Settle = oneshot::Sender<Result<(), TaskError>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Snapshot returned by [`Scheduler::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    pub pending: usize,
    pub running: usize,
    pub capacity: usize,
    pub available_slots: usize,
}

struct PendingTask {
    id: TaskId,
    kind: String,
    priority: i32,
    timeout: Duration,
    token: CancellationToken,
    settled: CancellationToken,
    job: Job,
    done: Settle,
}

impl QueueEntry for PendingTask {
    fn id(&self) -> TaskId {
        self.id
    }

    fn kind(&self) -> &str {
        &self.kind
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

struct RunningTask {
    kind: String,
    token: CancellationToken,
    settled: CancellationToken,
    done: Settle,
}

/// Work handed to a driver once a slot has been reserved for it.
struct Admitted {
    id: TaskId,
    timeout: Duration,
    token: CancellationToken,
    job: Job,
}

#[derive(Debug)]
enum Outcome {
    Completed,
    Failed(String),
    Cancelled,
    TimedOut(u64),
}

#[derive(Default)]
struct State {
    queue: PendingQueue<PendingTask>,
    running: HashMap<TaskId, RunningTask>,
    records: HashMap<TaskId, TaskRecord>,
}

struct Inner {
    max_concurrent: usize,
    default_timeout_ms: u64,
    default_priority: i32,
    state: Mutex<State>,
    events: broadcast::Sender<TaskEvent>,
}

/// Priority task scheduler with bounded concurrency, per-task timeouts and
/// cooperative cancellation.
///
/// All queue and running-set mutations happen under one lock and never
/// across an `.await`, so a submit racing a completion sees either the state
/// before or after it, never a half-updated list.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                max_concurrent: config.max_concurrent.max(1),
                default_timeout_ms: config.default_timeout_ms,
                default_priority: config.default_priority,
                state: Mutex::new(State::default()),
                events,
            }),
        }
    }

    /// Queue `executor` under `kind`. The executor receives the task's
    /// cancellation token and is expected to stop once it fires.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit<T, F, Fut>(
        &self,
        kind: impl Into<String>,
        executor: F,
        options: TaskOptions,
    ) -> Result<TaskHandle<T>, TaskError>
    where
        T: Send + 'static,
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let timeout_ms = options
            .timeout_ms
            .unwrap_or(self.inner.default_timeout_ms);
        if timeout_ms == 0 {
            return Err(TaskError::InvalidTimeout);
        }
        let priority = options.priority.unwrap_or(self.inner.default_priority);
        let kind = kind.into();
        let id = TaskId::new();
        let token = match &options.signal {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        let settled = CancellationToken::new();

        let slot: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(None));
        let job_slot = Arc::clone(&slot);
        let job: Job = Box::new(move |token: CancellationToken| -> JobFuture {
            Box::pin(async move {
                match executor(token).await {
                    Ok(value) => {
                        *lock(&job_slot) = Some(value);
                        Ok(())
                    }
                    Err(err) => Err(format!("{err:#}")),
                }
            })
        });

        let (done, rx) = oneshot::channel();
        let pending = PendingTask {
            id,
            kind: kind.clone(),
            priority,
            timeout: Duration::from_millis(timeout_ms),
            token: token.clone(),
            settled: settled.clone(),
            job,
            done,
        };

        let admitted = {
            let mut state = lock(&self.inner.state);
            state.records.insert(
                id,
                TaskRecord::new(id, kind.clone(), priority, timeout_ms),
            );
            state.queue.push(pending);
            self.inner.emit(TaskEvent::Queued {
                id,
                kind: kind.clone(),
                priority,
            });
            tracing::debug!(
                target: "lumen.scheduler",
                task_id = %id,
                kind = %kind,
                priority,
                timeout_ms,
                "task queued"
            );
            self.inner.pump(&mut state)
        };
        self.inner.spawn_all(admitted);

        if options.signal.is_some() {
            self.watch_signal(id, token, settled);
        }

        Ok(TaskHandle {
            id,
            rx,
            slot,
            inner: Arc::clone(&self.inner),
        })
    }

    /// Cancels a pending or running task. Returns false for unknown or
    /// already-terminal tasks.
    pub fn cancel(&self, id: TaskId) -> bool {
        let (cancelled, admitted) = {
            let mut state = lock(&self.inner.state);
            let cancelled = self.inner.cancel_locked(&mut state, id);
            let admitted = if cancelled {
                self.inner.pump(&mut state)
            } else {
                Vec::new()
            };
            (cancelled, admitted)
        };
        self.inner.spawn_all(admitted);
        cancelled
    }

    /// Cancels every pending and running task of `kind`; returns how many
    /// transitioned to cancelled.
    pub fn cancel_by_kind(&self, kind: &str) -> usize {
        let (count, admitted) = {
            let mut state = lock(&self.inner.state);
            let mut ids: Vec<TaskId> = state
                .queue
                .drain_kind(kind)
                .into_iter()
                .map(|p| {
                    let id = p.id;
                    self.inner.settle_pending_cancelled(&mut state, p);
                    id
                })
                .collect();

            let running: Vec<TaskId> = state
                .running
                .iter()
                .filter(|(_, r)| r.kind == kind)
                .map(|(id, _)| *id)
                .collect();
            for id in running {
                if self.inner.cancel_locked(&mut state, id) {
                    ids.push(id);
                }
            }

            let admitted = self.inner.pump(&mut state);
            (ids.len(), admitted)
        };
        if count > 0 {
            tracing::debug!(target: "lumen.scheduler", kind, count, "cancelled tasks by kind");
        }
        self.inner.spawn_all(admitted);
        count
    }

    pub fn status(&self) -> SchedulerStatus {
        let state = lock(&self.inner.state);
        let running = state.running.len();
        SchedulerStatus {
            pending: state.queue.len(),
            running,
            capacity: self.inner.max_concurrent,
            available_slots: self.inner.max_concurrent.saturating_sub(running),
        }
    }

    /// Snapshot of a tracked task. Terminal tasks stop being tracked once
    /// their handle has been consumed or dropped.
    pub fn task(&self, id: TaskId) -> Option<TaskRecord> {
        lock(&self.inner.state).records.get(&id).cloned()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.inner.events.subscribe()
    }

    pub fn capacity(&self) -> usize {
        self.inner.max_concurrent
    }

    fn watch_signal(&self, id: TaskId, token: CancellationToken, settled: CancellationToken) {
        let inner = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            tokio::select! {
                _ = settled.cancelled() => {}
                _ = token.cancelled() => {
                    if let Some(inner) = inner.upgrade() {
                        Scheduler { inner }.cancel(id);
                    }
                }
            }
        });
    }
}

impl Inner {
    fn emit(&self, event: TaskEvent) {
        let _ = self.events.send(event);
    }

    /// Admits pending tasks while slots are free. Returns the tasks whose
    /// drivers must be spawned once the lock is released.
    fn pump(&self, state: &mut State) -> Vec<Admitted> {
        let mut admitted = Vec::new();
        while state.running.len() < self.max_concurrent {
            let Some(task) = state.queue.pop_front() else {
                break;
            };

            // Caller already aborted while it was queued: never start it.
            if task.token.is_cancelled() {
                self.settle_pending_cancelled(state, task);
                continue;
            }

            if let Some(rec) = state.records.get_mut(&task.id) {
                if let Err(err) = rec.transition(TaskStatus::Running, None) {
                    tracing::warn!(target: "lumen.scheduler", task_id = %task.id, error = %err);
                }
            }
            self.emit(TaskEvent::Started {
                id: task.id,
                kind: task.kind.clone(),
            });
            tracing::debug!(target: "lumen.scheduler", task_id = %task.id, kind = %task.kind, "task started");

            state.running.insert(
                task.id,
                RunningTask {
                    kind: task.kind,
                    token: task.token.clone(),
                    settled: task.settled,
                    done: task.done,
                },
            );
            admitted.push(Admitted {
                id: task.id,
                timeout: task.timeout,
                token: task.token,
                job: task.job,
            });
        }
        admitted
    }

    fn spawn_all(self: &Arc<Self>, admitted: Vec<Admitted>) {
        for task in admitted {
            self.spawn_driver(task);
        }
    }

    /// Races the executor against its timeout and cancellation token. The
    /// executor runs on its own task so a timed-out or cancelled executor
    /// keeps running detached until it observes the token.
    fn spawn_driver(self: &Arc<Self>, task: Admitted) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let Admitted {
                id,
                timeout,
                token,
                job,
            } = task;
            let work = tokio::spawn(job(token.clone()));

            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => Outcome::Cancelled,
                joined = work => match joined {
                    Ok(Ok(())) => Outcome::Completed,
                    Ok(Err(_)) if token.is_cancelled() => Outcome::Cancelled,
                    Ok(Err(msg)) => Outcome::Failed(msg),
                    Err(err) => Outcome::Failed(format!("task panicked: {err}")),
                },
                _ = tokio::time::sleep(timeout) => Outcome::TimedOut(timeout.as_millis() as u64),
            };

            let timed_out = matches!(outcome, Outcome::TimedOut(_));
            inner.finish(id, outcome);
            if timed_out {
                token.cancel();
            }
        });
    }

    fn finish(self: &Arc<Self>, id: TaskId, outcome: Outcome) {
        let admitted = {
            let mut state = lock(&self.state);
            // Already settled by an explicit cancel.
            let Some(running) = state.running.remove(&id) else {
                return;
            };

            let (status, result) = match outcome {
                Outcome::Completed => (TaskStatus::Completed, Ok(())),
                Outcome::Failed(msg) => (TaskStatus::Failed, Err(TaskError::Failed(msg))),
                Outcome::Cancelled => (TaskStatus::Cancelled, Err(TaskError::Cancelled)),
                Outcome::TimedOut(timeout_ms) => {
                    tracing::warn!(target: "lumen.scheduler", task_id = %id, kind = %running.kind, timeout_ms, "task timed out");
                    (TaskStatus::Failed, Err(TaskError::Timeout { timeout_ms }))
                }
            };
            self.settle(&mut state, id, running.kind, status, result, running.done);
            running.settled.cancel();
            self.pump(&mut state)
        };
        self.spawn_all(admitted);
    }

    fn cancel_locked(&self, state: &mut State, id: TaskId) -> bool {
        if let Some(pending) = state.queue.remove(id) {
            self.settle_pending_cancelled(state, pending);
            return true;
        }
        if let Some(running) = state.running.remove(&id) {
            self.settle(
                state,
                id,
                running.kind,
                TaskStatus::Cancelled,
                Err(TaskError::Cancelled),
                running.done,
            );
            running.settled.cancel();
            running.token.cancel();
            return true;
        }
        false
    }

    fn settle_pending_cancelled(&self, state: &mut State, task: PendingTask) {
        self.settle(
            state,
            task.id,
            task.kind,
            TaskStatus::Cancelled,
            Err(TaskError::Cancelled),
            task.done,
        );
        task.settled.cancel();
        task.token.cancel();
    }

    fn settle(
        &self,
        state: &mut State,
        id: TaskId,
        kind: String,
        status: TaskStatus,
        result: Result<(), TaskError>,
        done: Settle,
    ) {
        let error = result.as_ref().err().map(ToString::to_string);
        if let Some(rec) = state.records.get_mut(&id) {
            if let Err(err) = rec.transition(status, error.clone()) {
                tracing::warn!(target: "lumen.scheduler", task_id = %id, error = %err);
            }
        }
        tracing::debug!(
            target: "lumen.scheduler",
            task_id = %id,
            kind = %kind,
            status = ?status,
            error = error.as_deref().unwrap_or(""),
            "task settled"
        );
        self.emit(TaskEvent::Finished {
            id,
            kind,
            status,
            error,
        });
        // Nobody is waiting any more: stop tracking right away.
        if done.send(result).is_err() {
            state.records.remove(&id);
        }
    }

    fn forget(&self, id: TaskId) {
        let mut state = lock(&self.state);
        if state
            .records
            .get(&id)
            .is_some_and(|rec| rec.status.is_terminal())
        {
            state.records.remove(&id);
        }
    }
}

/// Awaitable result of a submitted task.
pub struct TaskHandle<T> {
    id: TaskId,
    rx: oneshot::Receiver<Result<(), TaskError>>,
    slot: Arc<Mutex<Option<T>>>,
    inner: Arc<Inner>,
}

impl<T> TaskHandle<T> {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Waits for the task to settle and drops it from tracking.
    pub async fn join(self) -> Result<T, TaskError> {
        let settled = self.rx.await.unwrap_or(Err(TaskError::SchedulerClosed));
        self.inner.forget(self.id);
        settled?;
        lock(&self.slot)
            .take()
            .ok_or_else(|| TaskError::Failed("task completed without a value".to_string()))
    }
}

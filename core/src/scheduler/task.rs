//! Task identity, lifecycle states and transition rules.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Opaque unique token identifying a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// pending -> running -> {completed | failed | cancelled}, plus
    /// pending -> cancelled. Nothing leaves a terminal state.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Cancelled)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Cancelled)
        )
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Invalid transition from {from:?} to {to:?}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },
    #[error("Cannot transition from terminal state {state:?}")]
    FromTerminalState { state: TaskStatus },
}

/// Tracked state of one unit of work. Identity fields never change after
/// `submit`; status and timestamps are only written by the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub kind: String,
    pub priority: i32,
    pub timeout_ms: u64,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl TaskRecord {
    pub fn new(id: TaskId, kind: String, priority: i32, timeout_ms: u64) -> Self {
        Self {
            id,
            kind,
            priority,
            timeout_ms,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    pub fn transition(
        &mut self,
        next: TaskStatus,
        error: Option<String>,
    ) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::FromTerminalState { state: self.status });
        }
        if !self.status.can_transition_to(next) {
            return Err(TransitionError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        let now = Utc::now();
        match next {
            TaskStatus::Running => self.started_at = Some(now),
            s if s.is_terminal() => self.completed_at = Some(now),
            _ => {}
        }
        self.status = next;
        self.error = error;
        Ok(())
    }
}

/// Per-submission overrides. Unset fields fall back to scheduler defaults.
#[derive(Debug, Clone, Default)]
pub struct TaskOptions {
    pub priority: Option<i32>,
    pub timeout_ms: Option<u64>,
    /// Caller-owned abort signal; cancelling it cancels the task.
    pub signal: Option<CancellationToken>,
}

impl TaskOptions {
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_signal(mut self, signal: CancellationToken) -> Self {
        self.signal = Some(signal);
        self
    }
}

/// Lifecycle notifications published on the scheduler's broadcast channel.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    Queued {
        id: TaskId,
        kind: String,
        priority: i32,
    },
    Started {
        id: TaskId,
        kind: String,
    },
    Finished {
        id: TaskId,
        kind: String,
        status: TaskStatus,
        error: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_lifecycle() {
        let mut rec = TaskRecord::new(TaskId::new(), "ocr".into(), 0, 1000);
        rec.transition(TaskStatus::Running, None).unwrap();
        assert!(rec.started_at.is_some());
        rec.transition(TaskStatus::Completed, None).unwrap();
        assert!(rec.completed_at.is_some());
        assert_eq!(
            rec.transition(TaskStatus::Cancelled, None),
            Err(TransitionError::FromTerminalState {
                state: TaskStatus::Completed
            })
        );
    }

    #[test]
    fn pending_can_be_cancelled_but_not_completed() {
        let mut rec = TaskRecord::new(TaskId::new(), "ai".into(), 1, 1000);
        assert_eq!(
            rec.transition(TaskStatus::Completed, None),
            Err(TransitionError::InvalidTransition {
                from: TaskStatus::Pending,
                to: TaskStatus::Completed
            })
        );
        rec.transition(TaskStatus::Cancelled, Some("task cancelled".into()))
            .unwrap();
        assert_eq!(rec.status, TaskStatus::Cancelled);
        assert!(rec.started_at.is_none());
    }

    #[test]
    fn running_cannot_go_back() {
        assert!(!TaskStatus::Running.can_transition_to(TaskStatus::Pending));
        assert!(!TaskStatus::Failed.can_transition_to(TaskStatus::Running));
    }
}

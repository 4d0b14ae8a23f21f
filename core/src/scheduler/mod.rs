//! Priority task scheduler shared by OCR and AI traffic.
//!
//! ```text
//! submit(kind, executor, opts)
//!   ↓
//! PendingQueue (priority desc, FIFO within a tier)
//!   ↓  pump() while running < max_concurrent
//! driver: select { cancelled, executor, timeout }
//!   ↓
//! settle → TaskHandle::join() → Result<T, TaskError>
//! ```

mod queue;
mod scheduler;
mod task;

pub use queue::{PendingQueue, QueueEntry};
pub use scheduler::{Scheduler, SchedulerStatus, TaskHandle};
pub use task::{TaskEvent, TaskId, TaskOptions, TaskRecord, TaskStatus, TransitionError};

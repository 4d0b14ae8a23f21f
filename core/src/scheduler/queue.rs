use super::task::TaskId;

/// Minimal view of a queued entry needed for ordering and lookup.
pub trait QueueEntry {
    fn id(&self) -> TaskId;
    fn kind(&self) -> &str;
    fn priority(&self) -> i32;
}

/// Pending list ordered by priority (desc), then submission order (asc).
#[derive(Debug)]
pub struct PendingQueue<T> {
    items: Vec<T>,
}

impl<T: QueueEntry> PendingQueue<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Inserts behind every entry of equal or higher priority, which keeps
    /// ties FIFO without a separate sequence number.
    pub fn push(&mut self, item: T) {
        let at = self
            .items
            .partition_point(|e| e.priority() >= item.priority());
        self.items.insert(at, item);
    }

    pub fn pop_front(&mut self) -> Option<T> {
        if self.items.is_empty() {
            None
        } else {
            Some(self.items.remove(0))
        }
    }

    pub fn remove(&mut self, id: TaskId) -> Option<T> {
        let pos = self.items.iter().position(|e| e.id() == id)?;
        Some(self.items.remove(pos))
    }

    pub fn drain_kind(&mut self, kind: &str) -> Vec<T> {
        let (taken, kept): (Vec<T>, Vec<T>) =
            self.items.drain(..).partition(|e| e.kind() == kind);
        self.items = kept;
        taken
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn ids(&self) -> Vec<TaskId> {
        self.items.iter().map(QueueEntry::id).collect()
    }
}

impl<T: QueueEntry> Default for PendingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

use std::collections::VecDeque;
use treesync_api::{SyncTask, TreeKey};

/// What a [SyncQueue::push] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Queued {
    /// A new task was inserted.
    Added,
    /// The already queued task for the key got a new root pointer.
    Updated,
    /// The key was already queued at the same root hash.
    Unchanged,
}

/// Pending tree pulls, ordered by ascending priority and FIFO within a
/// priority tier. Holds at most one task per tree key.
#[derive(Debug, Default)]
pub(crate) struct SyncQueue(VecDeque<SyncTask>);

impl SyncQueue {
    pub fn push(&mut self, task: SyncTask) -> Queued {
        if let Some(queued) = self.0.iter_mut().find(|t| t.key == task.key) {
            if queued.root.hash == task.root.hash {
                return Queued::Unchanged;
            }

            // updated in place, keeping its position in line
            queued.root = task.root;
            queued.is_own |= task.is_own;
            return Queued::Updated;
        }

        let at = self.0.partition_point(|t| t.priority <= task.priority);
        self.0.insert(at, task);
        Queued::Added
    }

    pub fn pop(&mut self) -> Option<SyncTask> {
        self.0.pop_front()
    }

    pub fn remove(&mut self, key: &TreeKey) -> Option<SyncTask> {
        let at = self.0.iter().position(|t| &t.key == key)?;
        self.0.remove(at)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn tasks(&self) -> Vec<SyncTask> {
        self.0.iter().cloned().collect()
    }
}

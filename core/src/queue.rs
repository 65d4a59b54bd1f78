use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueItem {
    /// Position of the job in the submitted list.
    pub index: usize,
}

/// FIFO of pending jobs shared by the batch workers.
#[derive(Debug, Default)]
pub struct JobQueue {
    items: Mutex<VecDeque<QueueItem>>,
}

impl JobQueue {
    /// Queues positions `0..len` in order.
    pub fn new(len: usize) -> Self {
        let items = (0..len).map(|index| QueueItem { index }).collect();
        Self {
            items: Mutex::new(items),
        }
    }

    pub fn pop(&self) -> Option<QueueItem> {
        self.items
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(|err| err.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

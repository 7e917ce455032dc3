//! In-memory ring buffer of recent log lines
//!
//! Every formatted record lands here so that warnings and errors can be sent
//! together with the lines that led up to them.

use std::collections::VecDeque;
use std::sync::RwLock;

/// Thread-safe ring buffer of formatted log lines
pub struct LogBuffer {
    entries: RwLock<VecDeque<String>>,
    capacity: usize,
}

impl LogBuffer {
    /// Create a buffer holding at most `capacity` lines (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append a line, evicting the oldest one once full
    pub fn append(&self, line: impl Into<String>) {
        let line = line.into();
        // A poisoned lock still holds a consistent deque; keep logging through it
        let mut entries = match self.entries.write() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(line);
    }

    /// Copy of the current contents, oldest first
    pub fn snapshot(&self) -> Vec<String> {
        match self.entries.read() {
            Ok(entries) => entries.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }

    /// Get the number of lines in the buffer
    pub fn len(&self) -> usize {
        match self.entries.read() {
            Ok(entries) => entries.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Check if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

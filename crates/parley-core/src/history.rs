//! Bounded per-channel message history.

use crate::message::ChatMessage;
use std::collections::VecDeque;
use tracing::trace;

/// Default number of messages retained per channel.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// A FIFO ring of the most recent messages in a channel.
#[derive(Debug, Clone)]
pub struct MessageHistory {
    messages: VecDeque<ChatMessage>,
    capacity: usize,
}

impl MessageHistory {
    /// Create an empty history with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Create an empty history retaining at most `capacity` messages.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            messages: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a message, evicting from the head until the cap holds.
    ///
    /// Returns the number of evicted messages.
    pub fn append(&mut self, message: ChatMessage) -> usize {
        self.messages.push_back(message);

        let mut evicted = 0;
        while self.messages.len() > self.capacity {
            self.messages.pop_front();
            evicted += 1;
        }
        if evicted > 0 {
            trace!(evicted, retained = self.messages.len(), "History evicted");
        }
        evicted
    }

    /// Owned copy of the retained messages, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().collect()
    }

    /// The `n` most recent messages, oldest first.
    #[must_use]
    pub fn recent(&self, n: usize) -> Vec<ChatMessage> {
        let skip = self.messages.len().saturating_sub(n);
        self.messages.iter().skip(skip).cloned().collect()
    }

    /// The newest message, if any.
    #[must_use]
    pub fn latest(&self) -> Option<&ChatMessage> {
        self.messages.back()
    }

    /// Number of retained messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether no messages are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Maximum number of retained messages.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for MessageHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(i: usize) -> ChatMessage {
        ChatMessage::new(i.to_string(), "alice", format!("message {i}"))
    }

    #[test]
    fn test_retains_min_of_appended_and_cap() {
        for n in [0, 1, 99, 100, 101, 250] {
            let mut history = MessageHistory::new();
            for i in 0..n {
                history.append(msg(i));
            }

            let kept = history.snapshot();
            assert_eq!(kept.len(), n.min(DEFAULT_HISTORY_CAPACITY));

            // The last min(n, cap) messages in arrival order
            let expected: Vec<_> = (n.saturating_sub(DEFAULT_HISTORY_CAPACITY)..n).map(msg).collect();
            assert_eq!(kept, expected);
        }
    }

    #[test]
    fn test_append_reports_evictions() {
        let mut history = MessageHistory::with_capacity(2);
        assert_eq!(history.append(msg(0)), 0);
        assert_eq!(history.append(msg(1)), 0);
        assert_eq!(history.append(msg(2)), 1);
        assert_eq!(history.latest(), Some(&msg(2)));
        assert_eq!(history.snapshot(), vec![msg(1), msg(2)]);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut history = MessageHistory::new();
        history.append(msg(0));
        let snapshot = history.snapshot();

        history.append(msg(1));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_recent() {
        let mut history = MessageHistory::new();
        for i in 0..5 {
            history.append(msg(i));
        }
        assert_eq!(history.recent(2), vec![msg(3), msg(4)]);
        assert_eq!(history.recent(10).len(), 5);
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let mut history = MessageHistory::with_capacity(0);
        assert_eq!(history.capacity(), 1);
        history.append(msg(0));
        history.append(msg(1));
        assert_eq!(history.snapshot(), vec![msg(1)]);
    }
}

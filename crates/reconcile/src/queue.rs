//! Pending alias mutations.
//!
//! Mutations are processed one at a time in FIFO order. A processed entry
//! is removed with a count-based acknowledgement, whether it succeeded or
//! not, so a failing cascade never blocks the queue.

use std::collections::VecDeque;
use std::fmt;

/// A queued rename, delete or purge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasMutation {
    Rename { from: String, to: String },
    Delete { alias: String },
    Purge { alias: String },
}

impl AliasMutation {
    /// Alias the mutation starts from.
    pub fn alias(&self) -> &str {
        match self {
            Self::Rename { from, .. } => from,
            Self::Delete { alias } | Self::Purge { alias } => alias,
        }
    }

    /// Short operation name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Rename { .. } => "rename",
            Self::Delete { .. } => "delete",
            Self::Purge { .. } => "purge",
        }
    }
}

impl fmt::Display for AliasMutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rename { from, to } => write!(f, "rename {from} -> {to}"),
            Self::Delete { alias } => write!(f, "delete {alias}"),
            Self::Purge { alias } => write!(f, "purge {alias}"),
        }
    }
}

/// FIFO of pending alias mutations.
#[derive(Debug, Clone, Default)]
pub struct MutationQueue {
    items: VecDeque<AliasMutation>,
}

impl MutationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mutation: AliasMutation) {
        log::debug!("Queued {mutation}");
        self.items.push_back(mutation);
    }

    /// Oldest pending mutation.
    pub fn front(&self) -> Option<&AliasMutation> {
        self.items.front()
    }

    /// Remove the `count` oldest entries and return them.
    pub fn acknowledge(&mut self, count: usize) -> Vec<AliasMutation> {
        let count = count.min(self.items.len());
        self.items.drain(..count).collect()
    }

    /// Whether any pending mutation touches `alias`.
    pub fn touches(&self, alias: &str) -> bool {
        self.items.iter().any(|m| match m {
            AliasMutation::Rename { from, to } => from == alias || to == alias,
            other => other.alias() == alias,
        })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &AliasMutation> {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delete(alias: &str) -> AliasMutation {
        AliasMutation::Delete {
            alias: alias.into(),
        }
    }

    #[test]
    fn test_fifo_and_acknowledge() {
        let mut queue = MutationQueue::new();
        queue.push(delete("a"));
        queue.push(AliasMutation::Rename {
            from: "b".into(),
            to: "c".into(),
        });
        queue.push(delete("d"));

        assert_eq!(queue.front(), Some(&delete("a")));
        assert_eq!(queue.acknowledge(1), vec![delete("a")]);
        assert_eq!(queue.front().unwrap().kind(), "rename");
        assert!(queue.touches("c"));
        assert!(!queue.touches("a"));

        assert_eq!(queue.acknowledge(10).len(), 2);
        assert!(queue.is_empty());
        assert!(queue.acknowledge(1).is_empty());
    }

    #[test]
    fn test_display() {
        let m = AliasMutation::Rename {
            from: "web".into(),
            to: "edge".into(),
        };
        assert_eq!(m.to_string(), "rename web -> edge");
        assert_eq!(m.alias(), "web");
    }
}

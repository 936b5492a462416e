use std::collections::VecDeque;

use crate::manager::ConnectionId;
use crate::payload::DebugSnapshot;

/// A received snapshot and the connection it arrived on.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub connection: ConnectionId,
    pub snapshot: DebugSnapshot,
}

/// Ordered record of received snapshots with a selection cursor.
///
/// Appending moves the selection to the new entry. With a capacity, the
/// oldest entries are dropped first and the selection shifts with them.
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: VecDeque<HistoryEntry>,
    capacity: Option<usize>,
    selected: Option<usize>,
}

impl History {
    /// Unbounded history.
    pub fn new() -> Self {
        Self::default()
    }

    /// History keeping at most `capacity` entries. A capacity of zero is
    /// treated as one.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity.max(1)),
            ..Self::default()
        }
    }

    /// Append a snapshot and select it.
    pub fn push(&mut self, connection: ConnectionId, snapshot: DebugSnapshot) {
        self.entries.push_back(HistoryEntry {
            connection,
            snapshot,
        });
        if let Some(capacity) = self.capacity {
            while self.entries.len() > capacity {
                self.entries.pop_front();
            }
        }
        self.selected = Some(self.entries.len() - 1);
    }

    /// Select entry `index`. Returns it, or `None` if out of range (the
    /// selection is unchanged).
    pub fn select(&mut self, index: usize) -> Option<&HistoryEntry> {
        if index >= self.entries.len() {
            return None;
        }
        self.selected = Some(index);
        self.entries.get(index)
    }

    /// Index of the selected entry.
    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    /// The selected entry.
    pub fn selected(&self) -> Option<&HistoryEntry> {
        self.selected.and_then(|i| self.entries.get(i))
    }

    pub fn get(&self, index: usize) -> Option<&HistoryEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.selected = None;
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn snapshot(action: &str) -> DebugSnapshot {
        DebugSnapshot::new(action, json!({ "action": action }), b"")
    }

    fn ids(n: u64) -> Vec<ConnectionId> {
        (1..=n).map(ConnectionId::new).collect()
    }

    #[test]
    fn push_selects_newest() {
        let id = ids(1)[0];
        let mut history = History::new();
        assert!(history.selected().is_none());

        history.push(id, snapshot("a"));
        history.push(id, snapshot("b"));

        assert_eq!(history.len(), 2);
        assert_eq!(history.selected_index(), Some(1));
        assert_eq!(history.selected().unwrap().snapshot.action, "b");
    }

    #[test]
    fn select_out_of_range_keeps_selection() {
        let id = ids(1)[0];
        let mut history = History::new();
        history.push(id, snapshot("a"));
        history.push(id, snapshot("b"));

        assert_eq!(history.select(0).unwrap().snapshot.action, "a");
        assert!(history.select(5).is_none());
        assert_eq!(history.selected_index(), Some(0));
    }

    #[test]
    fn capacity_drops_oldest() {
        let conns = ids(2);
        let mut history = History::with_capacity(2);
        history.push(conns[0], snapshot("a"));
        history.push(conns[1], snapshot("b"));
        history.push(conns[0], snapshot("c"));

        let actions: Vec<&str> = history.iter().map(|e| e.snapshot.action.as_str()).collect();
        assert_eq!(actions, vec!["b", "c"]);
        assert_eq!(history.get(0).unwrap().connection, conns[1]);
        assert_eq!(history.selected_index(), Some(1));
    }

    #[test]
    fn clear_resets_selection() {
        let id = ids(1)[0];
        let mut history = History::with_capacity(0);
        history.push(id, snapshot("a"));
        history.push(id, snapshot("b"));
        assert_eq!(history.len(), 1);

        history.clear();
        assert!(history.is_empty());
        assert!(history.selected().is_none());
    }
}

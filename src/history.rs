use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::RwLock;

/// Number of entries retained before the oldest is evicted.
const CAPACITY: usize = 100;

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub details: String,
}

/// Bounded ring of recent operations, kept purely for diagnostics. Writers
/// are exclusive, readers may be concurrent.
pub struct TagHistory {
    entries: RwLock<VecDeque<HistoryEntry>>,
}

impl TagHistory {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(CAPACITY)),
        }
    }

    pub fn record(&self, operation: &str, details: impl Into<String>) {
        let mut entries = self.entries.write().expect("history lock poisoned");
        if entries.len() == CAPACITY {
            entries.pop_front();
        }
        entries.push_back(HistoryEntry {
            timestamp: Utc::now(),
            operation: operation.to_string(),
            details: details.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("history lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the current entries, oldest first.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries
            .read()
            .expect("history lock poisoned")
            .iter()
            .cloned()
            .collect()
    }
}

impl Default for TagHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_snapshot() {
        let history = TagHistory::new();
        assert!(history.is_empty());

        history.record("Startup", "agent initialized");
        history.record("Apply Tag", "Applied tag v1");

        let entries = history.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].operation, "Startup");
        assert_eq!(entries[1].operation, "Apply Tag");
        assert_eq!(entries[1].details, "Applied tag v1");
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let history = TagHistory::new();
        for i in 0..CAPACITY {
            history.record("Apply Tag", format!("Applied tag v{i}"));
        }
        assert_eq!(history.len(), CAPACITY);

        history.record("Apply Tag", "Applied tag v100");
        assert_eq!(history.len(), CAPACITY);

        let entries = history.entries();
        assert_eq!(entries[0].details, "Applied tag v1");
        assert_eq!(entries[CAPACITY - 1].details, "Applied tag v100");
    }
}

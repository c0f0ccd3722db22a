//! Unordered pair bookkeeping for one filter run.

use rustc_hash::{FxHashMap, FxHashSet};

/// Sorts two ids into the canonical (smaller, larger) order.
fn sorted_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Set of (query, subject) pairs already emitted, ignoring orientation.
///
/// Keyed by the smaller id, then the larger one, so lookups borrow the ids.
/// Constructed fresh for every run; nothing is persisted.
#[derive(Debug, Default)]
pub struct PairTracker {
    seen: FxHashMap<String, FxHashSet<String>>,
    count: usize,
}

impl PairTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// False for self-pairs and for pairs already marked in either orientation.
    pub fn is_new(&self, query_id: &str, subject_id: &str) -> bool {
        if query_id == subject_id {
            return false;
        }
        let (a, b) = sorted_pair(query_id, subject_id);
        !self.seen.get(a).is_some_and(|partners| partners.contains(b))
    }

    pub fn mark_seen(&mut self, query_id: &str, subject_id: &str) {
        let (a, b) = sorted_pair(query_id, subject_id);
        if let Some(partners) = self.seen.get_mut(a) {
            if partners.insert(b.to_string()) {
                self.count += 1;
            }
            return;
        }
        let mut partners = FxHashSet::default();
        partners.insert(b.to_string());
        self.seen.insert(a.to_string(), partners);
        self.count += 1;
    }

    /// Number of distinct pairs marked so far.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

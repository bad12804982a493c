use regia_core::RegulatoryChange;
use std::collections::{HashMap, HashSet, VecDeque};

/// In-memory change store bounded by `max_changes_in_memory`. Eviction is
/// least-recently-used but never removes a pinned record; records are pinned
/// while their detection event is being published.
pub struct BoundedChangeStore {
    capacity: usize,
    changes: HashMap<String, RegulatoryChange>,
    order: VecDeque<String>,
    pinned: HashSet<String>,
}

impl BoundedChangeStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            changes: HashMap::new(),
            order: VecDeque::new(),
            pinned: HashSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn contains(&self, change_id: &str) -> bool {
        self.changes.contains_key(change_id)
    }

    /// Returns the ids evicted to stay within capacity so callers can drop
    /// them from their indexes too.
    pub fn insert(&mut self, change: RegulatoryChange) -> Vec<String> {
        let change_id = change.change_id().to_string();
        if self.changes.insert(change_id.clone(), change).is_some() {
            self.touch(&change_id);
        } else {
            self.order.push_back(change_id);
        }
        self.evict_over_capacity()
    }

    pub fn get(&mut self, change_id: &str) -> Option<RegulatoryChange> {
        let found = self.changes.get(change_id).cloned();
        if found.is_some() {
            self.touch(change_id);
        }
        found
    }

    /// Read without refreshing recency; used by bulk iteration.
    pub fn peek(&self, change_id: &str) -> Option<&RegulatoryChange> {
        self.changes.get(change_id)
    }

    pub fn remove(&mut self, change_id: &str) -> Option<RegulatoryChange> {
        self.order.retain(|id| id != change_id);
        self.pinned.remove(change_id);
        self.changes.remove(change_id)
    }

    pub fn pin(&mut self, change_id: &str) {
        if self.changes.contains_key(change_id) {
            self.pinned.insert(change_id.to_string());
        }
    }

    pub fn unpin(&mut self, change_id: &str) {
        self.pinned.remove(change_id);
    }

    pub fn is_pinned(&self, change_id: &str) -> bool {
        self.pinned.contains(change_id)
    }

    pub fn values(&self) -> impl Iterator<Item = &RegulatoryChange> {
        self.changes.values()
    }

    pub fn clear(&mut self) {
        self.changes.clear();
        self.order.clear();
        self.pinned.clear();
    }

    fn touch(&mut self, change_id: &str) {
        self.order.retain(|id| id != change_id);
        self.order.push_back(change_id.to_string());
    }

    fn evict_over_capacity(&mut self) -> Vec<String> {
        let mut evicted = Vec::new();
        while self.changes.len() > self.capacity {
            let Some(position) = self.order.iter().position(|id| !self.pinned.contains(id)) else {
                // Everything left is pinned; allow the store to exceed its
                // bound until publishes complete.
                break;
            };
            if let Some(change_id) = self.order.remove(position) {
                self.changes.remove(&change_id);
                evicted.push(change_id);
            }
        }
        evicted
    }
}

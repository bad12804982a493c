use regia_core::sha256_hex;
use std::collections::{HashSet, VecDeque};

/// Bounded seen-item memory for feed sources that have no monotonic cursor.
/// Keys are content hashes; state round-trips through the source state store
/// as a JSON array, newest last.
pub struct ItemDedup {
    capacity: usize,
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl ItemDedup {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            seen: HashSet::new(),
        }
    }

    pub fn from_state(raw: &str, capacity: usize) -> Self {
        let mut dedup = Self::new(capacity);
        if let Ok(serde_json::Value::Array(items)) = serde_json::from_str(raw) {
            for item in items {
                if let Some(hash) = item.as_str() {
                    dedup.insert(hash.to_string());
                }
            }
        }
        dedup
    }

    pub fn to_state(&self) -> String {
        serde_json::Value::Array(
            self.order
                .iter()
                .map(|h| serde_json::Value::String(h.clone()))
                .collect(),
        )
        .to_string()
    }

    pub fn item_key(title: &str, link: &str) -> String {
        sha256_hex(&format!("{}|{}", title, link))
    }

    /// Returns true when the key has not been seen before.
    pub fn check_and_insert(&mut self, key: &str) -> bool {
        if self.seen.contains(key) {
            return false;
        }
        self.insert(key.to_string());
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn insert(&mut self, key: String) {
        if self.seen.contains(&key) {
            return;
        }
        self.seen.insert(key.clone());
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
    }
}

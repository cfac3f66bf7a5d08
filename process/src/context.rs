use util::{HashMap, Hasher};

use crate::Value;

/// Name → value map for one task: input bindings, referenced globals, and
/// anything lazy expressions need at resolution time.
///
/// Cached runs restore their stored context through `merge` so lazy value
/// outputs resolve identically on resume.
#[derive(Debug, Clone)]
pub struct TaskContext {
    map: HashMap<String, Value>,
}

impl Default for TaskContext {
    fn default() -> Self {
        Self {
            map: HashMap::with_capacity_and_hasher(16, Hasher::default()),
        }
    }
}

impl TaskContext {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.map.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.map.insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn merge(&mut self, other: &TaskContext) {
        for (k, v) in &other.map {
            self.map.insert(k.clone(), v.clone());
        }
    }

    /// Entries in sorted name order, for stable serialization.
    pub fn sorted_pairs(&self) -> Vec<(&str, &Value)> {
        let mut pairs: Vec<(&str, &Value)> =
            self.map.iter().map(|(k, v)| (k.as_str(), v)).collect();
        pairs.sort_by_key(|(k, _)| *k);
        pairs
    }
}

impl FromIterator<(String, Value)> for TaskContext {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            map: HashMap::from_iter(iter),
        }
    }
}

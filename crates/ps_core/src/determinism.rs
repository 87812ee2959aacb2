//! Stable ordering helpers.
//!
//! Determinism: iteration order is always insertion order. Nothing in the
//! engine iterates a hash map; grouping goes through `InsertionMap`, which is
//! a small vec-backed map (datasets are tens to hundreds of entries).

use core::cmp::Ordering;

/// Vec-backed map that iterates in first-insertion order.
#[derive(Clone, Debug, PartialEq)]
pub struct InsertionMap<K, V> {
    entries: Vec<(K, V)>,
}

impl<K, V> Default for InsertionMap<K, V> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<K: PartialEq, V> InsertionMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn position(&self, key: &K) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Existing entry, or a new one appended at the end.
    pub fn entry_or_insert_with<F: FnOnce() -> V>(&mut self, key: K, make: F) -> &mut V {
        let idx = match self.position(&key) {
            Some(i) => i,
            None => {
                self.entries.push((key, make()));
                self.entries.len() - 1
            }
        };
        &mut self.entries[idx].1
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().map(|(k, _)| k)
    }
}

/// Total order on finite f64 values for descending sorts (NaN sorts last).
pub fn cmp_f64_desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or_else(|| a.is_nan().cmp(&b.is_nan()))
}

/// Stable sort of indices by a key, descending; ties keep their input order.
pub fn stable_sort_desc_by<F: Fn(usize) -> f64>(indices: &mut [usize], key: F) {
    indices.sort_by(|&a, &b| cmp_f64_desc(key(a), key(b)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iteration_follows_first_insertion() {
        let mut m: InsertionMap<&str, Vec<u32>> = InsertionMap::new();
        m.entry_or_insert_with("b", Vec::new).push(1);
        m.entry_or_insert_with("a", Vec::new).push(2);
        m.entry_or_insert_with("b", Vec::new).push(3);
        let keys: Vec<_> = m.keys().copied().collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(m.get(&"b"), Some(&vec![1, 3]));
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn descending_sort_is_stable() {
        let vals = [5.0, 7.0, 5.0, 9.0];
        let mut idx = vec![0, 1, 2, 3];
        stable_sort_desc_by(&mut idx, |i| vals[i]);
        assert_eq!(idx, vec![3, 1, 0, 2]);
    }
}

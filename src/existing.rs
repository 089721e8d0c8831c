use crate::ObjectKey;

/// The keys of one resource kind currently believed to exist, in the order
/// they were first observed.
///
/// Owned by a single watcher and kept behind its lock. Insertion ignores keys
/// already present, and removal drops every occurrence of a key without
/// disturbing the order of the others.
#[derive(Debug, Clone, Default)]
pub struct ExistingSet {
    keys: Vec<ObjectKey>,
}

impl ExistingSet {
    /// Record a key, returning whether it was new
    pub fn insert(&mut self, key: ObjectKey) -> bool {
        if self.contains(&key) {
            return false;
        }
        self.keys.push(key);
        true
    }

    /// Forget a key, returning whether it was present
    pub fn remove(&mut self, key: &ObjectKey) -> bool {
        let before = self.keys.len();
        self.keys.retain(|k| k != key);
        self.keys.len() != before
    }

    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    /// Replace the tracked keys wholesale, as after a fresh listing
    pub fn replace(&mut self, keys: impl IntoIterator<Item = ObjectKey>) {
        self.keys.clear();
        for key in keys {
            self.insert(key);
        }
    }

    pub fn keys(&self) -> &[ObjectKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn key(name: &str) -> ObjectKey {
        ObjectKey::new("default", name)
    }

    #[test]
    fn removing_twice_is_idempotent() {
        let mut set = ExistingSet::default();
        set.insert(key("a"));
        set.insert(key("b"));
        set.insert(key("c"));

        assert!(set.remove(&key("b")));
        assert!(!set.remove(&key("b")));
        assert_eq!(set.keys(), &[key("a"), key("c")]);
    }

    #[test]
    fn duplicate_inserts_are_ignored() {
        let mut set = ExistingSet::default();
        assert!(set.insert(key("a")));
        assert!(!set.insert(key("a")));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn remove_drops_every_occurrence_and_keeps_order() {
        let mut set = ExistingSet {
            keys: vec![key("a"), key("x"), key("b"), key("x"), key("c")],
        };
        assert!(set.remove(&key("x")));
        assert!(!set.contains(&key("x")));
        assert_eq!(set.keys(), &[key("a"), key("b"), key("c")]);
    }

    #[test]
    fn replace_resets_to_listing() {
        let mut set = ExistingSet::default();
        set.insert(key("old"));
        set.replace([key("b"), key("a"), key("b")]);
        assert_eq!(set.keys(), &[key("b"), key("a")]);
        set.replace([]);
        assert!(set.is_empty());
    }
}

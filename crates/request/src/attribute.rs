//! Per-request attribute storage.
//!
//! Attributes are arbitrary values attached to a request by handler code or by the
//! container while dispatching. They live exactly as long as the request: the store
//! is cleared when the request is recycled or dropped.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// An attribute value. Shared so the same value can be captured by an async context.
pub type AttrValue = Arc<dyn Any + Send + Sync>;

/// Insertion-ordered mapping from attribute name to value.
#[derive(Default)]
pub struct AttributeStore {
    entries: Vec<(String, AttrValue)>,
}

impl AttributeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value bound to `name`, or `None` if nothing is bound.
    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.entries.iter().find(|(key, _)| key == name).map(|(_, value)| value)
    }

    /// Returns the value bound to `name` if it has type `T`.
    pub fn get_as<T: Any>(&self, name: &str) -> Option<&T> {
        self.get(name).and_then(|value| value.downcast_ref::<T>())
    }

    /// Binds `value` to `name`, replacing any previous binding in place.
    ///
    /// Passing `None` is equivalent to [`AttributeStore::remove`].
    pub fn set(&mut self, name: impl Into<String>, value: Option<AttrValue>) {
        let name = name.into();
        let Some(value) = value else {
            self.remove(&name);
            return;
        };

        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Binds an owned value, wrapping it into an [`AttrValue`].
    pub fn insert<T: Any + Send + Sync>(&mut self, name: impl Into<String>, value: T) {
        self.set(name, Some(Arc::new(value)));
    }

    /// Removes the binding for `name`, returning the previous value.
    pub fn remove(&mut self, name: &str) -> Option<AttrValue> {
        let index = self.entries.iter().position(|(key, _)| key == name)?;
        Some(self.entries.remove(index).1)
    }

    /// Snapshot of the bound names, taken at call time.
    pub fn names(&self) -> std::vec::IntoIter<String> {
        self.entries.iter().map(|(key, _)| key.clone()).collect::<Vec<_>>().into_iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl fmt::Debug for AttributeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.iter().map(|(key, _)| key)).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get() {
        let mut store = AttributeStore::new();
        store.insert("user", String::from("zava"));
        store.insert("count", 3_u32);

        assert_eq!(store.get_as::<String>("user").map(String::as_str), Some("zava"));
        assert_eq!(store.get_as::<u32>("count"), Some(&3));
        assert_eq!(store.get_as::<u64>("count"), None);
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn set_none_is_remove() {
        let mut store = AttributeStore::new();
        store.insert("a", 1_i32);
        store.insert("b", 2_i32);

        store.set("a", None);
        assert!(store.get("a").is_none());

        assert!(store.remove("b").is_some());
        assert!(store.get("b").is_none());
        assert!(store.remove("b").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn overwrite_keeps_position() {
        let mut store = AttributeStore::new();
        store.insert("first", 1_i32);
        store.insert("second", 2_i32);
        store.insert("first", 10_i32);

        assert_eq!(store.names().collect::<Vec<_>>(), vec!["first", "second"]);
        assert_eq!(store.get_as::<i32>("first"), Some(&10));
    }

    #[test]
    fn names_is_a_snapshot() {
        let mut store = AttributeStore::new();
        store.insert("a", ());
        let names = store.names();

        store.insert("b", ());
        store.clear();

        assert_eq!(names.collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(store.len(), 0);
    }
}

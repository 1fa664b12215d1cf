use std::collections::HashMap;

use serde::de::DeserializeOwned;

use crate::error::RequestError;

/// Ordered multi-value mapping from parameter name to values.
///
/// Names keep the order in which they were first encountered, values keep encounter
/// order across all sources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterMap {
    entries: Vec<(String, Vec<String>)>,
    index: HashMap<String, usize>,
    value_count: usize,
}

impl ParameterMap {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn append(&mut self, name: String, value: String) {
        match self.index.get(&name) {
            Some(&position) => self.entries[position].1.push(value),
            None => {
                self.index.insert(name.clone(), self.entries.len());
                self.entries.push((name, vec![value]));
            }
        }
        self.value_count += 1;
    }

    /// First value of `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).and_then(|values| values.first()).map(String::as_str)
    }

    /// All values of `name`, in encounter order.
    pub fn get_all(&self, name: &str) -> Option<&[String]> {
        self.index.get(name).map(|&position| self.entries[position].1.as_slice())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of values across all names.
    pub fn value_count(&self) -> usize {
        self.value_count
    }

    /// Deserializes the parameters into `T`, the way a form body would be.
    ///
    /// Repeated names are handed to serde as repeated pairs.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, RequestError> {
        let pairs = self
            .iter()
            .flat_map(|(name, values)| values.iter().map(move |value| (name, value.as_str())))
            .collect::<Vec<_>>();

        let encoded = serde_urlencoded::to_string(&pairs).map_err(RequestError::deserialize)?;
        serde_urlencoded::from_str(&encoded).map_err(RequestError::deserialize)
    }
}

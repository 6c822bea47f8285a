//! Ordered, duplicate-free attribute values.

use indexmap::IndexSet;
use std::fmt;
use std::hash::Hash;

/// One primary value plus any further distinct values, in insertion order.
#[derive(Debug, Clone)]
pub struct ValueSet<V> {
    primary: Option<V>,
    extras: IndexSet<V>,
}

impl<V> Default for ValueSet<V> {
    fn default() -> Self {
        Self {
            primary: None,
            extras: IndexSet::new(),
        }
    }
}

impl<V> ValueSet<V> {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn value(&self) -> Option<&V> {
        self.primary.as_ref()
    }

    pub fn iter(&self) -> impl Iterator<Item = &V> + '_ {
        self.primary.iter().chain(self.extras.iter())
    }

    pub fn len(&self) -> usize {
        self.primary.as_ref().map_or(0, |_| 1 + self.extras.len())
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_none()
    }

    pub fn has_multiple(&self) -> bool {
        self.len() > 1
    }
}

impl<V: Eq + Hash> ValueSet<V> {
    pub fn new(value: V) -> Self {
        Self {
            primary: Some(value),
            extras: IndexSet::new(),
        }
    }

    /// Replace every value with `value`.
    pub fn set(&mut self, value: V) {
        self.extras.clear();
        self.primary = Some(value);
    }

    /// Add a distinct value; returns false for one already present.
    pub fn add(&mut self, value: V) -> bool {
        match &self.primary {
            None => {
                self.primary = Some(value);
                true
            }
            Some(primary) if *primary == value => false,
            Some(_) => self.extras.insert(value),
        }
    }

    /// Remove `value`; the oldest remaining value becomes primary.
    pub fn remove(&mut self, value: &V) -> bool {
        if self.primary.as_ref() == Some(value) {
            self.primary = self.extras.shift_remove_index(0);
            return true;
        }
        self.extras.shift_remove(value)
    }
}

/// Equal when both hold the same values in the same order.
impl<V: PartialEq> PartialEq for ValueSet<V> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other.iter()).all(|(a, b)| a == b)
    }
}

impl<V: Eq> Eq for ValueSet<V> {}

impl<V: fmt::Display> fmt::Display for ValueSet<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.has_multiple() {
            return match &self.primary {
                Some(value) => value.fmt(f),
                None => Ok(()),
            };
        }
        f.write_str("[")?;
        for (i, value) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            value.fmt(f)?;
        }
        f.write_str("]")
    }
}

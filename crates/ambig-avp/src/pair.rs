//! Attribute/value pairs.

use crate::attribute::Canonical;
use crate::container::ContainerId;
use crate::values::ValueSet;
use ambig_chain::AmbiguousEntity;
use std::fmt;
use std::hash::Hash;

/// An attribute (canonical type and/or free-text name) with its values and
/// optional metadata.
///
/// Ambiguity is not stored on the pair itself: a container keeps competing
/// interpretations of the same input chained in its arena.
#[derive(Debug)]
pub struct AttValPair<E, V, M = ()> {
    att_type: Option<E>,
    other_type: Option<String>,
    values: ValueSet<V>,
    metadata: Option<M>,
    container: Option<ContainerId>,
}

/// Copies never belong to a container until one stores them.
impl<E: Clone, V: Clone, M: Clone> Clone for AttValPair<E, V, M> {
    fn clone(&self) -> Self {
        Self {
            att_type: self.att_type.clone(),
            other_type: self.other_type.clone(),
            values: self.values.clone(),
            metadata: self.metadata.clone(),
            container: None,
        }
    }
}

impl<E, V, M> AttValPair<E, V, M> {
    pub fn att_type(&self) -> Option<&E> {
        self.att_type.as_ref()
    }

    pub fn set_att_type(&mut self, att_type: E) {
        self.att_type = Some(att_type);
    }

    pub fn other_type(&self) -> Option<&str> {
        self.other_type.as_deref()
    }

    /// Whether a non-empty free-text name is present.
    pub fn has_other_type(&self) -> bool {
        self.other_type.as_deref().map_or(false, |text| !text.is_empty())
    }

    pub fn value(&self) -> Option<&V> {
        self.values.value()
    }

    pub fn values(&self) -> Vec<&V> {
        self.values.iter().collect()
    }

    pub fn value_set(&self) -> &ValueSet<V> {
        &self.values
    }

    pub fn values_count(&self) -> usize {
        self.values.len()
    }

    pub fn has_multiple_values(&self) -> bool {
        self.values.has_multiple()
    }

    pub fn metadata(&self) -> Option<&M> {
        self.metadata.as_ref()
    }

    pub fn has_metadata(&self) -> bool {
        self.metadata.is_some()
    }

    /// Attach metadata, returning what was there before.
    pub fn set_metadata(&mut self, metadata: M) -> Option<M> {
        self.metadata.replace(metadata)
    }

    pub fn take_metadata(&mut self) -> Option<M> {
        self.metadata.take()
    }

    pub fn with_metadata(mut self, metadata: M) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// The container currently holding this pair.
    pub fn container(&self) -> Option<ContainerId> {
        self.container
    }

    pub(crate) fn set_container(&mut self, container: Option<ContainerId>) {
        self.container = container;
    }
}

impl<E: Canonical, V, M> AttValPair<E, V, M> {
    pub fn is_canonical(&self) -> bool {
        self.att_type.as_ref().map_or(false, Canonical::is_canonical)
    }

    /// The canonical type, when there is one.
    pub(crate) fn canonical_type(&self) -> Option<&E> {
        self.att_type.as_ref().filter(|att_type| att_type.is_canonical())
    }
}

impl<E, V: Eq + Hash, M> AttValPair<E, V, M> {
    pub fn new(att_type: Option<E>, other_type: Option<String>, value: V) -> Self {
        Self {
            att_type,
            other_type,
            values: ValueSet::new(value),
            metadata: None,
            container: None,
        }
    }

    /// A pair known only by its free-text attribute name.
    pub fn free(other_type: impl Into<String>, value: V) -> Self {
        Self::new(None, Some(other_type.into()), value)
    }

    pub fn set_value(&mut self, value: V) {
        self.values.set(value);
    }

    pub fn add_value(&mut self, value: V) -> bool {
        self.values.add(value)
    }

    pub fn remove_value(&mut self, value: &V) -> bool {
        self.values.remove(value)
    }
}

impl<E: fmt::Display, V: Eq + Hash, M> AttValPair<E, V, M> {
    /// A pair with a known type; its free-text name is the type's name.
    pub fn canonical(att_type: E, value: V) -> Self {
        let other_type = att_type.to_string();
        Self::new(Some(att_type), Some(other_type), value)
    }
}

impl<E: PartialEq, V: PartialEq, M> AttValPair<E, V, M> {
    /// Whether `other` names the same entry of a container: same canonical
    /// type, same free-text name ignoring case, same values.
    pub(crate) fn same_entry(&self, other: &Self) -> bool {
        let names_match = match (self.has_other_type(), other.has_other_type()) {
            (true, true) => match (&self.other_type, &other.other_type) {
                (Some(a), Some(b)) => a.to_lowercase() == b.to_lowercase(),
                _ => false,
            },
            (false, false) => true,
            _ => false,
        };
        self.att_type == other.att_type && names_match && self.values == other.values
    }
}

/// Two pairs are duplicates when they carry the same type and the same values
/// in the same order. Untyped pairs compare by free-text name instead.
impl<E: PartialEq, V: PartialEq, M> AmbiguousEntity for AttValPair<E, V, M> {
    fn matches(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        let types_match = match (&self.att_type, &other.att_type) {
            (None, None) => self.other_type == other.other_type,
            (a, b) => a == b,
        };
        types_match && self.values == other.values
    }
}

impl<E: fmt::Display, V: fmt::Display, M> fmt::Display for AttValPair<E, V, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.att_type, &self.other_type) {
            (Some(att_type), _) => write!(f, "{att_type}")?,
            (None, Some(text)) if !text.is_empty() => write!(f, "%{text}")?,
            _ => f.write_str("?")?,
        }
        if !self.values.is_empty() {
            write!(f, "={}", self.values)?;
        }
        if self.metadata.is_some() {
            f.write_str("+")?;
        }
        Ok(())
    }
}

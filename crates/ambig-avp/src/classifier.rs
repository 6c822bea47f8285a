//! Free-text → canonical attribute classification.

use crate::attribute::Classification;
use std::collections::HashMap;
use std::fmt;

/// Maps free text to ranked canonical candidates.
///
/// Implementations must be deterministic for a given text and should rank
/// candidates most likely first. Containers compare classifiers by identity
/// (the `Arc` they were given), so share one instance between containers that
/// are meant to match.
pub trait AttributeClassifier<E>: fmt::Debug {
    fn classify(&self, text: &str) -> Option<Classification<E>>;
}

/// Lookup-table classifier keyed by case-folded text.
#[derive(Debug, Clone)]
pub struct TableClassifier<E> {
    entries: HashMap<String, Vec<E>>,
}

impl<E> Default for TableClassifier<E> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<E> TableClassifier<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, text: &str, ranked: impl IntoIterator<Item = E>) -> Self {
        self.insert(text, ranked);
        self
    }

    pub fn insert(&mut self, text: &str, ranked: impl IntoIterator<Item = E>) {
        self.entries
            .insert(text.to_lowercase(), ranked.into_iter().collect());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<E: Clone + PartialEq + fmt::Debug> AttributeClassifier<E> for TableClassifier<E> {
    fn classify(&self, text: &str) -> Option<Classification<E>> {
        let ranked = self.entries.get(&text.to_lowercase())?;
        Classification::ranked(ranked.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let classifier = TableClassifier::new()
            .with_entry("Type", ["model", "style"])
            .with_entry("make", ["make"]);

        let classification = classifier.classify("TYPE").unwrap();
        assert_eq!(classification.candidates(), vec![&"model", &"style"]);
        assert!(!classifier.classify("make").unwrap().is_ambiguous());
        assert!(classifier.classify("nothing").is_none());
        assert_eq!(classifier.len(), 2);
    }

    #[test]
    fn empty_entry_classifies_to_nothing() {
        let classifier = TableClassifier::<&str>::new().with_entry("blank", []);
        assert!(classifier.classify("blank").is_none());
    }
}

//! Canonical attribute types and ranked classification results.

use ambig_chain::{AmbiguityArena, AmbiguousEntity, EntityId, EntityRef};
use std::fmt;
use std::hash::Hash;

/// Whether a value names a fixed, enumerable attribute (as opposed to a
/// catch-all such as "other").
pub trait Canonical {
    fn is_canonical(&self) -> bool;
}

/// Everything the container needs from a canonical attribute type.
pub trait CanonicalType: Canonical + Clone + Eq + Hash + fmt::Display + fmt::Debug {}

impl<T> CanonicalType for T where T: Canonical + Clone + Eq + Hash + fmt::Display + fmt::Debug {}

/// A canonical attribute type taking part in a classification chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Attribute<E> {
    att_type: E,
}

impl<E> Attribute<E> {
    pub fn new(att_type: E) -> Self {
        Self { att_type }
    }

    pub fn att_type(&self) -> &E {
        &self.att_type
    }

    pub fn into_att_type(self) -> E {
        self.att_type
    }
}

impl<E: Canonical> Attribute<E> {
    pub fn is_canonical(&self) -> bool {
        self.att_type.is_canonical()
    }
}

impl<E: PartialEq> AmbiguousEntity for Attribute<E> {
    fn matches(&self, other: &Self) -> bool {
        self.att_type == other.att_type
    }
}

impl<E: fmt::Display> fmt::Display for Attribute<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.att_type.fmt(f)
    }
}

/// Ranked candidate attributes for one piece of free text, most likely first.
#[derive(Debug)]
pub struct Classification<E> {
    arena: AmbiguityArena<Attribute<E>>,
    head: EntityId,
}

impl<E: PartialEq> Classification<E> {
    /// Chain the given types in rank order. `None` when there are none.
    pub fn ranked(types: impl IntoIterator<Item = E>) -> Option<Self> {
        let mut arena = AmbiguityArena::new();
        let head = arena.insert_ranked(types.into_iter().map(Attribute::new))?;
        Some(Self { arena, head })
    }

    pub fn single(att_type: E) -> Self {
        let mut arena = AmbiguityArena::new();
        let head = arena.insert(Attribute::new(att_type));
        Self { arena, head }
    }

    /// The most likely candidate.
    pub fn primary(&self) -> Option<&E> {
        self.arena.get(self.head).map(Attribute::att_type)
    }

    pub fn head(&self) -> Option<EntityRef<'_, Attribute<E>>> {
        self.arena.entity(self.head)
    }

    pub fn is_ambiguous(&self) -> bool {
        self.arena.is_ambiguous(self.head)
    }

    /// Number of distinct candidates.
    pub fn len(&self) -> usize {
        self.arena.ambiguity_count(self.head)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Distinct candidate types in rank order; repeated types are skipped.
    pub fn candidates(&self) -> Vec<&E> {
        self.attributes()
            .into_iter()
            .map(|attribute| attribute.entity().att_type())
            .collect()
    }

    pub fn attributes(&self) -> Vec<EntityRef<'_, Attribute<E>>> {
        self.arena
            .alternatives(self.head)
            .into_iter()
            .filter_map(|id| self.arena.entity(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Car {
        Model,
        Style,
        Other,
    }

    impl Canonical for Car {
        fn is_canonical(&self) -> bool {
            !matches!(self, Car::Other)
        }
    }

    #[test]
    fn ranked_chain_keeps_order() {
        let classification = Classification::ranked([Car::Model, Car::Style]).unwrap();
        assert!(classification.is_ambiguous());
        assert_eq!(classification.primary(), Some(&Car::Model));
        assert_eq!(classification.candidates(), vec![&Car::Model, &Car::Style]);

        let attributes = classification.attributes();
        assert_eq!(attributes[0].precedence(), 0);
        assert_eq!(attributes[1].precedence(), 1);
        assert_eq!(attributes[1].first_ambiguity().id(), attributes[0].id());
        assert!(attributes[1].next_ambiguity().is_none());
    }

    #[test]
    fn repeated_candidates_collapse() {
        let classification =
            Classification::ranked([Car::Model, Car::Model, Car::Style]).unwrap();
        assert_eq!(classification.len(), 2);
        assert_eq!(classification.candidates(), vec![&Car::Model, &Car::Style]);
    }

    #[test]
    fn single_candidate_is_unambiguous() {
        let classification = Classification::single(Car::Other);
        assert!(!classification.is_ambiguous());
        assert_eq!(classification.len(), 1);
        assert!(!classification.head().unwrap().is_canonical());
        assert!(Classification::<Car>::ranked([]).is_none());
    }
}

//! Attribute/value pairs and the container that tracks their ambiguity.
//!
//! Input arrives as free-text attribute names ("type", "make", "colour")
//! with values. An [`AttributeClassifier`] maps a name to ranked canonical
//! types; a name with several candidates becomes several competing readings
//! chained together:
//!
//! ```text
//!   ("type", sonata) ──classify──► MODEL=sonata ─► STYLE=sonata
//!                                   precedence 0    precedence 1
//! ```
//!
//! [`AvpContainer`] keeps one slot per canonical type, a cache of classified
//! text lookups, and a slot per free-text name that no canonical type claims.
//! Callers inspect [`AvpContainer::ambiguities`] and settle them with
//! [`AvpContainer::discard`] or [`AvpContainer::resolve`].
//!
//! Chain mechanics come from [`ambig_chain`]; its error type is re-exported.

pub mod attribute;
pub mod classifier;
pub mod container;
pub mod options;
pub mod pair;
pub mod values;

pub use ambig_chain::{AmbiguityError, AmbiguousEntity, EntityId, EntityRef, Result};
pub use attribute::{Attribute, Canonical, CanonicalType, Classification};
pub use classifier::{AttributeClassifier, TableClassifier};
pub use container::{AddMode, AvpContainer, AvpId, AvpRef, ContainerId};
pub use options::{ContainerOptions, KeyFolding};
pub use pair::AttValPair;
pub use values::ValueSet;

//! Ambiguity chains
//!
//! An *ambiguity chain* is an ordered set of mutually exclusive candidates for
//! one logical slot, most likely first. The position of a member is its
//! *precedence* (0 = most likely).
//!
//! ```text
//!   "type" ──classify──►  MODEL ──► STYLE           precedence 0, 1
//!   year   ──records───►  2012 ──► 2011 ──► 2010    precedence 0, 1, 2
//! ```
//!
//! ## Pieces
//!
//! - [`AmbiguityChain`]: member list plus member→position index.
//! - [`AmbiguousEntity`]: the one thing a participant must decide, namely
//!   whether another entity is a mere duplicate of it.
//! - [`AmbiguityArena`]: owns participants and chains, enforces that an
//!   entity sits in at most one chain, and provides navigation
//!   (first/next/precedence/count) plus add/insert/remove/discard/resolve.
//! - [`EntityRef`]: borrowed view of a participant with navigation attached.
//!
//! Participants never own their chain and chains never own participants;
//! both refer to each other through ids handed out by the arena.

pub mod arena;
pub mod chain;
pub mod entity;
pub mod error;

pub use arena::{AmbiguityArena, ChainId, EntityId};
pub use chain::AmbiguityChain;
pub use entity::{AmbiguousEntity, EntityRef};
pub use error::{AmbiguityError, Result};

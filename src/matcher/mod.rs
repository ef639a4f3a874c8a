//! Structural method matching.
//!
//! A [`Fingerprint`] describes a method by its signature, the strings it loads, an ordered list
//! of [`InstructionFilter`]s and an optional [`MethodPredicate`]. Matching is a linear scan over
//! the container; nothing is indexed or cached, so a fingerprint always sees the current state
//! of the methods.
//!
//! A failed match is reported as [`crate::Error::PatternNotFound`] carrying the fingerprint
//! name, which aborts the patch that depended on it.

mod filter;
mod fingerprint;
mod predicate;

pub use filter::{FilterKind, InstructionFilter, InstructionLocation};
pub use fingerprint::{Fingerprint, InstructionMatch, MatchResult, StringMatch};
pub use predicate::MethodPredicate;

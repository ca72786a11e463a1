//! Core data structures shared across the liquidil workspace.
//!
//! Currently this is just string interning: identifiers, cycle identities,
//! and assign/capture names all flow through the same `Interner` so the
//! compiler and VM compare them as cheap integers instead of strings.

mod interner;

pub use interner::{Interner, Symbol};

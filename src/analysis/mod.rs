//! Analyses over method bodies.
//!
//! - [`cfg`] - instruction level successors and bounded reachability windows
//! - [`registers`] - liveness based scratch register allocation
//!
//! Both work directly on the instruction stream and are recomputed per query; no result is
//! cached across edits.

/// Implementation of instruction level control flow
pub mod cfg;
/// Implementation of the register allocator
pub mod registers;

pub use cfg::{successors, RegisterWindow};
pub use registers::{find_free_register, AllocatorPolicy, FreeRegisterProvider, RegisterAllocator};

//! # dexweave Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the dexweave library. Import this module to get quick access to the essential
//! types for writing patches.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dexweave operations
pub use crate::Error;

/// The result type used throughout dexweave
pub use crate::Result;

// ================================================================================================
// Instructions
// ================================================================================================

/// Instruction model
pub use crate::assembly::{FieldReference, Instruction, Label, MethodReference, Opcode, Register};

// ================================================================================================
// Classes and Methods
// ================================================================================================

/// Container, classes and methods
pub use crate::metadata::{
    AccessFlags, BytecodeContainer, ClassBuilder, ClassDef, Method, MethodBuilder, MethodId,
};

// ================================================================================================
// Editing
// ================================================================================================

/// Method editing
pub use crate::editor::{
    ExternalLabel, HelperMethod, InsertedBlock, InstructionAnchor, InstructionId, MethodEditor,
};

/// Register allocation
pub use crate::analysis::{AllocatorPolicy, FreeRegisterProvider, RegisterAllocator};

// ================================================================================================
// Matching
// ================================================================================================

/// Fingerprints
pub use crate::matcher::{
    Fingerprint, InstructionFilter, InstructionLocation, MatchResult, MethodPredicate,
};

// ================================================================================================
// Aggregates, Strategies and Patches
// ================================================================================================

/// Aggregates
pub use crate::registry::{AggregateBuilder, AggregateLayout, AggregateSpec};

/// Version branches
pub use crate::strategy::{AppVersion, HookStrategy, InstrumentationStrategy, VersionInfo};

/// Patch orchestration
pub use crate::patcher::{
    BuildContext, BuildPhase, EventKind, EventLog, HookPoint, Patch, PatchScheduler,
    PatcherConfig,
};

/// Component filter patches
pub use crate::patches::{ComponentFilterPatch, FilterContributionPatch};

use thiserror::Error;

use crate::assembly::Register;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Errors fall into a handful of groups. Every group except register exhaustion is fatal for
/// the patch that triggered it, and a failing patch aborts the whole build.
///
/// # Error Categories
///
/// ## Assembly Errors
/// - [`Error::Malformed`] - Text that could not be parsed as an instruction block
/// - [`Error::InvalidMnemonic`] - Unknown opcode mnemonic
/// - [`Error::WrongOperand`] - Operand shape does not fit the opcode
/// - [`Error::UnknownLabel`] / [`Error::DuplicateLabel`] - Label resolution failures
///
/// ## Editing Errors
/// - [`Error::IndexOutOfRange`] - Edit position outside the instruction stream
/// - [`Error::RegisterOutOfRange`] - Register outside the method's register file
/// - [`Error::RegisterNotEncodable`] - Register too large for the opcode's operand width
/// - [`Error::InvalidInsertionPoint`] - Edit would split an invoke from its result move
/// - [`Error::DanglingLabel`] - Removal would leave a label without an instruction
/// - [`Error::NoImplementation`] - Method has no body to edit
///
/// ## Allocation
/// - [`Error::RegisterExhausted`] - No free register at the edit point. Callers resolve this
///   through the helper-method strategy instead of failing the build.
///
/// ## Matching and Orchestration
/// - [`Error::PatternNotFound`] - A fingerprint did not match
/// - [`Error::ClassNotFound`] / [`Error::MethodNotFound`] - Lookups that missed
/// - [`Error::RegistrySealed`] / [`Error::AggregateNotFound`] - Registry lifecycle violations
/// - [`Error::PatchFailed`] - Wraps the error of a failing patch
/// - [`Error::GraphError`] - Broken patch dependency graph
#[derive(Error, Debug)]
pub enum Error {
    /// Text handed to the assembler could not be parsed.
    ///
    /// The error includes the source location where the malformation was detected for
    /// debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The mnemonic is not a known opcode.
    #[error("Invalid instruction mnemonic - {0}")]
    InvalidMnemonic(String),

    /// The operands do not fit the opcode's format.
    #[error("Wrong operand for '{opcode}': {message}")]
    WrongOperand {
        /// Mnemonic of the offending instruction
        opcode: String,
        /// What was wrong
        message: String,
    },

    /// A branch referenced a label that is neither defined in the block nor supplied by the
    /// caller.
    #[error("Unknown label - {0}")]
    UnknownLabel(String),

    /// The same label name was defined twice in one block.
    #[error("Duplicate label - {0}")]
    DuplicateLabel(String),

    /// An edit referenced a position outside of the instruction stream.
    #[error("Index {index} is out of range for {len} instructions")]
    IndexOutOfRange {
        /// Requested index
        index: usize,
        /// Instruction count at the time of the edit
        len: usize,
    },

    /// A register is outside the method's register file.
    #[error("Register v{register} is out of range for {register_count} registers")]
    RegisterOutOfRange {
        /// Offending register
        register: u32,
        /// Declared register count of the method
        register_count: u16,
    },

    /// A register does not fit into the operand width of the opcode.
    #[error("Register v{register} can not be encoded by '{opcode}' (max v{max})")]
    RegisterNotEncodable {
        /// Mnemonic of the offending instruction
        opcode: &'static str,
        /// Offending register
        register: Register,
        /// Highest register the operand can encode
        max: Register,
    },

    /// The edit would separate an invoke from the `move-result` that consumes its value.
    #[error("Can not edit at index {0}: instruction is bound to the preceding invoke")]
    InvalidInsertionPoint(usize),

    /// A removal would leave branch targets without an instruction to point at.
    #[error("Removing index {0} would leave a dangling label")]
    DanglingLabel(usize),

    /// The method is abstract or native.
    #[error("Method {0} has no implementation")]
    NoImplementation(String),

    /// No register is free at the edit point.
    ///
    /// This is not a build failure on its own, callers that can move their work into a helper
    /// method catch it and do so.
    #[error("No free register at index {index} (requested {requested})")]
    RegisterExhausted {
        /// The edit point
        index: usize,
        /// How many registers were still needed
        requested: usize,
    },

    /// A fingerprint did not match anything.
    #[error("Pattern not found - {0}")]
    PatternNotFound(String),

    /// No class with this type descriptor exists.
    #[error("Class not found - {0}")]
    ClassNotFound(String),

    /// No method matched the lookup.
    #[error("Method not found - {0}")]
    MethodNotFound(String),

    /// A class or method with the same signature is already present.
    #[error("Duplicate definition - {0}")]
    DuplicateDefinition(String),

    /// Registration or finalize after the registry was sealed.
    #[error("Aggregate '{0}' is already sealed")]
    RegistrySealed(String),

    /// Registration into an aggregate that no patch has opened.
    #[error("Aggregate '{0}' has not been opened")]
    AggregateNotFound(String),

    /// The build context was used outside of the phase that allows the operation.
    #[error("Build context is in the wrong phase: {0}")]
    WrongPhase(String),

    /// A hook point was requested that no patch has located.
    #[error("Hook point '{0}' has not been located")]
    HookNotFound(String),

    /// A patch failed, aborting the build.
    #[error("Patch '{patch}' failed: {source}")]
    PatchFailed {
        /// Name of the failing patch
        patch: String,
        /// The underlying error
        source: Box<Error>,
    },

    /// Patch dependency graph error.
    ///
    /// Occurs when a patch depends on an unknown patch or when dependencies form a cycle.
    #[error("{0}")]
    GraphError(String),
}

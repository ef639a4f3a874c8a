//! Dalvik instruction model and textual mini-assembly.
//!
//! This module holds everything needed to describe a single instruction and to turn smali-like
//! text into instructions:
//!
//! - [`Opcode`] / [`OpcodeInfo`] - the opcode table, driving validation and liveness
//! - [`Instruction`] - an opcode with its operands
//! - [`Reference`] - string, type, field and method references
//! - [`parse_block`] - parses instruction text into a [`ParsedBlock`], which is compiled against
//!   a [`RegisterFile`] before being spliced into a method
//!
//! Instructions are values. Positions and labels belong to the instruction stream that owns
//! them, see [`crate::editor`].

mod instruction;
mod opcodes;
mod parser;
mod reference;

pub use instruction::{Instruction, Label, Payload, Register, SwitchCase};
pub use opcodes::{Access, FlowType, Format, Opcode, OpcodeInfo, ReferenceKind, Slot};
pub use parser::{
    parse_block, CompiledBlock, ParsedBlock, ParsedInstruction, ParsedPayload, RegisterFile,
    RegisterToken,
};
pub use reference::{
    escape_string, parse_type_list, type_width, FieldReference, MethodReference, Reference,
};

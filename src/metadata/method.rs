//! Methods and method bodies.
//!
//! A [`Method`] carries its signature and, unless it is abstract or native, a
//! [`MethodImplementation`] holding the register count, the instruction stream and the try
//! blocks. Parameters occupy the top of the register file:
//!
//! ```text
//!  v0 .. v(n-k-1)   locals
//!  p0 .. p(k-1)     parameters, p0 = `this` for instance methods, J/D take two registers
//! ```

use std::fmt;

use crate::{
    assembly::{type_width, Instruction, Label, MethodReference, Opcode, RegisterFile},
    editor::{InstructionStream, MethodEditor},
    metadata::AccessFlags,
    Error, Result,
};

/// A guarded range of instructions and the handler that catches its exceptions.
///
/// All three positions are labels, so try blocks stay attached to their instructions across
/// edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryBlock {
    /// First guarded instruction
    pub start: Label,
    /// Last guarded instruction, inclusive
    pub end: Label,
    /// First instruction of the handler
    pub handler: Label,
    /// Caught exception type, `None` for catch-all
    pub exception_type: Option<String>,
}

/// Body of a method.
#[derive(Debug, Clone, Default)]
pub struct MethodImplementation {
    register_count: u16,
    instructions: InstructionStream,
    try_blocks: Vec<TryBlock>,
}

impl MethodImplementation {
    /// Creates an empty body with `register_count` registers.
    #[must_use]
    pub fn new(register_count: u16) -> Self {
        Self {
            register_count,
            instructions: InstructionStream::new(),
            try_blocks: Vec::new(),
        }
    }

    /// Declared number of registers, parameters included.
    #[must_use]
    pub fn register_count(&self) -> u16 {
        self.register_count
    }

    /// The instruction stream.
    #[must_use]
    pub fn instructions(&self) -> &InstructionStream {
        &self.instructions
    }

    /// Mutable access to the instruction stream.
    pub(crate) fn instructions_mut(&mut self) -> &mut InstructionStream {
        &mut self.instructions
    }

    /// Try blocks in declaration order.
    #[must_use]
    pub fn try_blocks(&self) -> &[TryBlock] {
        &self.try_blocks
    }

    /// Adds a try block. All labels must be bound in this body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownLabel`] if any of the labels does not resolve.
    pub fn add_try_block(&mut self, block: TryBlock) -> Result<()> {
        let start = self.instructions.resolve(block.start)?;
        let end = self.instructions.resolve(block.end)?;
        self.instructions.resolve(block.handler)?;
        if end < start {
            return Err(malformed_error!(
                "Try block ends at {} before it starts at {}",
                end,
                start
            ));
        }
        self.try_blocks.push(block);
        Ok(())
    }

    /// Handler indices of every try block covering `index`.
    #[must_use]
    pub fn handlers_covering(&self, index: usize) -> Vec<usize> {
        self.try_blocks
            .iter()
            .filter_map(|block| {
                let start = self.instructions.resolve(block.start).ok()?;
                let end = self.instructions.resolve(block.end).ok()?;
                let handler = self.instructions.resolve(block.handler).ok()?;
                (start <= index && index <= end).then_some(handler)
            })
            .collect()
    }
}

/// A method definition.
#[derive(Debug, Clone)]
pub struct Method {
    /// Type descriptor of the declaring class
    pub defining_class: String,
    /// Method name
    pub name: String,
    /// Parameter type descriptors, excluding `this`
    pub parameters: Vec<String>,
    /// Return type descriptor
    pub return_type: String,
    /// Access flags
    pub access_flags: AccessFlags,
    /// Body, `None` for abstract and native methods
    pub implementation: Option<MethodImplementation>,
}

impl Method {
    /// Creates a method without a body.
    pub fn new(
        defining_class: impl Into<String>,
        name: impl Into<String>,
        parameters: Vec<String>,
        return_type: impl Into<String>,
        access_flags: AccessFlags,
    ) -> Self {
        Self {
            defining_class: defining_class.into(),
            name: name.into(),
            parameters,
            return_type: return_type.into(),
            access_flags,
            implementation: None,
        }
    }

    /// Returns true for static methods.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(AccessFlags::STATIC)
    }

    /// Returns true for `<init>` and `<clinit>`.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == "<init>" || self.name == "<clinit>"
    }

    /// Number of registers holding parameters, `this` included.
    #[must_use]
    pub fn parameter_registers(&self) -> u16 {
        let this = u16::from(!self.is_static());
        this + self.parameters.iter().map(|p| type_width(p)).sum::<u16>()
    }

    /// The reference used to call this method.
    #[must_use]
    pub fn reference(&self) -> MethodReference {
        MethodReference::new(
            self.defining_class.clone(),
            self.name.clone(),
            self.parameters.clone(),
            self.return_type.clone(),
        )
    }

    /// The register file of the body, if there is one.
    #[must_use]
    pub fn register_file(&self) -> Option<RegisterFile> {
        self.implementation.as_ref().map(|body| RegisterFile {
            register_count: body.register_count(),
            parameter_registers: self.parameter_registers(),
        })
    }

    /// The body, or [`Error::NoImplementation`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoImplementation`] for abstract and native methods.
    pub fn implementation_or_err(&self) -> Result<&MethodImplementation> {
        self.implementation
            .as_ref()
            .ok_or_else(|| Error::NoImplementation(self.to_string()))
    }

    /// Instruction at `index` of the body.
    ///
    /// # Errors
    ///
    /// [`Error::NoImplementation`] or [`Error::IndexOutOfRange`].
    pub fn instruction(&self, index: usize) -> Result<&Instruction> {
        self.implementation_or_err()?.instructions().get_or_err(index)
    }

    /// Number of instructions in the body, zero without one.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.implementation
            .as_ref()
            .map_or(0, |body| body.instructions().len())
    }

    /// Opens an editor on the body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoImplementation`] for abstract and native methods.
    pub fn editor(&mut self) -> Result<MethodEditor<'_>> {
        MethodEditor::new(self)
    }

    /// Index of the first instruction at or after `start` matching `predicate`.
    pub fn index_of_first_instruction<F>(&self, start: usize, predicate: F) -> Option<usize>
    where
        F: FnMut(&Instruction) -> bool,
    {
        self.implementation
            .as_ref()
            .and_then(|body| body.instructions().index_of_first(start, predicate))
    }

    /// Like [`Method::index_of_first_instruction`], failing with [`Error::PatternNotFound`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::PatternNotFound`] if nothing matches.
    pub fn index_of_first_instruction_or_err<F>(&self, start: usize, predicate: F) -> Result<usize>
    where
        F: FnMut(&Instruction) -> bool,
    {
        self.index_of_first_instruction(start, predicate)
            .ok_or_else(|| Error::PatternNotFound(format!("instruction after {start} in {self}")))
    }

    /// Index of the first instruction with `opcode`.
    #[must_use]
    pub fn index_of_first_opcode(&self, opcode: Opcode) -> Option<usize> {
        self.index_of_first_instruction(0, |i| i.opcode == opcode)
    }

    /// Index of the closest instruction at or before `end` matching `predicate`.
    pub fn index_of_first_instruction_reversed<F>(&self, end: usize, predicate: F) -> Option<usize>
    where
        F: FnMut(&Instruction) -> bool,
    {
        self.implementation
            .as_ref()
            .and_then(|body| body.instructions().index_of_first_reversed(end, predicate))
    }

    /// Like [`Method::index_of_first_instruction_reversed`], failing with
    /// [`Error::PatternNotFound`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::PatternNotFound`] if nothing matches.
    pub fn index_of_first_instruction_reversed_or_err<F>(
        &self,
        end: usize,
        predicate: F,
    ) -> Result<usize>
    where
        F: FnMut(&Instruction) -> bool,
    {
        self.index_of_first_instruction_reversed(end, predicate)
            .ok_or_else(|| Error::PatternNotFound(format!("instruction before {end} in {self}")))
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}->{}({}){}",
            self.defining_class,
            self.name,
            self.parameters.concat(),
            self.return_type
        )
    }
}

//! Instruction editing.
//!
//! [`MethodEditor`] is the only way to change a method body. It compiles smali-like text against
//! the method's register file, validates every operand and label, and only then splices the
//! result into the [`InstructionStream`]. A failing edit leaves the body untouched.
//!
//! # Label Semantics
//!
//! Labels are identities, see [`stream`]. The three insertion flavours differ only in what
//! happens to labels that pointed at the instruction at the insertion index:
//!
//! | Operation                                   | Existing labels at `index`            |
//! |---------------------------------------------|---------------------------------------|
//! | [`MethodEditor::add_instructions`]           | stay, branches skip the new block     |
//! | [`MethodEditor::add_instructions_with_labels`] | stay, block may branch to given labels |
//! | [`MethodEditor::add_instructions_at_control_flow_label`] | move to the first new instruction |
//!
//! Labels defined inside the block (`:name`) bind to the instruction following them in the
//! block, or to the instruction following the block when they are trailing.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut editor = method.editor()?;
//! let skip = editor.label_for(7)?;
//! editor.add_instructions_with_labels(
//!     7,
//!     "invoke-static {}, Lapp/Hooks;->enabled()Z\nmove-result v0\nif-eqz v0, :skip\nnop",
//!     &[ExternalLabel::new("skip", skip)],
//! )?;
//! ```

mod helper;
mod literal;
pub mod stream;

use std::collections::HashMap;

use crate::{
    assembly::{
        parse_block, CompiledBlock, FlowType, Instruction, Label, Opcode, Payload, RegisterFile,
        SwitchCase,
    },
    metadata::{BytecodeContainer, Method, MethodId, MethodImplementation},
    Error, Result,
};

pub use helper::HelperMethod;
pub use literal::{LiteralOverride, LiteralOverrides};
pub use stream::{InstructionId, InstructionStream};

/// A label of the target method made available to a block under a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalLabel {
    /// Name used in the block, without the leading `:`
    pub name: String,
    /// The stream label
    pub label: Label,
}

impl ExternalLabel {
    /// Creates a new external label.
    pub fn new(name: impl Into<String>, label: Label) -> Self {
        Self {
            name: name.into(),
            label,
        }
    }
}

/// An instruction of a method, tracked by identity.
///
/// Unlike a [`Label`] an anchor is never moved by control flow aware insertion; it always
/// refers to the very instruction it was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstructionAnchor {
    /// The method
    pub method: MethodId,
    /// Identity of the instruction
    pub instruction: InstructionId,
}

impl InstructionAnchor {
    /// Anchors the instruction currently at `index` of `method`.
    ///
    /// # Errors
    ///
    /// [`Error::MethodNotFound`], [`Error::NoImplementation`] or [`Error::IndexOutOfRange`].
    pub fn at(container: &BytecodeContainer, method: MethodId, index: usize) -> Result<Self> {
        let stream = container.method(method)?.implementation_or_err()?.instructions();
        let instruction = stream.id_at(index).ok_or(Error::IndexOutOfRange {
            index,
            len: stream.len(),
        })?;
        Ok(Self {
            method,
            instruction,
        })
    }

    /// Current index of the anchored instruction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if the instruction has been removed.
    pub fn position(&self, container: &BytecodeContainer) -> Result<usize> {
        container
            .method(self.method)?
            .implementation_or_err()?
            .instructions()
            .position(self.instruction)
            .ok_or_else(|| {
                malformed_error!(
                    "Anchored instruction {} of {} was removed",
                    self.instruction.value(),
                    self.method
                )
            })
    }
}

/// Where a block ended up after an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertedBlock {
    /// Index of the first new instruction
    pub start: usize,
    /// Number of new instructions
    pub len: usize,
    /// Stream labels created for the block's own label definitions
    pub labels: HashMap<String, Label>,
}

impl InsertedBlock {
    /// Index one past the last new instruction.
    #[must_use]
    pub fn end(&self) -> usize {
        self.start + self.len
    }

    /// Stream label created for the block label `name`.
    #[must_use]
    pub fn label(&self, name: &str) -> Option<Label> {
        self.labels.get(name).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LabelMode {
    KeepExisting,
    MigrateToBlock,
}

/// Editor over one method body.
///
/// Created through [`Method::editor`]. All indices are relative to the current stream version;
/// after an edit, indices past the edit point shift, labels do not.
pub struct MethodEditor<'a> {
    body: &'a mut MethodImplementation,
    file: RegisterFile,
    method: String,
}

impl<'a> MethodEditor<'a> {
    pub(crate) fn new(method: &'a mut Method) -> Result<Self> {
        let name = method.to_string();
        let parameter_registers = method.parameter_registers();
        let body = method
            .implementation
            .as_mut()
            .ok_or_else(|| Error::NoImplementation(name.clone()))?;
        let file = RegisterFile {
            register_count: body.register_count(),
            parameter_registers,
        };

        Ok(Self {
            body,
            file,
            method: name,
        })
    }

    /// The register file blocks are compiled against.
    #[must_use]
    pub fn register_file(&self) -> RegisterFile {
        self.file
    }

    /// The instruction stream.
    #[must_use]
    pub fn instructions(&self) -> &InstructionStream {
        self.body.instructions()
    }

    /// The method body.
    #[must_use]
    pub fn body(&self) -> &MethodImplementation {
        self.body
    }

    /// Number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.body.instructions().len()
    }

    /// Returns true if the body holds no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.instructions().is_empty()
    }

    /// Instruction at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] past the end of the stream.
    pub fn get(&self, index: usize) -> Result<&Instruction> {
        self.body.instructions().get_or_err(index)
    }

    /// A label bound to the instruction at `index`, reusing an existing one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] past the end of the stream.
    pub fn label_for(&mut self, index: usize) -> Result<Label> {
        self.body.instructions_mut().label_for(index)
    }

    /// Inserts a block before the instruction at `index`.
    ///
    /// Labels at `index` keep pointing at the original instruction, so branches to it skip the
    /// new block. `index == len()` appends.
    ///
    /// # Errors
    ///
    /// See [`MethodEditor::add_instructions_with_labels`].
    pub fn add_instructions(&mut self, index: usize, text: &str) -> Result<InsertedBlock> {
        self.add_instructions_with_labels(index, text, &[])
    }

    /// Inserts a single instruction before the instruction at `index`.
    ///
    /// # Errors
    ///
    /// See [`MethodEditor::add_instructions_with_labels`].
    pub fn add_instruction(&mut self, index: usize, text: &str) -> Result<InsertedBlock> {
        let block = self.add_instructions_with_labels(index, text, &[])?;
        if block.len != 1 {
            log::warn!(
                "add_instruction inserted {} instructions into {}",
                block.len,
                self.method
            );
        }
        Ok(block)
    }

    /// Inserts a block that may branch to existing instructions through `labels`.
    ///
    /// # Errors
    ///
    /// - [`Error::Malformed`], [`Error::InvalidMnemonic`] for syntax errors
    /// - [`Error::WrongOperand`], [`Error::RegisterOutOfRange`], [`Error::RegisterNotEncodable`]
    ///   for invalid operands
    /// - [`Error::UnknownLabel`], [`Error::DuplicateLabel`] for label problems
    /// - [`Error::IndexOutOfRange`] if `index > len()`
    /// - [`Error::InvalidInsertionPoint`] if the instruction at `index` is a `move-result*`
    /// - [`Error::DanglingLabel`] for a trailing block label with nothing after the block
    pub fn add_instructions_with_labels(
        &mut self,
        index: usize,
        text: &str,
        labels: &[ExternalLabel],
    ) -> Result<InsertedBlock> {
        self.splice_text(index, 0, text, labels, LabelMode::KeepExisting)
    }

    /// Inserts a block so that every path reaching the instruction at `index` runs it first.
    ///
    /// Labels bound to the instruction at `index` before the edit move to the first new
    /// instruction. Labels defined by the block itself are bound afterwards and never move, so
    /// a trailing `:continue` still lands on the original instruction.
    ///
    /// # Errors
    ///
    /// See [`MethodEditor::add_instructions_with_labels`].
    pub fn add_instructions_at_control_flow_label(
        &mut self,
        index: usize,
        text: &str,
    ) -> Result<InsertedBlock> {
        self.splice_text(index, 0, text, &[], LabelMode::MigrateToBlock)
    }

    /// [`MethodEditor::add_instructions_at_control_flow_label`] with external labels.
    ///
    /// # Errors
    ///
    /// See [`MethodEditor::add_instructions_with_labels`].
    pub fn add_instructions_at_control_flow_label_with_labels(
        &mut self,
        index: usize,
        text: &str,
        labels: &[ExternalLabel],
    ) -> Result<InsertedBlock> {
        self.splice_text(index, 0, text, labels, LabelMode::MigrateToBlock)
    }

    /// Replaces `count` instructions starting at `index` with a block.
    ///
    /// Labels bound to replaced instructions move to the first replacement instruction.
    ///
    /// # Errors
    ///
    /// See [`MethodEditor::add_instructions_with_labels`]. The range must lie inside the stream.
    pub fn replace_instructions(
        &mut self,
        index: usize,
        count: usize,
        text: &str,
    ) -> Result<InsertedBlock> {
        self.splice_text(index, count, text, &[], LabelMode::KeepExisting)
    }

    /// Replaces the instruction at `index` with a block.
    ///
    /// # Errors
    ///
    /// See [`MethodEditor::replace_instructions`].
    pub fn replace_instruction(&mut self, index: usize, text: &str) -> Result<InsertedBlock> {
        self.replace_instructions(index, 1, text)
    }

    /// Removes the instruction at `index`.
    ///
    /// Labels bound to it move to the instruction taking its place.
    ///
    /// # Errors
    ///
    /// - [`Error::IndexOutOfRange`] past the end of the stream
    /// - [`Error::DanglingLabel`] if it is labelled and last
    pub fn remove_instruction(&mut self, index: usize) -> Result<()> {
        self.remove_instructions(index, 1)
    }

    /// Removes `count` instructions starting at `index`.
    ///
    /// # Errors
    ///
    /// See [`MethodEditor::remove_instruction`].
    pub fn remove_instructions(&mut self, index: usize, count: usize) -> Result<()> {
        self.body
            .instructions_mut()
            .splice(index, count, Vec::new())?;
        log::debug!("removed {} instructions at {} in {}", count, index, self.method);
        Ok(())
    }

    /// Inserts already built instructions without branch targets.
    ///
    /// # Errors
    ///
    /// Operand validation errors, [`Error::IndexOutOfRange`], [`Error::InvalidInsertionPoint`].
    pub fn insert_instructions(
        &mut self,
        index: usize,
        instructions: Vec<Instruction>,
    ) -> Result<InsertedBlock> {
        for instruction in &instructions {
            instruction.validate(self.file.register_count)?;
            for target in instruction.branch_targets() {
                self.body.instructions().resolve(target)?;
            }
        }
        self.check_insertion_point(index)?;

        let len = instructions.len();
        self.body.instructions_mut().splice(index, 0, instructions)?;
        Ok(InsertedBlock {
            start: index,
            len,
            labels: HashMap::new(),
        })
    }

    /// Rewrites the literal of the `const*` instruction at `index`, keeping its register,
    /// identity and labels. The narrowest encoding able to hold `value` is chosen.
    ///
    /// # Errors
    ///
    /// - [`Error::IndexOutOfRange`] past the end of the stream
    /// - [`Error::WrongOperand`] if the instruction is not a literal `const`
    pub fn rewrite_literal(&mut self, index: usize, value: i64) -> Result<()> {
        let current = self.get(index)?;
        if !current.opcode.is_literal_const() {
            return Err(Error::WrongOperand {
                opcode: current.opcode.to_string(),
                message: format!("instruction at {index} does not load a literal"),
            });
        }
        let register = current.register_a().unwrap_or_default();
        let opcode = if current.opcode.is_wide_const() {
            Opcode::narrowest_const_wide(value)
        } else {
            Opcode::narrowest_const(register, value)
        };
        let replacement = Instruction::new(opcode)
            .with_registers(vec![register])
            .with_literal(value);
        replacement.validate(self.file.register_count)?;

        self.body.instructions_mut().set(index, replacement)?;
        log::debug!("rewrote literal at {} in {} to {}", index, self.method, value);
        Ok(())
    }

    /// Makes every `return` of the method return `value`.
    ///
    /// A `const` into the returned register goes in front of each `return`, and labels on the
    /// return move onto it, so the original computation still runs to completion. Returns the
    /// positions of the inserted instructions.
    ///
    /// # Errors
    ///
    /// - [`Error::WrongOperand`] if the method returns a wide value, an object or nothing
    /// - [`Error::PatternNotFound`] if it never returns
    pub fn force_return_value(&mut self, value: i64) -> Result<Vec<usize>> {
        let mut returns = Vec::new();
        for (index, instruction) in self.body.instructions().iter().enumerate() {
            match instruction.opcode {
                Opcode::Return => {
                    returns.push((index, instruction.register_a().unwrap_or_default()));
                }
                Opcode::ReturnWide | Opcode::ReturnObject | Opcode::ReturnVoid => {
                    return Err(Error::WrongOperand {
                        opcode: instruction.opcode.to_string(),
                        message: format!("{} does not return a narrow value", self.method),
                    })
                }
                _ => {}
            }
        }
        if returns.is_empty() {
            return Err(Error::PatternNotFound(format!("return in {}", self.method)));
        }

        // back to front keeps the earlier indices valid
        for (index, register) in returns.iter().rev() {
            let forcing = Instruction::new(Opcode::narrowest_const(*register, value))
                .with_registers(vec![*register])
                .with_literal(value);
            self.add_instructions_at_control_flow_label(*index, &forcing.to_string())?;
        }
        let positions: Vec<usize> = returns
            .iter()
            .enumerate()
            .map(|(shift, (index, _))| index + shift)
            .collect();
        log::debug!(
            "forced {} returns of {} to {}",
            positions.len(),
            self.method,
            value
        );
        Ok(positions)
    }

    fn check_insertion_point(&self, index: usize) -> Result<()> {
        let len = self.len();
        if index > len {
            return Err(Error::IndexOutOfRange { index, len });
        }
        if index > 0
            && self
                .body
                .instructions()
                .get(index)
                .is_some_and(|i| i.opcode.is_move_result())
        {
            return Err(Error::InvalidInsertionPoint(index));
        }
        Ok(())
    }

    fn splice_text(
        &mut self,
        index: usize,
        remove: usize,
        text: &str,
        externals: &[ExternalLabel],
        mode: LabelMode,
    ) -> Result<InsertedBlock> {
        let compiled = parse_block(text)?.compile(&self.file)?;
        self.check_splice(index, remove, &compiled)?;

        // Name resolution, all before anything is touched.
        let mut external_map: HashMap<&str, Label> = HashMap::new();
        for external in externals {
            self.body.instructions().resolve(external.label)?;
            if compiled.labels.iter().any(|(name, _)| *name == external.name)
                || external_map
                    .insert(external.name.as_str(), external.label)
                    .is_some()
            {
                return Err(Error::DuplicateLabel(external.name.clone()));
            }
        }
        for name in compiled.target_names() {
            let local = compiled.labels.iter().any(|(defined, _)| defined == name);
            if !local && !external_map.contains_key(name) {
                return Err(Error::UnknownLabel(name.to_string()));
            }
        }

        let stream = self.body.instructions_mut();
        let follower = stream.id_at(index + remove);
        let snapshot = stream.id_at(index);

        let mut local_labels: HashMap<String, Label> = HashMap::new();
        for (name, _) in &compiled.labels {
            local_labels.insert(name.clone(), stream.reserve_label());
        }

        let lookup = |name: &str| {
            local_labels
                .get(name)
                .or_else(|| external_map.get(name))
                .copied()
                .ok_or_else(|| Error::UnknownLabel(name.to_string()))
        };
        let len = compiled.len();
        let mut instructions = Vec::with_capacity(len);
        for ((mut instruction, target), cases) in compiled
            .instructions
            .into_iter()
            .zip(&compiled.targets)
            .zip(&compiled.cases)
        {
            if let Some(name) = target {
                instruction.target = Some(lookup(name)?);
            }
            if instruction.opcode.info().flow == FlowType::Switch {
                let cases = cases
                    .iter()
                    .map(|(key, name)| {
                        Ok(SwitchCase {
                            key: *key,
                            target: lookup(name)?,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                instruction.payload = Some(Payload::Switch(cases));
            }
            instructions.push(instruction);
        }

        let new_ids = stream.splice(index, remove, instructions)?;

        if mode == LabelMode::MigrateToBlock {
            if let (Some(original), Some(first)) = (snapshot, new_ids.first()) {
                let moved = stream.retarget(original, *first);
                log::debug!("moved {} labels onto inserted block at {}", moved, index);
            }
        }

        for (name, position) in &compiled.labels {
            let id = new_ids.get(*position).copied().or(follower);
            if let (Some(label), Some(id)) = (local_labels.get(name), id) {
                stream.bind_id(*label, id)?;
            }
        }

        log::debug!(
            "spliced {} instructions at {} (replacing {}) in {}",
            len,
            index,
            remove,
            self.method
        );

        Ok(InsertedBlock {
            start: index,
            len,
            labels: local_labels,
        })
    }

    fn check_splice(&self, index: usize, remove: usize, block: &CompiledBlock) -> Result<()> {
        let len = self.len();
        let end = index.checked_add(remove).unwrap_or(usize::MAX);
        if end > len {
            return Err(Error::IndexOutOfRange { index: end, len });
        }

        if remove == 0 {
            self.check_insertion_point(index)?;
        } else {
            let splits_result = index > 0
                && self
                    .body
                    .instructions()
                    .get(index)
                    .is_some_and(|i| i.opcode.is_move_result());
            let keeps_result = block
                .instructions
                .first()
                .is_some_and(|i| i.opcode.is_move_result());
            if splits_result && !keeps_result {
                return Err(Error::InvalidInsertionPoint(index));
            }
        }

        let trailing = block.labels.iter().any(|(_, pos)| *pos == block.len());
        if trailing && end >= len {
            return Err(Error::DanglingLabel(index));
        }
        Ok(())
    }
}

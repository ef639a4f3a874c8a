//! Literal guarded flag overrides.
//!
//! Feature flags are usually read as `const-wide vX, <flag id>`, passed to a lookup call and
//! the boolean result is taken with `move-result`. Overriding the flag inserts a `const` right
//! after that `move-result`, forcing the value. Without a `move-result` close to the literal the
//! literal register itself is overwritten.
//!
//! Overrides are tracked per literal instruction: overriding the same literal again rewrites the
//! previous override instead of stacking a second one, so the last applied value wins.

use std::collections::HashMap;

use crate::{
    assembly::{Instruction, Opcode, Register},
    editor::InstructionId,
    metadata::{BytecodeContainer, MethodId},
    Error, Result,
};

/// How many instructions after a literal are searched for the `move-result` it guards.
pub const LITERAL_OVERRIDE_WINDOW: usize = 10;

/// Result of applying an override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiteralOverride {
    /// Method that was edited
    pub method: MethodId,
    /// Current index of the forcing `const`
    pub index: usize,
    /// Register that is forced
    pub register: Register,
    /// The forced value
    pub value: i64,
    /// Whether an earlier override of the same literal was replaced
    pub replaced: bool,
}

/// Tracks applied overrides for one build.
#[derive(Debug, Clone, Default)]
pub struct LiteralOverrides {
    applied: HashMap<(MethodId, InstructionId), InstructionId>,
}

impl LiteralOverrides {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct literals overridden.
    #[must_use]
    pub fn len(&self) -> usize {
        self.applied.len()
    }

    /// Returns true if nothing was overridden.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }

    /// Forces the value guarded by the literal at `literal_index` of `method` to `value`.
    ///
    /// # Errors
    ///
    /// - [`Error::MethodNotFound`], [`Error::NoImplementation`] for bad handles
    /// - [`Error::IndexOutOfRange`] past the end of the body
    /// - [`Error::WrongOperand`] if the instruction at `literal_index` has no literal
    pub fn apply(
        &mut self,
        container: &mut BytecodeContainer,
        method: MethodId,
        literal_index: usize,
        value: i64,
    ) -> Result<LiteralOverride> {
        let target = container.method_mut(method)?;
        let mut editor = target.editor()?;

        let literal = editor.get(literal_index)?;
        if literal.literal.is_none() {
            return Err(Error::WrongOperand {
                opcode: literal.opcode.to_string(),
                message: format!("instruction at {literal_index} carries no literal"),
            });
        }
        let literal_register = literal.register_a().unwrap_or_default();
        let literal_wide = literal.opcode.is_wide_const();
        let literal_id = editor
            .instructions()
            .id_at(literal_index)
            .ok_or(Error::IndexOutOfRange {
                index: literal_index,
                len: editor.len(),
            })?;

        // Rewrite an earlier override of the same literal.
        if let Some(previous) = self.applied.get(&(method, literal_id)) {
            if let Some(index) = editor.instructions().position(*previous) {
                let register = editor.get(index)?.register_a().unwrap_or_default();
                editor.rewrite_literal(index, value)?;
                log::debug!(
                    "replaced literal override at {} of {} with {}",
                    index,
                    method,
                    value
                );
                return Ok(LiteralOverride {
                    method,
                    index,
                    register,
                    value,
                    replaced: true,
                });
            }
        }

        let window_end = (literal_index + LITERAL_OVERRIDE_WINDOW).min(editor.len().saturating_sub(1));
        let guarded = (literal_index + 1..=window_end).find(|&i| {
            editor
                .get(i)
                .is_ok_and(|instruction| instruction.opcode == Opcode::MoveResult)
        });

        let (insert_at, register, opcode) = match guarded {
            Some(index) => {
                let register = editor.get(index)?.register_a().unwrap_or_default();
                (index + 1, register, Opcode::narrowest_const(register, value))
            }
            // the whole pair is redefined when the literal itself is wide
            None if literal_wide => (
                literal_index + 1,
                literal_register,
                Opcode::narrowest_const_wide(value),
            ),
            None => (
                literal_index + 1,
                literal_register,
                Opcode::narrowest_const(literal_register, value),
            ),
        };

        let forcing = Instruction::new(opcode)
            .with_registers(vec![register])
            .with_literal(value);
        editor.insert_instructions(insert_at, vec![forcing])?;

        let inserted = editor
            .instructions()
            .id_at(insert_at)
            .ok_or(Error::IndexOutOfRange {
                index: insert_at,
                len: editor.len(),
            })?;
        self.applied.insert((method, literal_id), inserted);

        log::debug!(
            "forced v{} to {} after literal at {} of {}",
            register,
            value,
            literal_index,
            method
        );

        Ok(LiteralOverride {
            method,
            index: insert_at,
            register,
            value,
            replaced: false,
        })
    }
}

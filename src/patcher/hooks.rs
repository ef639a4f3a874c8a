//! Named hook points.
//!
//! A patch that locates an instrumentation point publishes it under a name; dependent patches
//! attach calls to it later without matching again. A hook point is anchored on an instruction
//! identity, so edits made in between do not invalidate it.

use crate::{
    assembly::MethodReference,
    editor::InstructionAnchor,
    Error, Result,
};

/// Where calls are attached relative to the anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPlacement {
    /// In front of the anchored instruction
    Before,
    /// Behind the anchored instruction and its `move-result*`, if any
    After,
}

/// A located instrumentation point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookPoint {
    /// The anchored instruction
    pub anchor: InstructionAnchor,
    /// Placement of attached calls
    pub placement: HookPlacement,
    /// Registers passed to attached calls, e.g. `["p1"]`
    pub arguments: Vec<String>,
    /// Register receiving the result of non-void calls
    pub result: Option<String>,
}

impl HookPoint {
    /// Calls go in front of `anchor`.
    #[must_use]
    pub fn before(anchor: InstructionAnchor) -> Self {
        Self {
            anchor,
            placement: HookPlacement::Before,
            arguments: Vec::new(),
            result: None,
        }
    }

    /// Calls go behind `anchor`.
    #[must_use]
    pub fn after(anchor: InstructionAnchor) -> Self {
        Self {
            placement: HookPlacement::After,
            ..Self::before(anchor)
        }
    }

    /// Sets the argument registers.
    #[must_use]
    pub fn with_arguments<I, S>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments = arguments.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the register receiving the call result.
    #[must_use]
    pub fn with_result(mut self, register: impl Into<String>) -> Self {
        self.result = Some(register.into());
        self
    }

    /// The smali text of a call to `descriptor` at this point.
    ///
    /// # Errors
    ///
    /// - [`Error::Malformed`] if `descriptor` is not a method reference
    /// - [`Error::WrongOperand`] if the argument count does not fit the prototype, or a non-void
    ///   call has no result register
    pub fn call_text(&self, descriptor: &str) -> Result<String> {
        let reference: MethodReference = descriptor.parse()?;
        if usize::from(reference.parameter_registers()) != self.arguments.len() {
            return Err(Error::WrongOperand {
                opcode: "invoke-static".to_string(),
                message: format!(
                    "{} takes {} registers, hook point passes {}",
                    descriptor,
                    reference.parameter_registers(),
                    self.arguments.len()
                ),
            });
        }

        let mut text = format!(
            "invoke-static {{{}}}, {}",
            self.arguments.join(", "),
            reference
        );
        let move_result = match reference.return_type.as_str() {
            "V" => None,
            "J" | "D" => Some("move-result-wide"),
            t if t.starts_with('L') || t.starts_with('[') => Some("move-result-object"),
            _ => Some("move-result"),
        };
        match (move_result, &self.result) {
            (Some(opcode), Some(register)) => text.push_str(&format!("\n{opcode} {register}")),
            (Some(_), None) => {
                return Err(Error::WrongOperand {
                    opcode: "invoke-static".to_string(),
                    message: format!("{descriptor} returns a value but the hook point keeps none"),
                })
            }
            (None, _) => {}
        }
        Ok(text)
    }
}

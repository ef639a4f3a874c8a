//! Helper method synthesis.
//!
//! When a host method has no free register at an edit point, the generated code moves into a
//! new private static method of the same class. The helper has its own register space, so it
//! never competes with the host for registers; the host only needs an `invoke-static` and, for
//! non-void helpers, a `move-result*` into a register it already owns.

use crate::{
    assembly::{type_width, Opcode},
    metadata::{AccessFlags, BytecodeContainer, Method, MethodId, MethodImplementation},
    Error, Result,
};

/// Description of a helper method to synthesize.
#[derive(Debug, Clone)]
pub struct HelperMethod {
    name: String,
    parameters: Vec<String>,
    return_type: String,
    register_count: u16,
    body: String,
}

impl HelperMethod {
    /// Starts a helper named `name` returning `return_type`.
    pub fn new(name: impl Into<String>, return_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            return_type: return_type.into(),
            register_count: 0,
            body: String::new(),
        }
    }

    /// Sets the parameter types.
    #[must_use]
    pub fn parameters(mut self, parameters: Vec<String>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Sets the number of local registers, parameters come on top.
    #[must_use]
    pub fn locals(mut self, locals: u16) -> Self {
        self.register_count = locals;
        self
    }

    /// Sets the initial body text. May be empty and filled in later.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// The name of the helper.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The `move-result*` opcode the host needs after calling this helper, if any.
    #[must_use]
    pub fn result_opcode(&self) -> Option<Opcode> {
        match self.return_type.as_str() {
            "V" => None,
            "J" | "D" => Some(Opcode::MoveResultWide),
            t if t.starts_with('L') || t.starts_with('[') => Some(Opcode::MoveResultObject),
            _ => Some(Opcode::MoveResult),
        }
    }

    /// Adds the helper to the class at `class_slot` and returns its handle.
    ///
    /// # Errors
    ///
    /// - [`Error::DuplicateDefinition`] if the class already has a method with this prototype
    /// - any editor error of the initial body
    pub fn install(self, container: &mut BytecodeContainer, class_slot: usize) -> Result<MethodId> {
        let defining_class = container.class_at(class_slot)?.type_descriptor.clone();
        let parameter_registers: u16 = self.parameters.iter().map(|p| type_width(p)).sum();
        let register_count = self
            .register_count
            .checked_add(parameter_registers)
            .ok_or_else(|| malformed_error!("Helper {} has too many registers", self.name))?;

        let mut method = Method::new(
            defining_class,
            self.name,
            self.parameters,
            self.return_type,
            AccessFlags::PRIVATE | AccessFlags::STATIC,
        );
        method.implementation = Some(MethodImplementation::new(register_count));
        if !self.body.trim().is_empty() {
            method.editor()?.add_instructions(0, &self.body)?;
        }

        let description = method.to_string();
        let id = container.add_method(class_slot, method)?;
        log::debug!("synthesized helper {}", description);
        Ok(id)
    }

    /// Text of the host side call, storing the result into `destination` if the helper returns
    /// a value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WrongOperand`] if a value returning helper gets no destination.
    pub fn call_text(
        &self,
        defining_class: &str,
        arguments: &[u16],
        destination: Option<u16>,
    ) -> Result<String> {
        let registers = arguments
            .iter()
            .map(|r| format!("v{r}"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut text = format!(
            "invoke-static {{{}}}, {}->{}({}){}",
            registers,
            defining_class,
            self.name,
            self.parameters.concat(),
            self.return_type
        );
        match (self.result_opcode(), destination) {
            (Some(opcode), Some(register)) => {
                text.push_str(&format!("\n{opcode} v{register}"));
            }
            (Some(opcode), None) => {
                return Err(Error::WrongOperand {
                    opcode: opcode.to_string(),
                    message: format!("helper {} returns a value but has no destination", self.name),
                })
            }
            (None, _) => {}
        }
        Ok(text)
    }
}

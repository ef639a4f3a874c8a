//! Instruction filters and their relative locations.

use std::{fmt, sync::Arc};

use crate::assembly::{Instruction, Opcode, Reference};

/// Where a filter may match relative to the match of the previous filter.
///
/// For the first filter of a fingerprint the "previous match" is the start of the method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstructionLocation {
    /// Anywhere after the previous match
    #[default]
    After,
    /// Only the first occurrence after the previous match, later occurrences are not tried
    First,
    /// At most `n` instructions after the previous match
    AfterWithin(usize),
    /// Directly after the previous match
    Immediately,
}

impl InstructionLocation {
    /// Returns true if `index` is an acceptable position given the previous match.
    #[must_use]
    pub fn accepts(self, previous: Option<usize>, index: usize) -> bool {
        match (self, previous) {
            (InstructionLocation::Immediately, None) => index == 0,
            (_, None) => true,
            (InstructionLocation::After | InstructionLocation::First, Some(p)) => index > p,
            (InstructionLocation::AfterWithin(n), Some(p)) => index > p && index - p <= n,
            (InstructionLocation::Immediately, Some(p)) => index == p + 1,
        }
    }
}

type InstructionPredicate = Arc<dyn Fn(&Instruction) -> bool + Send + Sync>;

/// What an [`InstructionFilter`] compares.
#[derive(Clone)]
pub enum FilterKind {
    /// Any of the opcodes
    Opcode(Vec<Opcode>),
    /// A literal operand
    Literal(i64),
    /// A `const-string` whose value starts with the given text
    String(String),
    /// A field access, every `Some` part must match
    FieldAccess {
        /// Access opcode
        opcode: Option<Opcode>,
        /// Declaring class, `L` matches any class
        defining_class: Option<String>,
        /// Field name
        name: Option<String>,
        /// Field type
        field_type: Option<String>,
    },
    /// A method call, every `Some` part must match
    MethodCall {
        /// Invoke opcode
        opcode: Option<Opcode>,
        /// Declaring class
        defining_class: Option<String>,
        /// Method name
        name: Option<String>,
        /// Exact parameter list
        parameters: Option<Vec<String>>,
        /// Return type, compared as a prefix
        return_type: Option<String>,
    },
    /// A custom predicate
    Custom(InstructionPredicate),
}

impl fmt::Debug for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterKind::Opcode(opcodes) => f.debug_tuple("Opcode").field(opcodes).finish(),
            FilterKind::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            FilterKind::String(value) => f.debug_tuple("String").field(value).finish(),
            FilterKind::FieldAccess {
                opcode,
                defining_class,
                name,
                field_type,
            } => f
                .debug_struct("FieldAccess")
                .field("opcode", opcode)
                .field("defining_class", defining_class)
                .field("name", name)
                .field("field_type", field_type)
                .finish(),
            FilterKind::MethodCall {
                opcode,
                defining_class,
                name,
                parameters,
                return_type,
            } => f
                .debug_struct("MethodCall")
                .field("opcode", opcode)
                .field("defining_class", defining_class)
                .field("name", name)
                .field("parameters", parameters)
                .field("return_type", return_type)
                .finish(),
            FilterKind::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// One element of a fingerprint's ordered instruction pattern.
#[derive(Debug, Clone)]
pub struct InstructionFilter {
    /// What is compared
    pub kind: FilterKind,
    /// Where it may match
    pub location: InstructionLocation,
}

impl InstructionFilter {
    fn new(kind: FilterKind) -> Self {
        Self {
            kind,
            location: InstructionLocation::default(),
        }
    }

    /// Matches an opcode.
    #[must_use]
    pub fn opcode(opcode: Opcode) -> Self {
        Self::new(FilterKind::Opcode(vec![opcode]))
    }

    /// Matches any of the opcodes.
    #[must_use]
    pub fn any_opcode(opcodes: impl Into<Vec<Opcode>>) -> Self {
        Self::new(FilterKind::Opcode(opcodes.into()))
    }

    /// One filter per opcode, each directly after the previous one.
    #[must_use]
    pub fn opcodes(opcodes: &[Opcode]) -> Vec<Self> {
        opcodes
            .iter()
            .enumerate()
            .map(|(i, opcode)| {
                let filter = Self::opcode(*opcode);
                if i == 0 {
                    filter
                } else {
                    filter.located(InstructionLocation::Immediately)
                }
            })
            .collect()
    }

    /// Matches a literal operand.
    #[must_use]
    pub fn literal(value: i64) -> Self {
        Self::new(FilterKind::Literal(value))
    }

    /// Matches a `const-string` starting with `value`.
    pub fn string(value: impl Into<String>) -> Self {
        Self::new(FilterKind::String(value.into()))
    }

    /// Matches a field access.
    #[must_use]
    pub fn field_access(
        opcode: Option<Opcode>,
        defining_class: Option<&str>,
        name: Option<&str>,
        field_type: Option<&str>,
    ) -> Self {
        Self::new(FilterKind::FieldAccess {
            opcode,
            defining_class: defining_class.map(str::to_string),
            name: name.map(str::to_string),
            field_type: field_type.map(str::to_string),
        })
    }

    /// Matches a method call.
    #[must_use]
    pub fn method_call(
        opcode: Option<Opcode>,
        defining_class: Option<&str>,
        name: Option<&str>,
        parameters: Option<Vec<String>>,
        return_type: Option<&str>,
    ) -> Self {
        Self::new(FilterKind::MethodCall {
            opcode,
            defining_class: defining_class.map(str::to_string),
            name: name.map(str::to_string),
            parameters,
            return_type: return_type.map(str::to_string),
        })
    }

    /// Matches with a custom predicate.
    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&Instruction) -> bool + Send + Sync + 'static,
    {
        Self::new(FilterKind::Custom(Arc::new(predicate)))
    }

    /// Sets the location.
    #[must_use]
    pub fn located(mut self, location: InstructionLocation) -> Self {
        self.location = location;
        self
    }

    /// Returns true if `instruction` satisfies this filter.
    #[must_use]
    pub fn matches(&self, instruction: &Instruction) -> bool {
        match &self.kind {
            FilterKind::Opcode(opcodes) => opcodes.contains(&instruction.opcode),
            FilterKind::Literal(value) => instruction.literal == Some(*value),
            FilterKind::String(prefix) => instruction
                .string_reference()
                .is_some_and(|s| s.starts_with(prefix.as_str())),
            FilterKind::FieldAccess {
                opcode,
                defining_class,
                name,
                field_type,
            } => {
                let Some(Reference::Field(field)) = &instruction.reference else {
                    return false;
                };
                opcode.is_none_or(|o| o == instruction.opcode)
                    && matches_type(defining_class.as_deref(), &field.defining_class)
                    && name.as_deref().is_none_or(|n| n == field.name)
                    && matches_type(field_type.as_deref(), &field.field_type)
            }
            FilterKind::MethodCall {
                opcode,
                defining_class,
                name,
                parameters,
                return_type,
            } => {
                let Some(method) = instruction.method_reference() else {
                    return false;
                };
                opcode.is_none_or(|o| o == instruction.opcode)
                    && matches_type(defining_class.as_deref(), &method.defining_class)
                    && name.as_deref().is_none_or(|n| n == method.name)
                    && parameters
                        .as_ref()
                        .is_none_or(|p| *p == method.parameters)
                    && matches_type(return_type.as_deref(), &method.return_type)
            }
            FilterKind::Custom(predicate) => predicate(instruction),
        }
    }
}

/// Compares a type descriptor against an optional pattern. `L` alone matches any class type,
/// other patterns must match exactly.
fn matches_type(pattern: Option<&str>, descriptor: &str) -> bool {
    match pattern {
        None => true,
        Some("L") => descriptor.starts_with('L'),
        Some(pattern) => pattern == descriptor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::{FieldReference, MethodReference};

    #[test]
    fn test_locations() {
        assert!(InstructionLocation::After.accepts(None, 7));
        assert!(InstructionLocation::After.accepts(Some(3), 7));
        assert!(!InstructionLocation::After.accepts(Some(7), 7));
        assert!(InstructionLocation::AfterWithin(5).accepts(Some(3), 8));
        assert!(!InstructionLocation::AfterWithin(5).accepts(Some(3), 9));
        assert!(InstructionLocation::Immediately.accepts(Some(3), 4));
        assert!(!InstructionLocation::Immediately.accepts(Some(3), 5));
        assert!(InstructionLocation::Immediately.accepts(None, 0));
    }

    #[test]
    fn test_reference_filters() -> crate::Result<()> {
        let sput = Instruction::new(Opcode::SputObject)
            .with_registers(vec![0])
            .with_reference(Reference::Field(FieldReference::new(
                "Lapp/Patch;",
                "filters",
                "[Lapp/Filter;",
            )));
        assert!(InstructionFilter::field_access(
            Some(Opcode::SputObject),
            None,
            None,
            Some("[Lapp/Filter;")
        )
        .matches(&sput));
        assert!(!InstructionFilter::field_access(None, None, Some("other"), None).matches(&sput));

        let reference: MethodReference = "Lapp/Cc;->toString()Ljava/lang/String;".parse()?;
        let call = Instruction::new(Opcode::InvokeVirtual)
            .with_registers(vec![0])
            .with_reference(Reference::Method(reference));
        assert!(InstructionFilter::method_call(
            None,
            Some("L"),
            Some("toString"),
            Some(vec![]),
            Some("Ljava/lang/String;")
        )
        .matches(&call));
        assert!(!InstructionFilter::method_call(Some(Opcode::InvokeStatic), None, None, None, None)
            .matches(&call));
        Ok(())
    }

    #[test]
    fn test_string_and_literal_filters() {
        let s = Instruction::new(Opcode::ConstString)
            .with_registers(vec![0])
            .with_reference(Reference::String("ConversionContext{id=".into()));
        assert!(InstructionFilter::string("ConversionContext{").matches(&s));
        assert!(!InstructionFilter::string("Other").matches(&s));

        let c = Instruction::new(Opcode::ConstWide)
            .with_registers(vec![0])
            .with_literal(45_419_603);
        assert!(InstructionFilter::literal(45_419_603).matches(&c));
        assert!(InstructionFilter::custom(|i| i.opcode == Opcode::ConstWide).matches(&c));
    }
}

//! Constant pool references carried by instructions.
//!
//! References use their smali text form both for display and parsing:
//!
//! - type: `Lcom/example/Filter;`, `[Ljava/lang/String;`, `I`
//! - field: `Lcom/example/Context;->path:Ljava/lang/StringBuilder;`
//! - method: `Lcom/example/Hooks;->isFiltered(Ljava/lang/String;)Z`

use std::{fmt, str::FromStr};

use crate::{Error, Result};

/// A reference operand.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reference {
    /// String constant (`const-string`)
    String(String),
    /// Type descriptor
    Type(String),
    /// Field reference
    Field(FieldReference),
    /// Method reference
    Method(MethodReference),
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::String(value) => write!(f, "\"{}\"", escape_string(value)),
            Reference::Type(descriptor) => f.write_str(descriptor),
            Reference::Field(field) => field.fmt(f),
            Reference::Method(method) => method.fmt(f),
        }
    }
}

/// A field reference: defining class, name and type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldReference {
    /// Type descriptor of the class declaring the field
    pub defining_class: String,
    /// Field name
    pub name: String,
    /// Type descriptor of the field
    pub field_type: String,
}

impl FieldReference {
    /// Creates a new field reference.
    pub fn new(
        defining_class: impl Into<String>,
        name: impl Into<String>,
        field_type: impl Into<String>,
    ) -> Self {
        Self {
            defining_class: defining_class.into(),
            name: name.into(),
            field_type: field_type.into(),
        }
    }
}

impl fmt::Display for FieldReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}:{}", self.defining_class, self.name, self.field_type)
    }
}

impl FromStr for FieldReference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (class, member) = split_member(s)?;
        let (name, field_type) = member
            .split_once(':')
            .ok_or_else(|| malformed_error!("Field reference without type - {}", s))?;
        if name.is_empty() {
            return Err(malformed_error!("Field reference without name - {}", s));
        }
        let types = parse_type_list(field_type)?;
        if types.len() != 1 {
            return Err(malformed_error!("Invalid field type - {}", s));
        }

        Ok(FieldReference::new(class, name, field_type))
    }
}

/// A method reference: defining class, name and prototype.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodReference {
    /// Type descriptor of the class declaring the method
    pub defining_class: String,
    /// Method name
    pub name: String,
    /// Parameter type descriptors
    pub parameters: Vec<String>,
    /// Return type descriptor
    pub return_type: String,
}

impl MethodReference {
    /// Creates a new method reference.
    pub fn new(
        defining_class: impl Into<String>,
        name: impl Into<String>,
        parameters: Vec<String>,
        return_type: impl Into<String>,
    ) -> Self {
        Self {
            defining_class: defining_class.into(),
            name: name.into(),
            parameters,
            return_type: return_type.into(),
        }
    }

    /// Number of registers the parameters occupy, not counting `this`.
    #[must_use]
    pub fn parameter_registers(&self) -> u16 {
        self.parameters.iter().map(|p| type_width(p)).sum()
    }

    /// Returns true if both references name the same prototype, ignoring the defining class.
    #[must_use]
    pub fn signature_matches(&self, other: &MethodReference) -> bool {
        self.name == other.name
            && self.parameters == other.parameters
            && self.return_type == other.return_type
    }
}

impl fmt::Display for MethodReference {
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

impl FromStr for MethodReference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (class, member) = split_member(s)?;
        let open = member
            .find('(')
            .ok_or_else(|| malformed_error!("Method reference without prototype - {}", s))?;
        let close = member
            .find(')')
            .ok_or_else(|| malformed_error!("Method reference without prototype - {}", s))?;
        if close < open || open == 0 {
            return Err(malformed_error!("Invalid method reference - {}", s));
        }

        let parameters = parse_type_list(&member[open + 1..close])?;
        let return_type = &member[close + 1..];
        if return_type != "V" && parse_type_list(return_type)?.len() != 1 {
            return Err(malformed_error!("Invalid return type - {}", s));
        }

        Ok(MethodReference::new(
            class,
            &member[..open],
            parameters,
            return_type,
        ))
    }
}

/// Number of registers a value of the given type occupies.
#[must_use]
pub fn type_width(descriptor: &str) -> u16 {
    match descriptor {
        "J" | "D" => 2,
        _ => 1,
    }
}

/// Splits a concatenated list of type descriptors, as found in a method prototype.
///
/// # Errors
///
/// Returns [`Error::Malformed`] for truncated class descriptors or unknown primitive codes.
pub fn parse_type_list(list: &str) -> Result<Vec<String>> {
    let bytes = list.as_bytes();
    let mut types = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let start = pos;
        while pos < bytes.len() && bytes[pos] == b'[' {
            pos += 1;
        }
        match bytes.get(pos) {
            Some(b'L') => {
                let end = list[pos..]
                    .find(';')
                    .ok_or_else(|| malformed_error!("Unterminated class descriptor - {}", list))?;
                pos += end + 1;
            }
            Some(b'Z' | b'B' | b'S' | b'C' | b'I' | b'J' | b'F' | b'D') => pos += 1,
            _ => return Err(malformed_error!("Invalid type descriptor - {}", list)),
        }
        types.push(list[start..pos].to_string());
    }

    Ok(types)
}

fn split_member(s: &str) -> Result<(&str, &str)> {
    let (class, member) = s
        .split_once("->")
        .ok_or_else(|| malformed_error!("Member reference without '->' - {}", s))?;
    if !(class.starts_with('L') || class.starts_with('[')) || !class.ends_with(';') {
        return Err(malformed_error!("Invalid defining class - {}", s));
    }
    Ok((class, member))
}

/// Escapes a string for use inside a smali string literal.
#[must_use]
pub fn escape_string(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\t' => escaped.push_str("\\t"),
            '\r' => escaped.push_str("\\r"),
            c => escaped.push(c),
        }
    }
    escaped
}

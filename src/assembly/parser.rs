//! Textual mini-assembly.
//!
//! Generated code is written as smali-like text and compiled against the register file of the
//! method it is inserted into:
//!
//! ```text
//! move-object/from16 v0, p2
//! instance-of v1, v0, Lapp/ConversionContext;
//! if-eqz v1, :unfiltered
//! invoke-static { v1, v2 }, Lapp/Hooks;->isFiltered(Ljava/lang/String;Ljava/lang/StringBuilder;)Z
//! move-result v0
//! :unfiltered
//! nop
//! ```
//!
//! Parsing and compiling are two steps. [`parse_block`] turns text into a [`ParsedBlock`] whose
//! parameter registers (`pN`) and labels are still symbolic. [`ParsedBlock::compile`] maps
//! `pN` onto the register file of a concrete method and validates every operand, so a block is
//! rejected as a whole before anything is spliced into a method.
//!
//! # Syntax
//!
//! - one instruction or one `:label` definition per line
//! - `#` starts a comment (outside of string literals)
//! - registers are `vN` or `pN`; lists are `{v0, v1}`, ranges `{v0 .. v3}`
//! - literals are decimal or `0x` hex, optionally negative, with an optional `L`/`t`/`s` suffix
//! - switches list their cases inline: `packed-switch v0, {0x1 -> :one, 0x2 -> :two}`
//! - array data lists its elements inline, the suffix of the first element fixes the width:
//!   `fill-array-data v0, {0x1s, 0x2s}`

use std::str::FromStr;

use crate::{
    assembly::{
        instruction::{Instruction, Label, Payload, Register, SwitchCase},
        opcodes::{Format, Opcode, ReferenceKind},
        reference::{FieldReference, MethodReference, Reference},
    },
    Error, Result,
};

/// A register operand before it is mapped onto a register file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterToken {
    /// `vN`
    Local(u16),
    /// `pN`
    Parameter(u16),
}

/// One parsed, not yet compiled instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedInstruction {
    /// The opcode
    pub opcode: Opcode,
    /// Register operands
    pub registers: Vec<RegisterToken>,
    /// Literal operand
    pub literal: Option<i64>,
    /// Reference operand
    pub reference: Option<Reference>,
    /// Branch target label name, without the leading `:`
    pub target: Option<String>,
    /// Switch cases or array data
    pub payload: Option<ParsedPayload>,
    /// Source line, 1-based, for diagnostics
    pub line: usize,
}

/// Inline payload before its labels are bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedPayload {
    /// Case keys with their target label names
    Switch(Vec<(i32, String)>),
    /// Array elements and their width in bytes
    ArrayData {
        /// 1, 2, 4 or 8
        element_width: u8,
        /// Element values
        elements: Vec<i64>,
    },
}

/// A parsed block of instructions and the labels it defines.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedBlock {
    /// Instructions in order
    pub instructions: Vec<ParsedInstruction>,
    /// Label definitions: name and the position of the instruction following the label.
    /// A position equal to `instructions.len()` marks a trailing label.
    pub labels: Vec<(String, usize)>,
}

/// Register file of the method a block is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterFile {
    /// Total number of registers
    pub register_count: u16,
    /// Number of registers holding parameters, including `this`
    pub parameter_registers: u16,
}

impl RegisterFile {
    /// Maps a register token onto this register file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RegisterOutOfRange`] if the register does not exist.
    pub fn resolve(&self, token: RegisterToken) -> Result<Register> {
        let register = match token {
            RegisterToken::Local(n) => u32::from(n),
            RegisterToken::Parameter(n) => {
                let register = u32::from(self.first_parameter()?) + u32::from(n);
                if n >= self.parameter_registers {
                    return Err(Error::RegisterOutOfRange {
                        register,
                        register_count: self.register_count,
                    });
                }
                register
            }
        };

        if register >= u32::from(self.register_count) {
            return Err(Error::RegisterOutOfRange {
                register,
                register_count: self.register_count,
            });
        }
        Register::try_from(register).map_err(|_| Error::RegisterOutOfRange {
            register,
            register_count: self.register_count,
        })
    }

    /// First parameter register (`p0`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::RegisterOutOfRange`] if the parameters do not fit the register count.
    pub fn first_parameter(&self) -> Result<Register> {
        self.register_count
            .checked_sub(self.parameter_registers)
            .ok_or(Error::RegisterOutOfRange {
                register: u32::from(self.parameter_registers),
                register_count: self.register_count,
            })
    }
}

/// A block compiled against a register file.
///
/// Branch targets are still label names; the editor binds them to stream labels when the
/// block is spliced.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledBlock {
    /// Compiled instructions, `target` and switch payloads left empty
    pub instructions: Vec<Instruction>,
    /// Target label name per instruction
    pub targets: Vec<Option<String>>,
    /// Switch case keys and label names per instruction, empty for non-switches
    pub cases: Vec<Vec<(i32, String)>>,
    /// Label definitions, as in [`ParsedBlock::labels`]
    pub labels: Vec<(String, usize)>,
}

impl CompiledBlock {
    /// Every label name the block branches to, with duplicates.
    pub fn target_names(&self) -> impl Iterator<Item = &str> {
        self.targets
            .iter()
            .flatten()
            .map(String::as_str)
            .chain(self.cases.iter().flatten().map(|(_, name)| name.as_str()))
    }

    /// Number of instructions in the block.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns true if the block holds no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

impl ParsedBlock {
    /// Compiles the block for a register file.
    ///
    /// Every instruction is validated; targets are checked for presence only.
    ///
    /// # Errors
    ///
    /// Any operand validation error of [`Instruction::validate`], or
    /// [`Error::RegisterOutOfRange`] for parameter registers the method does not have.
    pub fn compile(&self, file: &RegisterFile) -> Result<CompiledBlock> {
        let mut instructions = Vec::with_capacity(self.instructions.len());
        let mut targets = Vec::with_capacity(self.instructions.len());
        let mut cases = Vec::with_capacity(self.instructions.len());

        for parsed in &self.instructions {
            let registers = parsed
                .registers
                .iter()
                .map(|token| file.resolve(*token))
                .collect::<Result<Vec<_>>>()?;

            let (payload, switch_cases) = match &parsed.payload {
                Some(ParsedPayload::Switch(named)) => (None, named.clone()),
                Some(ParsedPayload::ArrayData {
                    element_width,
                    elements,
                }) => (
                    Some(Payload::ArrayData {
                        element_width: *element_width,
                        elements: elements.clone(),
                    }),
                    Vec::new(),
                ),
                None => (None, Vec::new()),
            };

            let instruction = Instruction {
                opcode: parsed.opcode,
                registers,
                literal: parsed.literal,
                reference: parsed.reference.clone(),
                target: None,
                payload,
            };

            // Unbound labels are stood in for so the shape check sees every operand.
            let mut shaped = instruction.clone();
            if parsed.target.is_some() {
                shaped.target = Some(Label(u32::MAX));
            }
            if let Some(ParsedPayload::Switch(named)) = &parsed.payload {
                shaped.payload = Some(Payload::Switch(
                    named
                        .iter()
                        .map(|(key, _)| SwitchCase {
                            key: *key,
                            target: Label(u32::MAX),
                        })
                        .collect(),
                ));
            }
            shaped.validate(file.register_count)?;

            instructions.push(instruction);
            targets.push(parsed.target.clone());
            cases.push(switch_cases);
        }

        Ok(CompiledBlock {
            instructions,
            targets,
            cases,
            labels: self.labels.clone(),
        })
    }

    /// Names of every label this block branches to.
    #[must_use]
    pub fn referenced_labels(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .instructions
            .iter()
            .flat_map(|i| {
                let cases: &[(i32, String)] = match &i.payload {
                    Some(ParsedPayload::Switch(cases)) => cases,
                    _ => &[],
                };
                i.target
                    .as_deref()
                    .into_iter()
                    .chain(cases.iter().map(|(_, name)| name.as_str()))
            })
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

/// Parses a block of mini-assembly text.
///
/// # Errors
///
/// - [`Error::InvalidMnemonic`] for unknown opcodes
/// - [`Error::DuplicateLabel`] for labels defined twice
/// - [`Error::Malformed`] for any other syntax problem
pub fn parse_block(text: &str) -> Result<ParsedBlock> {
    let mut block = ParsedBlock::default();

    for (line_index, raw_line) in text.lines().enumerate() {
        let line_number = line_index + 1;
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        if let Some(name) = line.strip_prefix(':') {
            let name = name.trim();
            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(malformed_error!(
                    "Invalid label definition on line {}: '{}'",
                    line_number,
                    line
                ));
            }
            if block.labels.iter().any(|(existing, _)| existing == name) {
                return Err(Error::DuplicateLabel(name.to_string()));
            }
            block
                .labels
                .push((name.to_string(), block.instructions.len()));
            continue;
        }

        block
            .instructions
            .push(parse_instruction(line, line_number)?);
    }

    Ok(block)
}

fn parse_instruction(line: &str, line_number: usize) -> Result<ParsedInstruction> {
    let (mnemonic, rest) = match line.find(char::is_whitespace) {
        Some(split) => (&line[..split], line[split..].trim()),
        None => (line, ""),
    };
    let opcode =
        Opcode::from_str(mnemonic).map_err(|_| Error::InvalidMnemonic(mnemonic.to_string()))?;
    let info = opcode.info();
    let operands = split_operands(rest, line_number)?;

    let mut parsed = ParsedInstruction {
        opcode,
        registers: Vec::new(),
        literal: None,
        reference: None,
        target: None,
        payload: None,
        line: line_number,
    };

    let fixed_registers = if info.format.has_register_list() {
        1
    } else {
        info.slots.len()
    };
    let trailing = usize::from(info.format.literal_range().is_some())
        + usize::from(info.reference != ReferenceKind::None)
        + usize::from(info.format.has_target())
        + usize::from(info.format.has_payload());
    let expected = fixed_registers + trailing;
    if operands.len() != expected {
        return Err(malformed_error!(
            "'{}' expects {} operands, got {} on line {}",
            mnemonic,
            expected,
            operands.len(),
            line_number
        ));
    }

    let mut operands = operands.into_iter();

    if info.format.has_register_list() {
        let list = operands.next().unwrap_or_default();
        parsed.registers = parse_register_list(&list, info.format, line_number)?;
    } else {
        for _ in 0..fixed_registers {
            let token = operands.next().unwrap_or_default();
            parsed.registers.push(parse_register(&token, line_number)?);
        }
    }

    if info.format.literal_range().is_some() {
        let token = operands.next().unwrap_or_default();
        parsed.literal = Some(parse_literal(&token, line_number)?);
    }

    if info.reference != ReferenceKind::None {
        let token = operands.next().unwrap_or_default();
        parsed.reference = Some(parse_reference(info.reference, &token, line_number)?);
    }

    if info.format.has_target() {
        let token = operands.next().unwrap_or_default();
        let name = token.strip_prefix(':').ok_or_else(|| {
            malformed_error!("Expected label, got '{}' on line {}", token, line_number)
        })?;
        if name.is_empty() {
            return Err(malformed_error!("Empty label on line {}", line_number));
        }
        parsed.target = Some(name.to_string());
    }

    if info.format.has_payload() {
        let token = operands.next().unwrap_or_default();
        parsed.payload = Some(parse_payload(opcode, &token, line_number)?);
    }

    Ok(parsed)
}

fn parse_payload(opcode: Opcode, token: &str, line_number: usize) -> Result<ParsedPayload> {
    let inner = token
        .strip_prefix('{')
        .and_then(|t| t.strip_suffix('}'))
        .ok_or_else(|| {
            malformed_error!("Expected '{{...}}' payload, got '{}' on line {}", token, line_number)
        })?
        .trim();
    let items: Vec<&str> = if inner.is_empty() {
        Vec::new()
    } else {
        inner.split(',').map(str::trim).collect()
    };

    if opcode == Opcode::FillArrayData {
        let element_width = items.first().map_or(4, |first| element_width(first));
        let elements = items
            .iter()
            .map(|item| {
                if self::element_width(item) != element_width {
                    return Err(malformed_error!(
                        "Mixed element widths in array data on line {}",
                        line_number
                    ));
                }
                parse_literal(item, line_number)
            })
            .collect::<Result<Vec<_>>>()?;
        return Ok(ParsedPayload::ArrayData {
            element_width,
            elements,
        });
    }

    let cases = items
        .iter()
        .map(|item| {
            let (key, target) = item.split_once("->").ok_or_else(|| {
                malformed_error!("Expected 'key -> :label', got '{}' on line {}", item, line_number)
            })?;
            let key = parse_literal(key.trim(), line_number)?;
            let key = i32::try_from(key).map_err(|_| {
                malformed_error!("Switch key {} out of range on line {}", key, line_number)
            })?;
            let name = target
                .trim()
                .strip_prefix(':')
                .filter(|name| !name.is_empty())
                .ok_or_else(|| {
                    malformed_error!("Expected label, got '{}' on line {}", target, line_number)
                })?;
            Ok((key, name.to_string()))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(ParsedPayload::Switch(cases))
}

/// Element width in bytes implied by the suffix of an array data literal.
fn element_width(literal: &str) -> u8 {
    if literal.ends_with('t') {
        1
    } else if literal.ends_with('s') {
        2
    } else if literal.ends_with(['L', 'l']) {
        8
    } else {
        4
    }
}

/// Removes a trailing `#` comment that is not inside a string literal.
fn strip_comment(line: &str) -> &str {
    let mut in_string = false;
    let mut escaped = false;
    for (pos, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..pos],
            _ => {}
        }
    }
    line
}

/// Splits an operand list on top level commas, keeping braces and strings intact.
fn split_operands(rest: &str, line_number: usize) -> Result<Vec<String>> {
    let mut operands = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for c in rest.chars() {
        if in_string {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                current.push(c);
            }
            '{' => {
                depth += 1;
                current.push(c);
            }
            '}' => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    malformed_error!("Unbalanced '}}' on line {}", line_number)
                })?;
                current.push(c);
            }
            ',' if depth == 0 => {
                operands.push(current.trim().to_string());
                current.clear();
            }
            c => current.push(c),
        }
    }

    if in_string || depth != 0 {
        return Err(malformed_error!("Unterminated operand on line {}", line_number));
    }

    let last = current.trim();
    if !last.is_empty() {
        operands.push(last.to_string());
    } else if !operands.is_empty() {
        return Err(malformed_error!("Trailing ',' on line {}", line_number));
    }

    if operands.iter().any(String::is_empty) {
        return Err(malformed_error!("Empty operand on line {}", line_number));
    }

    Ok(operands)
}

fn parse_register(token: &str, line_number: usize) -> Result<RegisterToken> {
    let invalid = || malformed_error!("Invalid register '{}' on line {}", token, line_number);
    let (kind, number) = token.split_at_checked(1).ok_or_else(invalid)?;
    let number: u16 = number.parse().map_err(|_| invalid())?;
    match kind {
        "v" => Ok(RegisterToken::Local(number)),
        "p" => Ok(RegisterToken::Parameter(number)),
        _ => Err(invalid()),
    }
}

fn parse_register_list(
    token: &str,
    format: Format,
    line_number: usize,
) -> Result<Vec<RegisterToken>> {
    let inner = token
        .strip_prefix('{')
        .and_then(|t| t.strip_suffix('}'))
        .ok_or_else(|| {
            malformed_error!("Expected register list, got '{}' on line {}", token, line_number)
        })?
        .trim();

    if format == Format::F3rc {
        if inner.is_empty() {
            return Ok(Vec::new());
        }
        let (first, last) = inner.split_once("..").ok_or_else(|| {
            malformed_error!("Expected register range on line {}", line_number)
        })?;
        let first = parse_register(first.trim(), line_number)?;
        let last = parse_register(last.trim(), line_number)?;
        return match (first, last) {
            (RegisterToken::Local(a), RegisterToken::Local(b)) if a <= b => {
                Ok((a..=b).map(RegisterToken::Local).collect())
            }
            (RegisterToken::Parameter(a), RegisterToken::Parameter(b)) if a <= b => {
                Ok((a..=b).map(RegisterToken::Parameter).collect())
            }
            _ => Err(malformed_error!(
                "Invalid register range '{}' on line {}",
                token,
                line_number
            )),
        };
    }

    if inner.is_empty() {
        return Ok(Vec::new());
    }
    inner
        .split(',')
        .map(|register| parse_register(register.trim(), line_number))
        .collect()
}

/// Parses a literal operand: decimal or `0x` hex, optionally negative and suffixed.
pub(crate) fn parse_literal(token: &str, line_number: usize) -> Result<i64> {
    let invalid = || malformed_error!("Invalid literal '{}' on line {}", token, line_number);

    let trimmed = token.trim_end_matches(['L', 'l', 't', 's']);
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(digits) => (true, digits),
        None => (false, trimmed),
    };

    let magnitude = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16).map_err(|_| invalid())?
    } else {
        digits.parse::<u64>().map_err(|_| invalid())?
    };

    if negative {
        if magnitude > i64::MIN.unsigned_abs() {
            return Err(invalid());
        }
        Ok(0i64.wrapping_sub_unsigned(magnitude))
    } else {
        // Hex spellings of negative 64 bit values are accepted as two's complement.
        Ok(magnitude as i64)
    }
}

fn parse_reference(kind: ReferenceKind, token: &str, line_number: usize) -> Result<Reference> {
    match kind {
        ReferenceKind::String => {
            let inner = token
                .strip_prefix('"')
                .and_then(|t| t.strip_suffix('"'))
                .ok_or_else(|| {
                    malformed_error!("Expected string literal on line {}", line_number)
                })?;
            Ok(Reference::String(unescape_string(inner, line_number)?))
        }
        ReferenceKind::Type => {
            let types = crate::assembly::reference::parse_type_list(token)?;
            if types.len() != 1 {
                return Err(malformed_error!(
                    "Invalid type '{}' on line {}",
                    token,
                    line_number
                ));
            }
            Ok(Reference::Type(token.to_string()))
        }
        ReferenceKind::Field => Ok(Reference::Field(FieldReference::from_str(token)?)),
        ReferenceKind::Method => Ok(Reference::Method(MethodReference::from_str(token)?)),
        ReferenceKind::None => Err(malformed_error!(
            "Unexpected reference on line {}",
            line_number
        )),
    }
}

fn unescape_string(inner: &str, line_number: usize) -> Result<String> {
    let mut value = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            value.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => value.push('\n'),
            Some('t') => value.push('\t'),
            Some('r') => value.push('\r'),
            Some('"') => value.push('"'),
            Some('\'') => value.push('\''),
            Some('\\') => value.push('\\'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let code = u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| {
                        malformed_error!("Invalid unicode escape on line {}", line_number)
                    })?;
                value.push(code);
            }
            _ => {
                return Err(malformed_error!(
                    "Invalid escape sequence on line {}",
                    line_number
                ))
            }
        }
    }
    Ok(value)
}

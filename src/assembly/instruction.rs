//! Instruction representation.
//!
//! An [`Instruction`] is an opcode plus its operands: an ordered register list, an optional
//! literal, an optional [`Reference`], an optional branch [`Label`] and, for switches and
//! `fill-array-data`, an inline [`Payload`]. Instructions are plain values; the editor never
//! mutates one in place but replaces it wholesale.
//!
//! Register lists follow the opcode's [`Format`]. Fixed formats store one entry per slot in
//! `vA, vB, vC` order, list formats store every listed register, and range formats store the
//! expanded, contiguous range.

use std::fmt;

use crate::{
    assembly::{
        opcodes::{Access, FlowType, Format, Opcode, ReferenceKind},
        reference::{FieldReference, MethodReference, Reference},
    },
    Error, Result,
};

/// A virtual register number.
pub type Register = u16;

/// Identity based branch target.
///
/// A label names "the instruction currently bound to it", not a position. The owning
/// [`crate::editor::InstructionStream`] resolves it to an index on demand, so labels survive
/// any number of insertions and removals around their instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub(crate) u32);

impl Label {
    /// Raw label number, unique within one instruction stream.
    #[must_use]
    pub fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":L{}", self.0)
    }
}

/// One case of a switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchCase {
    /// Value the switch register is compared with
    pub key: i32,
    /// Instruction taken on a match
    pub target: Label,
}

/// Data a `*-switch` or `fill-array-data` instruction refers to.
///
/// The payload travels with its instruction instead of living at the end of the method, so
/// case targets are labels like any other branch target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Cases in key order. Packed switches have consecutive keys.
    Switch(Vec<SwitchCase>),
    /// Array elements, each `element_width` bytes wide
    ArrayData {
        /// 1, 2, 4 or 8
        element_width: u8,
        /// Element values
        elements: Vec<i64>,
    },
}

/// A single instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// The opcode
    pub opcode: Opcode,
    /// Register operands in format order
    pub registers: Vec<Register>,
    /// Literal operand of `const*` and `/lit` forms
    pub literal: Option<i64>,
    /// Reference operand
    pub reference: Option<Reference>,
    /// Branch target
    pub target: Option<Label>,
    /// Switch cases or array data
    pub payload: Option<Payload>,
}

impl Instruction {
    /// Creates an instruction without operands.
    #[must_use]
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            registers: Vec::new(),
            literal: None,
            reference: None,
            target: None,
            payload: None,
        }
    }

    /// Sets the register operands.
    #[must_use]
    pub fn with_registers(mut self, registers: impl Into<Vec<Register>>) -> Self {
        self.registers = registers.into();
        self
    }

    /// Sets the literal operand.
    #[must_use]
    pub fn with_literal(mut self, literal: i64) -> Self {
        self.literal = Some(literal);
        self
    }

    /// Sets the reference operand.
    #[must_use]
    pub fn with_reference(mut self, reference: Reference) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Sets the branch target.
    #[must_use]
    pub fn with_target(mut self, target: Label) -> Self {
        self.target = Some(target);
        self
    }

    /// Sets the switch cases or array data.
    #[must_use]
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Every label this instruction may branch to: the branch target and all switch cases.
    #[must_use]
    pub fn branch_targets(&self) -> Vec<Label> {
        let mut targets: Vec<Label> = self.target.into_iter().collect();
        if let Some(Payload::Switch(cases)) = &self.payload {
            for case in cases {
                if !targets.contains(&case.target) {
                    targets.push(case.target);
                }
            }
        }
        targets
    }

    /// Switch cases, empty for anything but a switch.
    #[must_use]
    pub fn switch_cases(&self) -> &[SwitchCase] {
        match &self.payload {
            Some(Payload::Switch(cases)) => cases,
            _ => &[],
        }
    }

    /// How this instruction affects control flow.
    #[must_use]
    pub fn flow(&self) -> FlowType {
        self.opcode.info().flow
    }

    /// Returns true if this instruction can branch.
    #[must_use]
    pub fn is_branch(&self) -> bool {
        self.opcode.is_branch()
    }

    /// Returns true if execution can continue with the next instruction.
    #[must_use]
    pub fn falls_through(&self) -> bool {
        !matches!(
            self.flow(),
            FlowType::UnconditionalBranch | FlowType::Return | FlowType::Throw
        )
    }

    /// Registers whose current value this instruction consumes.
    ///
    /// Wide slots contribute both halves of the register pair.
    #[must_use]
    pub fn reads(&self) -> Vec<Register> {
        let info = self.opcode.info();
        if info.format.has_register_list() {
            return self.registers.clone();
        }

        let mut reads = Vec::new();
        for (slot, &register) in info.slots.iter().zip(&self.registers) {
            if matches!(slot.access, Access::Read | Access::ReadWrite) {
                reads.push(register);
                if slot.wide {
                    reads.push(register.saturating_add(1));
                }
            }
        }
        reads
    }

    /// Registers this instruction overwrites.
    ///
    /// Wide slots contribute both halves of the register pair.
    #[must_use]
    pub fn writes(&self) -> Vec<Register> {
        let info = self.opcode.info();
        let mut writes = Vec::new();
        for (slot, &register) in info.slots.iter().zip(&self.registers) {
            if matches!(slot.access, Access::Write | Access::ReadWrite) {
                writes.push(register);
                if slot.wide {
                    writes.push(register.saturating_add(1));
                }
            }
        }
        writes
    }

    /// Every register mentioned by this instruction, including the high half of pairs.
    #[must_use]
    pub fn registers_used(&self) -> Vec<Register> {
        let mut used = self.reads();
        for register in self.writes() {
            if !used.contains(&register) {
                used.push(register);
            }
        }
        used
    }

    /// First register operand (`vA`), if any.
    #[must_use]
    pub fn register_a(&self) -> Option<Register> {
        self.registers.first().copied()
    }

    /// Second register operand (`vB`), if any.
    #[must_use]
    pub fn register_b(&self) -> Option<Register> {
        self.registers.get(1).copied()
    }

    /// Field reference operand, if any.
    #[must_use]
    pub fn field_reference(&self) -> Option<&FieldReference> {
        match &self.reference {
            Some(Reference::Field(field)) => Some(field),
            _ => None,
        }
    }

    /// Method reference operand, if any.
    #[must_use]
    pub fn method_reference(&self) -> Option<&MethodReference> {
        match &self.reference {
            Some(Reference::Method(method)) => Some(method),
            _ => None,
        }
    }

    /// Type reference operand, if any.
    #[must_use]
    pub fn type_reference(&self) -> Option<&str> {
        match &self.reference {
            Some(Reference::Type(descriptor)) => Some(descriptor),
            _ => None,
        }
    }

    /// String constant operand, if any.
    #[must_use]
    pub fn string_reference(&self) -> Option<&str> {
        match &self.reference {
            Some(Reference::String(value)) => Some(value),
            _ => None,
        }
    }

    /// Validates the operands against the opcode format and a register file of
    /// `register_count` registers.
    ///
    /// Branch targets are only checked for presence; whether a label is bound is the stream's
    /// business.
    ///
    /// # Errors
    ///
    /// - [`Error::WrongOperand`] for a mismatching operand shape
    /// - [`Error::RegisterOutOfRange`] for registers outside the register file
    /// - [`Error::RegisterNotEncodable`] for registers too wide for their slot
    pub fn validate(&self, register_count: u16) -> Result<()> {
        let info = self.opcode.info();
        let mnemonic = self.opcode.mnemonic();
        let wrong = |message: String| Error::WrongOperand {
            opcode: mnemonic.to_string(),
            message,
        };

        // Register shape
        match info.format {
            Format::F35c => {
                if self.registers.len() > 5 {
                    return Err(wrong(format!(
                        "{} registers, at most 5 allowed",
                        self.registers.len()
                    )));
                }
            }
            Format::F3rc => {
                if self.registers.len() > 255 {
                    return Err(wrong("range longer than 255 registers".to_string()));
                }
                if self.registers.windows(2).any(|w| w[1] != w[0].wrapping_add(1)) {
                    return Err(wrong("range registers are not contiguous".to_string()));
                }
            }
            _ => {
                if self.registers.len() != info.slots.len() {
                    return Err(wrong(format!(
                        "expected {} registers, got {}",
                        info.slots.len(),
                        self.registers.len()
                    )));
                }
            }
        }

        // Register file bounds and encodability
        let limits = info.format.slot_limits();
        for (position, &register) in self.registers.iter().enumerate() {
            let wide = info.slots.get(position).is_some_and(|slot| slot.wide);
            let highest = u32::from(register) + u32::from(wide);
            if highest >= u32::from(register_count) {
                return Err(Error::RegisterOutOfRange {
                    register: highest,
                    register_count,
                });
            }

            let max = if info.format.has_register_list() {
                limits[0]
            } else {
                limits[position]
            };
            if register > max {
                return Err(Error::RegisterNotEncodable {
                    opcode: mnemonic,
                    register,
                    max,
                });
            }
        }

        // Literal
        match (info.format.literal_range(), self.literal) {
            (Some((min, max)), Some(value)) => {
                if value < min || value > max {
                    return Err(wrong(format!("literal {value} outside {min}..={max}")));
                }
            }
            (Some(_), None) => return Err(wrong("missing literal".to_string())),
            (None, Some(_)) => return Err(wrong("unexpected literal".to_string())),
            (None, None) => {}
        }
        if let (Some(shift), Some(value)) = (self.opcode.high_literal_shift(), self.literal) {
            let fits = shift == 48 || i32::try_from(value).is_ok();
            if !fits || value & ((1i64 << shift) - 1) != 0 {
                return Err(wrong(format!("literal {value:#x} does not fit the high 16 bits")));
            }
        }

        // Reference
        let reference_ok = matches!(
            (info.reference, &self.reference),
            (ReferenceKind::None, None)
                | (ReferenceKind::String, Some(Reference::String(_)))
                | (ReferenceKind::Type, Some(Reference::Type(_)))
                | (ReferenceKind::Field, Some(Reference::Field(_)))
                | (ReferenceKind::Method, Some(Reference::Method(_)))
        );
        if !reference_ok {
            return Err(wrong(format!("expected {:?} reference", info.reference)));
        }

        // Target
        if info.format.has_target() != self.target.is_some() {
            return Err(wrong(if self.target.is_some() {
                "unexpected branch target".to_string()
            } else {
                "missing branch target".to_string()
            }));
        }

        // Payload
        match (&self.payload, self.opcode) {
            (None, _) if !info.format.has_payload() => {}
            (Some(Payload::Switch(cases)), Opcode::PackedSwitch) => {
                if cases
                    .windows(2)
                    .any(|w| i64::from(w[1].key) != i64::from(w[0].key) + 1)
                {
                    return Err(wrong("packed switch keys are not consecutive".to_string()));
                }
            }
            (Some(Payload::Switch(cases)), Opcode::SparseSwitch) => {
                if cases.windows(2).any(|w| w[1].key <= w[0].key) {
                    return Err(wrong(
                        "sparse switch keys are not strictly ascending".to_string(),
                    ));
                }
            }
            (
                Some(Payload::ArrayData {
                    element_width,
                    elements,
                }),
                Opcode::FillArrayData,
            ) => {
                let (min, max) = element_range(*element_width)
                    .ok_or_else(|| wrong(format!("element width {element_width}")))?;
                if let Some(value) = elements.iter().find(|&&v| v < min || v > max) {
                    return Err(wrong(format!(
                        "element {value} does not fit {element_width} bytes"
                    )));
                }
            }
            (None, _) => return Err(wrong("missing payload".to_string())),
            (Some(_), _) => return Err(wrong("payload does not match the opcode".to_string())),
        }

        Ok(())
    }
}

/// Values an array data element of `width` bytes can hold, signed or unsigned.
fn element_range(width: u8) -> Option<(i64, i64)> {
    match width {
        1 => Some((i64::from(i8::MIN), i64::from(u8::MAX))),
        2 => Some((i64::from(i16::MIN), i64::from(u16::MAX))),
        4 => Some((i64::from(i32::MIN), i64::from(u32::MAX))),
        8 => Some((i64::MIN, i64::MAX)),
        _ => None,
    }
}

fn hex(value: i64) -> String {
    if value < 0 {
        format!("-0x{:x}", value.unsigned_abs())
    } else {
        format!("0x{value:x}")
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let info = self.opcode.info();
        let mut operands = Vec::new();

        match info.format {
            Format::F35c => operands.push(format!(
                "{{{}}}",
                self.registers
                    .iter()
                    .map(|r| format!("v{r}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
            Format::F3rc => operands.push(match (self.registers.first(), self.registers.last()) {
                (Some(first), Some(last)) => format!("{{v{first} .. v{last}}}"),
                _ => "{}".to_string(),
            }),
            _ => operands.extend(self.registers.iter().map(|r| format!("v{r}"))),
        }

        if let Some(literal) = self.literal {
            operands.push(hex(literal));
        }
        if let Some(reference) = &self.reference {
            operands.push(reference.to_string());
        }
        if let Some(target) = self.target {
            operands.push(target.to_string());
        }
        match &self.payload {
            Some(Payload::Switch(cases)) => operands.push(format!(
                "{{{}}}",
                cases
                    .iter()
                    .map(|case| format!("{} -> {}", hex(i64::from(case.key)), case.target))
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
            Some(Payload::ArrayData {
                element_width,
                elements,
            }) => {
                let suffix = match element_width {
                    1 => "t",
                    2 => "s",
                    8 => "L",
                    _ => "",
                };
                operands.push(format!(
                    "{{{}}}",
                    elements
                        .iter()
                        .map(|e| format!("{}{suffix}", hex(*e)))
                        .collect::<Vec<_>>()
                        .join(", ")
                ));
            }
            None => {}
        }

        if operands.is_empty() {
            f.write_str(self.opcode.mnemonic())
        } else {
            write!(f, "{} {}", self.opcode.mnemonic(), operands.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoke(registers: &[Register]) -> Instruction {
        Instruction::new(Opcode::InvokeStatic)
            .with_registers(registers.to_vec())
            .with_reference(Reference::Method(
                "Lapp/Hooks;->run(II)V".parse().unwrap(),
            ))
    }

    #[test]
    fn test_reads_and_writes() {
        let add = Instruction::new(Opcode::AddInt).with_registers(vec![0, 1, 2]);
        assert_eq!(add.reads(), vec![1, 2]);
        assert_eq!(add.writes(), vec![0]);

        let addr = Instruction::new(Opcode::AddInt2Addr).with_registers(vec![3, 4]);
        assert_eq!(addr.reads(), vec![3, 4]);
        assert_eq!(addr.writes(), vec![3]);

        assert_eq!(invoke(&[5, 6]).reads(), vec![5, 6]);
        assert!(invoke(&[5, 6]).writes().is_empty());
    }

    #[test]
    fn test_wide_registers_cover_pairs() {
        let wide = Instruction::new(Opcode::ConstWide16)
            .with_registers(vec![4])
            .with_literal(1);
        assert_eq!(wide.writes(), vec![4, 5]);

        let ret = Instruction::new(Opcode::ReturnWide).with_registers(vec![2]);
        assert_eq!(ret.reads(), vec![2, 3]);
    }

    #[test]
    fn test_validate_register_bounds() {
        let mov = Instruction::new(Opcode::Move).with_registers(vec![0, 3]);
        assert!(mov.validate(4).is_ok());
        assert!(matches!(
            mov.validate(3),
            Err(Error::RegisterOutOfRange { register: 3, .. })
        ));

        let wide = Instruction::new(Opcode::ConstWide16)
            .with_registers(vec![3])
            .with_literal(0);
        assert!(matches!(
            wide.validate(4),
            Err(Error::RegisterOutOfRange { register: 4, .. })
        ));
    }

    #[test]
    fn test_validate_encodability() {
        let mov = Instruction::new(Opcode::MoveObject).with_registers(vec![0, 16]);
        assert!(matches!(
            mov.validate(20),
            Err(Error::RegisterNotEncodable { register: 16, max: 15, .. })
        ));

        let from16 = Instruction::new(Opcode::MoveObjectFrom16).with_registers(vec![0, 16]);
        assert!(from16.validate(20).is_ok());

        assert!(matches!(
            invoke(&[16]).validate(20),
            Err(Error::RegisterNotEncodable { .. })
        ));
    }

    #[test]
    fn test_validate_literal_and_reference() {
        let c4 = Instruction::new(Opcode::Const4)
            .with_registers(vec![0])
            .with_literal(8);
        assert!(c4.validate(1).is_err());

        let missing_ref = Instruction::new(Opcode::NewInstance).with_registers(vec![0]);
        assert!(missing_ref.validate(1).is_err());

        let branch = Instruction::new(Opcode::IfEqz).with_registers(vec![0]);
        assert!(branch.validate(1).is_err());
        assert!(branch.with_target(Label(0)).validate(1).is_ok());
    }

    #[test]
    fn test_display() {
        let c = Instruction::new(Opcode::Const16)
            .with_registers(vec![1])
            .with_literal(3);
        assert_eq!(c.to_string(), "const/16 v1, 0x3");

        assert_eq!(
            invoke(&[0, 1]).to_string(),
            "invoke-static {v0, v1}, Lapp/Hooks;->run(II)V"
        );

        let range = Instruction::new(Opcode::InvokeStaticRange)
            .with_registers(vec![16, 17])
            .with_reference(Reference::Method("Lapp/Hooks;->run(II)V".parse().unwrap()));
        assert_eq!(
            range.to_string(),
            "invoke-static/range {v16 .. v17}, Lapp/Hooks;->run(II)V"
        );

        let goto = Instruction::new(Opcode::Goto).with_target(Label(7));
        assert_eq!(goto.to_string(), "goto :L7");

        let switch = Instruction::new(Opcode::PackedSwitch)
            .with_registers(vec![0])
            .with_payload(Payload::Switch(vec![
                SwitchCase { key: -1, target: Label(2) },
                SwitchCase { key: 0, target: Label(3) },
            ]));
        assert_eq!(switch.to_string(), "packed-switch v0, {-0x1 -> :L2, 0x0 -> :L3}");

        let data = Instruction::new(Opcode::FillArrayData)
            .with_registers(vec![1])
            .with_payload(Payload::ArrayData {
                element_width: 2,
                elements: vec![1, -2],
            });
        assert_eq!(data.to_string(), "fill-array-data v1, {0x1s, -0x2s}");

        let s = Instruction::new(Opcode::ConstString)
            .with_registers(vec![0])
            .with_reference(Reference::String("a\"b".to_string()));
        assert_eq!(s.to_string(), "const-string v0, \"a\\\"b\"");
    }

    fn switch(opcode: Opcode, keys: &[i32]) -> Instruction {
        let cases = keys
            .iter()
            .enumerate()
            .map(|(n, &key)| SwitchCase {
                key,
                target: Label(n as u32),
            })
            .collect();
        Instruction::new(opcode)
            .with_registers(vec![0])
            .with_payload(Payload::Switch(cases))
    }

    #[test]
    fn test_validate_switches() {
        assert!(switch(Opcode::PackedSwitch, &[4, 5, 6]).validate(1).is_ok());
        assert!(switch(Opcode::PackedSwitch, &[4, 6]).validate(1).is_err());
        assert!(switch(Opcode::SparseSwitch, &[-3, 10, 200]).validate(1).is_ok());
        assert!(switch(Opcode::SparseSwitch, &[10, 10]).validate(1).is_err());
        assert!(switch(Opcode::SparseSwitch, &[10, 3]).validate(1).is_err());
        assert!(Instruction::new(Opcode::SparseSwitch)
            .with_registers(vec![0])
            .validate(1)
            .is_err());

        let sparse = switch(Opcode::SparseSwitch, &[1, 2, 3]);
        assert_eq!(sparse.branch_targets(), vec![Label(0), Label(1), Label(2)]);
        assert_eq!(sparse.switch_cases().len(), 3);
        assert!(sparse.target.is_none());
    }

    #[test]
    fn test_validate_array_data_and_high_literals() {
        let data = |width: u8, elements: Vec<i64>| {
            Instruction::new(Opcode::FillArrayData)
                .with_registers(vec![0])
                .with_payload(Payload::ArrayData {
                    element_width: width,
                    elements,
                })
        };
        assert!(data(1, vec![-128, 255]).validate(1).is_ok());
        assert!(data(1, vec![256]).validate(1).is_err());
        assert!(data(3, vec![1]).validate(1).is_err());
        assert!(data(8, vec![i64::MIN]).validate(1).is_ok());

        let high = |opcode: Opcode, value: i64| {
            Instruction::new(opcode)
                .with_registers(vec![0])
                .with_literal(value)
                .validate(2)
        };
        assert!(high(Opcode::ConstHigh16, 0x7f01_0000).is_ok());
        assert!(high(Opcode::ConstHigh16, -0x1_0000).is_ok());
        assert!(high(Opcode::ConstHigh16, 0x7f01_0001).is_err());
        assert!(high(Opcode::ConstHigh16, 0x1_0000_0000).is_err());
        assert!(high(Opcode::ConstWideHigh16, 0x4000_0000_0000_0000).is_ok());
        assert!(high(Opcode::ConstWideHigh16, 0x4000_0000_0001_0000).is_err());
    }
}

//! Dalvik opcode table.
//!
//! Every supported opcode is a variant of [`Opcode`]. The mnemonic is attached through
//! `strum` so that `Opcode::from_str("move-object/from16")` and `opcode.to_string()` are the
//! two halves of the same lookup, the way the encoder and decoder share one instruction table.
//!
//! [`Opcode::info`] returns the static [`OpcodeInfo`] of an opcode: its operand [`Format`],
//! how it affects control flow, which kind of reference it carries and how each register slot
//! is accessed. The register allocator and the editor's operand validation are both driven by
//! this table.

use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Operand layout of an instruction, named after the Dalvik instruction formats.
///
/// The format fixes how many register slots an instruction has, how wide each slot is and
/// whether a literal, reference or branch target follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// `op`
    F10x,
    /// `op +AA`
    F10t,
    /// `op +AAAA`
    F20t,
    /// `op +AAAAAAAA`
    F30t,
    /// `op vAA`
    F11x,
    /// `op vA, #+B`
    F11n,
    /// `op vA, vB`
    F12x,
    /// `op vAA, kind@BBBB`
    F21c,
    /// `op vAA, #+BBBB0000` or `op vAA, #+BBBB000000000000`
    F21h,
    /// `op vAA, #+BBBB`
    F21s,
    /// `op vAA, +BBBB`
    F21t,
    /// `op vAA, vBB, #+CC`
    F22b,
    /// `op vA, vB, kind@CCCC`
    F22c,
    /// `op vA, vB, #+CCCC`
    F22s,
    /// `op vA, vB, +CCCC`
    F22t,
    /// `op vAA, vBBBB`
    F22x,
    /// `op vAA, vBB, vCC`
    F23x,
    /// `op vAA, #+BBBBBBBB`
    F31i,
    /// `op vAA, string@BBBBBBBB`
    F31c,
    /// `op vAA, +BBBBBBBB` pointing at a payload
    F31t,
    /// `op vAAAA, vBBBB`
    F32x,
    /// `op {vC, vD, vE, vF, vG}, kind@BBBB`
    F35c,
    /// `op {vCCCC .. vNNNN}, kind@BBBB`
    F3rc,
    /// `op vAA, #+BBBBBBBBBBBBBBBB`
    F51l,
}

impl Format {
    /// Highest register number each fixed slot of this format can encode.
    ///
    /// List formats ([`Format::F35c`], [`Format::F3rc`]) return a single entry that applies
    /// to every listed register.
    #[must_use]
    pub fn slot_limits(self) -> &'static [u16] {
        match self {
            Format::F10x | Format::F10t | Format::F20t | Format::F30t => &[],
            Format::F11x
            | Format::F21c
            | Format::F21h
            | Format::F21s
            | Format::F21t
            | Format::F31i
            | Format::F31c
            | Format::F31t
            | Format::F51l => &[255],
            Format::F11n => &[15],
            Format::F12x | Format::F22c | Format::F22s | Format::F22t => &[15, 15],
            Format::F22b => &[255, 255],
            Format::F22x => &[255, 65535],
            Format::F23x => &[255, 255, 255],
            Format::F32x => &[65535, 65535],
            Format::F35c => &[15],
            Format::F3rc => &[65535],
        }
    }

    /// Inclusive literal range accepted by this format, if it carries a literal.
    #[must_use]
    pub fn literal_range(self) -> Option<(i64, i64)> {
        match self {
            Format::F11n => Some((-8, 7)),
            Format::F22b => Some((i64::from(i8::MIN), i64::from(i8::MAX))),
            Format::F21s | Format::F22s => Some((i64::from(i16::MIN), i64::from(i16::MAX))),
            // const accepts both signed and unsigned 32 bit spellings
            Format::F31i => Some((i64::from(i32::MIN), i64::from(u32::MAX))),
            // only the high bits are encoded, see Opcode::high_literal_shift
            Format::F21h | Format::F51l => Some((i64::MIN, i64::MAX)),
            _ => None,
        }
    }

    /// Returns true if the format takes a braced register list.
    #[must_use]
    pub fn has_register_list(self) -> bool {
        matches!(self, Format::F35c | Format::F3rc)
    }

    /// Returns true if the format refers to a switch or array data payload.
    #[must_use]
    pub fn has_payload(self) -> bool {
        self == Format::F31t
    }

    /// Returns true if the format ends with a branch target.
    #[must_use]
    pub fn has_target(self) -> bool {
        matches!(
            self,
            Format::F10t | Format::F20t | Format::F30t | Format::F21t | Format::F22t
        )
    }
}

/// How an instruction affects control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Normal execution continues to next instruction
    Sequential,
    /// Call to another method, continues to the next instruction
    Call,
    /// Conditional branch to another location
    ConditionalBranch,
    /// Always branches to another location
    UnconditionalBranch,
    /// Branches to one of several case targets or falls through
    Switch,
    /// Returns from current method
    Return,
    /// Exception throwing
    Throw,
}

/// Which kind of constant pool reference an opcode carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// No reference
    None,
    /// `const-string`
    String,
    /// Type descriptor (`new-instance`, `check-cast`, ...)
    Type,
    /// Field reference (`iget`, `sput`, ...)
    Field,
    /// Method reference (`invoke-*`)
    Method,
}

/// How a register slot is accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// The register value is consumed
    Read,
    /// The register is overwritten
    Write,
    /// The register is consumed and overwritten (`/2addr` forms)
    ReadWrite,
}

/// Access mode of one register slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    /// How the slot is accessed
    pub access: Access,
    /// Whether the slot names the low half of a register pair
    pub wide: bool,
}

const R: Slot = Slot {
    access: Access::Read,
    wide: false,
};
const W: Slot = Slot {
    access: Access::Write,
    wide: false,
};
const RW: Slot = Slot {
    access: Access::ReadWrite,
    wide: false,
};
const R_WIDE: Slot = Slot {
    access: Access::Read,
    wide: true,
};
const W_WIDE: Slot = Slot {
    access: Access::Write,
    wide: true,
};
const RW_WIDE: Slot = Slot {
    access: Access::ReadWrite,
    wide: true,
};

/// Static description of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeInfo {
    /// Operand layout
    pub format: Format,
    /// Control flow behaviour
    pub flow: FlowType,
    /// Reference carried by the instruction
    pub reference: ReferenceKind,
    /// Access mode per fixed register slot; empty for list formats, whose registers are all read
    pub slots: &'static [Slot],
    /// Whether the instruction produces a value for a following `move-result*`
    pub sets_result: bool,
    /// Whether the instruction may raise an exception
    pub can_throw: bool,
}

/// Supported Dalvik opcodes.
#[allow(missing_docs)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, IntoStaticStr, EnumIter,
)]
pub enum Opcode {
    #[strum(to_string = "nop")]
    Nop,
    #[strum(to_string = "move")]
    Move,
    #[strum(to_string = "move/from16")]
    MoveFrom16,
    #[strum(to_string = "move/16")]
    Move16,
    #[strum(to_string = "move-wide")]
    MoveWide,
    #[strum(to_string = "move-wide/from16")]
    MoveWideFrom16,
    #[strum(to_string = "move-wide/16")]
    MoveWide16,
    #[strum(to_string = "move-object")]
    MoveObject,
    #[strum(to_string = "move-object/from16")]
    MoveObjectFrom16,
    #[strum(to_string = "move-object/16")]
    MoveObject16,
    #[strum(to_string = "move-result")]
    MoveResult,
    #[strum(to_string = "move-result-wide")]
    MoveResultWide,
    #[strum(to_string = "move-result-object")]
    MoveResultObject,
    #[strum(to_string = "move-exception")]
    MoveException,
    #[strum(to_string = "return-void")]
    ReturnVoid,
    #[strum(to_string = "return")]
    Return,
    #[strum(to_string = "return-wide")]
    ReturnWide,
    #[strum(to_string = "return-object")]
    ReturnObject,
    #[strum(to_string = "const/4")]
    Const4,
    #[strum(to_string = "const/16")]
    Const16,
    #[strum(to_string = "const")]
    Const,
    #[strum(to_string = "const/high16")]
    ConstHigh16,
    #[strum(to_string = "const-wide/16")]
    ConstWide16,
    #[strum(to_string = "const-wide/32")]
    ConstWide32,
    #[strum(to_string = "const-wide")]
    ConstWide,
    #[strum(to_string = "const-wide/high16")]
    ConstWideHigh16,
    #[strum(to_string = "const-string")]
    ConstString,
    #[strum(to_string = "const-string/jumbo")]
    ConstStringJumbo,
    #[strum(to_string = "const-class")]
    ConstClass,
    #[strum(to_string = "monitor-enter")]
    MonitorEnter,
    #[strum(to_string = "monitor-exit")]
    MonitorExit,
    #[strum(to_string = "check-cast")]
    CheckCast,
    #[strum(to_string = "instance-of")]
    InstanceOf,
    #[strum(to_string = "array-length")]
    ArrayLength,
    #[strum(to_string = "new-instance")]
    NewInstance,
    #[strum(to_string = "new-array")]
    NewArray,
    #[strum(to_string = "filled-new-array")]
    FilledNewArray,
    #[strum(to_string = "filled-new-array/range")]
    FilledNewArrayRange,
    #[strum(to_string = "fill-array-data")]
    FillArrayData,
    #[strum(to_string = "throw")]
    Throw,
    #[strum(to_string = "goto")]
    Goto,
    #[strum(to_string = "goto/16")]
    Goto16,
    #[strum(to_string = "goto/32")]
    Goto32,
    #[strum(to_string = "packed-switch")]
    PackedSwitch,
    #[strum(to_string = "sparse-switch")]
    SparseSwitch,
    #[strum(to_string = "cmpl-float")]
    CmplFloat,
    #[strum(to_string = "cmpg-float")]
    CmpgFloat,
    #[strum(to_string = "cmpl-double")]
    CmplDouble,
    #[strum(to_string = "cmpg-double")]
    CmpgDouble,
    #[strum(to_string = "cmp-long")]
    CmpLong,
    #[strum(to_string = "if-eq")]
    IfEq,
    #[strum(to_string = "if-ne")]
    IfNe,
    #[strum(to_string = "if-lt")]
    IfLt,
    #[strum(to_string = "if-ge")]
    IfGe,
    #[strum(to_string = "if-gt")]
    IfGt,
    #[strum(to_string = "if-le")]
    IfLe,
    #[strum(to_string = "if-eqz")]
    IfEqz,
    #[strum(to_string = "if-nez")]
    IfNez,
    #[strum(to_string = "if-ltz")]
    IfLtz,
    #[strum(to_string = "if-gez")]
    IfGez,
    #[strum(to_string = "if-gtz")]
    IfGtz,
    #[strum(to_string = "if-lez")]
    IfLez,
    #[strum(to_string = "aget")]
    Aget,
    #[strum(to_string = "aget-wide")]
    AgetWide,
    #[strum(to_string = "aget-object")]
    AgetObject,
    #[strum(to_string = "aget-boolean")]
    AgetBoolean,
    #[strum(to_string = "aget-byte")]
    AgetByte,
    #[strum(to_string = "aget-char")]
    AgetChar,
    #[strum(to_string = "aget-short")]
    AgetShort,
    #[strum(to_string = "aput")]
    Aput,
    #[strum(to_string = "aput-wide")]
    AputWide,
    #[strum(to_string = "aput-object")]
    AputObject,
    #[strum(to_string = "aput-boolean")]
    AputBoolean,
    #[strum(to_string = "aput-byte")]
    AputByte,
    #[strum(to_string = "aput-char")]
    AputChar,
    #[strum(to_string = "aput-short")]
    AputShort,
    #[strum(to_string = "iget")]
    Iget,
    #[strum(to_string = "iget-wide")]
    IgetWide,
    #[strum(to_string = "iget-object")]
    IgetObject,
    #[strum(to_string = "iget-boolean")]
    IgetBoolean,
    #[strum(to_string = "iget-byte")]
    IgetByte,
    #[strum(to_string = "iget-char")]
    IgetChar,
    #[strum(to_string = "iget-short")]
    IgetShort,
    #[strum(to_string = "iput")]
    Iput,
    #[strum(to_string = "iput-wide")]
    IputWide,
    #[strum(to_string = "iput-object")]
    IputObject,
    #[strum(to_string = "iput-boolean")]
    IputBoolean,
    #[strum(to_string = "iput-byte")]
    IputByte,
    #[strum(to_string = "iput-char")]
    IputChar,
    #[strum(to_string = "iput-short")]
    IputShort,
    #[strum(to_string = "sget")]
    Sget,
    #[strum(to_string = "sget-wide")]
    SgetWide,
    #[strum(to_string = "sget-object")]
    SgetObject,
    #[strum(to_string = "sget-boolean")]
    SgetBoolean,
    #[strum(to_string = "sget-byte")]
    SgetByte,
    #[strum(to_string = "sget-char")]
    SgetChar,
    #[strum(to_string = "sget-short")]
    SgetShort,
    #[strum(to_string = "sput")]
    Sput,
    #[strum(to_string = "sput-wide")]
    SputWide,
    #[strum(to_string = "sput-object")]
    SputObject,
    #[strum(to_string = "sput-boolean")]
    SputBoolean,
    #[strum(to_string = "sput-byte")]
    SputByte,
    #[strum(to_string = "sput-char")]
    SputChar,
    #[strum(to_string = "sput-short")]
    SputShort,
    #[strum(to_string = "invoke-virtual")]
    InvokeVirtual,
    #[strum(to_string = "invoke-super")]
    InvokeSuper,
    #[strum(to_string = "invoke-direct")]
    InvokeDirect,
    #[strum(to_string = "invoke-static")]
    InvokeStatic,
    #[strum(to_string = "invoke-interface")]
    InvokeInterface,
    #[strum(to_string = "invoke-virtual/range")]
    InvokeVirtualRange,
    #[strum(to_string = "invoke-super/range")]
    InvokeSuperRange,
    #[strum(to_string = "invoke-direct/range")]
    InvokeDirectRange,
    #[strum(to_string = "invoke-static/range")]
    InvokeStaticRange,
    #[strum(to_string = "invoke-interface/range")]
    InvokeInterfaceRange,
    #[strum(to_string = "neg-int")]
    NegInt,
    #[strum(to_string = "not-int")]
    NotInt,
    #[strum(to_string = "neg-long")]
    NegLong,
    #[strum(to_string = "not-long")]
    NotLong,
    #[strum(to_string = "neg-float")]
    NegFloat,
    #[strum(to_string = "neg-double")]
    NegDouble,
    #[strum(to_string = "int-to-long")]
    IntToLong,
    #[strum(to_string = "int-to-float")]
    IntToFloat,
    #[strum(to_string = "int-to-double")]
    IntToDouble,
    #[strum(to_string = "long-to-int")]
    LongToInt,
    #[strum(to_string = "long-to-float")]
    LongToFloat,
    #[strum(to_string = "long-to-double")]
    LongToDouble,
    #[strum(to_string = "float-to-int")]
    FloatToInt,
    #[strum(to_string = "float-to-long")]
    FloatToLong,
    #[strum(to_string = "float-to-double")]
    FloatToDouble,
    #[strum(to_string = "double-to-int")]
    DoubleToInt,
    #[strum(to_string = "double-to-long")]
    DoubleToLong,
    #[strum(to_string = "double-to-float")]
    DoubleToFloat,
    #[strum(to_string = "int-to-byte")]
    IntToByte,
    #[strum(to_string = "int-to-char")]
    IntToChar,
    #[strum(to_string = "int-to-short")]
    IntToShort,
    #[strum(to_string = "add-int")]
    AddInt,
    #[strum(to_string = "sub-int")]
    SubInt,
    #[strum(to_string = "mul-int")]
    MulInt,
    #[strum(to_string = "div-int")]
    DivInt,
    #[strum(to_string = "rem-int")]
    RemInt,
    #[strum(to_string = "and-int")]
    AndInt,
    #[strum(to_string = "or-int")]
    OrInt,
    #[strum(to_string = "xor-int")]
    XorInt,
    #[strum(to_string = "shl-int")]
    ShlInt,
    #[strum(to_string = "shr-int")]
    ShrInt,
    #[strum(to_string = "ushr-int")]
    UshrInt,
    #[strum(to_string = "add-long")]
    AddLong,
    #[strum(to_string = "sub-long")]
    SubLong,
    #[strum(to_string = "mul-long")]
    MulLong,
    #[strum(to_string = "div-long")]
    DivLong,
    #[strum(to_string = "rem-long")]
    RemLong,
    #[strum(to_string = "and-long")]
    AndLong,
    #[strum(to_string = "or-long")]
    OrLong,
    #[strum(to_string = "xor-long")]
    XorLong,
    #[strum(to_string = "shl-long")]
    ShlLong,
    #[strum(to_string = "shr-long")]
    ShrLong,
    #[strum(to_string = "ushr-long")]
    UshrLong,
    #[strum(to_string = "add-float")]
    AddFloat,
    #[strum(to_string = "sub-float")]
    SubFloat,
    #[strum(to_string = "mul-float")]
    MulFloat,
    #[strum(to_string = "div-float")]
    DivFloat,
    #[strum(to_string = "rem-float")]
    RemFloat,
    #[strum(to_string = "add-double")]
    AddDouble,
    #[strum(to_string = "sub-double")]
    SubDouble,
    #[strum(to_string = "mul-double")]
    MulDouble,
    #[strum(to_string = "div-double")]
    DivDouble,
    #[strum(to_string = "rem-double")]
    RemDouble,
    #[strum(to_string = "add-int/2addr")]
    AddInt2Addr,
    #[strum(to_string = "sub-int/2addr")]
    SubInt2Addr,
    #[strum(to_string = "mul-int/2addr")]
    MulInt2Addr,
    #[strum(to_string = "div-int/2addr")]
    DivInt2Addr,
    #[strum(to_string = "rem-int/2addr")]
    RemInt2Addr,
    #[strum(to_string = "and-int/2addr")]
    AndInt2Addr,
    #[strum(to_string = "or-int/2addr")]
    OrInt2Addr,
    #[strum(to_string = "xor-int/2addr")]
    XorInt2Addr,
    #[strum(to_string = "shl-int/2addr")]
    ShlInt2Addr,
    #[strum(to_string = "shr-int/2addr")]
    ShrInt2Addr,
    #[strum(to_string = "ushr-int/2addr")]
    UshrInt2Addr,
    #[strum(to_string = "add-long/2addr")]
    AddLong2Addr,
    #[strum(to_string = "sub-long/2addr")]
    SubLong2Addr,
    #[strum(to_string = "mul-long/2addr")]
    MulLong2Addr,
    #[strum(to_string = "div-long/2addr")]
    DivLong2Addr,
    #[strum(to_string = "rem-long/2addr")]
    RemLong2Addr,
    #[strum(to_string = "and-long/2addr")]
    AndLong2Addr,
    #[strum(to_string = "or-long/2addr")]
    OrLong2Addr,
    #[strum(to_string = "xor-long/2addr")]
    XorLong2Addr,
    #[strum(to_string = "shl-long/2addr")]
    ShlLong2Addr,
    #[strum(to_string = "shr-long/2addr")]
    ShrLong2Addr,
    #[strum(to_string = "ushr-long/2addr")]
    UshrLong2Addr,
    #[strum(to_string = "add-float/2addr")]
    AddFloat2Addr,
    #[strum(to_string = "sub-float/2addr")]
    SubFloat2Addr,
    #[strum(to_string = "mul-float/2addr")]
    MulFloat2Addr,
    #[strum(to_string = "div-float/2addr")]
    DivFloat2Addr,
    #[strum(to_string = "rem-float/2addr")]
    RemFloat2Addr,
    #[strum(to_string = "add-double/2addr")]
    AddDouble2Addr,
    #[strum(to_string = "sub-double/2addr")]
    SubDouble2Addr,
    #[strum(to_string = "mul-double/2addr")]
    MulDouble2Addr,
    #[strum(to_string = "div-double/2addr")]
    DivDouble2Addr,
    #[strum(to_string = "rem-double/2addr")]
    RemDouble2Addr,
    #[strum(to_string = "add-int/lit16")]
    AddIntLit16,
    #[strum(to_string = "rsub-int")]
    RsubInt,
    #[strum(to_string = "mul-int/lit16")]
    MulIntLit16,
    #[strum(to_string = "div-int/lit16")]
    DivIntLit16,
    #[strum(to_string = "rem-int/lit16")]
    RemIntLit16,
    #[strum(to_string = "and-int/lit16")]
    AndIntLit16,
    #[strum(to_string = "or-int/lit16")]
    OrIntLit16,
    #[strum(to_string = "xor-int/lit16")]
    XorIntLit16,
    #[strum(to_string = "add-int/lit8")]
    AddIntLit8,
    #[strum(to_string = "rsub-int/lit8")]
    RsubIntLit8,
    #[strum(to_string = "mul-int/lit8")]
    MulIntLit8,
    #[strum(to_string = "div-int/lit8")]
    DivIntLit8,
    #[strum(to_string = "rem-int/lit8")]
    RemIntLit8,
    #[strum(to_string = "and-int/lit8")]
    AndIntLit8,
    #[strum(to_string = "or-int/lit8")]
    OrIntLit8,
    #[strum(to_string = "xor-int/lit8")]
    XorIntLit8,
    #[strum(to_string = "shl-int/lit8")]
    ShlIntLit8,
    #[strum(to_string = "shr-int/lit8")]
    ShrIntLit8,
    #[strum(to_string = "ushr-int/lit8")]
    UshrIntLit8,
}

impl Opcode {
    /// Returns the mnemonic of this opcode.
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        self.into()
    }

    /// Returns the static description of this opcode.
    #[must_use]
    pub fn info(self) -> OpcodeInfo {
        use Format::*;
        use Opcode::*;

        let (format, flow, reference, slots): (Format, FlowType, ReferenceKind, &'static [Slot]) =
            match self {
                Nop => (F10x, FlowType::Sequential, ReferenceKind::None, &[]),
                Move | MoveObject | ArrayLength => {
                    (F12x, FlowType::Sequential, ReferenceKind::None, &[W, R])
                }
                MoveFrom16 | MoveObjectFrom16 => {
                    (F22x, FlowType::Sequential, ReferenceKind::None, &[W, R])
                }
                Move16 | MoveObject16 => (F32x, FlowType::Sequential, ReferenceKind::None, &[W, R]),
                MoveWide => (F12x, FlowType::Sequential, ReferenceKind::None, &[W_WIDE, R_WIDE]),
                MoveWideFrom16 => {
                    (F22x, FlowType::Sequential, ReferenceKind::None, &[W_WIDE, R_WIDE])
                }
                MoveWide16 => (F32x, FlowType::Sequential, ReferenceKind::None, &[W_WIDE, R_WIDE]),
                MoveResult | MoveResultObject | MoveException => {
                    (F11x, FlowType::Sequential, ReferenceKind::None, &[W])
                }
                MoveResultWide => (F11x, FlowType::Sequential, ReferenceKind::None, &[W_WIDE]),
                ReturnVoid => (F10x, FlowType::Return, ReferenceKind::None, &[]),
                Return | ReturnObject => (F11x, FlowType::Return, ReferenceKind::None, &[R]),
                ReturnWide => (F11x, FlowType::Return, ReferenceKind::None, &[R_WIDE]),
                Const4 => (F11n, FlowType::Sequential, ReferenceKind::None, &[W]),
                Const16 => (F21s, FlowType::Sequential, ReferenceKind::None, &[W]),
                Const => (F31i, FlowType::Sequential, ReferenceKind::None, &[W]),
                ConstHigh16 => (F21h, FlowType::Sequential, ReferenceKind::None, &[W]),
                ConstWide16 => (F21s, FlowType::Sequential, ReferenceKind::None, &[W_WIDE]),
                ConstWide32 => (F31i, FlowType::Sequential, ReferenceKind::None, &[W_WIDE]),
                ConstWide => (F51l, FlowType::Sequential, ReferenceKind::None, &[W_WIDE]),
                ConstWideHigh16 => (F21h, FlowType::Sequential, ReferenceKind::None, &[W_WIDE]),
                ConstString => (F21c, FlowType::Sequential, ReferenceKind::String, &[W]),
                ConstStringJumbo => (F31c, FlowType::Sequential, ReferenceKind::String, &[W]),
                ConstClass => (F21c, FlowType::Sequential, ReferenceKind::Type, &[W]),
                MonitorEnter | MonitorExit => (F11x, FlowType::Sequential, ReferenceKind::None, &[R]),
                CheckCast => (F21c, FlowType::Sequential, ReferenceKind::Type, &[R]),
                InstanceOf | NewArray => (F22c, FlowType::Sequential, ReferenceKind::Type, &[W, R]),
                NewInstance => (F21c, FlowType::Sequential, ReferenceKind::Type, &[W]),
                FilledNewArray => (F35c, FlowType::Sequential, ReferenceKind::Type, &[]),
                FilledNewArrayRange => (F3rc, FlowType::Sequential, ReferenceKind::Type, &[]),
                FillArrayData => (F31t, FlowType::Sequential, ReferenceKind::None, &[R]),
                Throw => (F11x, FlowType::Throw, ReferenceKind::None, &[R]),
                Goto => (F10t, FlowType::UnconditionalBranch, ReferenceKind::None, &[]),
                Goto16 => (F20t, FlowType::UnconditionalBranch, ReferenceKind::None, &[]),
                Goto32 => (F30t, FlowType::UnconditionalBranch, ReferenceKind::None, &[]),
                PackedSwitch | SparseSwitch => (F31t, FlowType::Switch, ReferenceKind::None, &[R]),
                CmplFloat | CmpgFloat => (F23x, FlowType::Sequential, ReferenceKind::None, &[W, R, R]),
                CmplDouble | CmpgDouble | CmpLong => {
                    (F23x, FlowType::Sequential, ReferenceKind::None, &[W, R_WIDE, R_WIDE])
                }
                IfEq | IfNe | IfLt | IfGe | IfGt | IfLe => {
                    (F22t, FlowType::ConditionalBranch, ReferenceKind::None, &[R, R])
                }
                IfEqz | IfNez | IfLtz | IfGez | IfGtz | IfLez => {
                    (F21t, FlowType::ConditionalBranch, ReferenceKind::None, &[R])
                }
                Aget | AgetObject | AgetBoolean | AgetByte | AgetChar | AgetShort => {
                    (F23x, FlowType::Sequential, ReferenceKind::None, &[W, R, R])
                }
                AgetWide => (F23x, FlowType::Sequential, ReferenceKind::None, &[W_WIDE, R, R]),
                Aput | AputObject | AputBoolean | AputByte | AputChar | AputShort => {
                    (F23x, FlowType::Sequential, ReferenceKind::None, &[R, R, R])
                }
                AputWide => (F23x, FlowType::Sequential, ReferenceKind::None, &[R_WIDE, R, R]),
                Iget | IgetObject | IgetBoolean | IgetByte | IgetChar | IgetShort => {
                    (F22c, FlowType::Sequential, ReferenceKind::Field, &[W, R])
                }
                IgetWide => (F22c, FlowType::Sequential, ReferenceKind::Field, &[W_WIDE, R]),
                Iput | IputObject | IputBoolean | IputByte | IputChar | IputShort => {
                    (F22c, FlowType::Sequential, ReferenceKind::Field, &[R, R])
                }
                IputWide => (F22c, FlowType::Sequential, ReferenceKind::Field, &[R_WIDE, R]),
                Sget | SgetObject | SgetBoolean | SgetByte | SgetChar | SgetShort => {
                    (F21c, FlowType::Sequential, ReferenceKind::Field, &[W])
                }
                SgetWide => (F21c, FlowType::Sequential, ReferenceKind::Field, &[W_WIDE]),
                Sput | SputObject | SputBoolean | SputByte | SputChar | SputShort => {
                    (F21c, FlowType::Sequential, ReferenceKind::Field, &[R])
                }
                SputWide => (F21c, FlowType::Sequential, ReferenceKind::Field, &[R_WIDE]),
                InvokeVirtual | InvokeSuper | InvokeDirect | InvokeStatic | InvokeInterface => {
                    (F35c, FlowType::Call, ReferenceKind::Method, &[])
                }
                InvokeVirtualRange | InvokeSuperRange | InvokeDirectRange | InvokeStaticRange
                | InvokeInterfaceRange => (F3rc, FlowType::Call, ReferenceKind::Method, &[]),
                NegInt | NotInt | NegFloat | IntToFloat | FloatToInt | IntToByte | IntToChar
                | IntToShort => (F12x, FlowType::Sequential, ReferenceKind::None, &[W, R]),
                NegLong | NotLong | NegDouble | LongToDouble | DoubleToLong => {
                    (F12x, FlowType::Sequential, ReferenceKind::None, &[W_WIDE, R_WIDE])
                }
                IntToLong | IntToDouble | FloatToLong | FloatToDouble => {
                    (F12x, FlowType::Sequential, ReferenceKind::None, &[W_WIDE, R])
                }
                LongToInt | LongToFloat | DoubleToInt | DoubleToFloat => {
                    (F12x, FlowType::Sequential, ReferenceKind::None, &[W, R_WIDE])
                }
                AddInt | SubInt | MulInt | DivInt | RemInt | AndInt | OrInt | XorInt | ShlInt
                | ShrInt | UshrInt | AddFloat | SubFloat | MulFloat | DivFloat | RemFloat => {
                    (F23x, FlowType::Sequential, ReferenceKind::None, &[W, R, R])
                }
                AddLong | SubLong | MulLong | DivLong | RemLong | AndLong | OrLong | XorLong
                | AddDouble | SubDouble | MulDouble | DivDouble | RemDouble => {
                    (F23x, FlowType::Sequential, ReferenceKind::None, &[W_WIDE, R_WIDE, R_WIDE])
                }
                // the shift distance is a plain int
                ShlLong | ShrLong | UshrLong => {
                    (F23x, FlowType::Sequential, ReferenceKind::None, &[W_WIDE, R_WIDE, R])
                }
                AddInt2Addr | SubInt2Addr | MulInt2Addr | DivInt2Addr | RemInt2Addr
                | AndInt2Addr | OrInt2Addr | XorInt2Addr | ShlInt2Addr | ShrInt2Addr
                | UshrInt2Addr | AddFloat2Addr | SubFloat2Addr | MulFloat2Addr | DivFloat2Addr
                | RemFloat2Addr => (F12x, FlowType::Sequential, ReferenceKind::None, &[RW, R]),
                AddLong2Addr | SubLong2Addr | MulLong2Addr | DivLong2Addr | RemLong2Addr
                | AndLong2Addr | OrLong2Addr | XorLong2Addr | AddDouble2Addr | SubDouble2Addr
                | MulDouble2Addr | DivDouble2Addr | RemDouble2Addr => {
                    (F12x, FlowType::Sequential, ReferenceKind::None, &[RW_WIDE, R_WIDE])
                }
                ShlLong2Addr | ShrLong2Addr | UshrLong2Addr => {
                    (F12x, FlowType::Sequential, ReferenceKind::None, &[RW_WIDE, R])
                }
                AddIntLit16 | RsubInt | MulIntLit16 | DivIntLit16 | RemIntLit16 | AndIntLit16
                | OrIntLit16 | XorIntLit16 => {
                    (F22s, FlowType::Sequential, ReferenceKind::None, &[W, R])
                }
                AddIntLit8 | RsubIntLit8 | MulIntLit8 | DivIntLit8 | RemIntLit8 | AndIntLit8
                | OrIntLit8 | XorIntLit8 | ShlIntLit8 | ShrIntLit8 | UshrIntLit8 => {
                    (F22b, FlowType::Sequential, ReferenceKind::None, &[W, R])
                }
            };

        let sets_result = matches!(flow, FlowType::Call)
            || matches!(self, FilledNewArray | FilledNewArrayRange);
        // Floating point division never throws, integer division by zero does.
        let can_throw = matches!(flow, FlowType::Call | FlowType::Throw)
            || reference != ReferenceKind::None
            || matches!(
                self,
                MonitorEnter
                    | MonitorExit
                    | ArrayLength
                    | FillArrayData
                    | Aget
                    | AgetWide
                    | AgetObject
                    | AgetBoolean
                    | AgetByte
                    | AgetChar
                    | AgetShort
                    | Aput
                    | AputWide
                    | AputObject
                    | AputBoolean
                    | AputByte
                    | AputChar
                    | AputShort
                    | DivInt
                    | RemInt
                    | DivLong
                    | RemLong
                    | DivInt2Addr
                    | RemInt2Addr
                    | DivLong2Addr
                    | RemLong2Addr
                    | DivIntLit16
                    | RemIntLit16
                    | DivIntLit8
                    | RemIntLit8
            );

        OpcodeInfo {
            format,
            flow,
            reference,
            slots,
            sets_result,
            can_throw,
        }
    }

    /// Returns true for the `move-result*` family, which must directly follow the instruction
    /// producing the value.
    #[must_use]
    pub fn is_move_result(self) -> bool {
        matches!(
            self,
            Opcode::MoveResult | Opcode::MoveResultWide | Opcode::MoveResultObject
        )
    }

    /// Returns true for the `return*` family.
    #[must_use]
    pub fn is_return(self) -> bool {
        matches!(self.info().flow, FlowType::Return)
    }

    /// Returns true for any conditional or unconditional branch.
    #[must_use]
    pub fn is_branch(self) -> bool {
        matches!(
            self.info().flow,
            FlowType::ConditionalBranch | FlowType::UnconditionalBranch | FlowType::Switch
        )
    }

    /// Returns true for the literal loading `const*` family.
    #[must_use]
    pub fn is_literal_const(self) -> bool {
        matches!(
            self,
            Opcode::Const4
                | Opcode::Const16
                | Opcode::Const
                | Opcode::ConstHigh16
                | Opcode::ConstWide16
                | Opcode::ConstWide32
                | Opcode::ConstWide
                | Opcode::ConstWideHigh16
        )
    }

    /// Picks the narrowest `const` form able to load `value` into `register`.
    #[must_use]
    pub fn narrowest_const(register: u16, value: i64) -> Opcode {
        if register <= 15 && (-8..=7).contains(&value) {
            Opcode::Const4
        } else if i16::try_from(value).is_ok() {
            Opcode::Const16
        } else {
            Opcode::Const
        }
    }

    /// The narrowest `const-wide*` able to load `value`.
    #[must_use]
    pub fn narrowest_const_wide(value: i64) -> Opcode {
        if i16::try_from(value).is_ok() {
            Opcode::ConstWide16
        } else if i32::try_from(value).is_ok() {
            Opcode::ConstWide32
        } else {
            Opcode::ConstWide
        }
    }

    /// Number of low literal bits the `/high16` forms leave out; their literal must have these
    /// bits cleared.
    #[must_use]
    pub fn high_literal_shift(self) -> Option<u32> {
        match self {
            Opcode::ConstHigh16 => Some(16),
            Opcode::ConstWideHigh16 => Some(48),
            _ => None,
        }
    }

    /// Returns true for the `const-wide*` family.
    #[must_use]
    pub fn is_wide_const(self) -> bool {
        matches!(
            self,
            Opcode::ConstWide16 | Opcode::ConstWide32 | Opcode::ConstWide | Opcode::ConstWideHigh16
        )
    }
}

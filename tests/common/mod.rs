//! Shared helpers for the integration tests.
//!
//! [`Machine`] executes method bodies symbolically so tests can check what edited code does
//! instead of how it is spelled. Calls into classes the container does not define are recorded
//! and answered from a table.

#![allow(dead_code)]

use std::collections::HashMap;

use dexweave::{editor::InstructionStream, prelude::*};

/// Package of the extension classes in [`component_app`].
pub const EXTENSION: &str = "Lapp/extension/patches/components";

const STEP_LIMIT: usize = 10_000;

/// A register value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Str(String),
    Ref(usize),
}

impl Value {
    fn as_int(&self) -> i64 {
        match self {
            Value::Null => 0,
            Value::Int(value) => *value,
            Value::Str(_) | Value::Ref(_) => 1,
        }
    }
}

/// Something allocated by the executed code.
#[derive(Debug, Clone, PartialEq)]
pub enum HeapEntry {
    Object {
        class: String,
        fields: HashMap<String, Value>,
    },
    Array {
        element_type: String,
        items: Vec<Value>,
    },
}

/// One executed invoke instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: MethodReference,
    pub arguments: Vec<Value>,
}

/// Symbolic executor over one container.
pub struct Machine<'a> {
    container: &'a BytecodeContainer,
    heap: Vec<HeapEntry>,
    statics: HashMap<String, Value>,
    calls: Vec<Call>,
    responses: HashMap<String, Value>,
    steps: usize,
}

impl<'a> Machine<'a> {
    pub fn new(container: &'a BytecodeContainer) -> Self {
        Self {
            container,
            heap: Vec::new(),
            statics: HashMap::new(),
            calls: Vec::new(),
            responses: HashMap::new(),
            steps: 0,
        }
    }

    /// Answers external calls to methods named `name` with `value`.
    pub fn respond(mut self, name: &str, value: Value) -> Self {
        self.responses.insert(name.to_string(), value);
        self
    }

    pub fn object(&mut self, class: &str, fields: &[(&str, Value)]) -> Value {
        self.heap.push(HeapEntry::Object {
            class: class.to_string(),
            fields: fields
                .iter()
                .map(|(name, value)| ((*name).to_string(), value.clone()))
                .collect(),
        });
        Value::Ref(self.heap.len() - 1)
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn calls_to(&self, name: &str) -> Vec<&Call> {
        self.calls.iter().filter(|c| c.method.name == name).collect()
    }

    pub fn class_of(&self, value: &Value) -> Option<&str> {
        match value {
            Value::Ref(index) => match &self.heap[*index] {
                HeapEntry::Object { class, .. } => Some(class),
                HeapEntry::Array { element_type, .. } => Some(element_type),
            },
            Value::Str(_) => Some("Ljava/lang/String;"),
            _ => None,
        }
    }

    pub fn array(&self, value: &Value) -> Option<&[Value]> {
        match value {
            Value::Ref(index) => match &self.heap[*index] {
                HeapEntry::Array { items, .. } => Some(items),
                HeapEntry::Object { .. } => None,
            },
            _ => None,
        }
    }

    pub fn static_value(&self, field: &str) -> Option<&Value> {
        self.statics.get(field)
    }

    /// Runs `class->name` with `arguments`, `this` first for instance methods.
    pub fn run(&mut self, class: &str, name: &str, arguments: Vec<Value>) -> Result<Value> {
        let id = self.container.find_method(class, name)?;
        self.execute(id, arguments)
    }

    pub fn execute(&mut self, id: MethodId, arguments: Vec<Value>) -> Result<Value> {
        let container = self.container;
        let method = container.method(id)?;
        let body = method.implementation_or_err()?;
        assert_eq!(
            arguments.len(),
            usize::from(method.parameter_registers()),
            "arguments of {method}"
        );

        let count = usize::from(body.register_count());
        let mut registers = vec![Value::Null; count];
        registers[count - arguments.len()..].clone_from_slice(&arguments);

        let stream = body.instructions();
        let mut pc = 0;
        let mut result = Value::Null;
        loop {
            self.steps += 1;
            assert!(self.steps < STEP_LIMIT, "step limit in {method}");

            let instruction = stream.get_or_err(pc)?;
            let r: Vec<usize> = instruction.registers.iter().map(|&r| usize::from(r)).collect();
            let mut next = pc + 1;

            match instruction.opcode {
                Opcode::Nop | Opcode::MonitorEnter | Opcode::MonitorExit => {}
                Opcode::Move
                | Opcode::MoveFrom16
                | Opcode::Move16
                | Opcode::MoveWide
                | Opcode::MoveWideFrom16
                | Opcode::MoveWide16
                | Opcode::MoveObject
                | Opcode::MoveObjectFrom16
                | Opcode::MoveObject16
                | Opcode::IntToLong
                | Opcode::LongToInt => registers[r[0]] = registers[r[1]].clone(),
                Opcode::MoveResult | Opcode::MoveResultWide | Opcode::MoveResultObject => {
                    registers[r[0]] = result.clone();
                }
                Opcode::ReturnVoid => return Ok(Value::Null),
                Opcode::Return | Opcode::ReturnWide | Opcode::ReturnObject => {
                    return Ok(registers[r[0]].clone())
                }
                Opcode::Const4
                | Opcode::Const16
                | Opcode::Const
                | Opcode::ConstHigh16
                | Opcode::ConstWide16
                | Opcode::ConstWide32
                | Opcode::ConstWide
                | Opcode::ConstWideHigh16 => {
                    registers[r[0]] = Value::Int(instruction.literal.unwrap_or_default());
                }
                Opcode::ConstString | Opcode::ConstStringJumbo => {
                    let value = instruction.string_reference().unwrap_or_default();
                    registers[r[0]] = Value::Str(value.to_string());
                }
                Opcode::NewInstance => {
                    let class = instruction.type_reference().unwrap_or_default().to_string();
                    registers[r[0]] = self.object(&class, &[]);
                }
                Opcode::NewArray => {
                    let length = usize::try_from(registers[r[1]].as_int()).unwrap_or_default();
                    let array_type = instruction.type_reference().unwrap_or_default();
                    self.heap.push(HeapEntry::Array {
                        element_type: array_type.to_string(),
                        items: vec![Value::Null; length],
                    });
                    registers[r[0]] = Value::Ref(self.heap.len() - 1);
                }
                Opcode::ArrayLength => {
                    let length = self.array(&registers[r[1]]).map_or(0, <[Value]>::len);
                    registers[r[0]] = Value::Int(length as i64);
                }
                Opcode::CheckCast => {
                    let target = instruction.type_reference().unwrap_or_default();
                    let value = &registers[r[0]];
                    assert!(
                        *value == Value::Null || self.instance_of(value, target),
                        "ClassCastException: {value:?} to {target} in {method}"
                    );
                }
                Opcode::InstanceOf => {
                    let target = instruction.type_reference().unwrap_or_default();
                    let is = self.instance_of(&registers[r[1]], target);
                    registers[r[0]] = Value::Int(i64::from(is));
                }
                Opcode::Throw => panic!("throw in {method}"),
                Opcode::Goto | Opcode::Goto16 | Opcode::Goto32 => {
                    next = branch_target(stream, instruction)?;
                }
                Opcode::PackedSwitch | Opcode::SparseSwitch => {
                    let key = registers[r[0]].as_int();
                    if let Some(case) = instruction
                        .switch_cases()
                        .iter()
                        .find(|case| i64::from(case.key) == key)
                    {
                        next = stream.resolve(case.target)?;
                    }
                }
                Opcode::CmpLong => {
                    let (a, b) = (registers[r[1]].as_int(), registers[r[2]].as_int());
                    registers[r[0]] = Value::Int(a.cmp(&b) as i64);
                }
                Opcode::IfEqz
                | Opcode::IfNez
                | Opcode::IfLtz
                | Opcode::IfGez
                | Opcode::IfGtz
                | Opcode::IfLez => {
                    let value = registers[r[0]].as_int();
                    let taken = match instruction.opcode {
                        Opcode::IfEqz => value == 0,
                        Opcode::IfNez => value != 0,
                        Opcode::IfLtz => value < 0,
                        Opcode::IfGez => value >= 0,
                        Opcode::IfGtz => value > 0,
                        _ => value <= 0,
                    };
                    if taken {
                        next = branch_target(stream, instruction)?;
                    }
                }
                Opcode::IfEq
                | Opcode::IfNe
                | Opcode::IfLt
                | Opcode::IfGe
                | Opcode::IfGt
                | Opcode::IfLe => {
                    let (a, b) = (registers[r[0]].as_int(), registers[r[1]].as_int());
                    let taken = match instruction.opcode {
                        Opcode::IfEq => a == b,
                        Opcode::IfNe => a != b,
                        Opcode::IfLt => a < b,
                        Opcode::IfGe => a >= b,
                        Opcode::IfGt => a > b,
                        _ => a <= b,
                    };
                    if taken {
                        next = branch_target(stream, instruction)?;
                    }
                }
                Opcode::Aget | Opcode::AgetObject | Opcode::AgetBoolean => {
                    let index = usize::try_from(registers[r[2]].as_int()).unwrap_or(usize::MAX);
                    let items = self.array(&registers[r[1]]).expect("aget on a non array");
                    registers[r[0]] = items[index].clone();
                }
                Opcode::Aput | Opcode::AputObject | Opcode::AputBoolean => {
                    let index = usize::try_from(registers[r[2]].as_int()).unwrap_or(usize::MAX);
                    let value = registers[r[0]].clone();
                    match &registers[r[1]] {
                        Value::Ref(array) => match &mut self.heap[*array] {
                            HeapEntry::Array { items, .. } => items[index] = value,
                            HeapEntry::Object { class, .. } => panic!("aput into {class}"),
                        },
                        other => panic!("aput into {other:?} in {method}"),
                    }
                }
                Opcode::Iget | Opcode::IgetWide | Opcode::IgetObject | Opcode::IgetBoolean => {
                    let field = field(instruction.field_reference());
                    let value = match &registers[r[1]] {
                        Value::Ref(object) => match &self.heap[*object] {
                            HeapEntry::Object { fields, .. } => fields.get(&field.name).cloned(),
                            HeapEntry::Array { .. } => panic!("iget on an array"),
                        },
                        other => panic!("iget {field} on {other:?} in {method}"),
                    };
                    registers[r[0]] = value.unwrap_or_else(|| default_value(&field.field_type));
                }
                Opcode::Iput | Opcode::IputWide | Opcode::IputObject | Opcode::IputBoolean => {
                    let field = field(instruction.field_reference());
                    let value = registers[r[0]].clone();
                    match &registers[r[1]] {
                        Value::Ref(object) => match &mut self.heap[*object] {
                            HeapEntry::Object { fields, .. } => {
                                fields.insert(field.name, value);
                            }
                            HeapEntry::Array { .. } => panic!("iput on an array"),
                        },
                        other => panic!("iput {field} on {other:?} in {method}"),
                    }
                }
                Opcode::Sget | Opcode::SgetWide | Opcode::SgetObject | Opcode::SgetBoolean => {
                    let field = field(instruction.field_reference());
                    registers[r[0]] = self
                        .statics
                        .get(&field.to_string())
                        .cloned()
                        .unwrap_or_else(|| default_value(&field.field_type));
                }
                Opcode::Sput | Opcode::SputWide | Opcode::SputObject | Opcode::SputBoolean => {
                    let field = field(instruction.field_reference());
                    self.statics.insert(field.to_string(), registers[r[0]].clone());
                }
                Opcode::InvokeVirtual
                | Opcode::InvokeSuper
                | Opcode::InvokeDirect
                | Opcode::InvokeStatic
                | Opcode::InvokeInterface
                | Opcode::InvokeVirtualRange
                | Opcode::InvokeSuperRange
                | Opcode::InvokeDirectRange
                | Opcode::InvokeStaticRange
                | Opcode::InvokeInterfaceRange => {
                    let reference = instruction
                        .method_reference()
                        .cloned()
                        .expect("invoke without a method");
                    let arguments: Vec<Value> =
                        r.iter().map(|&register| registers[register].clone()).collect();
                    self.calls.push(Call {
                        method: reference.clone(),
                        arguments: arguments.clone(),
                    });
                    result = match self.resolve(&reference) {
                        Some(callee) => self.execute(callee, arguments)?,
                        None => self.respond_to(&reference),
                    };
                }
                Opcode::NegInt | Opcode::NegLong => {
                    registers[r[0]] = Value::Int(-registers[r[1]].as_int());
                }
                Opcode::NotInt | Opcode::NotLong => {
                    registers[r[0]] = Value::Int(!registers[r[1]].as_int());
                }
                Opcode::IntToByte => {
                    registers[r[0]] = Value::Int(i64::from(registers[r[1]].as_int() as i8));
                }
                Opcode::IntToShort => {
                    registers[r[0]] = Value::Int(i64::from(registers[r[1]].as_int() as i16));
                }
                Opcode::IntToChar => {
                    registers[r[0]] = Value::Int(i64::from(registers[r[1]].as_int() as u16));
                }
                Opcode::AddInt
                | Opcode::SubInt
                | Opcode::MulInt
                | Opcode::DivInt
                | Opcode::RemInt
                | Opcode::AndInt
                | Opcode::OrInt
                | Opcode::XorInt
                | Opcode::ShlInt
                | Opcode::ShrInt
                | Opcode::UshrInt
                | Opcode::AddLong
                | Opcode::SubLong
                | Opcode::MulLong
                | Opcode::DivLong
                | Opcode::RemLong
                | Opcode::AndLong
                | Opcode::OrLong
                | Opcode::XorLong
                | Opcode::ShlLong
                | Opcode::ShrLong
                | Opcode::UshrLong => {
                    let value = arithmetic(
                        instruction.opcode,
                        registers[r[1]].as_int(),
                        registers[r[2]].as_int(),
                    );
                    registers[r[0]] = Value::Int(value);
                }
                Opcode::AddInt2Addr
                | Opcode::SubInt2Addr
                | Opcode::MulInt2Addr
                | Opcode::DivInt2Addr
                | Opcode::RemInt2Addr
                | Opcode::AndInt2Addr
                | Opcode::OrInt2Addr
                | Opcode::XorInt2Addr
                | Opcode::ShlInt2Addr
                | Opcode::ShrInt2Addr
                | Opcode::UshrInt2Addr
                | Opcode::AddLong2Addr
                | Opcode::SubLong2Addr
                | Opcode::MulLong2Addr
                | Opcode::AndLong2Addr
                | Opcode::OrLong2Addr
                | Opcode::XorLong2Addr => {
                    let value = arithmetic(
                        instruction.opcode,
                        registers[r[0]].as_int(),
                        registers[r[1]].as_int(),
                    );
                    registers[r[0]] = Value::Int(value);
                }
                Opcode::AddIntLit16
                | Opcode::RsubInt
                | Opcode::MulIntLit16
                | Opcode::DivIntLit16
                | Opcode::RemIntLit16
                | Opcode::AndIntLit16
                | Opcode::OrIntLit16
                | Opcode::XorIntLit16
                | Opcode::AddIntLit8
                | Opcode::RsubIntLit8
                | Opcode::MulIntLit8
                | Opcode::DivIntLit8
                | Opcode::RemIntLit8
                | Opcode::AndIntLit8
                | Opcode::OrIntLit8
                | Opcode::XorIntLit8
                | Opcode::ShlIntLit8
                | Opcode::ShrIntLit8
                | Opcode::UshrIntLit8 => {
                    let value = arithmetic(
                        instruction.opcode,
                        registers[r[1]].as_int(),
                        instruction.literal.unwrap_or_default(),
                    );
                    registers[r[0]] = Value::Int(value);
                }
                other => panic!("{other} is not supported by the test machine"),
            }

            pc = next;
        }
    }

    fn resolve(&self, reference: &MethodReference) -> Option<MethodId> {
        let class = self.container.class_index(&reference.defining_class)?;
        let method = self.container.classes()[class].methods.iter().position(|m| {
            m.name == reference.name
                && m.parameters == reference.parameters
                && m.implementation.is_some()
        })?;
        Some(MethodId { class, method })
    }

    fn respond_to(&self, reference: &MethodReference) -> Value {
        self.responses
            .get(&reference.name)
            .cloned()
            .unwrap_or_else(|| default_value(&reference.return_type))
    }

    fn instance_of(&self, value: &Value, target: &str) -> bool {
        let mut class = self.class_of(value).map(str::to_string);
        while let Some(current) = class {
            if current == target {
                return true;
            }
            class = self
                .container
                .class(&current)
                .and_then(|c| c.super_class.clone());
        }
        false
    }
}

fn branch_target(stream: &InstructionStream, instruction: &Instruction) -> Result<usize> {
    let label = instruction.target.expect("branch without a target");
    stream.resolve(label)
}

fn field(reference: Option<&FieldReference>) -> FieldReference {
    reference.cloned().expect("field access without a field")
}

fn default_value(descriptor: &str) -> Value {
    match descriptor.chars().next() {
        Some('L' | '[') | Some('V') | None => Value::Null,
        _ => Value::Int(0),
    }
}

/// Integer arithmetic by operation name. Values are not truncated to 32 bits.
fn arithmetic(opcode: Opcode, a: i64, b: i64) -> i64 {
    let operation = opcode.mnemonic().split('-').next().unwrap_or_default();
    let shift = (b & 63) as u32;
    match operation {
        "add" => a.wrapping_add(b),
        "sub" => a.wrapping_sub(b),
        "rsub" => b.wrapping_sub(a),
        "mul" => a.wrapping_mul(b),
        "div" => a.checked_div(b).expect("ArithmeticException: divide by zero"),
        "rem" => a.checked_rem(b).expect("ArithmeticException: divide by zero"),
        "and" => a & b,
        "or" => a | b,
        "xor" => a ^ b,
        "shl" => a.wrapping_shl(shift),
        "shr" => a.wrapping_shr(shift),
        "ushr" => ((a as u64) >> shift) as i64,
        other => panic!("{other} is not integer arithmetic"),
    }
}

fn extension_class(name: &str) -> Result<ClassDef> {
    let class = format!("{EXTENSION}/{name};");
    let array = format!("[{EXTENSION}/Filter;");
    ClassBuilder::new(class.as_str())
        .field("filters", array.as_str(), AccessFlags::PUBLIC | AccessFlags::STATIC)
        .method(
            MethodBuilder::new("<clinit>")
                .access(AccessFlags::STATIC | AccessFlags::CONSTRUCTOR)
                .registers(3)
                .body(format!(
                    "const/4 v0, 0x0\n\
                     new-array v1, v0, {array}\n\
                     sput-object v1, {class}->filters:{array}\n\
                     return-void"
                )),
        )
        .build()
}

/// An app shaped like the component pipeline of a real release.
///
/// `native` selects the conversion context of releases that decode buffers natively.
/// `create_locals` is the number of locals of the component create method, which has `this`
/// and two parameters on top.
pub fn component_app(native: bool, create_locals: u16) -> Result<BytecodeContainer> {
    let mut container = BytecodeContainer::new();
    container.add_class(extension_class("LithoFilterPatch")?)?;
    container.add_class(extension_class("LegacyLithoFilterPatch")?)?;

    let append = "invoke-virtual {v0, v1}, Ljava/lang/StringBuilder;->append(Ljava/lang/String;)Ljava/lang/StringBuilder;";
    let mut to_string = vec![
        "new-instance v0, Ljava/lang/StringBuilder;".to_string(),
        "invoke-direct {v0}, Ljava/lang/StringBuilder;-><init>()V".to_string(),
        "const-string v1, \"ConversionContext{containerInternal=\"".to_string(),
        append.to_string(),
    ];
    if native {
        to_string.push("const-string v1, \", widthConstraint=\"".to_string());
        to_string.push(append.to_string());
    }
    to_string.extend([
        "const-string v1, \", identifierProperty=\"".to_string(),
        append.to_string(),
        "iget-object v1, p0, Lapp/ConversionContext;->identifierProperty:Ljava/lang/String;"
            .to_string(),
        append.to_string(),
        "invoke-virtual {v0}, Ljava/lang/StringBuilder;->toString()Ljava/lang/String;".to_string(),
        "move-result-object v0".to_string(),
        "return-object v0".to_string(),
    ]);
    container.add_class(
        ClassBuilder::new("Lapp/ConversionContext;")
            .field("identifierProperty", "Ljava/lang/String;", AccessFlags::FINAL)
            .field("path", "Ljava/lang/StringBuilder;", AccessFlags::FINAL)
            .method(
                MethodBuilder::new("toString")
                    .returns("Ljava/lang/String;")
                    .registers(3)
                    .body(to_string.join("\n")),
            )
            .build()?,
    )?;

    container.add_class(
        ClassBuilder::new("Lapp/ComponentFactory;")
            .method(
                MethodBuilder::new("create")
                    .parameters(["Lapp/ComponentContext;", "Ljava/lang/Object;"])
                    .returns("Lapp/Component;")
                    .registers(create_locals + 3)
                    .body(
                        "const-string v0, \"Element missing correct type extension\"\n\
                         const-string v0, \"Element missing type\"\n\
                         new-instance v0, Lapp/Component;\n\
                         if-eqz p1, :done\n\
                         invoke-static {p1}, Lapp/Trace;->context(Lapp/ComponentContext;)V\n\
                         :done\n\
                         return-object v0",
                    ),
            )
            .build()?,
    )?;

    container.add_class(
        ClassBuilder::new("Lapp/EmptyComponent;")
            .super_class("Lapp/Component;")
            .method(
                MethodBuilder::new("<init>")
                    .access(AccessFlags::PRIVATE | AccessFlags::CONSTRUCTOR)
                    .registers(2)
                    .body(
                        "const-string v0, \"EmptyComponent\"\n\
                         invoke-direct {p0}, Lapp/Component;-><init>()V\n\
                         return-void",
                    ),
            )
            .method(
                MethodBuilder::new("create")
                    .access(AccessFlags::PUBLIC | AccessFlags::STATIC)
                    .parameters(["Lapp/ComponentContext;"])
                    .returns("Lapp/EmptyBuilder;")
                    .registers(3)
                    .body(
                        "new-instance v0, Lapp/EmptyBuilder;\n\
                         new-instance v1, Lapp/EmptyComponent;\n\
                         iput-object v1, v0, Lapp/EmptyBuilder;->component:Lapp/Component;\n\
                         return-object v0",
                    ),
            )
            .build()?,
    )?;
    container.add_class(
        ClassBuilder::new("Lapp/EmptyBuilder;")
            .field("component", "Lapp/Component;", AccessFlags::FINAL)
            .build()?,
    )?;

    container.add_class(
        ClassBuilder::new("Lapp/BufferReference;")
            .field(
                "message",
                "Lcom/google/android/libraries/elements/adl/UpbMessage;",
                AccessFlags::FINAL,
            )
            .method(
                MethodBuilder::new("setBuffer")
                    .access(AccessFlags::PUBLIC | AccessFlags::FINAL)
                    .parameters(["[B"])
                    .registers(3)
                    .body(
                        "iget-object v0, p0, Lapp/BufferReference;->message:Lcom/google/android/libraries/elements/adl/UpbMessage;\n\
                         invoke-virtual {v0, p1}, Lcom/google/android/libraries/elements/adl/UpbMessage;->jniDecode([B)V\n\
                         return-void",
                    ),
            )
            .build()?,
    )?;
    container.add_class(
        ClassBuilder::new("Lapp/BufferSetter;")
            .field("size", "I", AccessFlags::empty())
            .field("left", "I", AccessFlags::empty())
            .method(
                MethodBuilder::new("set")
                    .access(AccessFlags::PUBLIC | AccessFlags::FINAL)
                    .parameters(["I", "Ljava/nio/ByteBuffer;"])
                    .registers(4)
                    .body(
                        "iput p1, p0, Lapp/BufferSetter;->size:I\n\
                         invoke-virtual {p2}, Ljava/nio/ByteBuffer;->remaining()I\n\
                         move-result v0\n\
                         sub-int/2addr v0, p1\n\
                         iput v0, p0, Lapp/BufferSetter;->left:I\n\
                         return-void",
                    ),
            )
            .build()?,
    )?;

    container.add_class(
        ClassBuilder::new("Lapp/ComponentExecutor;")
            .super_class("Ljava/util/concurrent/ThreadPoolExecutor;")
            .method(
                MethodBuilder::new("<init>")
                    .access(AccessFlags::PUBLIC | AccessFlags::CONSTRUCTOR)
                    .parameters(["I", "I", "I"])
                    .registers(5)
                    .body(
                        "const/4 v0, 0x1\n\
                         invoke-direct {p0, p1, p2}, Ljava/util/concurrent/ThreadPoolExecutor;-><init>(II)V\n\
                         return-void",
                    ),
            )
            .build()?,
    )?;

    container.add_class(
        ClassBuilder::new("Lapp/Flags;")
            .method(
                MethodBuilder::new("componentNames")
                    .access(AccessFlags::PUBLIC | AccessFlags::FINAL)
                    .returns("Z")
                    .registers(3)
                    .body(
                        "const-wide v0, 45631264L\n\
                         invoke-static {v0, v1}, Lapp/Flags;->enabled(J)Z\n\
                         move-result v0\n\
                         if-nez v0, :native\n\
                         invoke-virtual {p0}, Lapp/Flags;->fallback()Z\n\
                         move-result v1\n\
                         return v1\n\
                         :native\n\
                         return v0",
                    ),
            )
            .build()?,
    )?;

    Ok(container)
}

/// Makes the app look like a release whose component create method overwrites the conversion
/// context before returning: the legacy context parser shares the sub parser's signature.
pub fn reuse_conversion_context(container: &mut BytecodeContainer) -> Result<()> {
    for (class, body) in [
        (
            "Lapp/ContextParser;",
            "invoke-interface {p1}, Lapp/Element;->size()I\n\
             invoke-static/range {p1 .. p1}, Lapp/Converter;->convert(Lapp/Element;)Lapp/Component;\n\
             move-result-object v0\n\
             iget-object v1, p0, Lapp/ContextParser;->fallback:Lapp/Component;\n\
             if-nez v0, :converted\n\
             const-string v0, \"Error while converting element\"\n\
             return-object v1\n\
             :converted\n\
             return-object v0",
        ),
        (
            "Lapp/SubParser;",
            "const-string v0, \"Number of bits must be positive\"\n\
             const/4 v0, 0x0\n\
             return-object v0",
        ),
    ] {
        container.add_class(
            ClassBuilder::new(class)
                .field("fallback", "Lapp/Component;", AccessFlags::FINAL)
                .method(
                    MethodBuilder::new("parse")
                        .access(AccessFlags::PUBLIC | AccessFlags::FINAL)
                        .parameters(["Lapp/Element;"])
                        .returns("Lapp/Component;")
                        .registers(4)
                        .body(body),
                )
                .build()?,
        )?;
    }

    let create = container.find_method("Lapp/ComponentFactory;", "create")?;
    let mut editor = container.method_mut(create)?.editor()?;
    let index = editor.len() - 1;
    editor.add_instructions_at_control_flow_label(index, "const-string p2, \"consumed\"")?;
    Ok(())
}

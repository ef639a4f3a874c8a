//! Fingerprints of the component pipeline and the resolvers built on them.

use crate::{
    assembly::{FieldReference, MethodReference, Opcode},
    editor::InstructionAnchor,
    matcher::{Fingerprint, InstructionFilter, MatchResult, MethodPredicate},
    metadata::{AccessFlags, BytecodeContainer},
    Error, Result,
};

/// Literal of the feature flag that moves buffer parsing into native code.
pub const BUFFER_UPB_FEATURE_FLAG: i64 = 45_419_603;

/// Literal of the feature flag that moves component names and paths into native code. With it
/// on most components reach the filter call without identifier or path.
pub const PATH_UPB_FEATURE_FLAG: i64 = 45_631_264;

/// Native message wrapper whose decode call carries the raw buffer.
pub const UPB_MESSAGE: &str = "Lcom/google/android/libraries/elements/adl/UpbMessage;";

const THREAD_POOL_EXECUTOR: &str = "Ljava/util/concurrent/ThreadPoolExecutor;";
const STRING: &str = "Ljava/lang/String;";
const STRING_BUILDER: &str = "Ljava/lang/StringBuilder;";
const IDENTIFIER_PROPERTY: &str = ", identifierProperty=";
const BIT_COUNT_CHECK: &str = "Number of bits must be positive";

/// Static initializer of the extension class storing the filter array.
pub fn filter_registry(array_type: &str) -> Fingerprint {
    Fingerprint::new("filterRegistry")
        .access(AccessFlags::STATIC | AccessFlags::CONSTRUCTOR)
        .filter(InstructionFilter::field_access(
            Some(Opcode::SputObject),
            None,
            None,
            Some(array_type),
        ))
}

/// `toString` of the conversion context as shipped with native buffer parsing.
pub fn conversion_context_native() -> Fingerprint {
    Fingerprint::new("conversionContextToString")
        .parameters(Vec::<String>::new())
        .strings(["ConversionContext{", ", widthConstraint=", IDENTIFIER_PROPERTY])
        .custom(MethodPredicate::name("toString"))
}

/// `toString` of the conversion context of older releases.
pub fn conversion_context_legacy() -> Fingerprint {
    Fingerprint::new("conversionContextToStringLegacy")
        .parameters(Vec::<String>::new())
        .strings(["ConversionContext{", IDENTIFIER_PROPERTY])
        .custom(MethodPredicate::name("toString"))
}

/// Method creating components from their elements. Its first `return-object` is where
/// filtered components are replaced.
pub fn component_create() -> Fingerprint {
    Fingerprint::new("componentCreate")
        .strings(["Element missing correct type extension", "Element missing type"])
}

/// Private constructor of the empty component.
pub fn empty_component() -> Fingerprint {
    Fingerprint::new("emptyComponent")
        .access(AccessFlags::PRIVATE | AccessFlags::CONSTRUCTOR)
        .parameters(Vec::<String>::new())
        .strings(["EmptyComponent"])
        .custom(MethodPredicate::new(|_, class| {
            class.methods.iter().filter(|m| m.is_static()).count() == 1
        }))
}

/// Bridge handing the native decoded buffer to the component tree.
pub fn protobuf_buffer_reference() -> Fingerprint {
    Fingerprint::new("protobufBufferReference")
        .access(AccessFlags::PUBLIC | AccessFlags::FINAL)
        .returns("V")
        .parameters(["[B"])
        .filter(InstructionFilter::field_access(
            Some(Opcode::IgetObject),
            None,
            None,
            Some(UPB_MESSAGE),
        ))
        .filter(InstructionFilter::method_call(
            None,
            Some(UPB_MESSAGE),
            Some("jniDecode"),
            None,
            None,
        ))
}

/// Setter receiving the proto buffer before native parsing existed.
pub fn protobuf_buffer_reference_legacy() -> Fingerprint {
    Fingerprint::new("protobufBufferReferenceLegacy")
        .access(AccessFlags::PUBLIC | AccessFlags::FINAL)
        .returns("V")
        .parameters(["I", "Ljava/nio/ByteBuffer;"])
        .filters(InstructionFilter::opcodes(&[
            Opcode::Iput,
            Opcode::InvokeVirtual,
            Opcode::MoveResult,
            Opcode::SubInt2Addr,
        ]))
}

/// Constructor of the thread pool the component tree is built on.
pub fn thread_executor() -> Fingerprint {
    Fingerprint::new("threadExecutor")
        .access(AccessFlags::PUBLIC | AccessFlags::CONSTRUCTOR)
        .parameters(["I", "I", "I"])
        .custom(MethodPredicate::new(|method, class| {
            class.super_class.as_deref() == Some(THREAD_POOL_EXECUTOR)
                // keep-alive of one unit
                && method
                    .index_of_first_instruction(0, |i| i.literal == Some(1))
                    .is_some()
        }))
}

/// Getter of the native buffer parsing flag.
pub fn buffer_feature_flag() -> Fingerprint {
    Fingerprint::new("bufferUpbFeatureFlag")
        .returns("L")
        .filter(InstructionFilter::literal(BUFFER_UPB_FEATURE_FLAG))
}

/// Getter of the native component name and path flag.
pub fn path_feature_flag() -> Fingerprint {
    Fingerprint::new("pathUpbFeatureFlag")
        .access(AccessFlags::PUBLIC | AccessFlags::FINAL)
        .returns("Z")
        .parameters(Vec::<String>::new())
        .filter(InstructionFilter::literal(PATH_UPB_FEATURE_FLAG))
}

/// Parser of component contexts from their serialized form.
pub fn component_context_sub_parser() -> Fingerprint {
    Fingerprint::new("componentContextSubParser")
        .returns("L")
        .strings([BIT_COUNT_CHECK])
}

/// Component context parser as shipped by releases whose component create method reuses the
/// conversion context register before returning.
pub fn component_context_parser_legacy() -> Fingerprint {
    Fingerprint::new("componentContextParserLegacy")
        .access(AccessFlags::PUBLIC | AccessFlags::FINAL)
        .returns("L")
        .strings(["Error while converting"])
        .filters(InstructionFilter::opcodes(&[
            Opcode::InvokeInterface,
            Opcode::InvokeStaticRange,
            Opcode::MoveResultObject,
            Opcode::IgetObject,
        ]))
}

/// Fields of the conversion context read by the filter call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionContext {
    /// Type descriptor of the conversion context
    pub class: String,
    /// Component identifier
    pub identifier: FieldReference,
    /// Path of the component in the tree
    pub path: FieldReference,
}

impl ConversionContext {
    /// Resolves the context from a match of one of the `toString` fingerprints.
    ///
    /// The identifier is the string field read right after the `identifierProperty` label, the
    /// path is the only `StringBuilder` field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PatternNotFound`] if either field can not be told apart.
    pub fn resolve(container: &BytecodeContainer, to_string: &MatchResult) -> Result<Self> {
        let method = container.method(to_string.method)?;
        let class = container.class_at(to_string.class_slot())?;

        let label = to_string
            .string_matches
            .iter()
            .find(|s| s.value == IDENTIFIER_PROPERTY)
            .map(|s| s.index)
            .ok_or_else(|| Error::PatternNotFound("identifierProperty string".to_string()))?;
        let read = method
            .index_of_first_instruction(label, |i| {
                i.opcode == Opcode::IgetObject
                    && i.field_reference().is_some_and(|f| {
                        f.field_type == STRING && f.defining_class == class.type_descriptor
                    })
            })
            .ok_or_else(|| Error::PatternNotFound("conversion context identifier field".to_string()))?;
        let identifier = method
            .instruction(read)?
            .field_reference()
            .cloned()
            .ok_or_else(|| Error::PatternNotFound("conversion context identifier field".to_string()))?;

        let path = class.single_field_of_type(STRING_BUILDER)?.reference();

        Ok(Self {
            class: class.type_descriptor.clone(),
            identifier,
            path,
        })
    }
}

/// How to produce the empty component returned for filtered elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmptyComponent {
    /// Static builder taking the component context
    pub builder: MethodReference,
    /// Field of the builder's result holding the component
    pub field: FieldReference,
}

impl EmptyComponent {
    /// Locates the builder and the component field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PatternNotFound`] if the builder does not take exactly one register or
    /// its result type does not have exactly one field.
    pub fn locate(container: &BytecodeContainer) -> Result<Self> {
        let constructor = empty_component().match_in(container)?;
        let class = container.class_at(constructor.class_slot())?;
        let builder = class
            .methods
            .iter()
            .find(|m| m.is_static())
            .map(|m| m.reference())
            .ok_or_else(|| Error::PatternNotFound("empty component builder".to_string()))?;
        if builder.parameter_registers() != 1 {
            return Err(Error::PatternNotFound(format!(
                "empty component builder taking one register, found {builder}"
            )));
        }

        let result = container.class_or_err(&builder.return_type)?;
        let field = match result.fields.as_slice() {
            [field] => field.reference(),
            _ => {
                return Err(Error::PatternNotFound(format!(
                    "single field of {}",
                    result.type_descriptor
                )))
            }
        };

        Ok(Self { builder, field })
    }
}

/// Anchor on the store of the filter array in the static initializer of `extension_class`.
///
/// # Errors
///
/// Returns [`Error::ClassNotFound`] if the extension class is missing, or
/// [`Error::PatternNotFound`] if it never stores an `array_type`.
pub fn registry_store(
    container: &BytecodeContainer,
    extension_class: &str,
    array_type: &str,
) -> Result<InstructionAnchor> {
    let slot = container
        .class_index(extension_class)
        .ok_or_else(|| Error::ClassNotFound(extension_class.to_string()))?;
    let found = filter_registry(array_type).match_class(container, slot)?;
    InstructionAnchor::at(container, found.method, found.index(0)?)
}

/// Anchor on the first `return-object` of the component create method.
///
/// # Errors
///
/// Returns [`Error::PatternNotFound`] if the method or its return is missing.
pub fn component_return(container: &BytecodeContainer) -> Result<InstructionAnchor> {
    let found = component_create().match_in(container)?;
    let index = container
        .method(found.method)?
        .index_of_first_opcode(Opcode::ReturnObject)
        .ok_or_else(|| Error::PatternNotFound("return-object of componentCreate".to_string()))?;
    InstructionAnchor::at(container, found.method, index)
}

/// Anchor on the first instruction of the component create method.
///
/// # Errors
///
/// Returns [`Error::PatternNotFound`] if the method is missing.
pub fn component_entry(container: &BytecodeContainer) -> Result<InstructionAnchor> {
    let found = component_create().match_in(container)?;
    InstructionAnchor::at(container, found.method, 0)
}

/// Returns true if the legacy component context parser and the sub parser share a signature.
/// Releases shaped like that overwrite the conversion context in the component create method
/// before its return, so the context can only be read on entry.
///
/// # Errors
///
/// Only container errors, a missing parser is `false`.
pub fn reuses_conversion_context(container: &BytecodeContainer) -> Result<bool> {
    let (Some(legacy), Some(sub)) = (
        component_context_parser_legacy().match_or_none(container),
        component_context_sub_parser().match_or_none(container),
    ) else {
        return Ok(false);
    };
    let legacy = container.method(legacy.method)?.reference();
    let sub = container.method(sub.method)?.reference();
    Ok(legacy.name == sub.name
        && legacy.parameters == sub.parameters
        && legacy.return_type == sub.return_type)
}

/// Anchor on the first instruction of the thread executor constructor.
///
/// # Errors
///
/// Returns [`Error::PatternNotFound`] if the constructor is missing.
pub fn executor_entry(container: &BytecodeContainer) -> Result<InstructionAnchor> {
    let found = thread_executor().match_in(container)?;
    InstructionAnchor::at(container, found.method, 0)
}

/// Anchor on the literal of the flag matched by `fingerprint`, if this release has the flag.
///
/// # Errors
///
/// Only anchor errors, a missing flag is `None`.
pub fn feature_flag(
    container: &BytecodeContainer,
    fingerprint: &Fingerprint,
) -> Result<Option<InstructionAnchor>> {
    match fingerprint.match_or_none(container) {
        Some(found) => Ok(Some(InstructionAnchor::at(
            container,
            found.method,
            found.index(0)?,
        )?)),
        None => {
            log::debug!("no {} in this release", fingerprint.name());
            Ok(None)
        }
    }
}

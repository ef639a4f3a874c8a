//! Shared fixtures for unit tests.

use crate::{
    metadata::{
        AccessFlags, BytecodeContainer, ClassBuilder, ClassDef, Method, MethodBuilder, MethodId,
    },
    Result,
};

/// Class the single method fixtures live in.
pub const TEST_CLASS: &str = "Lapp/Test;";

/// A public static `run()V` with `registers` registers and the given body.
pub fn method_from_smali(registers: u16, body: &str) -> Result<Method> {
    MethodBuilder::new("run")
        .access(AccessFlags::PUBLIC | AccessFlags::STATIC)
        .registers(registers)
        .body(body)
        .build(TEST_CLASS)
}

/// A container holding [`TEST_CLASS`] with the method of [`method_from_smali`].
pub fn container_with_method(registers: u16, body: &str) -> Result<(BytecodeContainer, MethodId)> {
    let mut container = BytecodeContainer::new();
    let mut class = ClassBuilder::new(TEST_CLASS).build()?;
    class.add_method(method_from_smali(registers, body)?)?;
    let slot = container.add_class(class)?;
    Ok((container, MethodId { class: slot, method: 0 }))
}

/// Package of the extension classes in [`component_app`].
pub const EXTENSION: &str = "Lapp/extension/patches/components";

fn extension_class(name: &str) -> Result<ClassDef> {
    let class = format!("{EXTENSION}/{name};");
    let array = format!("[{EXTENSION}/Filter;");
    ClassBuilder::new(class.as_str())
        .field("filters", array.as_str(), AccessFlags::PRIVATE | AccessFlags::STATIC)
        .method(
            MethodBuilder::new("<clinit>")
                .access(AccessFlags::STATIC | AccessFlags::CONSTRUCTOR)
                .registers(3)
                .body(format!(
                    "const/4 v0, 0x0\n\
                     new-array v0, v0, {array}\n\
                     sput-object v0, {class}->filters:{array}\n\
                     return-void"
                )),
        )
        .build()
}

/// A minimal app with the shapes the component instrumentation looks for.
///
/// `native` adds the conversion context shape of releases with native buffer parsing. The
/// component create method has `create_locals` local registers next to `this` and its two
/// parameters.
pub fn component_app_with(native: bool, create_locals: u16) -> Result<BytecodeContainer> {
    let mut container = BytecodeContainer::new();

    container.add_class(extension_class("LithoFilterPatch")?)?;
    container.add_class(extension_class("LegacyLithoFilterPatch")?)?;

    let width = if native {
        "const-string v1, \", widthConstraint=\"\n\
         invoke-virtual {v0, v1}, Ljava/lang/StringBuilder;->append(Ljava/lang/String;)Ljava/lang/StringBuilder;\n"
    } else {
        ""
    };
    container.add_class(
        ClassBuilder::new("Lapp/ConversionContext;")
            .field("identifierProperty", "Ljava/lang/String;", AccessFlags::FINAL)
            .field("templateName", "Ljava/lang/String;", AccessFlags::FINAL)
            .field("path", "Ljava/lang/StringBuilder;", AccessFlags::FINAL)
            .method(
                MethodBuilder::new("toString")
                    .returns("Ljava/lang/String;")
                    .registers(3)
                    .body(format!(
                        "new-instance v0, Ljava/lang/StringBuilder;\n\
                         invoke-direct {{v0}}, Ljava/lang/StringBuilder;-><init>()V\n\
                         const-string v1, \"ConversionContext{{\"\n\
                         invoke-virtual {{v0, v1}}, Ljava/lang/StringBuilder;->append(Ljava/lang/String;)Ljava/lang/StringBuilder;\n\
                         {width}\
                         iget-object v1, p0, Lapp/ConversionContext;->templateName:Ljava/lang/String;\n\
                         invoke-virtual {{v0, v1}}, Ljava/lang/StringBuilder;->append(Ljava/lang/String;)Ljava/lang/StringBuilder;\n\
                         const-string v1, \", identifierProperty=\"\n\
                         invoke-virtual {{v0, v1}}, Ljava/lang/StringBuilder;->append(Ljava/lang/String;)Ljava/lang/StringBuilder;\n\
                         iget-object v1, p0, Lapp/ConversionContext;->identifierProperty:Ljava/lang/String;\n\
                         invoke-virtual {{v0, v1}}, Ljava/lang/StringBuilder;->append(Ljava/lang/String;)Ljava/lang/StringBuilder;\n\
                         invoke-virtual {{v0}}, Ljava/lang/StringBuilder;->toString()Ljava/lang/String;\n\
                         move-result-object v0\n\
                         return-object v0"
                    )),
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
                         invoke-direct {v0}, Lapp/Component;-><init>()V\n\
                         if-eqz v0, :done\n\
                         nop\n\
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
                    .registers(2)
                    .body("const/4 v0, 0x0\nreturn-object v0"),
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
                MethodBuilder::new("bufferConfig")
                    .access(AccessFlags::PUBLIC | AccessFlags::STATIC)
                    .returns("Lapp/Config;")
                    .registers(3)
                    .body(
                        "const-wide v0, 45419603L\n\
                         invoke-static {v0, v1}, Lapp/Flags;->enabled(J)Z\n\
                         move-result v2\n\
                         invoke-static {v2}, Lapp/Config;->of(Z)Lapp/Config;\n\
                         move-result-object v0\n\
                         return-object v0",
                    ),
            )
            .method(
                MethodBuilder::new("componentNames")
                    .access(AccessFlags::PUBLIC | AccessFlags::FINAL)
                    .returns("Z")
                    .registers(3)
                    .body(
                        "const-wide v0, 45631264L\n\
                         invoke-static {v0, v1}, Lapp/Flags;->enabled(J)Z\n\
                         move-result v0\n\
                         return v0",
                    ),
            )
            .build()?,
    )?;

    Ok(container)
}

/// Adds the component context parsers of releases whose component create method overwrites
/// the conversion context before returning, and overwrites it. With `same_signature` false the
/// sub parser is named differently, as in releases that keep the context intact.
pub fn reuse_conversion_context(
    container: &mut BytecodeContainer,
    same_signature: bool,
) -> Result<()> {
    container.add_class(
        ClassBuilder::new("Lapp/ContextParser;")
            .field("fallback", "Lapp/Component;", AccessFlags::FINAL)
            .method(
                MethodBuilder::new("parse")
                    .access(AccessFlags::PUBLIC | AccessFlags::FINAL)
                    .parameters(["Lapp/Element;"])
                    .returns("Lapp/Component;")
                    .registers(4)
                    .body(
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
            )
            .build()?,
    )?;
    container.add_class(
        ClassBuilder::new("Lapp/SubParser;")
            .method(
                MethodBuilder::new(if same_signature { "parse" } else { "parseBits" })
                    .access(AccessFlags::PUBLIC | AccessFlags::FINAL)
                    .parameters(["Lapp/Element;"])
                    .returns("Lapp/Component;")
                    .registers(3)
                    .body(
                        "const-string v0, \"Number of bits must be positive\"\n\
                         const/4 v0, 0x0\n\
                         return-object v0",
                    ),
            )
            .build()?,
    )?;

    let create = container.find_method("Lapp/ComponentFactory;", "create")?;
    let mut editor = container.method_mut(create)?.editor()?;
    let index = editor.len() - 1;
    editor.add_instructions_at_control_flow_label(index, "const-string p2, \"consumed\"")?;
    Ok(())
}

/// [`component_app_with`] with enough registers for the inline filter call.
pub fn component_app(native: bool) -> Result<BytecodeContainer> {
    component_app_with(native, 4)
}

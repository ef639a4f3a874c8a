use crate::{
    editor::InstructionAnchor,
    metadata::BytecodeContainer,
    patcher::{BuildContext, HookPoint, PatcherConfig},
    strategy::{
        component_name_flag, emit_common_hooks, emit_filter_block, empty_return, filter_call,
        fingerprints::{self, ConversionContext, EmptyComponent},
        HookStrategy, InstrumentationStrategy, LocatedHooks,
    },
    Result,
};

/// Instrumentation of releases that decode component buffers natively.
///
/// The conversion context arrives untyped, so the filter block checks its type before reading
/// the fields. The buffer is picked up right after the native decode call and again where it is
/// still handed over as a `ByteBuffer`. Filters are collected in a helper method.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeBufferStrategy;

impl NativeBufferStrategy {
    fn helper_body(hooks: &LocatedHooks) -> String {
        let context = &hooks.conversion_context;
        format!(
            "instance-of v0, p0, {class}\n\
             if-eqz v0, :unfiltered\n\
             check-cast p0, {class}\n\
             iget-object v0, p0, {identifier}\n\
             iget-object v1, p0, {path}\n\
             {call}\n\
             move-result v0\n\
             :unfiltered\n\
             return v0",
            class = context.class,
            identifier = context.identifier,
            path = context.path,
            call = filter_call(hooks, 0, 1),
        )
    }
}

impl HookStrategy for NativeBufferStrategy {
    fn kind(&self) -> InstrumentationStrategy {
        InstrumentationStrategy::NativeBuffer
    }

    fn extension_class(&self, config: &PatcherConfig) -> String {
        config.extension_class("LithoFilterPatch")
    }

    fn locate(&self, container: &BytecodeContainer, config: &PatcherConfig) -> Result<LocatedHooks> {
        let extension_class = self.extension_class(config);
        let array_type = format!("[{}/Filter;", config.extension_package);

        let to_string = fingerprints::conversion_context_native().match_in(container)?;
        let buffer = fingerprints::protobuf_buffer_reference().match_in(container)?;
        let decode = buffer.index(1)?;
        // the ByteBuffer setter is still called for some components
        let legacy_buffer =
            fingerprints::protobuf_buffer_reference_legacy().match_in(container)?;
        let buffer_flag = fingerprints::buffer_feature_flag();

        Ok(LocatedHooks {
            registry_store: fingerprints::registry_store(container, &extension_class, &array_type)?,
            filter_site: fingerprints::component_return(container)?,
            conversion_context: ConversionContext::resolve(container, &to_string)?,
            empty_component: EmptyComponent::locate(container)?,
            proto_buffer: HookPoint::after(InstructionAnchor::at(container, buffer.method, decode)?)
                .with_arguments(["p1"]),
            legacy_buffer: Some(
                HookPoint::before(InstructionAnchor::at(container, legacy_buffer.method, 0)?)
                    .with_arguments(["p2"]),
            ),
            executor: fingerprints::executor_entry(container)?,
            feature_flags: fingerprints::feature_flag(container, &buffer_flag)?
                .into_iter()
                .collect(),
            component_name_flag: component_name_flag(container, config)?,
            extension_class,
            filter_array_type: array_type,
        })
    }

    fn emit_instrumentation(&self, ctx: &mut BuildContext, hooks: &LocatedHooks) -> Result<()> {
        let context = &hooks.conversion_context;
        emit_filter_block(
            ctx,
            hooks,
            |registers| {
                let object = registers.next_register()?;
                let identifier = registers.next_register()?;
                let path = registers.next_register()?;
                Ok(format!(
                    "move-object/from16 v{object}, p2\n\
                     instance-of v{identifier}, v{object}, {class}\n\
                     if-eqz v{identifier}, :unfiltered\n\
                     iget-object v{identifier}, v{object}, {identifier_field}\n\
                     iget-object v{path}, v{object}, {path_field}\n\
                     {call}\n\
                     move-result v{object}\n\
                     if-eqz v{object}, :unfiltered\n\
                     {empty}\n\
                     :unfiltered\n\
                     nop",
                    class = context.class,
                    identifier_field = context.identifier,
                    path_field = context.path,
                    call = filter_call(hooks, identifier, path),
                    empty = empty_return(hooks, object),
                ))
            },
            Self::helper_body(hooks),
        )?;

        emit_common_hooks(ctx, hooks, "([B)V")
    }
}

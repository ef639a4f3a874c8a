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

/// Instrumentation of releases that pass component buffers as `ByteBuffer`.
///
/// The conversion context is always of the expected type here, the filter block casts instead
/// of testing. Releases that overwrite the context register before the component return are
/// filtered on entry of the create method. Filters are added to the existing static initializer
/// of the extension class.
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyStrategy;

impl LegacyStrategy {
    fn helper_body(hooks: &LocatedHooks) -> String {
        let context = &hooks.conversion_context;
        format!(
            "check-cast p0, {class}\n\
             iget-object v0, p0, {identifier}\n\
             iget-object v1, p0, {path}\n\
             {call}\n\
             move-result v0\n\
             return v0",
            class = context.class,
            identifier = context.identifier,
            path = context.path,
            call = filter_call(hooks, 0, 1),
        )
    }
}

impl HookStrategy for LegacyStrategy {
    fn kind(&self) -> InstrumentationStrategy {
        InstrumentationStrategy::Legacy
    }

    fn extension_class(&self, config: &PatcherConfig) -> String {
        config.extension_class("LegacyLithoFilterPatch")
    }

    fn locate(&self, container: &BytecodeContainer, config: &PatcherConfig) -> Result<LocatedHooks> {
        let extension_class = self.extension_class(config);
        let array_type = format!("[{}/Filter;", config.extension_package);

        let to_string = fingerprints::conversion_context_legacy().match_in(container)?;
        let buffer = fingerprints::protobuf_buffer_reference_legacy().match_in(container)?;
        let filter_site = if fingerprints::reuses_conversion_context(container)? {
            log::debug!(
                "conversion context is overwritten before the component return, filtering on entry"
            );
            fingerprints::component_entry(container)?
        } else {
            fingerprints::component_return(container)?
        };
        let mut feature_flags = Vec::new();
        for flag in [
            fingerprints::buffer_feature_flag(),
            fingerprints::path_feature_flag(),
        ] {
            feature_flags.extend(fingerprints::feature_flag(container, &flag)?);
        }

        Ok(LocatedHooks {
            registry_store: fingerprints::registry_store(container, &extension_class, &array_type)?,
            filter_site,
            conversion_context: ConversionContext::resolve(container, &to_string)?,
            empty_component: EmptyComponent::locate(container)?,
            proto_buffer: HookPoint::before(InstructionAnchor::at(container, buffer.method, 0)?)
                .with_arguments(["p2"]),
            legacy_buffer: None,
            executor: fingerprints::executor_entry(container)?,
            feature_flags,
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
                     check-cast v{object}, {class}\n\
                     iget-object v{identifier}, v{object}, {identifier_field}\n\
                     iget-object v{path}, v{object}, {path_field}\n\
                     {call}\n\
                     move-result v{identifier}\n\
                     if-eqz v{identifier}, :unfiltered\n\
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

        emit_common_hooks(ctx, hooks, "(Ljava/nio/ByteBuffer;)V")
    }
}

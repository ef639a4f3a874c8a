//! Version dependent instrumentation of the component pipeline.
//!
//! The app changed how component buffers reach the component tree: newer releases decode the
//! buffer natively and hand a byte array over, older ones pass a `ByteBuffer` directly. The
//! two code shapes need different hook points, register layouts and aggregate layouts, but the
//! extension sees the same calls either way.
//!
//! [`InstrumentationStrategy::select`] picks one branch per build; the chosen branch's
//! [`HookStrategy`] first locates every hook point without editing anything, then emits. A
//! failing locate therefore never leaves a partly instrumented container behind, and the two
//! branches are never mixed.

pub mod fingerprints;
mod legacy;
mod native;
mod version;

pub use legacy::LegacyStrategy;
pub use native::NativeBufferStrategy;
pub use version::{AppVersion, VersionInfo};

use crate::{
    analysis::FreeRegisterProvider,
    assembly::Register,
    editor::{HelperMethod, InstructionAnchor},
    metadata::{BytecodeContainer, MethodId},
    patcher::{BuildContext, HookPoint, PatcherConfig},
    registry::{AggregateLayout, AggregateSpec},
    strategy::fingerprints::{ConversionContext, EmptyComponent},
    Error, Result,
};

/// Oldest release that decodes component buffers natively.
pub const NATIVE_BUFFER_VERSION: (u32, u32) = (20, 22);

/// Name of the filter aggregate.
pub const FILTER_AGGREGATE: &str = "component-filters";

/// Name of the helper materializing the filter array.
pub const FILTER_ARRAY_HELPER: &str = "patch_getFilterArray";

/// Name of the helper running the filter call when the host has no registers to spare.
pub const FILTER_CALL_HELPER: &str = "patch_isFiltered";

/// Hook point receiving the raw component buffer.
pub const PROTO_BUFFER_HOOK: &str = "proto-buffer";

/// Hook point receiving the `ByteBuffer` the native branch also passes on.
pub const PROTO_BUFFER_LEGACY_HOOK: &str = "proto-buffer-legacy";

/// Releases reading the native component name flag, from the first up to but not including the
/// second. The flag is forced off there.
pub const COMPONENT_NAME_FLAG_VERSIONS: ((u32, u32), (u32, u32)) = ((19, 25), (20, 5));

/// Hook point of the executor core pool size argument.
pub const EXECUTOR_CORE_POOL_HOOK: &str = "executor-core-pool";

/// Hook point of the executor maximum thread count argument.
pub const EXECUTOR_MAX_THREADS_HOOK: &str = "executor-max-threads";

/// Name and prototype of the filter call on the extension class.
pub const FILTER_CALL: &str = "isFiltered(Ljava/lang/String;Ljava/lang/StringBuilder;)Z";

// 4 bit operands of iget-object, instance-of and invoke.
const FILTER_REGISTER_LIMIT: Register = 15;

/// The two instrumentation branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum InstrumentationStrategy {
    /// Buffers are decoded natively and handed over as `byte[]`
    #[strum(to_string = "native-buffer")]
    NativeBuffer,
    /// Buffers are passed as `ByteBuffer`
    #[strum(to_string = "legacy")]
    Legacy,
}

impl InstrumentationStrategy {
    /// Picks the branch for a build.
    ///
    /// The native branch needs both a recent enough release and the conversion context shape
    /// that ships with it. Unknown versions take the legacy branch.
    #[must_use]
    pub fn select(version: Option<AppVersion>, container: &BytecodeContainer) -> Self {
        let (major, minor) = NATIVE_BUFFER_VERSION;
        let recent = version.is_some_and(|v| v.is_at_least(major, minor));
        if recent
            && fingerprints::conversion_context_native()
                .match_or_none(container)
                .is_some()
        {
            InstrumentationStrategy::NativeBuffer
        } else {
            InstrumentationStrategy::Legacy
        }
    }

    /// The implementation of this branch.
    #[must_use]
    pub fn hooks(self) -> &'static dyn HookStrategy {
        static NATIVE: NativeBufferStrategy = NativeBufferStrategy;
        static LEGACY: LegacyStrategy = LegacyStrategy;
        match self {
            InstrumentationStrategy::NativeBuffer => &NATIVE,
            InstrumentationStrategy::Legacy => &LEGACY,
        }
    }

    /// Layout of the filter aggregate in this branch.
    #[must_use]
    pub fn aggregate_layout(self) -> AggregateLayout {
        match self {
            InstrumentationStrategy::NativeBuffer => AggregateLayout::HelperMethod,
            InstrumentationStrategy::Legacy => AggregateLayout::FieldInitializer,
        }
    }
}

/// Everything a branch edits, located before the first edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedHooks {
    /// Extension class receiving the calls
    pub extension_class: String,
    /// Type descriptor of the filter array
    pub filter_array_type: String,
    /// Store of the filter array in the extension class initializer
    pub registry_store: InstructionAnchor,
    /// Instruction of the component create method the filter block runs in front of
    pub filter_site: InstructionAnchor,
    /// Fields passed to the filter call
    pub conversion_context: ConversionContext,
    /// What filtered components are replaced with
    pub empty_component: EmptyComponent,
    /// Where the raw buffer is passed on
    pub proto_buffer: HookPoint,
    /// Where the `ByteBuffer` is passed on in addition to `proto_buffer`
    pub legacy_buffer: Option<HookPoint>,
    /// First instruction of the executor constructor
    pub executor: InstructionAnchor,
    /// Literals of the native parsing feature flags present in this release
    pub feature_flags: Vec<InstructionAnchor>,
    /// Getter of the component name flag, forced to return false
    pub component_name_flag: Option<MethodId>,
}

/// One instrumentation branch.
pub trait HookStrategy: Sync {
    /// Which branch this is.
    fn kind(&self) -> InstrumentationStrategy;

    /// Extension class the branch calls into.
    fn extension_class(&self, config: &PatcherConfig) -> String;

    /// Locates every hook point of the branch without editing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PatternNotFound`] or [`Error::ClassNotFound`] for the first missing
    /// hook point.
    fn locate(&self, container: &BytecodeContainer, config: &PatcherConfig) -> Result<LocatedHooks>;

    /// Installs the filter call, the buffer and executor hooks and the flag override.
    ///
    /// # Errors
    ///
    /// Returns editor errors, or [`Error::RegisterExhausted`] if not even the helper call fits.
    fn emit_instrumentation(&self, ctx: &mut BuildContext, hooks: &LocatedHooks) -> Result<()>;

    /// Opens the filter aggregate at the registry store.
    ///
    /// # Errors
    ///
    /// See [`BuildContext::open_aggregate`].
    fn emit_aggregate(&self, ctx: &mut BuildContext, hooks: &LocatedHooks) -> Result<()> {
        let spec = AggregateSpec {
            name: FILTER_AGGREGATE.to_string(),
            array_type: hooks.filter_array_type.clone(),
            layout: self.kind().aggregate_layout(),
            helper_name: FILTER_ARRAY_HELPER.to_string(),
            store_method: hooks.registry_store.method,
            store_index: hooks.registry_store.position(ctx.container())?,
        };
        ctx.open_aggregate(spec)
    }
}

/// Registers of the component create method the filter block reads.
struct FilterSite {
    method: MethodId,
    index: usize,
    busy: Vec<Register>,
}

impl FilterSite {
    fn new(ctx: &BuildContext, anchor: &InstructionAnchor) -> Result<Self> {
        let index = anchor.position(ctx.container())?;
        let method = ctx.container().method(anchor.method)?;
        let file = method
            .register_file()
            .ok_or_else(|| Error::NoImplementation(method.to_string()))?;
        // p1 component context, p2 conversion context, plus the returned component
        let first = file.first_parameter()?;
        let mut busy = vec![first + 1, first + 2];
        busy.extend(method.instruction(index)?.reads());
        Ok(Self {
            method: anchor.method,
            index,
            busy,
        })
    }
}

/// Instructions returning the empty component through `register`.
fn empty_return(hooks: &LocatedHooks, register: Register) -> String {
    format!(
        "move-object/from16 v{r}, p1\n\
         invoke-static {{v{r}}}, {builder}\n\
         move-result-object v{r}\n\
         iget-object v{r}, v{r}, {field}\n\
         return-object v{r}",
        r = register,
        builder = hooks.empty_component.builder,
        field = hooks.empty_component.field,
    )
}

/// The filter call on the two context fields.
fn filter_call(hooks: &LocatedHooks, identifier: Register, path: Register) -> String {
    format!(
        "invoke-static {{v{identifier}, v{path}}}, {}->{FILTER_CALL}",
        hooks.extension_class
    )
}

/// Inserts the filter block in front of the filter site, every path reaching the site runs it.
///
/// `inline` builds the block from three scratch registers. When the host has no three to spare
/// the filter call moves into a helper built from `helper_body`, which takes the conversion
/// context in `p0` and has two locals.
fn emit_filter_block<F>(
    ctx: &mut BuildContext,
    hooks: &LocatedHooks,
    inline: F,
    helper_body: String,
) -> Result<()>
where
    F: FnOnce(&mut FreeRegisterProvider) -> Result<String>,
{
    let site = FilterSite::new(ctx, &hooks.filter_site)?;
    match ctx.allocate_registers(site.method, site.index, 3, &site.busy, FILTER_REGISTER_LIMIT) {
        Ok(mut provider) => {
            let text = inline(&mut provider)?;
            ctx.add_instructions_at_control_flow_label(site.method, site.index, &text)?;
            Ok(())
        }
        Err(Error::RegisterExhausted { .. }) => {
            log::warn!(
                "no registers for the filter call in {}, using {}",
                site.method,
                FILTER_CALL_HELPER
            );
            let register = ctx
                .allocate_call_registers(
                    site.method,
                    site.index,
                    1,
                    &site.busy,
                    FILTER_REGISTER_LIMIT,
                )?
                .next_register()?;

            let helper = HelperMethod::new(FILTER_CALL_HELPER, "Z")
                .parameters(vec!["Ljava/lang/Object;".to_string()])
                .locals(2)
                .body(helper_body);
            let host_class = ctx.container().class_at(site.method.class)?.type_descriptor.clone();
            let call = helper.call_text(&host_class, &[register], Some(register))?;
            ctx.synthesize_helper(site.method.class, helper)?;

            let text = format!(
                "move-object/from16 v{r}, p2\n\
                 {call}\n\
                 if-eqz v{r}, :unfiltered\n\
                 {empty}\n\
                 :unfiltered\n\
                 nop",
                r = register,
                empty = empty_return(hooks, register),
            );
            ctx.add_instructions_at_control_flow_label(site.method, site.index, &text)?;
            Ok(())
        }
        Err(other) => Err(other),
    }
}

/// Getter of the component name flag if `config` targets a release that reads it.
fn component_name_flag(
    container: &BytecodeContainer,
    config: &PatcherConfig,
) -> Result<Option<MethodId>> {
    let ((first_major, first_minor), (end_major, end_minor)) = COMPONENT_NAME_FLAG_VERSIONS;
    let affected = config.target_version.is_some_and(|v| {
        v.is_at_least(first_major, first_minor) && !v.is_at_least(end_major, end_minor)
    });
    if !affected {
        return Ok(None);
    }
    Ok(Some(fingerprints::path_feature_flag().match_in(container)?.method))
}

/// Publishes and fills the buffer and executor hook points, then disables native parsing.
fn emit_common_hooks(
    ctx: &mut BuildContext,
    hooks: &LocatedHooks,
    buffer_prototype: &str,
) -> Result<()> {
    let extension = &hooks.extension_class;

    ctx.locate_hook(PROTO_BUFFER_HOOK, hooks.proto_buffer.clone());
    ctx.hook(
        PROTO_BUFFER_HOOK,
        &format!("{extension}->setProtoBuffer{buffer_prototype}"),
    )?;
    if let Some(point) = &hooks.legacy_buffer {
        ctx.locate_hook(PROTO_BUFFER_LEGACY_HOOK, point.clone());
        ctx.hook(
            PROTO_BUFFER_LEGACY_HOOK,
            &format!("{extension}->setProtoBuffer(Ljava/nio/ByteBuffer;)V"),
        )?;
    }

    ctx.locate_hook(
        EXECUTOR_CORE_POOL_HOOK,
        HookPoint::before(hooks.executor)
            .with_arguments(["p1"])
            .with_result("p1"),
    );
    ctx.locate_hook(
        EXECUTOR_MAX_THREADS_HOOK,
        HookPoint::before(hooks.executor)
            .with_arguments(["p2"])
            .with_result("p2"),
    );
    ctx.hook(
        EXECUTOR_CORE_POOL_HOOK,
        &format!("{extension}->getExecutorCorePoolSize(I)I"),
    )?;
    ctx.hook(
        EXECUTOR_MAX_THREADS_HOOK,
        &format!("{extension}->getExecutorMaxThreads(I)I"),
    )?;

    for flag in &hooks.feature_flags {
        let index = flag.position(ctx.container())?;
        ctx.override_literal(flag.method, index, 0)?;
    }
    if let Some(method) = hooks.component_name_flag {
        ctx.force_return_value(method, 0)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{component_app, reuse_conversion_context};

    #[test]
    fn test_select() -> Result<()> {
        let container = component_app(true)?;
        assert_eq!(
            InstrumentationStrategy::select(Some(AppVersion::new(20, 22, 0)), &container),
            InstrumentationStrategy::NativeBuffer
        );
        assert_eq!(
            InstrumentationStrategy::select(Some(AppVersion::new(20, 21, 9)), &container),
            InstrumentationStrategy::Legacy
        );
        assert_eq!(
            InstrumentationStrategy::select(None, &container),
            InstrumentationStrategy::Legacy
        );

        let old = component_app(false)?;
        assert_eq!(
            InstrumentationStrategy::select(Some(AppVersion::new(21, 1, 0)), &old),
            InstrumentationStrategy::Legacy
        );
        Ok(())
    }

    #[test]
    fn test_reused_conversion_context() -> Result<()> {
        let mut container = component_app(false)?;
        assert!(!fingerprints::reuses_conversion_context(&container)?);
        reuse_conversion_context(&mut container, true)?;
        assert!(fingerprints::reuses_conversion_context(&container)?);

        let mut renamed = component_app(false)?;
        reuse_conversion_context(&mut renamed, false)?;
        assert!(!fingerprints::reuses_conversion_context(&renamed)?);
        Ok(())
    }

    #[test]
    fn test_component_name_flag_versions() -> Result<()> {
        let container = component_app(false)?;
        let flag = component_name_flag(
            &container,
            &PatcherConfig::for_version(AppVersion::new(19, 47, 0)),
        )?;
        assert_eq!(
            flag,
            Some(container.find_method("Lapp/Flags;", "componentNames")?)
        );
        assert_eq!(component_name_flag(&container, &PatcherConfig::default())?, None);
        assert_eq!(
            component_name_flag(
                &container,
                &PatcherConfig::for_version(AppVersion::new(20, 22, 0))
            )?,
            None
        );
        Ok(())
    }

    #[test]
    fn test_branch_shapes() {
        let native = InstrumentationStrategy::NativeBuffer;
        assert_eq!(native.hooks().kind(), native);
        assert_eq!(native.aggregate_layout(), AggregateLayout::HelperMethod);
        assert_eq!(native.to_string(), "native-buffer");

        let legacy = InstrumentationStrategy::Legacy;
        assert_eq!(legacy.hooks().kind(), legacy);
        assert_eq!(legacy.aggregate_layout(), AggregateLayout::FieldInitializer);
    }
}

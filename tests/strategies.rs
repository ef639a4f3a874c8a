//! Both instrumentation branches must look the same from the extension's side.
//!
//! Each test instruments an app of one release shape and executes the edited methods, so the
//! checks are on calls and results rather than on instruction text.

mod common;

use common::{component_app, reuse_conversion_context, Machine, Value, EXTENSION};
use dexweave::{
    prelude::*,
    strategy::{FILTER_CALL_HELPER, NATIVE_BUFFER_VERSION},
};

const FACTORY: &str = "Lapp/ComponentFactory;";

fn instrument(
    native: bool,
    create_locals: u16,
) -> Result<(BytecodeContainer, InstrumentationStrategy)> {
    instrument_with(native, create_locals, AllocatorPolicy::default())
}

fn instrument_with(
    native: bool,
    create_locals: u16,
    allocator: AllocatorPolicy,
) -> Result<(BytecodeContainer, InstrumentationStrategy)> {
    let (major, minor) = NATIVE_BUFFER_VERSION;
    let mut config = if native {
        PatcherConfig::for_version(AppVersion::new(major, minor, 0))
    } else {
        PatcherConfig::default()
    };
    config.allocator = allocator;
    let mut ctx = BuildContext::new(component_app(native, create_locals)?, config);
    PatchScheduler::new()
        .with_patch(ComponentFilterPatch)
        .run(&mut ctx)?;
    let kind = ctx.strategy_kind().expect("strategy selected");
    Ok((ctx.into_container(), kind))
}

fn extension_class(kind: InstrumentationStrategy) -> String {
    match kind {
        InstrumentationStrategy::NativeBuffer => format!("{EXTENSION}/LithoFilterPatch;"),
        InstrumentationStrategy::Legacy => format!("{EXTENSION}/LegacyLithoFilterPatch;"),
    }
}

struct Outcome {
    component: Option<String>,
    filter_calls: Vec<(MethodReference, Vec<Value>)>,
}

/// Creates a component for a conversion context with the given identifier.
fn create_component(
    container: &BytecodeContainer,
    filtered: bool,
    component_context: Value,
) -> Result<Outcome> {
    let mut machine =
        Machine::new(container).respond("isFiltered", Value::Int(i64::from(filtered)));
    let this = machine.object(FACTORY, &[]);
    let conversion = machine.object(
        "Lapp/ConversionContext;",
        &[
            ("identifierProperty", Value::Str("ad_slot".to_string())),
            ("path", Value::Str("feed|ad_slot|".to_string())),
        ],
    );
    let result = machine.run(FACTORY, "create", vec![this, component_context, conversion])?;

    Ok(Outcome {
        component: machine.class_of(&result).map(str::to_string),
        filter_calls: machine
            .calls_to("isFiltered")
            .into_iter()
            .map(|c| (c.method.clone(), c.arguments.clone()))
            .collect(),
    })
}

fn check_filter_call(native: bool, create_locals: u16) -> Result<()> {
    let (container, kind) = instrument(native, create_locals)?;
    check_filtering(&container, kind)
}

fn check_filtering(container: &BytecodeContainer, kind: InstrumentationStrategy) -> Result<()> {
    let context = Value::Str("component context".to_string());

    let kept = create_component(container, false, context.clone())?;
    assert_eq!(kept.component.as_deref(), Some("Lapp/Component;"));

    let filtered = create_component(container, true, context)?;
    assert_eq!(filtered.component.as_deref(), Some("Lapp/EmptyComponent;"));

    assert_eq!(filtered.filter_calls.len(), 1);
    let (method, arguments) = &filtered.filter_calls[0];
    assert_eq!(method.defining_class, extension_class(kind));
    assert_eq!(method.name, "isFiltered");
    assert_eq!(
        method.parameters,
        vec!["Ljava/lang/String;", "Ljava/lang/StringBuilder;"]
    );
    assert_eq!(method.return_type, "Z");
    assert_eq!(
        arguments,
        &vec![
            Value::Str("ad_slot".to_string()),
            Value::Str("feed|ad_slot|".to_string())
        ]
    );
    Ok(())
}

#[test]
fn test_native_branch_filters_components() -> Result<()> {
    check_filter_call(true, 4)
}

#[test]
fn test_legacy_branch_filters_components() -> Result<()> {
    check_filter_call(false, 4)
}

#[test]
fn test_helper_fallback_filters_components() -> Result<()> {
    for native in [true, false] {
        let (container, _) = instrument(native, 1)?;
        let factory = container.class(FACTORY).expect("factory class");
        assert!(factory.method(FILTER_CALL_HELPER).is_some());
        check_filter_call(native, 1)?;
    }
    Ok(())
}

#[test]
fn test_helper_policy_filters_components() -> Result<()> {
    for native in [true, false] {
        let (container, kind) = instrument_with(native, 4, AllocatorPolicy::helper_always())?;
        let factory = container.class(FACTORY).expect("factory class");
        assert!(factory.method(FILTER_CALL_HELPER).is_some());
        check_filtering(&container, kind)?;
    }
    Ok(())
}

#[test]
fn test_branches_make_the_same_filter_call() -> Result<()> {
    let (native, native_kind) = instrument(true, 4)?;
    let (legacy, legacy_kind) = instrument(false, 4)?;
    assert_eq!(native_kind, InstrumentationStrategy::NativeBuffer);
    assert_eq!(legacy_kind, InstrumentationStrategy::Legacy);

    let context = Value::Str("component context".to_string());
    let native = create_component(&native, true, context.clone())?;
    let legacy = create_component(&legacy, true, context)?;

    let strip = |outcome: &Outcome| {
        outcome
            .filter_calls
            .iter()
            .map(|(m, args)| (m.name.clone(), m.parameters.clone(), args.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(strip(&native), strip(&legacy));
    assert_eq!(native.component, legacy.component);
    Ok(())
}

#[test]
fn test_branch_into_return_runs_filter() -> Result<()> {
    // A null component context takes the branch straight to the return.
    for native in [true, false] {
        let (container, _) = instrument(native, 4)?;
        let outcome = create_component(&container, true, Value::Null)?;
        assert_eq!(outcome.component.as_deref(), Some("Lapp/EmptyComponent;"));
        assert_eq!(outcome.filter_calls.len(), 1);
    }
    Ok(())
}

#[test]
fn test_native_branch_skips_foreign_contexts() -> Result<()> {
    let (container, _) = instrument(true, 4)?;
    let mut machine = Machine::new(&container).respond("isFiltered", Value::Int(1));
    let this = machine.object(FACTORY, &[]);
    let context = machine.object("Lapp/ComponentContext;", &[]);
    let foreign = machine.object("Lapp/OtherContext;", &[]);

    let result = machine.run(FACTORY, "create", vec![this, context, foreign])?;
    assert_eq!(machine.class_of(&result), Some("Lapp/Component;"));
    assert!(machine.calls_to("isFiltered").is_empty());
    Ok(())
}

#[test]
fn test_buffer_reaches_extension() -> Result<()> {
    let (native, kind) = instrument(true, 4)?;
    let mut machine = Machine::new(&native);
    let this = machine.object("Lapp/BufferReference;", &[]);
    let bytes = Value::Str("buffer bytes".to_string());
    machine.run("Lapp/BufferReference;", "setBuffer", vec![this, bytes.clone()])?;

    let names: Vec<&str> = machine.calls().iter().map(|c| c.method.name.as_str()).collect();
    assert_eq!(names, vec!["jniDecode", "setProtoBuffer"]);
    let hook = &machine.calls_to("setProtoBuffer")[0];
    assert_eq!(hook.method.defining_class, extension_class(kind));
    assert_eq!(hook.arguments, vec![bytes]);

    // ByteBuffers reach the extension in both branches
    for native in [true, false] {
        let (container, kind) = instrument(native, 4)?;
        let mut machine = Machine::new(&container).respond("remaining", Value::Int(16));
        let this = machine.object("Lapp/BufferSetter;", &[]);
        let buffer = machine.object("Ljava/nio/ByteBuffer;", &[]);
        machine.run(
            "Lapp/BufferSetter;",
            "set",
            vec![this, Value::Int(4), buffer.clone()],
        )?;

        let names: Vec<&str> = machine.calls().iter().map(|c| c.method.name.as_str()).collect();
        assert_eq!(names, vec!["setProtoBuffer", "remaining"]);
        let hook = &machine.calls_to("setProtoBuffer")[0];
        assert_eq!(hook.method.defining_class, extension_class(kind));
        assert_eq!(hook.method.parameters, vec!["Ljava/nio/ByteBuffer;"]);
        assert_eq!(hook.arguments, vec![buffer]);
    }
    Ok(())
}

/// Reads the component name flag of an instrumented app with native names switched on.
fn component_names(version: Option<AppVersion>) -> Result<Value> {
    let config = version.map_or_else(PatcherConfig::default, PatcherConfig::for_version);
    let mut ctx = BuildContext::new(component_app(false, 4)?, config);
    PatchScheduler::new()
        .with_patch(ComponentFilterPatch)
        .run(&mut ctx)?;
    let container = ctx.into_container();

    let mut machine = Machine::new(&container)
        .respond("enabled", Value::Int(1))
        .respond("fallback", Value::Int(1));
    let this = machine.object("Lapp/Flags;", &[]);
    machine.run("Lapp/Flags;", "componentNames", vec![this])
}

#[test]
fn test_component_name_flag_reads_false() -> Result<()> {
    // the literal override only covers the flag lookup, the fallback still answers
    assert_eq!(component_names(None)?, Value::Int(1));
    assert_eq!(
        component_names(Some(AppVersion::new(20, 10, 0)))?,
        Value::Int(1)
    );
    // affected releases have every return forced
    assert_eq!(
        component_names(Some(AppVersion::new(19, 25, 0)))?,
        Value::Int(0)
    );
    assert_eq!(
        component_names(Some(AppVersion::new(20, 4, 0)))?,
        Value::Int(0)
    );
    Ok(())
}

#[test]
fn test_reused_context_is_filtered_on_entry() -> Result<()> {
    let mut app = component_app(false, 4)?;
    reuse_conversion_context(&mut app)?;
    let mut ctx = BuildContext::new(app, PatcherConfig::default());
    PatchScheduler::new()
        .with_patch(ComponentFilterPatch)
        .run(&mut ctx)?;
    let kind = ctx.strategy_kind().expect("strategy selected");
    let container = ctx.into_container();

    check_filtering(&container, kind)
}

#[test]
fn test_executor_arguments_come_from_extension() -> Result<()> {
    for native in [true, false] {
        let (container, _) = instrument(native, 4)?;
        let mut machine = Machine::new(&container)
            .respond("getExecutorCorePoolSize", Value::Int(6))
            .respond("getExecutorMaxThreads", Value::Int(12));
        let this = machine.object("Lapp/ComponentExecutor;", &[]);
        machine.run(
            "Lapp/ComponentExecutor;",
            "<init>",
            vec![this.clone(), Value::Int(1), Value::Int(2), Value::Int(3)],
        )?;

        assert_eq!(
            machine.calls_to("getExecutorCorePoolSize")[0].arguments,
            vec![Value::Int(1)]
        );
        assert_eq!(
            machine.calls_to("getExecutorMaxThreads")[0].arguments,
            vec![Value::Int(2)]
        );
        let names: Vec<&str> = machine.calls().iter().map(|c| c.method.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["getExecutorCorePoolSize", "getExecutorMaxThreads", "<init>"]
        );
        assert_eq!(
            machine.calls_to("<init>")[0].arguments,
            vec![this, Value::Int(6), Value::Int(12)]
        );
    }
    Ok(())
}

#[test]
fn test_missing_hook_leaves_app_untouched() -> Result<()> {
    let mut app = component_app(false, 4)?;
    // An app without the executor the branch also hooks.
    let slot = app
        .class_index("Lapp/ComponentExecutor;")
        .expect("executor class");
    app.class_at_mut(slot)?.super_class = Some("Ljava/lang/Object;".to_string());
    let before: Vec<usize> = app.methods().map(|(_, m)| m.instruction_count()).collect();

    let mut ctx = BuildContext::new(app, PatcherConfig::default());
    let result = PatchScheduler::new()
        .with_patch(ComponentFilterPatch)
        .run(&mut ctx);
    match result {
        Err(Error::PatchFailed { patch, source }) => {
            assert_eq!(patch, "component-filter");
            assert!(matches!(*source, Error::PatternNotFound(_)));
        }
        other => panic!("expected a failed patch, got {other:?}"),
    }

    let after: Vec<usize> = ctx
        .container()
        .methods()
        .map(|(_, m)| m.instruction_count())
        .collect();
    assert_eq!(before, after);
    Ok(())
}

use crate::{
    patcher::{BuildContext, Patch},
    Result,
};

/// Hooks the component pipeline and opens the filter aggregate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComponentFilterPatch;

impl ComponentFilterPatch {
    /// Name other patches depend on.
    pub const NAME: &'static str = "component-filter";
}

impl Patch for ComponentFilterPatch {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        "Hooks the method which creates components to filter them."
    }

    fn execute(&self, ctx: &mut BuildContext) -> Result<()> {
        let strategy = ctx.select_strategy().hooks();
        let hooks = strategy.locate(ctx.container(), ctx.config())?;
        log::debug!(
            "located {} hooks, calling into {}",
            strategy.kind(),
            hooks.extension_class
        );

        strategy.emit_aggregate(ctx, &hooks)?;
        strategy.emit_instrumentation(ctx, &hooks)
    }
}

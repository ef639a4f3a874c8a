//! Shared state of one patching run.
//!
//! The [`BuildContext`] owns the container being patched together with everything patches
//! share: named aggregates, located hook points, applied literal overrides, the selected
//! instrumentation strategy and the event log. It moves through two phases:
//!
//! 1. **Executing**: patches run in dependency order, edit methods, open aggregates and
//!    register entries.
//! 2. **Finalized**: every aggregate is sealed with its final count; further registrations,
//!    edits through the context, or a second finalize fail.

use std::collections::HashMap;

use crate::{
    analysis::{FreeRegisterProvider, RegisterAllocator},
    assembly::Register,
    editor::{HelperMethod, InsertedBlock, LiteralOverride, LiteralOverrides},
    metadata::{BytecodeContainer, MethodId},
    patcher::{
        events::{EventKind, EventLog},
        hooks::{HookPlacement, HookPoint},
        PatcherConfig,
    },
    registry::{AggregateBuilder, AggregateSpec},
    strategy::{AppVersion, InstrumentationStrategy, VersionInfo},
    Error, Result,
};

/// Lifecycle phase of a [`BuildContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum BuildPhase {
    /// Patches are running
    Executing,
    /// Aggregates are sealed
    Finalized,
}

/// Shared state of one patching run.
pub struct BuildContext {
    container: BytecodeContainer,
    config: PatcherConfig,
    aggregates: Vec<AggregateBuilder>,
    hooks: HashMap<String, HookPoint>,
    overrides: LiteralOverrides,
    events: EventLog,
    phase: BuildPhase,
    strategy: Option<InstrumentationStrategy>,
    current_patch: Option<String>,
}

impl BuildContext {
    /// Starts a run over `container`.
    #[must_use]
    pub fn new(container: BytecodeContainer, config: PatcherConfig) -> Self {
        let events = if config.record_events {
            EventLog::new()
        } else {
            EventLog::disabled()
        };
        Self {
            container,
            config,
            aggregates: Vec::new(),
            hooks: HashMap::new(),
            overrides: LiteralOverrides::new(),
            events,
            phase: BuildPhase::Executing,
            strategy: None,
            current_patch: None,
        }
    }

    /// The container being patched.
    #[must_use]
    pub fn container(&self) -> &BytecodeContainer {
        &self.container
    }

    /// Mutable access to the container for edits not covered by the context.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WrongPhase`] once finalized.
    pub fn container_mut(&mut self) -> Result<&mut BytecodeContainer> {
        self.ensure_executing("edit the container")?;
        Ok(&mut self.container)
    }

    /// Ends the run and hands back the patched container.
    #[must_use]
    pub fn into_container(self) -> BytecodeContainer {
        self.container
    }

    /// The run configuration.
    #[must_use]
    pub fn config(&self) -> &PatcherConfig {
        &self.config
    }

    /// The event log.
    #[must_use]
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> BuildPhase {
        self.phase
    }

    /// Version of the target app, if known.
    #[must_use]
    pub fn version(&self) -> Option<AppVersion> {
        self.config.target_version
    }

    /// Returns true if the target is `major.minor` or newer. Unknown versions are never.
    #[must_use]
    pub fn is_at_least(&self, major: u32, minor: u32) -> bool {
        self.config
            .target_version
            .is_some_and(|v| v.is_at_least(major, minor))
    }

    /// The strategy selected for this run, if one was selected yet.
    #[must_use]
    pub fn strategy_kind(&self) -> Option<InstrumentationStrategy> {
        self.strategy
    }

    /// Selects the instrumentation strategy on first use and returns the cached choice after.
    pub fn select_strategy(&mut self) -> InstrumentationStrategy {
        if let Some(strategy) = self.strategy {
            return strategy;
        }
        let strategy = InstrumentationStrategy::select(self.version(), &self.container);
        log::info!("selected {} instrumentation", strategy);
        self.events
            .record(EventKind::StrategySelected)
            .message(strategy.to_string());
        self.strategy = Some(strategy);
        strategy
    }

    pub(crate) fn set_current_patch(&mut self, patch: Option<String>) {
        self.current_patch = patch;
    }

    fn record(&self, kind: EventKind, method: MethodId, location: usize, message: String) {
        let builder = self.events.record(kind).at(method, location).message(message);
        if let Some(patch) = &self.current_patch {
            drop(builder.patch(patch.clone()));
        }
    }

    fn ensure_executing(&self, action: &str) -> Result<()> {
        match self.phase {
            BuildPhase::Executing => Ok(()),
            BuildPhase::Finalized => Err(Error::WrongPhase(format!(
                "can not {action} after finalize"
            ))),
        }
    }

    /// Inserts `text` before the instruction at `index`, see
    /// [`crate::editor::MethodEditor::add_instructions`].
    ///
    /// # Errors
    ///
    /// [`Error::WrongPhase`] once finalized, otherwise editor errors.
    pub fn add_instructions(
        &mut self,
        method: MethodId,
        index: usize,
        text: &str,
    ) -> Result<InsertedBlock> {
        self.ensure_executing("insert instructions")?;
        let block = self
            .container
            .method_mut(method)?
            .editor()?
            .add_instructions(index, text)?;
        self.record(
            EventKind::InstructionsInserted,
            method,
            index,
            format!("{} instructions", block.len),
        );
        Ok(block)
    }

    /// Inserts `text` so that every branch to the instruction at `index` runs it first, see
    /// [`crate::editor::MethodEditor::add_instructions_at_control_flow_label`].
    ///
    /// # Errors
    ///
    /// [`Error::WrongPhase`] once finalized, otherwise editor errors.
    pub fn add_instructions_at_control_flow_label(
        &mut self,
        method: MethodId,
        index: usize,
        text: &str,
    ) -> Result<InsertedBlock> {
        self.ensure_executing("insert instructions")?;
        let block = self
            .container
            .method_mut(method)?
            .editor()?
            .add_instructions_at_control_flow_label(index, text)?;
        self.record(
            EventKind::InstructionsInserted,
            method,
            index,
            format!("{} instructions at control flow label", block.len),
        );
        Ok(block)
    }

    /// Replaces `count` instructions at `index` with `text`.
    ///
    /// # Errors
    ///
    /// [`Error::WrongPhase`] once finalized, otherwise editor errors.
    pub fn replace_instructions(
        &mut self,
        method: MethodId,
        index: usize,
        count: usize,
        text: &str,
    ) -> Result<InsertedBlock> {
        self.ensure_executing("replace instructions")?;
        let block = self
            .container
            .method_mut(method)?
            .editor()?
            .replace_instructions(index, count, text)?;
        self.record(
            EventKind::InstructionsReplaced,
            method,
            index,
            format!("{} instructions with {}", count, block.len),
        );
        Ok(block)
    }

    /// Removes `count` instructions at `index`.
    ///
    /// # Errors
    ///
    /// [`Error::WrongPhase`] once finalized, otherwise editor errors.
    pub fn remove_instructions(&mut self, method: MethodId, index: usize, count: usize) -> Result<()> {
        self.ensure_executing("remove instructions")?;
        self.container
            .method_mut(method)?
            .editor()?
            .remove_instructions(index, count)?;
        self.record(
            EventKind::InstructionsRemoved,
            method,
            index,
            format!("{count} instructions"),
        );
        Ok(())
    }

    /// Allocates `count` scratch registers at `index` of `method`, capped at `max`.
    ///
    /// # Errors
    ///
    /// [`Error::RegisterExhausted`] if fewer registers are free; callers that can move their
    /// code into a helper method should do so.
    pub fn allocate_registers(
        &self,
        method: MethodId,
        index: usize,
        count: usize,
        busy: &[Register],
        max: Register,
    ) -> Result<FreeRegisterProvider> {
        let target = self.container.method(method)?;
        let allocator = RegisterAllocator::new(target, self.config.allocator.clone())?;
        if allocator.prefers_helper() {
            self.record(
                EventKind::RegistersExhausted,
                method,
                index,
                "register pressure policy prefers a helper".to_string(),
            );
            return Err(Error::RegisterExhausted {
                index,
                requested: count,
            });
        }
        self.provide(&allocator, method, index, count, busy, max)
    }

    /// Allocates the registers a call into a helper method needs in its host.
    ///
    /// Unlike [`BuildContext::allocate_registers`] this ignores the helper preference of the
    /// allocator policy, the helper is already the fallback.
    ///
    /// # Errors
    ///
    /// [`Error::RegisterExhausted`] if fewer than `count` registers are free.
    pub fn allocate_call_registers(
        &self,
        method: MethodId,
        index: usize,
        count: usize,
        busy: &[Register],
        max: Register,
    ) -> Result<FreeRegisterProvider> {
        let target = self.container.method(method)?;
        let allocator = RegisterAllocator::new(target, self.config.allocator.clone())?;
        self.provide(&allocator, method, index, count, busy, max)
    }

    fn provide(
        &self,
        allocator: &RegisterAllocator<'_>,
        method: MethodId,
        index: usize,
        count: usize,
        busy: &[Register],
        max: Register,
    ) -> Result<FreeRegisterProvider> {
        match allocator.provider_below(index, count, busy, max) {
            Ok(provider) => {
                self.record(
                    EventKind::RegistersAllocated,
                    method,
                    index,
                    format!("{count} registers"),
                );
                Ok(provider)
            }
            Err(error @ Error::RegisterExhausted { .. }) => {
                self.record(
                    EventKind::RegistersExhausted,
                    method,
                    index,
                    error.to_string(),
                );
                Err(error)
            }
            Err(other) => Err(other),
        }
    }

    /// Synthesizes a helper method in the class at `class_slot`.
    ///
    /// # Errors
    ///
    /// [`Error::WrongPhase`] once finalized, otherwise see [`HelperMethod::install`].
    pub fn synthesize_helper(&mut self, class_slot: usize, helper: HelperMethod) -> Result<MethodId> {
        self.ensure_executing("synthesize a helper")?;
        let name = helper.name().to_string();
        let id = helper.install(&mut self.container, class_slot)?;
        self.record(EventKind::HelperSynthesized, id, 0, name);
        Ok(id)
    }

    /// Opens a named aggregate.
    ///
    /// # Errors
    ///
    /// - [`Error::WrongPhase`] once finalized
    /// - [`Error::DuplicateDefinition`] if an aggregate of this name is open
    /// - see [`AggregateBuilder::open`]
    pub fn open_aggregate(&mut self, spec: AggregateSpec) -> Result<()> {
        self.ensure_executing("open an aggregate")?;
        if self.aggregate(&spec.name).is_some() {
            return Err(Error::DuplicateDefinition(format!("aggregate {}", spec.name)));
        }

        let store = spec.store_method;
        let index = spec.store_index;
        let builder = AggregateBuilder::open(&mut self.container, spec, &self.config.allocator)?;
        if builder.layout() != builder.requested_layout() {
            self.events.warn(format!(
                "aggregate {} uses the {} layout instead of {}",
                builder.name(),
                builder.layout(),
                builder.requested_layout()
            ));
        }
        if let Some(helper) = builder.helper() {
            self.record(
                EventKind::HelperSynthesized,
                helper,
                0,
                format!("array helper of {}", builder.name()),
            );
        }
        self.record(
            EventKind::AggregateOpened,
            store,
            index,
            format!("{} ({})", builder.name(), builder.layout()),
        );
        self.aggregates.push(builder);
        Ok(())
    }

    /// The aggregate named `name`.
    #[must_use]
    pub fn aggregate(&self, name: &str) -> Option<&AggregateBuilder> {
        self.aggregates.iter().find(|a| a.name() == name)
    }

    /// Registers `class_descriptor` in the aggregate `name` and returns its slot.
    ///
    /// # Errors
    ///
    /// - [`Error::RegistrySealed`] once finalized
    /// - [`Error::AggregateNotFound`] if no aggregate of this name was opened
    pub fn add_entry(&mut self, name: &str, class_descriptor: &str) -> Result<usize> {
        if self.phase == BuildPhase::Finalized {
            return Err(Error::RegistrySealed(name.to_string()));
        }
        let aggregate = self
            .aggregates
            .iter_mut()
            .find(|a| a.name() == name)
            .ok_or_else(|| Error::AggregateNotFound(name.to_string()))?;
        let slot = aggregate.add_entry(&mut self.container, class_descriptor)?;

        let builder = self
            .events
            .record(EventKind::EntryRegistered)
            .message(format!("{class_descriptor} in {name} at slot {slot}"));
        if let Some(patch) = &self.current_patch {
            drop(builder.patch(patch.clone()));
        }
        Ok(slot)
    }

    /// Forces the value guarded by the literal at `literal_index` of `method`. Overriding the
    /// same literal again replaces the earlier override.
    ///
    /// # Errors
    ///
    /// [`Error::WrongPhase`] once finalized, otherwise see [`LiteralOverrides::apply`].
    pub fn override_literal(
        &mut self,
        method: MethodId,
        literal_index: usize,
        value: i64,
    ) -> Result<LiteralOverride> {
        self.ensure_executing("override a literal")?;
        let applied = self
            .overrides
            .apply(&mut self.container, method, literal_index, value)?;
        self.record(
            EventKind::LiteralOverridden,
            method,
            applied.index,
            format!(
                "v{} forced to {}{}",
                applied.register,
                value,
                if applied.replaced { " (replaced)" } else { "" }
            ),
        );
        Ok(applied)
    }

    /// Makes every `return` of `method` return `value`, see
    /// [`crate::editor::MethodEditor::force_return_value`].
    ///
    /// # Errors
    ///
    /// [`Error::WrongPhase`] once finalized, otherwise editor errors.
    pub fn force_return_value(&mut self, method: MethodId, value: i64) -> Result<usize> {
        self.ensure_executing("override a return")?;
        let positions = self
            .container
            .method_mut(method)?
            .editor()?
            .force_return_value(value)?;
        for index in &positions {
            self.record(
                EventKind::ReturnOverridden,
                method,
                *index,
                format!("returns {value}"),
            );
        }
        Ok(positions.len())
    }

    /// Publishes a located hook point under `name`, replacing an earlier one.
    pub fn locate_hook(&mut self, name: impl Into<String>, point: HookPoint) {
        let name = name.into();
        self.record(
            EventKind::HookLocated,
            point.anchor.method,
            self.position_or_zero(&point),
            name.clone(),
        );
        self.hooks.insert(name, point);
    }

    fn position_or_zero(&self, point: &HookPoint) -> usize {
        point.anchor.position(&self.container).unwrap_or_default()
    }

    /// The hook point published under `name`.
    #[must_use]
    pub fn hook_point(&self, name: &str) -> Option<&HookPoint> {
        self.hooks.get(name)
    }

    /// Attaches a call to `descriptor` at the hook point `name` and returns the index of the
    /// call. Calls attached to the same point run in the order they were attached.
    ///
    /// # Errors
    ///
    /// - [`Error::WrongPhase`] once finalized
    /// - [`Error::HookNotFound`] if no point was published under `name`
    /// - see [`HookPoint::call_text`] and the editor errors
    pub fn hook(&mut self, name: &str, descriptor: &str) -> Result<usize> {
        self.ensure_executing("attach a hook")?;
        let point = self
            .hooks
            .get(name)
            .cloned()
            .ok_or_else(|| Error::HookNotFound(name.to_string()))?;
        let text = point.call_text(descriptor)?;
        let method = point.anchor.method;
        let anchor = point.anchor.position(&self.container)?;

        let index = match point.placement {
            HookPlacement::Before => anchor,
            HookPlacement::After => {
                let target = self.container.method(method)?;
                let next = anchor + 1;
                match target.implementation_or_err()?.instructions().get(next) {
                    Some(i) if i.opcode.is_move_result() => next + 1,
                    _ => next,
                }
            }
        };

        let block = self
            .container
            .method_mut(method)?
            .editor()?
            .add_instructions(index, &text)?;

        // Later calls at an after-point go behind this one.
        if point.placement == HookPlacement::After {
            let last = crate::editor::InstructionAnchor::at(&self.container, method, block.end() - 1)?;
            if let Some(stored) = self.hooks.get_mut(name) {
                stored.anchor = last;
            }
        }

        self.record(EventKind::HookInstalled, method, index, descriptor.to_string());
        Ok(index)
    }

    /// Seals every aggregate with its final count.
    ///
    /// The context is finalized even if sealing an aggregate fails; the container may then hold
    /// a partially emitted aggregate and must be discarded.
    ///
    /// # Errors
    ///
    /// [`Error::RegistrySealed`] if called twice, otherwise errors of
    /// [`AggregateBuilder::finalize`].
    pub fn finalize(&mut self) -> Result<()> {
        if self.phase == BuildPhase::Finalized {
            return Err(Error::RegistrySealed("build context".to_string()));
        }
        self.phase = BuildPhase::Finalized;
        for aggregate in &mut self.aggregates {
            let count = aggregate.finalize(&mut self.container)?;
            self.events
                .record(EventKind::AggregateFinalized)
                .message(format!("{} with {} entries", aggregate.name(), count));
        }
        log::info!("build finalized: {}", self.events.summary());
        Ok(())
    }
}

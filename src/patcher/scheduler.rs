//! Dependency ordered patch execution.

use std::collections::HashMap;

use crate::{
    patcher::{events::EventKind, BuildContext, Patch},
    Error, Result,
};

/// Runs patches in dependency order against one [`BuildContext`].
///
/// Ordering is a topological sort of the declared dependencies. Patches without an ordering
/// constraint between them run in the order they were added.
#[derive(Default)]
pub struct PatchScheduler {
    patches: Vec<Box<dyn Patch>>,
}

impl PatchScheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a patch.
    pub fn add(&mut self, patch: Box<dyn Patch>) {
        self.patches.push(patch);
    }

    /// Adds a patch, builder style.
    #[must_use]
    pub fn with_patch(mut self, patch: impl Patch + 'static) -> Self {
        self.add(Box::new(patch));
        self
    }

    /// Number of patches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patches.len()
    }

    /// Returns true if no patch was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    /// Names of the patches in execution order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] for duplicate names, unknown dependencies and cycles.
    pub fn order(&self) -> Result<Vec<&'static str>> {
        Ok(self
            .schedule()?
            .into_iter()
            .map(|i| self.patches[i].name())
            .collect())
    }

    fn schedule(&self) -> Result<Vec<usize>> {
        let mut by_name = HashMap::with_capacity(self.patches.len());
        for (index, patch) in self.patches.iter().enumerate() {
            if by_name.insert(patch.name(), index).is_some() {
                return Err(Error::GraphError(format!(
                    "patch '{}' added twice",
                    patch.name()
                )));
            }
        }

        let mut indegree = vec![0usize; self.patches.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.patches.len()];
        for (index, patch) in self.patches.iter().enumerate() {
            for dependency in patch.dependencies() {
                let Some(&required) = by_name.get(dependency) else {
                    return Err(Error::GraphError(format!(
                        "patch '{}' depends on unknown patch '{}'",
                        patch.name(),
                        dependency
                    )));
                };
                indegree[index] += 1;
                dependents[required].push(index);
            }
        }

        // Kahn's algorithm, always taking the earliest added ready patch.
        let mut order = Vec::with_capacity(self.patches.len());
        let mut done = vec![false; self.patches.len()];
        while order.len() < self.patches.len() {
            let Some(next) = (0..self.patches.len()).find(|&i| !done[i] && indegree[i] == 0)
            else {
                let stuck: Vec<_> = (0..self.patches.len())
                    .filter(|&i| !done[i])
                    .map(|i| self.patches[i].name())
                    .collect();
                return Err(Error::GraphError(format!(
                    "dependency cycle between patches {}",
                    stuck.join(", ")
                )));
            };
            done[next] = true;
            order.push(next);
            for &dependent in &dependents[next] {
                indegree[dependent] -= 1;
            }
        }

        Ok(order)
    }

    /// Executes every patch, runs their finalize hooks and seals the context.
    ///
    /// # Errors
    ///
    /// - [`Error::GraphError`] if the patches can not be ordered
    /// - [`Error::PatchFailed`] naming the first patch that failed
    /// - errors of [`BuildContext::finalize`]
    pub fn run(&self, ctx: &mut BuildContext) -> Result<()> {
        let order = self.schedule()?;
        log::debug!(
            "patch order: {}",
            order
                .iter()
                .map(|&i| self.patches[i].name())
                .collect::<Vec<_>>()
                .join(" -> ")
        );

        for &index in &order {
            let patch = &self.patches[index];
            let name = patch.name();
            log::info!("applying {}", name);
            ctx.set_current_patch(Some(name.to_string()));
            ctx.events()
                .record(EventKind::PatchStarted)
                .patch(name)
                .message(patch.description());

            let result = patch.execute(ctx);
            ctx.set_current_patch(None);
            result.map_err(|source| {
                log::error!("{} failed: {}", name, source);
                Error::PatchFailed {
                    patch: name.to_string(),
                    source: Box::new(source),
                }
            })?;
            ctx.events().record(EventKind::PatchCompleted).patch(name);
        }

        for &index in &order {
            let patch = &self.patches[index];
            ctx.set_current_patch(Some(patch.name().to_string()));
            let result = patch.finalize(ctx);
            ctx.set_current_patch(None);
            result.map_err(|source| Error::PatchFailed {
                patch: patch.name().to_string(),
                source: Box::new(source),
            })?;
        }

        ctx.finalize()
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::{metadata::BytecodeContainer, patcher::PatcherConfig};

    struct TestPatch {
        name: &'static str,
        dependencies: Vec<&'static str>,
        fail: bool,
        trace: Rc<RefCell<Vec<String>>>,
    }

    impl TestPatch {
        fn new(name: &'static str, trace: &Rc<RefCell<Vec<String>>>) -> Self {
            Self {
                name,
                dependencies: Vec::new(),
                fail: false,
                trace: Rc::clone(trace),
            }
        }

        fn after(mut self, dependency: &'static str) -> Self {
            self.dependencies.push(dependency);
            self
        }
    }

    impl Patch for TestPatch {
        fn name(&self) -> &'static str {
            self.name
        }

        fn dependencies(&self) -> &[&'static str] {
            &self.dependencies
        }

        fn execute(&self, _ctx: &mut BuildContext) -> Result<()> {
            self.trace.borrow_mut().push(format!("execute {}", self.name));
            if self.fail {
                return Err(Error::PatternNotFound("missing".to_string()));
            }
            Ok(())
        }

        fn finalize(&self, _ctx: &mut BuildContext) -> Result<()> {
            self.trace.borrow_mut().push(format!("finalize {}", self.name));
            Ok(())
        }
    }

    fn context() -> BuildContext {
        BuildContext::new(BytecodeContainer::new(), PatcherConfig::default())
    }

    #[test]
    fn test_dependency_order() -> Result<()> {
        let trace = Rc::new(RefCell::new(Vec::new()));
        let scheduler = PatchScheduler::new()
            .with_patch(TestPatch::new("contribution", &trace).after("registry"))
            .with_patch(TestPatch::new("flags", &trace))
            .with_patch(TestPatch::new("registry", &trace));

        assert_eq!(scheduler.order()?, vec!["flags", "registry", "contribution"]);

        let mut ctx = context();
        scheduler.run(&mut ctx)?;
        assert_eq!(
            *trace.borrow(),
            vec![
                "execute flags",
                "execute registry",
                "execute contribution",
                "finalize flags",
                "finalize registry",
                "finalize contribution",
            ]
        );
        assert_eq!(ctx.events().count_kind(EventKind::PatchCompleted), 3);
        Ok(())
    }

    #[test]
    fn test_graph_errors() {
        let trace = Rc::new(RefCell::new(Vec::new()));
        let unknown = PatchScheduler::new().with_patch(TestPatch::new("a", &trace).after("b"));
        assert!(matches!(unknown.order(), Err(Error::GraphError(_))));

        let cycle = PatchScheduler::new()
            .with_patch(TestPatch::new("a", &trace).after("b"))
            .with_patch(TestPatch::new("b", &trace).after("a"));
        assert!(matches!(cycle.order(), Err(Error::GraphError(_))));

        let duplicate = PatchScheduler::new()
            .with_patch(TestPatch::new("a", &trace))
            .with_patch(TestPatch::new("a", &trace));
        assert!(matches!(duplicate.order(), Err(Error::GraphError(_))));
    }

    #[test]
    fn test_failure_aborts() {
        let trace = Rc::new(RefCell::new(Vec::new()));
        let mut failing = TestPatch::new("broken", &trace);
        failing.fail = true;
        let scheduler = PatchScheduler::new()
            .with_patch(failing)
            .with_patch(TestPatch::new("later", &trace).after("broken"));

        let mut ctx = context();
        match scheduler.run(&mut ctx) {
            Err(Error::PatchFailed { patch, source }) => {
                assert_eq!(patch, "broken");
                assert!(matches!(*source, Error::PatternNotFound(_)));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(*trace.borrow(), vec!["execute broken"]);
    }
}

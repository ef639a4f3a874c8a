//! Aggregates built from independent contributions.
//!
//! An aggregate is an array that many patches contribute elements to, in any order, while only
//! the final element count determines its length. Contributions are recorded as they arrive and
//! are emitted straight into the code that builds the array; the length is only fixed when the
//! aggregate is finalized after every patch ran.
//!
//! # Layouts
//!
//! - [`AggregateLayout::HelperMethod`]: a private static helper in the class of the store point
//!   builds and returns the array. The store point receives the result of a call to it.
//! - [`AggregateLayout::FieldInitializer`]: the elements are written directly in front of the
//!   store inside the existing initializer, using two scratch registers. The length constant
//!   feeding the existing `new-array` is patched on finalize.
//!
//! A field initializer aggregate silently degrades to the helper layout when no scratch
//! registers are available at the store point, when the register pressure policy asks for
//! helpers, or when the array length is not a literal.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut filters = AggregateBuilder::open(&mut container, spec, &AllocatorPolicy::default())?;
//! assert_eq!(filters.add_entry(&mut container, "Lapp/filters/AdsFilter;")?, 0);
//! assert_eq!(filters.add_entry(&mut container, "Lapp/filters/ShortsFilter;")?, 1);
//! filters.finalize(&mut container)?;
//! ```

mod layout;

use std::fmt;

use crate::{
    analysis::AllocatorPolicy,
    editor::InstructionAnchor,
    metadata::{BytecodeContainer, MethodId},
    Error, Result,
};

use layout::Emitter;

/// How an aggregate is materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum AggregateLayout {
    /// Synthesized helper method returning the array
    #[strum(serialize = "helper-method")]
    HelperMethod,
    /// Elements stored inline in the existing initializer
    #[strum(serialize = "field-initializer")]
    FieldInitializer,
}

/// Lifecycle of an aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateState {
    /// Accepting entries
    Open,
    /// Finalized, the count is frozen
    Sealed,
}

/// A registered element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterEntry {
    /// Type descriptor of the element class, instantiated with its no-argument constructor
    pub class_descriptor: String,
    /// Array slot assigned on registration
    pub slot: usize,
}

/// Everything needed to open an aggregate.
#[derive(Debug, Clone)]
pub struct AggregateSpec {
    /// Name the aggregate is addressed by
    pub name: String,
    /// Array type descriptor, e.g. `[Lapp/Filter;`
    pub array_type: String,
    /// Requested layout
    pub layout: AggregateLayout,
    /// Name of the helper method, used by the helper layout and by degradation
    pub helper_name: String,
    /// Method holding the store point
    pub store_method: MethodId,
    /// Index of the instruction publishing the array; its first register holds the array
    pub store_index: usize,
}

impl AggregateSpec {
    /// Element type descriptor.
    #[must_use]
    pub fn element_type(&self) -> &str {
        self.array_type.strip_prefix('[').unwrap_or(&self.array_type)
    }
}

/// Per build state of one aggregate.
pub struct AggregateBuilder {
    name: String,
    array_type: String,
    requested: AggregateLayout,
    emitter: Emitter,
    entries: Vec<FilterEntry>,
    state: AggregateState,
}

impl AggregateBuilder {
    /// Opens an aggregate, preparing the code of its layout at the store point.
    ///
    /// # Errors
    ///
    /// - [`Error::WrongOperand`] if the array type is not an array of references
    /// - lookup and editor errors for the store point
    pub fn open(
        container: &mut BytecodeContainer,
        spec: AggregateSpec,
        policy: &AllocatorPolicy,
    ) -> Result<Self> {
        if !spec.array_type.starts_with("[L") {
            return Err(Error::WrongOperand {
                opcode: "new-array".to_string(),
                message: format!("aggregate {} needs an object array, got {}", spec.name, spec.array_type),
            });
        }

        let store = InstructionAnchor::at(container, spec.store_method, spec.store_index)?;
        let emitter = match spec.layout {
            AggregateLayout::HelperMethod => Emitter::helper(container, &spec, store)?,
            AggregateLayout::FieldInitializer => {
                match Emitter::initializer(container, &spec, store, policy)? {
                    Some(emitter) => emitter,
                    None => {
                        log::warn!(
                            "aggregate {} degrades to a helper method at {}",
                            spec.name,
                            spec.store_method
                        );
                        Emitter::helper(container, &spec, store)?
                    }
                }
            }
        };

        log::debug!(
            "opened aggregate {} ({}) at {}",
            spec.name,
            emitter.layout(),
            spec.store_method
        );
        Ok(Self {
            name: spec.name,
            array_type: spec.array_type,
            requested: spec.layout,
            emitter,
            entries: Vec::new(),
            state: AggregateState::Open,
        })
    }

    /// Registers `class_descriptor` and returns its slot.
    ///
    /// # Errors
    ///
    /// - [`Error::RegistrySealed`] after [`AggregateBuilder::finalize`]
    /// - editor errors while emitting the element
    pub fn add_entry(
        &mut self,
        container: &mut BytecodeContainer,
        class_descriptor: &str,
    ) -> Result<usize> {
        if self.state == AggregateState::Sealed {
            return Err(Error::RegistrySealed(self.name.clone()));
        }
        if !class_descriptor.starts_with('L') || !class_descriptor.ends_with(';') {
            return Err(Error::WrongOperand {
                opcode: "new-instance".to_string(),
                message: format!("{class_descriptor} is not a class descriptor"),
            });
        }

        let slot = self.entries.len();
        self.emitter.emit_entry(container, class_descriptor, slot)?;
        self.entries.push(FilterEntry {
            class_descriptor: class_descriptor.to_string(),
            slot,
        });
        log::debug!("registered {} in {} at slot {}", class_descriptor, self.name, slot);
        Ok(slot)
    }

    /// Fixes the array length to the number of entries and seals the aggregate.
    ///
    /// # Errors
    ///
    /// - [`Error::RegistrySealed`] if already finalized
    /// - editor errors while emitting the array creation
    pub fn finalize(&mut self, container: &mut BytecodeContainer) -> Result<usize> {
        if self.state == AggregateState::Sealed {
            return Err(Error::RegistrySealed(self.name.clone()));
        }
        let count = self.entries.len();
        self.emitter.finalize(container, &self.array_type, count)?;
        self.state = AggregateState::Sealed;
        log::debug!("finalized aggregate {} with {} entries", self.name, count);
        Ok(count)
    }

    /// Name of the aggregate.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Array type descriptor.
    #[must_use]
    pub fn array_type(&self) -> &str {
        &self.array_type
    }

    /// Number of registered entries.
    #[must_use]
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Registered entries in slot order.
    #[must_use]
    pub fn entries(&self) -> &[FilterEntry] {
        &self.entries
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> AggregateState {
        self.state
    }

    /// The layout that was asked for.
    #[must_use]
    pub fn requested_layout(&self) -> AggregateLayout {
        self.requested
    }

    /// The layout in use, differs from the requested one after degradation.
    #[must_use]
    pub fn layout(&self) -> AggregateLayout {
        self.emitter.layout()
    }

    /// The synthesized helper, if the layout in use has one.
    #[must_use]
    pub fn helper(&self) -> Option<MethodId> {
        self.emitter.helper_method()
    }
}

impl fmt::Debug for AggregateBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateBuilder")
            .field("name", &self.name)
            .field("array_type", &self.array_type)
            .field("layout", &self.layout())
            .field("count", &self.entries.len())
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::Opcode,
        metadata::{AccessFlags, ClassBuilder, MethodBuilder},
    };

    const ARRAY: &str = "[Lapp/Filter;";

    /// `Lapp/Patch;` with a static initializer storing an empty filter array.
    fn initializer_container(registers: u16, body: &str) -> Result<(BytecodeContainer, MethodId)> {
        let mut container = BytecodeContainer::new();
        let class = ClassBuilder::new("Lapp/Patch;")
            .field("filters", ARRAY, AccessFlags::PRIVATE | AccessFlags::STATIC)
            .method(
                MethodBuilder::new("<clinit>")
                    .access(AccessFlags::STATIC | AccessFlags::CONSTRUCTOR)
                    .registers(registers)
                    .body(body),
            )
            .build()?;
        let slot = container.add_class(class)?;
        Ok((container, MethodId { class: slot, method: 0 }))
    }

    const CLINIT: &str = "const/4 v0, 0x0\n\
                          new-array v0, v0, [Lapp/Filter;\n\
                          sput-object v0, Lapp/Patch;->filters:[Lapp/Filter;\n\
                          return-void";

    fn spec(layout: AggregateLayout, method: MethodId) -> AggregateSpec {
        AggregateSpec {
            name: "filters".to_string(),
            array_type: ARRAY.to_string(),
            layout,
            helper_name: "patch_getFilterArray".to_string(),
            store_method: method,
            store_index: 2,
        }
    }

    #[test]
    fn test_helper_layout() -> Result<()> {
        let (mut container, clinit) = initializer_container(1, CLINIT)?;
        let mut aggregate = AggregateBuilder::open(
            &mut container,
            spec(AggregateLayout::HelperMethod, clinit),
            &AllocatorPolicy::default(),
        )?;
        assert_eq!(aggregate.add_entry(&mut container, "Lapp/A;")?, 0);
        assert_eq!(aggregate.add_entry(&mut container, "Lapp/B;")?, 1);
        assert_eq!(aggregate.finalize(&mut container)?, 2);

        let helper = container.method(aggregate.helper().ok_or(Error::NoImplementation("helper".into()))?)?;
        assert!(helper.access_flags.has_all(AccessFlags::PRIVATE | AccessFlags::STATIC));
        let body: Vec<String> = helper
            .implementation_or_err()?
            .instructions()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(body[0], "const/4 v1, 0x2");
        assert_eq!(body[1], "new-array v2, v1, [Lapp/Filter;");
        assert_eq!(body[2], "new-instance v0, Lapp/B;");
        assert_eq!(body[5], "aput-object v0, v2, v1");
        assert_eq!(body[6], "new-instance v0, Lapp/A;");
        assert_eq!(body.last().map(String::as_str), Some("return-object v2"));

        // host calls the helper right before the store
        let host = container.method(clinit)?;
        assert_eq!(host.instruction(2)?.opcode, Opcode::InvokeStatic);
        assert_eq!(host.instruction(3)?.opcode, Opcode::MoveResultObject);
        assert_eq!(host.instruction(4)?.opcode, Opcode::SputObject);

        assert!(matches!(
            aggregate.add_entry(&mut container, "Lapp/C;"),
            Err(Error::RegistrySealed(_))
        ));
        assert!(matches!(aggregate.finalize(&mut container), Err(Error::RegistrySealed(_))));
        Ok(())
    }

    #[test]
    fn test_field_initializer_layout() -> Result<()> {
        let (mut container, clinit) = initializer_container(3, CLINIT)?;
        let mut aggregate = AggregateBuilder::open(
            &mut container,
            spec(AggregateLayout::FieldInitializer, clinit),
            &AllocatorPolicy::default(),
        )?;
        assert_eq!(aggregate.layout(), AggregateLayout::FieldInitializer);
        assert!(aggregate.helper().is_none());

        aggregate.add_entry(&mut container, "Lapp/A;")?;
        aggregate.add_entry(&mut container, "Lapp/B;")?;
        aggregate.finalize(&mut container)?;

        let host = container.method(clinit)?;
        assert_eq!(host.instruction(0)?.literal, Some(2));
        assert_eq!(host.instruction(2)?.to_string(), "new-instance v1, Lapp/A;");
        assert_eq!(host.instruction(5)?.to_string(), "aput-object v1, v0, v2");
        assert_eq!(host.instruction(6)?.to_string(), "new-instance v1, Lapp/B;");
        assert_eq!(host.instruction(10)?.opcode, Opcode::SputObject);
        Ok(())
    }

    #[test]
    fn test_field_initializer_degrades_without_registers() -> Result<()> {
        let (mut container, clinit) = initializer_container(1, CLINIT)?;
        let mut aggregate = AggregateBuilder::open(
            &mut container,
            spec(AggregateLayout::FieldInitializer, clinit),
            &AllocatorPolicy::default(),
        )?;
        assert_eq!(aggregate.requested_layout(), AggregateLayout::FieldInitializer);
        assert_eq!(aggregate.layout(), AggregateLayout::HelperMethod);
        assert_eq!(aggregate.add_entry(&mut container, "Lapp/A;")?, 0);
        aggregate.finalize(&mut container)?;
        Ok(())
    }

    #[test]
    fn test_rejects_bad_input() -> Result<()> {
        let (mut container, clinit) = initializer_container(3, CLINIT)?;
        let mut bad = spec(AggregateLayout::HelperMethod, clinit);
        bad.array_type = "[I".to_string();
        assert!(AggregateBuilder::open(&mut container, bad, &AllocatorPolicy::default()).is_err());

        let mut aggregate = AggregateBuilder::open(
            &mut container,
            spec(AggregateLayout::HelperMethod, clinit),
            &AllocatorPolicy::default(),
        )?;
        assert!(aggregate.add_entry(&mut container, "app/A").is_err());
        assert_eq!(aggregate.count(), 0);
        Ok(())
    }
}

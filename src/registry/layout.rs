//! Code emission for the two aggregate layouts.

use crate::{
    analysis::{AllocatorPolicy, RegisterAllocator},
    assembly::{Opcode, Register},
    editor::{HelperMethod, InstructionAnchor},
    metadata::{BytecodeContainer, MethodId},
    registry::{AggregateLayout, AggregateSpec},
    Error, Result,
};

// Registers of the helper method.
const HELPER_ENTRY: Register = 0;
const HELPER_SLOT: Register = 1;
const HELPER_ARRAY: Register = 2;

/// `invoke-direct` only encodes registers up to v15.
const ENTRY_REGISTER_LIMIT: Register = 15;

pub(crate) enum Emitter {
    Helper {
        helper: MethodId,
    },
    Initializer {
        method: MethodId,
        store: InstructionAnchor,
        length: InstructionAnchor,
        array: Register,
        entry: Register,
        slot: Register,
    },
}

impl Emitter {
    /// Synthesizes the helper in the class of the store point and makes the store publish its
    /// result.
    pub(crate) fn helper(
        container: &mut BytecodeContainer,
        spec: &AggregateSpec,
        store: InstructionAnchor,
    ) -> Result<Self> {
        let store_index = store.position(container)?;
        let array = store_register(container, store.method, store_index)?;
        let class_slot = store.method.class;
        let defining_class = container.class_at(class_slot)?.type_descriptor.clone();

        let description = HelperMethod::new(spec.helper_name.clone(), spec.array_type.clone())
            .locals(HELPER_ARRAY + 1);
        let call = description.call_text(&defining_class, &[], Some(array))?;
        let helper = description.install(container, class_slot)?;

        container
            .method_mut(store.method)?
            .editor()?
            .add_instructions(store_index, &call)?;
        Ok(Emitter::Helper { helper })
    }

    /// Prepares inline emission in front of the store. Returns `None` if the layout can not be
    /// used at this store point.
    pub(crate) fn initializer(
        container: &mut BytecodeContainer,
        spec: &AggregateSpec,
        store: InstructionAnchor,
        policy: &AllocatorPolicy,
    ) -> Result<Option<Self>> {
        let method = container.method(store.method)?;
        let store_index = store.position(container)?;
        let array = store_register(container, store.method, store_index)?;

        let Some(new_array) = method.index_of_first_instruction_reversed(store_index, |i| {
            i.opcode == Opcode::NewArray && i.register_a() == Some(array)
        }) else {
            log::debug!("no new-array feeds the store of {}", spec.name);
            return Ok(None);
        };
        let Some(size) = method.instruction(new_array)?.register_b() else {
            return Ok(None);
        };
        let Some(length) = method.index_of_first_instruction_reversed(new_array, |i| {
            i.opcode.is_literal_const() && i.register_a() == Some(size)
        }) else {
            log::debug!("array length of {} is not a literal", spec.name);
            return Ok(None);
        };

        let allocator = RegisterAllocator::new(method, policy.clone())?;
        if allocator.prefers_helper() {
            return Ok(None);
        }
        let mut registers =
            match allocator.provider_below(store_index, 2, &[array], ENTRY_REGISTER_LIMIT) {
                Ok(provider) => provider,
                Err(Error::RegisterExhausted { .. }) => return Ok(None),
                Err(other) => return Err(other),
            };
        let entry = registers.next_register()?;
        let slot = registers.next_register()?;

        Ok(Some(Emitter::Initializer {
            method: store.method,
            store,
            length: InstructionAnchor::at(container, store.method, length)?,
            array,
            entry,
            slot,
        }))
    }

    pub(crate) fn layout(&self) -> AggregateLayout {
        match self {
            Emitter::Helper { .. } => AggregateLayout::HelperMethod,
            Emitter::Initializer { .. } => AggregateLayout::FieldInitializer,
        }
    }

    pub(crate) fn helper_method(&self) -> Option<MethodId> {
        match self {
            Emitter::Helper { helper } => Some(*helper),
            Emitter::Initializer { .. } => None,
        }
    }

    pub(crate) fn emit_entry(
        &self,
        container: &mut BytecodeContainer,
        class_descriptor: &str,
        slot_index: usize,
    ) -> Result<()> {
        let slot_index = literal(slot_index)?;
        match self {
            // Entries go to the front; the array creation is added above them on finalize.
            Emitter::Helper { helper } => {
                let text = entry_text(
                    class_descriptor,
                    slot_index,
                    HELPER_ENTRY,
                    HELPER_SLOT,
                    HELPER_ARRAY,
                );
                container.method_mut(*helper)?.editor()?.add_instructions(0, &text)?;
            }
            Emitter::Initializer {
                method,
                store,
                array,
                entry,
                slot,
                ..
            } => {
                let index = store.position(container)?;
                let text = entry_text(class_descriptor, slot_index, *entry, *slot, *array);
                container.method_mut(*method)?.editor()?.add_instructions(index, &text)?;
            }
        }
        Ok(())
    }

    pub(crate) fn finalize(
        &self,
        container: &mut BytecodeContainer,
        array_type: &str,
        count: usize,
    ) -> Result<()> {
        let count = literal(count)?;
        match self {
            Emitter::Helper { helper } => {
                let mut editor = container.method_mut(*helper)?.editor()?;
                editor.add_instructions(
                    0,
                    &format!(
                        "{} v{HELPER_SLOT}, {count}\n\
                         new-array v{HELPER_ARRAY}, v{HELPER_SLOT}, {array_type}",
                        Opcode::narrowest_const(HELPER_SLOT, count).mnemonic()
                    ),
                )?;
                let end = editor.len();
                editor.add_instructions(end, &format!("return-object v{HELPER_ARRAY}"))?;
            }
            Emitter::Initializer { method, length, .. } => {
                let index = length.position(container)?;
                container
                    .method_mut(*method)?
                    .editor()?
                    .rewrite_literal(index, count)?;
            }
        }
        Ok(())
    }
}

/// The register holding the array at the store point.
fn store_register(container: &BytecodeContainer, method: MethodId, index: usize) -> Result<Register> {
    let instruction = container.method(method)?.instruction(index)?;
    instruction.register_a().ok_or_else(|| Error::WrongOperand {
        opcode: instruction.opcode.to_string(),
        message: "store point does not read a register".to_string(),
    })
}

fn literal(value: usize) -> Result<i64> {
    i64::try_from(value).map_err(|_| malformed_error!("Aggregate index {} does not fit a literal", value))
}

fn entry_text(
    class_descriptor: &str,
    slot_index: i64,
    entry: Register,
    slot: Register,
    array: Register,
) -> String {
    format!(
        "new-instance v{entry}, {class_descriptor}\n\
         invoke-direct {{v{entry}}}, {class_descriptor}-><init>()V\n\
         {const_op} v{slot}, {slot_index}\n\
         aput-object v{entry}, v{array}, v{slot}",
        const_op = Opcode::narrowest_const(slot, slot_index).mnemonic(),
    )
}

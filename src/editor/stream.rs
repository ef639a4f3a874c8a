//! Instruction stream with identity based labels.
//!
//! Every instruction in an [`InstructionStream`] gets an [`InstructionId`] when it enters the
//! stream. Labels map to ids, never to positions, and a position table is rebuilt after each
//! structural edit:
//!
//! ```text
//!   labels      Label(0) ──► InstructionId(7)
//!   positions   InstructionId(7) ──► 11
//! ```
//!
//! Inserting or removing instructions therefore only invalidates indices, never labels. Callers
//! that hold indices across an edit must recompute them from an id or a label.

use std::collections::HashMap;

use crate::{
    assembly::{Instruction, Label},
    Error, Result,
};

/// Stable identity of an instruction within one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstructionId(u32);

impl InstructionId {
    /// Raw id value.
    #[must_use]
    pub fn value(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone)]
struct Entry {
    id: InstructionId,
    instruction: Instruction,
}

/// Ordered, editable sequence of instructions owned by one method body.
#[derive(Debug, Clone, Default)]
pub struct InstructionStream {
    entries: Vec<Entry>,
    /// Label number to bound instruction. `None` only between reservation and binding.
    labels: Vec<Option<InstructionId>>,
    positions: HashMap<InstructionId, usize>,
    next_id: u32,
}

impl InstructionStream {
    /// Creates an empty stream.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a stream from instructions without branch targets.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownLabel`] if an instruction carries a target, since a fresh stream
    /// has no labels yet.
    pub fn from_instructions(instructions: Vec<Instruction>) -> Result<Self> {
        let mut stream = Self::new();
        if let Some(branch) = instructions.iter().find(|i| !i.branch_targets().is_empty()) {
            return Err(Error::UnknownLabel(branch.to_string()));
        }
        stream.splice(0, 0, instructions)?;
        Ok(stream)
    }

    /// Number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the stream holds no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Instruction at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.entries.get(index).map(|e| &e.instruction)
    }

    /// Instruction at `index`, or [`Error::IndexOutOfRange`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if `index` is past the end of the stream.
    pub fn get_or_err(&self, index: usize) -> Result<&Instruction> {
        self.get(index).ok_or(Error::IndexOutOfRange {
            index,
            len: self.len(),
        })
    }

    /// Iterates over the instructions in order.
    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.entries.iter().map(|e| &e.instruction)
    }

    /// Identity of the instruction at `index`.
    #[must_use]
    pub fn id_at(&self, index: usize) -> Option<InstructionId> {
        self.entries.get(index).map(|e| e.id)
    }

    /// Current position of an instruction identity.
    #[must_use]
    pub fn position(&self, id: InstructionId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    /// Resolves a label to the current index of its instruction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownLabel`] for labels of another stream or unbound labels.
    pub fn resolve(&self, label: Label) -> Result<usize> {
        self.labels
            .get(label.0 as usize)
            .copied()
            .flatten()
            .and_then(|id| self.position(id))
            .ok_or_else(|| Error::UnknownLabel(label.to_string()))
    }

    /// Every label currently bound to the instruction at `index`.
    #[must_use]
    pub fn labels_at(&self, index: usize) -> Vec<Label> {
        let Some(id) = self.id_at(index) else {
            return Vec::new();
        };
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, bound)| **bound == Some(id))
            .filter_map(|(n, _)| u32::try_from(n).ok().map(Label))
            .collect()
    }

    /// Returns a label bound to the instruction at `index`, reusing an existing one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if `index` is past the end of the stream.
    pub fn label_for(&mut self, index: usize) -> Result<Label> {
        if let Some(existing) = self.labels_at(index).first() {
            return Ok(*existing);
        }
        self.new_label(index)
    }

    /// Creates a new label bound to the instruction at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if `index` is past the end of the stream.
    pub fn new_label(&mut self, index: usize) -> Result<Label> {
        let id = self.id_at(index).ok_or(Error::IndexOutOfRange {
            index,
            len: self.len(),
        })?;
        let label = self.reserve_label();
        self.labels[label.0 as usize] = Some(id);
        Ok(label)
    }

    /// Reserves a label that is bound later with [`InstructionStream::bind`].
    pub(crate) fn reserve_label(&mut self) -> Label {
        let label = Label(u32::try_from(self.labels.len()).unwrap_or(u32::MAX));
        self.labels.push(None);
        label
    }

    /// Binds (or rebinds) a label to the instruction at `index`.
    ///
    /// # Errors
    ///
    /// - [`Error::IndexOutOfRange`] if `index` is past the end of the stream
    /// - [`Error::UnknownLabel`] if the label does not belong to this stream
    pub fn bind(&mut self, label: Label, index: usize) -> Result<()> {
        let id = self.id_at(index).ok_or(Error::IndexOutOfRange {
            index,
            len: self.len(),
        })?;
        let slot = self
            .labels
            .get_mut(label.0 as usize)
            .ok_or_else(|| Error::UnknownLabel(label.to_string()))?;
        *slot = Some(id);
        Ok(())
    }

    /// Binds a reserved label to an instruction identity.
    pub(crate) fn bind_id(&mut self, label: Label, id: InstructionId) -> Result<()> {
        let slot = self
            .labels
            .get_mut(label.0 as usize)
            .ok_or_else(|| Error::UnknownLabel(label.to_string()))?;
        *slot = Some(id);
        Ok(())
    }

    /// Moves every label bound to `from` onto `to`. Returns the number of labels moved.
    pub(crate) fn retarget(&mut self, from: InstructionId, to: InstructionId) -> usize {
        let mut moved = 0;
        for bound in self.labels.iter_mut().filter(|b| **b == Some(from)) {
            *bound = Some(to);
            moved += 1;
        }
        moved
    }

    /// Number of labels defined in this stream.
    #[must_use]
    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    /// Returns true if any label is bound to the instruction at `index`.
    #[must_use]
    pub fn is_label_target(&self, index: usize) -> bool {
        self.id_at(index)
            .is_some_and(|id| self.labels.iter().any(|b| *b == Some(id)))
    }

    /// Replaces the instruction at `index` in place, keeping its identity and labels.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if `index` is past the end of the stream.
    pub(crate) fn set(&mut self, index: usize, instruction: Instruction) -> Result<()> {
        let len = self.len();
        let entry = self
            .entries
            .get_mut(index)
            .ok_or(Error::IndexOutOfRange { index, len })?;
        entry.instruction = instruction;
        Ok(())
    }

    /// Replaces `remove` instructions starting at `index` with `insert`.
    ///
    /// Labels bound to removed instructions move to the instruction that ends up at `index`
    /// afterwards: the first inserted one, or the one following the removed range. Returns the
    /// identities of the inserted instructions.
    ///
    /// # Errors
    ///
    /// - [`Error::IndexOutOfRange`] if the range exceeds the stream
    /// - [`Error::DanglingLabel`] if removed instructions carry labels and nothing takes their
    ///   place
    pub(crate) fn splice(
        &mut self,
        index: usize,
        remove: usize,
        insert: Vec<Instruction>,
    ) -> Result<Vec<InstructionId>> {
        let end = index.checked_add(remove).unwrap_or(usize::MAX);
        if index > self.len() || end > self.len() {
            return Err(Error::IndexOutOfRange {
                index: end.max(index),
                len: self.len(),
            });
        }

        let removed_ids: Vec<InstructionId> =
            self.entries[index..end].iter().map(|e| e.id).collect();
        let removed_labelled = removed_ids
            .iter()
            .any(|id| self.labels.iter().any(|b| *b == Some(*id)));
        if removed_labelled && insert.is_empty() && end == self.len() {
            return Err(Error::DanglingLabel(index));
        }

        let new_entries: Vec<Entry> = insert
            .into_iter()
            .map(|instruction| {
                let id = InstructionId(self.next_id);
                self.next_id += 1;
                Entry { id, instruction }
            })
            .collect();
        let new_ids: Vec<InstructionId> = new_entries.iter().map(|e| e.id).collect();

        self.entries.splice(index..end, new_entries);
        self.rebuild_positions();

        if removed_labelled {
            if let Some(successor) = self.id_at(index) {
                for id in &removed_ids {
                    self.retarget(*id, successor);
                }
            }
        }

        Ok(new_ids)
    }

    fn rebuild_positions(&mut self) {
        self.positions.clear();
        self.positions.extend(
            self.entries
                .iter()
                .enumerate()
                .map(|(position, entry)| (entry.id, position)),
        );
    }

    /// Index of the first instruction at or after `start` matching `predicate`.
    pub fn index_of_first<F>(&self, start: usize, mut predicate: F) -> Option<usize>
    where
        F: FnMut(&Instruction) -> bool,
    {
        self.entries
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, e)| predicate(&e.instruction))
            .map(|(i, _)| i)
    }

    /// Index of the last instruction at or before `end` matching `predicate`.
    pub fn index_of_first_reversed<F>(&self, end: usize, mut predicate: F) -> Option<usize>
    where
        F: FnMut(&Instruction) -> bool,
    {
        if self.entries.is_empty() {
            return None;
        }
        let end = end.min(self.entries.len() - 1);
        (0..=end)
            .rev()
            .find(|&i| predicate(&self.entries[i].instruction))
    }
}

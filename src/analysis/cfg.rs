//! Instruction level control flow.
//!
//! Successors of an instruction are its fall-through, its branch target or switch case targets
//! and, for instructions that may throw inside a try block, the handlers of every enclosing try
//! block. There is no
//! basic block graph; the register allocator only needs bounded forward walks.

use std::collections::{BTreeSet, VecDeque};

use crate::{metadata::MethodImplementation, Result};

/// Indices control may reach directly after the instruction at `index`.
///
/// # Errors
///
/// Returns [`crate::Error::IndexOutOfRange`] or [`crate::Error::UnknownLabel`] for broken
/// bodies.
pub fn successors(body: &MethodImplementation, index: usize) -> Result<Vec<usize>> {
    let stream = body.instructions();
    let instruction = stream.get_or_err(index)?;
    let mut next = Vec::with_capacity(2);

    if instruction.falls_through() && index + 1 < stream.len() {
        next.push(index + 1);
    }
    for target in instruction.branch_targets() {
        let position = stream.resolve(target)?;
        if !next.contains(&position) {
            next.push(position);
        }
    }
    if instruction.opcode.info().can_throw {
        for handler in body.handlers_covering(index) {
            if !next.contains(&handler) {
                next.push(handler);
            }
        }
    }

    Ok(next)
}

/// The instructions reachable from an edit point within a bounded number of steps.
///
/// Computed per query and never stored: indices are only valid for the stream version the
/// window was computed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterWindow {
    /// The edit point
    pub start: usize,
    /// Reachable instruction indices
    pub instructions: BTreeSet<usize>,
    /// True if the walk stopped at the limit with instructions left unvisited
    pub truncated: bool,
}

impl RegisterWindow {
    /// Walks breadth first from `start`, visiting at most `limit` instructions.
    ///
    /// # Errors
    ///
    /// Propagates [`successors`] errors.
    pub fn compute(body: &MethodImplementation, start: usize, limit: usize) -> Result<Self> {
        let mut window = RegisterWindow {
            start,
            instructions: BTreeSet::new(),
            truncated: false,
        };
        if start >= body.instructions().len() {
            return Ok(window);
        }

        let mut queue = VecDeque::from([start]);
        while let Some(index) = queue.pop_front() {
            if window.instructions.contains(&index) {
                continue;
            }
            if window.instructions.len() >= limit {
                window.truncated = true;
                break;
            }
            window.instructions.insert(index);
            for next in successors(body, index)? {
                if !window.instructions.contains(&next) {
                    queue.push_back(next);
                }
            }
        }

        Ok(window)
    }

    /// Returns true if `index` lies inside the window.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        self.instructions.contains(&index)
    }

    /// Number of instructions in the window.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns true if nothing is reachable.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}
